//! Errors raised while constructing decorations, sets and change sets, and while
//! validating a set's tree.

use snafu::Snafu;

/// Errors that can occur when building decoration values.
///
/// Filtering outside the document of an existing set is not represented here: it
/// panics at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecorationError {
    #[snafu(display("Invalid range: from {from} > to {to}"))]
    InvalidRange { from: usize, to: usize },

    #[snafu(display("Decoration {from}..{to} extends past document length {length}"))]
    OutOfBounds {
        from: usize,
        to: usize,
        length: usize,
    },

    #[snafu(display("Invalid change: from {from} > to {to}"))]
    InvalidChange { from: usize, to: usize },

    #[snafu(display(
        "Change at {from} overlaps or precedes the previous change ending at {previous_end}"
    ))]
    UnorderedChanges { from: usize, previous_end: usize },

    /// Reported by [`DecorationSet::check_invariants`](crate::DecorationSet::check_invariants).
    #[snafu(display("Invariant violated in node at {offset}: {detail}"))]
    InvariantViolation { offset: usize, detail: String },
}

pub type Result<T, E = DecorationError> = std::result::Result<T, E>;
