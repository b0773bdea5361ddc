//! Decoration sets for Stoat
//!
//! A decoration annotates a range or point of a document with presentation attributes,
//! a widget, or application metadata. This crate stores decorations in an immutable,
//! structurally shared tree and keeps them in sync with document edits.
//!
//! The key components are:
//! - [`Decoration`] - A range or point with a [`DecorationSpec`]
//! - [`DecorationSet`] - The persistent tree, with [`update`](DecorationSet::update) and
//!   [`map`](DecorationSet::map)
//! - [`ChangeSet`] - Validated edits driving [`DecorationSet::map`]
//! - [`decorated_spans_in_range`] - Flattens several sets into attribute-merged spans

mod change;
mod decoration;
mod error;
mod map;
mod set;
mod spans;
mod update;

pub use change::{Change, ChangeSet, ChangedRange};
pub use decoration::{
    Attributes, Bias, Decoration, DecorationSpec, Metadata, Payload, Widget, WidgetType,
};
pub use error::{DecorationError, Result};
pub use set::{DecorationSet, BASE_NODE_SIZE, MAX_LOCAL};
pub use spans::{decorated_spans_in_range, widgets_in_range, Span};
