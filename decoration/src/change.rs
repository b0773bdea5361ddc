//! Edit descriptions consumed by [`DecorationSet::map`](crate::DecorationSet::map).
//!
//! A [`Change`] replaces `[from, to)` with `len` units of new content. The engine never
//! sees the inserted text, only its length.
//!
//! # Coordinates
//!
//! Changes in a [`ChangeSet`] are applied one after another, so every change is
//! expressed in the coordinates of the document produced by the changes before it.
//! They must still be ascending and non-overlapping: a change may not start before
//! the end of the content the previous change inserted.
//!
//! ```text
//! old:  0 1 2 3 4 5 6
//!         |-|          Change { from: 1, to: 2, len: 3 }
//! mid:  0 1 x x x 2 3 4 5 6
//!                   |  Change { from: 6, to: 6, len: 2 }   (mid coordinates)
//! new:  0 1 x x x 2 y y 3 4 5 6
//! ```
//!
//! Each change is additionally located in original-document coordinates when the
//! set is built. Those locations are ascending too, which lets a position find the
//! first change that can affect it with a binary search instead of walking every
//! change.

use crate::{
    error::{InvalidChangeSnafu, Result, UnorderedChangesSnafu},
    Bias,
};
use serde::{Deserialize, Serialize};
use snafu::ensure;

/// Replace `[from, to)` with `len` units of new content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub from: usize,
    pub to: usize,
    pub len: usize,
}

impl Change {
    pub fn new(from: usize, to: usize, len: usize) -> Self {
        Self { from, to, len }
    }

    pub fn insert(pos: usize, len: usize) -> Self {
        Self::new(pos, pos, len)
    }

    pub fn delete(from: usize, to: usize) -> Self {
        Self::new(from, to, 0)
    }

    /// Net change in document length.
    pub fn delta(&self) -> isize {
        self.len as isize - (self.to as isize - self.from as isize)
    }
}

/// A region touched by a change, in both old and new document coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangedRange {
    pub from_a: usize,
    pub to_a: usize,
    pub from_b: usize,
    pub to_b: usize,
}

#[derive(Clone, Copy, Debug)]
struct Located {
    change: Change,
    /// `change.from` in original-document coordinates.
    old_from: usize,
    /// `change.to` in original-document coordinates.
    old_to: usize,
    /// Sum of the deltas of every earlier change.
    delta_before: isize,
}

/// An ordered, validated sequence of [`Change`]s.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    changes: Vec<Located>,
    delta: isize,
}

impl ChangeSet {
    /// Validate and locate a sequence of changes.
    ///
    /// Fails with [`InvalidChange`](crate::DecorationError::InvalidChange) when a change
    /// has `from > to` and with
    /// [`UnorderedChanges`](crate::DecorationError::UnorderedChanges) when a change
    /// starts inside the content inserted by its predecessor or before it.
    pub fn new(changes: impl IntoIterator<Item = Change>) -> Result<Self> {
        let mut located: Vec<Located> = Vec::new();
        let mut delta = 0isize;

        for change in changes {
            ensure!(
                change.from <= change.to,
                InvalidChangeSnafu {
                    from: change.from,
                    to: change.to,
                }
            );
            if let Some(prev) = located.last() {
                let previous_end = prev.change.from + prev.change.len;
                ensure!(
                    change.from >= previous_end,
                    UnorderedChangesSnafu {
                        from: change.from,
                        previous_end,
                    }
                );
            }

            let old_from = (change.from as isize - delta) as usize;
            located.push(Located {
                change,
                old_from,
                old_to: old_from + (change.to - change.from),
                delta_before: delta,
            });
            delta += change.delta();
        }

        Ok(Self {
            changes: located,
            delta,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> + '_ {
        self.changes.iter().map(|located| &located.change)
    }

    /// Net change in document length over the whole set.
    pub fn len_delta(&self) -> isize {
        self.delta
    }

    /// The furthest original-document position any change reaches.
    pub fn old_end(&self) -> usize {
        self.changes.last().map_or(0, |located| located.old_to)
    }

    /// Old and new coordinates of every changed region.
    pub fn changed_ranges(&self) -> Vec<ChangedRange> {
        self.changes
            .iter()
            .map(|located| {
                let from_b = (located.old_from as isize + located.delta_before) as usize;
                ChangedRange {
                    from_a: located.old_from,
                    to_a: located.old_to,
                    from_b,
                    to_b: from_b + located.change.len,
                }
            })
            .collect()
    }

    /// Whether any change touches `[from, to]` (original coordinates, inclusive).
    pub fn touches(&self, from: usize, to: usize) -> bool {
        let index = self.changes.partition_point(|c| c.old_to < from);
        self.changes
            .get(index)
            .is_some_and(|located| located.old_from <= to)
    }

    /// Map an original-document position into the new document.
    ///
    /// Positions inside a replaced range are clipped to one of its edges: `Left` to
    /// the start of the inserted content, `Right` to its end. A position exactly at
    /// the start of a non-empty replaced range stays there and one at its end follows
    /// the inserted content, since the content on their far side is untouched.
    pub fn map_pos(&self, pos: usize, bias: Bias) -> usize {
        let (mut pos, start) = self.skip_before(pos);
        for located in &self.changes[start..] {
            let Change { from, to, len } = located.change;
            if pos < from {
                break;
            }
            pos = if pos > to {
                (pos as isize + located.change.delta()) as usize
            } else if from < to && pos == from {
                from
            } else if from < to && pos == to {
                from + len
            } else {
                match bias {
                    Bias::Left => from,
                    Bias::Right => from + len,
                }
            };
        }
        pos
    }

    /// Map a point position, returning `None` when the content it is attached to
    /// is deleted.
    ///
    /// A point strictly inside a replaced range is always deleted. At the edge of a
    /// replaced range it survives only when its bias points at the untouched side:
    /// `Left` at the start, `Right` at the end. Pure insertions never delete points.
    pub fn map_point(&self, pos: usize, bias: Bias) -> Option<usize> {
        let (mut pos, start) = self.skip_before(pos);
        for located in &self.changes[start..] {
            let Change { from, to, len } = located.change;
            if pos < from {
                break;
            }
            pos = if pos > to {
                (pos as isize + located.change.delta()) as usize
            } else if from == to {
                match bias {
                    Bias::Left => from,
                    Bias::Right => from + len,
                }
            } else if pos == from && bias == Bias::Left {
                from
            } else if pos == to && bias == Bias::Right {
                from + len
            } else {
                return None;
            };
        }
        Some(pos)
    }

    /// Shift `pos` past every change that ends strictly before it, returning the
    /// shifted position and the index of the first change still to apply.
    fn skip_before(&self, pos: usize) -> (usize, usize) {
        let index = self.changes.partition_point(|c| c.old_to < pos);
        let delta = match self.changes.get(index) {
            Some(located) => located.delta_before,
            None => self.delta,
        };
        ((pos as isize + delta) as usize, index)
    }
}
