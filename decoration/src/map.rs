//! Change mapping: move a set into the coordinate space after a batch of edits.
//!
//! # Algorithm
//!
//! Mapping walks down only into nodes that some change touches. For each node:
//!
//! 1. Map the local decorations. Dropped ones disappear; ones that now reach outside
//!    the node's new span *escape* and are handed to the parent.
//! 2. Map every touched child the same way. Untouched children keep their length
//!    and content and are reused as they are.
//! 3. Decorations escaping a child are anchored here when they fit, or escape
//!    further up.
//!
//! Node ends are mapped with [`Bias::Right`], so content inserted exactly at a child
//! boundary belongs to the child on the left.
//!
//! ```text
//! before:  [ child 0 ......|... child 1 ...]
//!                          ^ insert "hello"
//! after:   [ child 0 ...........|... child 1 ...]
//!
//! An inclusive decoration starting at the old boundary keeps its start before the
//! insertion, which now lies inside child 0: it escapes to the parent.
//! ```

use crate::{change::ChangeSet, decoration::Decoration, set::DecorationSet, Bias};
use smallvec::SmallVec;

type Escaped = SmallVec<[Decoration; 4]>;

impl DecorationSet {
    /// Map every decoration through `changes`.
    ///
    /// Returns the set itself when there are no changes. Decorations collapsed or
    /// deleted by the edit are dropped, see [`Decoration`] for the boundary rules.
    pub fn map(&self, changes: &ChangeSet) -> Self {
        if changes.is_empty() {
            return self.clone();
        }

        let new_length = changes.map_pos(self.length(), Bias::Right);
        let (set, escaped) = self.map_node(changes, 0, 0, new_length);
        debug_assert!(escaped.is_empty(), "decorations escaped the root");

        tracing::trace!(
            "DecorationSet.map: changes={}, length {} -> {}, size {} -> {}",
            changes.len(),
            self.length(),
            set.length(),
            self.size(),
            set.size()
        );
        set
    }

    /// Map the subtree that started at `old_start` and now spans
    /// `[new_start, new_end)`. Escaping decorations come back at absolute positions.
    fn map_node(
        &self,
        changes: &ChangeSet,
        old_start: usize,
        new_start: usize,
        new_end: usize,
    ) -> (Self, Escaped) {
        let node = &self.0;
        let mut escaped = Escaped::new();
        let mut local = Vec::with_capacity(node.local.len());

        for deco in &node.local {
            let Some((from, to)) = deco.map(changes, old_start) else {
                continue;
            };
            if from < new_start || to > new_end {
                escaped.push(deco.with_range(from, to));
            } else {
                local.push(deco.with_range(from - new_start, to - new_start));
            }
        }

        let mut children = Vec::with_capacity(node.children.len());
        let mut modified = Vec::with_capacity(node.children.len());
        let mut old_pos = old_start;
        let mut new_pos = new_start;

        for child in &node.children {
            let old_end = old_pos + child.length();
            let new_child_end = changes.map_pos(old_end, Bias::Right);

            if changes.touches(old_pos, old_end) {
                let (mapped, child_escaped) = child.map_node(changes, old_pos, new_pos, new_child_end);
                for deco in child_escaped {
                    if deco.from() < new_start || deco.to() > new_end {
                        escaped.push(deco);
                    } else {
                        local.push(deco.unshifted(new_start));
                    }
                }
                children.push(mapped);
                modified.push(true);
            } else {
                debug_assert_eq!(new_child_end - new_pos, child.length());
                children.push(child.clone());
                modified.push(false);
            }

            old_pos = old_end;
            new_pos = new_child_end;
        }

        if !escaped.is_empty() {
            tracing::trace!(
                "{} decorations escaped node at {}..{}",
                escaped.len(),
                new_start,
                new_end
            );
        }

        let set = self.assemble(new_end - new_start, local, children, &modified);
        (set, escaped)
    }
}
