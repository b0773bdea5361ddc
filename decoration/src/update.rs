//! Incremental update: add decorations and filter existing ones.
//!
//! Only decorations touching the filter range are offered to the filter; everything
//! else is kept without being looked at. Subtrees that neither touch the filter range
//! nor receive additions are returned by identity, and a call that changes nothing
//! returns the original set.

use crate::{decoration::Decoration, set::DecorationSet};
use std::ops::Range;

type Filter<'a> = dyn FnMut(usize, usize, &Decoration) -> bool + 'a;

impl DecorationSet {
    /// Add decorations, keeping every existing one.
    ///
    /// Additions ending past [`length`](Self::length) grow the set.
    pub fn update(&self, add: Vec<Decoration>) -> Self {
        self.update_inner_root(add, None, 0..self.length())
    }

    /// Add decorations and keep only the existing ones for which `filter(from, to,
    /// decoration)` returns true. Positions passed to the filter are absolute.
    pub fn update_with_filter<F>(&self, add: Vec<Decoration>, mut filter: F) -> Self
    where
        F: FnMut(usize, usize, &Decoration) -> bool,
    {
        let filter: &mut Filter<'_> = &mut filter;
        self.update_inner_root(add, Some(filter), 0..self.length())
    }

    /// Like [`update_with_filter`](Self::update_with_filter), but only decorations
    /// touching `range` (ends inclusive) are offered to the filter.
    ///
    /// # Panics
    ///
    /// Panics when `range` is inverted or reaches past the document.
    pub fn update_in_range<F>(
        &self,
        add: Vec<Decoration>,
        mut filter: F,
        range: Range<usize>,
    ) -> Self
    where
        F: FnMut(usize, usize, &Decoration) -> bool,
    {
        let filter: &mut Filter<'_> = &mut filter;
        self.update_inner_root(add, Some(filter), range)
    }

    fn update_inner_root(
        &self,
        mut add: Vec<Decoration>,
        filter: Option<&mut Filter<'_>>,
        range: Range<usize>,
    ) -> Self {
        add.sort_by_key(Decoration::sort_key);
        let needed = add.iter().map(Decoration::to).max().unwrap_or(0);
        let length = self.length().max(needed);
        assert!(
            range.start <= range.end && range.end <= length,
            "filter range {range:?} outside document of length {length}"
        );

        let base = if needed > self.length() {
            self.grown(needed)
        } else {
            self.clone()
        };
        let added = add.len();
        let result = base.update_node(0, add, filter, range.start, range.end);

        tracing::trace!(
            "DecorationSet.update: added={}, size {} -> {}, reused={}",
            added,
            self.size(),
            result.size(),
            result.ptr_eq(self)
        );
        result
    }

    /// Update the subtree starting at absolute `offset`. `add` is sorted, absolute,
    /// and fits inside the subtree.
    fn update_node(
        &self,
        offset: usize,
        add: Vec<Decoration>,
        mut filter: Option<&mut Filter<'_>>,
        filter_from: usize,
        filter_to: usize,
    ) -> Self {
        let node = &self.0;
        let end = offset + node.length;
        let filtering = filter.is_some() && filter_from <= end && filter_to >= offset;
        if add.is_empty() && !filtering {
            return self.clone();
        }

        let mut changed = !add.is_empty();
        let mut local = Vec::with_capacity(node.local.len());
        for deco in &node.local {
            let from = deco.from() + offset;
            let to = deco.to() + offset;
            let keep = match filter.as_deref_mut() {
                Some(filter) if filtering && from <= filter_to && to >= filter_from => {
                    filter(from, to, &deco.shifted(offset))
                },
                _ => true,
            };
            if keep {
                local.push(deco.clone());
            } else {
                changed = true;
            }
        }

        // Route each addition to the child containing it, or keep it here.
        let mut ends = Vec::with_capacity(node.children.len());
        let mut pos = offset;
        for child in &node.children {
            pos += child.length();
            ends.push(pos);
        }
        let mut routed: Vec<Vec<Decoration>> = vec![Vec::new(); node.children.len()];
        for deco in add {
            let index = ends.partition_point(|&end| end < deco.to());
            let start = if index == 0 { offset } else { ends[index - 1] };
            match routed.get_mut(index) {
                Some(bucket) if start <= deco.from() => bucket.push(deco),
                _ => local.push(deco.unshifted(offset)),
            }
        }

        let mut children = Vec::with_capacity(node.children.len());
        let mut modified = Vec::with_capacity(node.children.len());
        let mut start = offset;
        for (child, add) in node.children.iter().zip(routed) {
            let updated =
                child.update_node(start, add, filter.as_deref_mut(), filter_from, filter_to);
            let is_new = !updated.ptr_eq(child);
            changed |= is_new;
            modified.push(is_new);
            children.push(updated);
            start += child.length();
        }

        if !changed {
            return self.clone();
        }

        self.assemble(node.length, local, children, &modified)
    }
}
