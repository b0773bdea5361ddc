//! Flatten one or more sets into non-overlapping, attribute-merged spans.
//!
//! Every boundary of a decoration carrying attributes cuts the query range; between
//! two cuts the attributes of all decorations covering the piece are merged in
//! `(from, to)` order, with ties broken by set order.
//!
//! ```text
//! one:     [3 ........ 8)
//! two:           [5 .. 8)      [10 .. 12)  three
//! spans: 0-3 | 3-5 | 5-8 | 8-10 | 10-12 | 12-15
//!         -    one  one,two  -    three    -
//! ```

use crate::{
    decoration::{Attributes, Decoration},
    set::DecorationSet,
};
use serde::Serialize;
use std::ops::Range;

/// A piece of a query range with constant merged attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Span {
    pub from: usize,
    pub to: usize,
    pub attrs: Attributes,
}

/// Split `[from, to)` into consecutive spans covering it exactly.
///
/// Returns no spans for an empty range.
pub fn decorated_spans_in_range(sets: &[DecorationSet], from: usize, to: usize) -> Vec<Span> {
    if from >= to {
        return Vec::new();
    }

    let mut pool = Vec::new();
    for set in sets {
        set.visit_range(0, from, to, &mut |deco, offset| {
            if deco.has_attributes() && deco.from() + offset < to && deco.to() + offset > from {
                pool.push(deco.shifted(offset));
            }
        });
    }
    // Stable, so equal ranges keep set order.
    pool.sort_by_key(Decoration::sort_key);

    let mut cuts = vec![from, to];
    for deco in &pool {
        cuts.extend([deco.from(), deco.to()].into_iter().filter(|&pos| from < pos && pos < to));
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut spans = Vec::with_capacity(cuts.len() - 1);
    let mut active: Vec<usize> = Vec::new();
    let mut next = 0;
    for window in cuts.windows(2) {
        let (start, end) = (window[0], window[1]);
        active.retain(|&index| pool[index].to() > start);
        while next < pool.len() && pool[next].from() <= start {
            if pool[next].to() > start {
                active.push(next);
            }
            next += 1;
        }

        let mut attrs = Attributes::new();
        for &index in &active {
            if let Some(other) = pool[index].attributes() {
                attrs.merge(other);
            }
        }
        spans.push(Span {
            from: start,
            to: end,
            attrs,
        });
    }

    tracing::trace!(
        "decorated_spans_in_range: sets={}, range={}..{}, decorations={}, spans={}",
        sets.len(),
        from,
        to,
        pool.len(),
        spans.len()
    );
    spans
}

/// Widget decorations touching `range` (ends inclusive) across `sets`, ordered by
/// position with ties in set order.
pub fn widgets_in_range(sets: &[DecorationSet], range: Range<usize>) -> Vec<Decoration> {
    let mut widgets = Vec::new();
    for set in sets {
        set.visit_range(0, range.start, range.end, &mut |deco, offset| {
            if deco.widget_ref().is_some() {
                widgets.push(deco.shifted(offset));
            }
        });
    }
    widgets.sort_by_key(Decoration::sort_key);
    widgets
}
