//! DecorationSet: a persistent tree of decorations over relative positions.
//!
//! # Structure
//!
//! ```text
//! DecorationSet (Arc<Node>)
//!   - length:   width of the span this node covers
//!   - size:     decorations in the whole subtree
//!   - local:    decorations anchored here, relative to the node start
//!   - children: DecorationSets tiling [0, length) without gaps
//! ```
//!
//! A decoration lives in the deepest node that contains it. Decorations crossing a
//! child boundary are hoisted into the parent's `local` list instead of being split.
//!
//! # Sharing
//!
//! Nodes are never mutated. [`update`](DecorationSet::update) and
//! [`map`](DecorationSet::map) rebuild only the path to the nodes they touch and
//! return every other subtree as the same `Arc`, so [`DecorationSet::ptr_eq`] tells a
//! consumer which parts it can skip.
//!
//! # Balancing
//!
//! - Leaves hold at most [`BASE_NODE_SIZE`] decorations and inner nodes at most
//!   [`BASE_NODE_SIZE`] children, which keeps the depth logarithmic with a large
//!   base (5 000 decorations fit in three levels).
//! - Child boundaries are picked near the even split at the point that hoists the
//!   fewest decorations. When the hoisted decorations would outgrow [`MAX_LOCAL`],
//!   [`build`](DecorationSet::build) uses fewer, wider children.
//! - Updates grow the tree like a B-tree. An overfull leaf is rebuilt into a small
//!   subtree, which its parent splices in as siblings; a node left with too many
//!   children is split in groups and spliced into its own parent. The root is the
//!   only place a level is added.
//! - A modified node whose subtree shrinks to [`BASE_NODE_SIZE`] decorations is
//!   flattened into a leaf, and runs of modified siblings that fit in one leaf are
//!   joined. A node whose `local` list is pushed past [`MAX_LOCAL`] is rebuilt.

use crate::{
    decoration::Decoration,
    error::{InvariantViolationSnafu, OutOfBoundsSnafu, Result},
};
use snafu::ensure;
use std::{fmt, ops::Range, sync::Arc};

/// Target number of entries in a node.
pub const BASE_NODE_SIZE: usize = 32;

/// Largest `local` list tolerated before a node is rebuilt.
pub const MAX_LOCAL: usize = 64;

/// How far from the even split a child boundary may move to hoist fewer decorations.
const SPLIT_WINDOW: usize = 4;

pub(crate) struct Node {
    pub(crate) length: usize,
    pub(crate) size: usize,
    pub(crate) depth: usize,
    pub(crate) local: Vec<Decoration>,
    pub(crate) children: Vec<DecorationSet>,
}

/// Immutable, structurally shared collection of decorations.
#[derive(Clone)]
pub struct DecorationSet(pub(crate) Arc<Node>);

impl Default for DecorationSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for DecorationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecorationSet")
            .field("length", &self.length())
            .field("size", &self.size())
            .field("local", &self.local().len())
            .field("children", &self.children().len())
            .finish()
    }
}

impl DecorationSet {
    /// A set without decorations.
    pub fn empty() -> Self {
        Self::leaf(0, Vec::new())
    }

    /// Build a balanced set. Its length is the largest `to` among the decorations.
    pub fn of(decorations: impl IntoIterator<Item = Decoration>) -> Self {
        let decorations = sorted(decorations.into_iter().collect());
        let length = decorations.iter().map(Decoration::to).max().unwrap_or(0);
        Self::build_root(decorations, length)
    }

    /// Build a balanced set covering `[0, length)`.
    ///
    /// Fails with [`OutOfBounds`](crate::DecorationError::OutOfBounds) when a
    /// decoration ends past `length`.
    pub fn of_with_length(
        decorations: impl IntoIterator<Item = Decoration>,
        length: usize,
    ) -> Result<Self> {
        let decorations: Vec<_> = decorations.into_iter().collect();
        for deco in &decorations {
            ensure!(
                deco.to() <= length,
                OutOfBoundsSnafu {
                    from: deco.from(),
                    to: deco.to(),
                    length,
                }
            );
        }
        Ok(Self::build_root(sorted(decorations), length))
    }

    fn build_root(decorations: Vec<Decoration>, length: usize) -> Self {
        let count = decorations.len();
        let set = Self::build(decorations, 0, length);
        tracing::trace!(
            "DecorationSet built: size={}, length={}, depth={}",
            count,
            length,
            set.depth()
        );
        set
    }

    pub fn length(&self) -> usize {
        self.0.length
    }

    pub fn size(&self) -> usize {
        self.0.size
    }

    pub fn is_empty(&self) -> bool {
        self.0.size == 0
    }

    /// Decorations anchored directly at this node, relative to its start.
    pub fn local(&self) -> &[Decoration] {
        &self.0.local
    }

    pub fn children(&self) -> &[DecorationSet] {
        &self.0.children
    }

    /// Number of levels, 1 for a leaf.
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Every decoration at absolute positions, ordered by `(from, to)`.
    pub fn decorations(&self) -> Vec<Decoration> {
        let mut out = Vec::with_capacity(self.size());
        self.collect_into(0, &mut out);
        sorted(out)
    }

    /// Decorations touching `range` (ends inclusive), at absolute positions, ordered
    /// by `(from, to)`.
    pub fn decorations_in_range(&self, range: Range<usize>) -> Vec<Decoration> {
        let mut out = Vec::new();
        self.visit_range(0, range.start, range.end, &mut |deco, offset| {
            out.push(deco.shifted(offset))
        });
        sorted(out)
    }

    /// Verify ordering, containment, tiling and sizes for the whole tree.
    ///
    /// Fails with [`InvariantViolation`](crate::DecorationError::InvariantViolation)
    /// for the first broken node, named by its absolute offset.
    pub fn check_invariants(&self) -> Result<()> {
        self.check_node(0).map(|_| ())
    }

    fn check_node(&self, offset: usize) -> Result<usize> {
        let node = &self.0;
        ensure!(
            node.local
                .windows(2)
                .all(|pair| pair[0].sort_key() <= pair[1].sort_key()),
            InvariantViolationSnafu {
                offset,
                detail: "local decorations out of order",
            }
        );
        for deco in &node.local {
            ensure!(
                deco.from() <= deco.to() && deco.to() <= node.length,
                InvariantViolationSnafu {
                    offset,
                    detail: format!(
                        "decoration {}..{} outside length {}",
                        deco.from(),
                        deco.to(),
                        node.length
                    ),
                }
            );
        }

        let mut counted = node.local.len();
        let mut pos = 0;
        for child in &node.children {
            counted += child.check_node(offset + pos)?;
            pos += child.length();
        }
        ensure!(
            node.children.is_empty() || pos == node.length,
            InvariantViolationSnafu {
                offset,
                detail: format!("children cover {pos}, node length is {}", node.length),
            }
        );
        ensure!(
            counted == node.size,
            InvariantViolationSnafu {
                offset,
                detail: format!("stored size {} but counted {counted}", node.size),
            }
        );
        Ok(counted)
    }

    pub(crate) fn leaf(length: usize, local: Vec<Decoration>) -> Self {
        Self(Arc::new(Node {
            length,
            size: local.len(),
            depth: 1,
            local,
            children: Vec::new(),
        }))
    }

    pub(crate) fn node(length: usize, local: Vec<Decoration>, children: Vec<DecorationSet>) -> Self {
        let size = local.len() + children.iter().map(Self::size).sum::<usize>();
        let depth = 1 + children.iter().map(Self::depth).max().unwrap_or(0);
        Self(Arc::new(Node {
            length,
            size,
            depth,
            local,
            children,
        }))
    }

    /// Build a subtree for `[start, start + length)` from decorations sorted by
    /// `(from, to)` and expressed in the same coordinates as `start`.
    pub(crate) fn build(decorations: Vec<Decoration>, start: usize, length: usize) -> Self {
        if decorations.len() <= BASE_NODE_SIZE {
            let local = decorations.iter().map(|deco| deco.unshifted(start)).collect();
            return Self::leaf(length, local);
        }

        let count = decorations.len();
        let mut capacity = BASE_NODE_SIZE;
        while count.div_ceil(capacity) > BASE_NODE_SIZE {
            capacity *= BASE_NODE_SIZE;
        }

        // Every boundary can hoist decorations, so fall back to fewer children
        // until the hoisted ones fit. Two children is as far as this goes.
        let mut chunks = count.div_ceil(capacity);
        let mut splits = split_points(&decorations, chunks);
        while chunks > 2 && hoisted(&decorations, &splits) > MAX_LOCAL {
            chunks = (chunks / 2).max(2);
            splits = split_points(&decorations, chunks);
        }
        splits.push(count);

        let end = start + length;
        let mut local = Vec::new();
        let mut children = Vec::with_capacity(splits.len());
        let mut chunk_start = 0;
        let mut pos = start;

        for split in splits {
            let boundary = decorations.get(split).map_or(end, |deco| deco.from());

            let mut inner = Vec::with_capacity(split - chunk_start);
            for deco in &decorations[chunk_start..split] {
                if deco.to() > boundary {
                    local.push(deco.unshifted(start));
                } else {
                    inner.push(deco.clone());
                }
            }
            children.push(Self::build(inner, pos, boundary - pos));

            chunk_start = split;
            pos = boundary;
        }

        Self::node(length, local, children)
    }

    /// Rebuild this subtree from scratch, keeping its length.
    pub(crate) fn rebuilt(&self) -> Self {
        let mut decorations = Vec::with_capacity(self.size());
        self.collect_into(0, &mut decorations);
        tracing::debug!(
            "Rebuilding decoration subtree: size={}, length={}",
            decorations.len(),
            self.length()
        );
        Self::build(sorted(decorations), 0, self.length())
    }

    /// Push every decoration of the subtree, shifted by `offset`, onto `out`.
    pub(crate) fn collect_into(&self, offset: usize, out: &mut Vec<Decoration>) {
        out.extend(self.0.local.iter().map(|deco| deco.shifted(offset)));
        let mut pos = offset;
        for child in &self.0.children {
            child.collect_into(pos, out);
            pos += child.length();
        }
    }

    /// Call `f` with every decoration touching `[from, to]` and the absolute offset
    /// of the node holding it.
    pub(crate) fn visit_range(
        &self,
        offset: usize,
        from: usize,
        to: usize,
        f: &mut dyn FnMut(&Decoration, usize),
    ) {
        for deco in &self.0.local {
            if deco.from() + offset <= to && deco.to() + offset >= from {
                f(deco, offset);
            }
        }
        let mut pos = offset;
        for child in &self.0.children {
            if pos > to {
                break;
            }
            let end = pos + child.length();
            if end >= from {
                child.visit_range(pos, from, to, f);
            }
            pos = end;
        }
    }

    /// The same tree extended to `length` by growing the rightmost path.
    pub(crate) fn grown(&self, length: usize) -> Self {
        let node = &self.0;
        let extra = length - node.length;
        match node.children.split_last() {
            None => Self::leaf(length, node.local.clone()),
            Some((last, rest)) => {
                let mut children = rest.to_vec();
                children.push(last.grown(last.length() + extra));
                Self::node(length, node.local.clone(), children)
            },
        }
    }

    /// Assemble the node replacing this one and restore the balancing rules.
    ///
    /// `modified[i]` tells whether `children[i]` was produced by this operation;
    /// unmodified children are kept as they are. Children that came back as deep as
    /// this node are spliced in, so the result is at most one level deeper than
    /// `self` and only when it had to be split.
    pub(crate) fn assemble(
        &self,
        length: usize,
        mut local: Vec<Decoration>,
        children: Vec<DecorationSet>,
        modified: &[bool],
    ) -> Self {
        let children = join_small_runs(children, modified);

        if children.is_empty() {
            local.sort_by_key(Decoration::sort_key);
            let set = Self::leaf(length, local);
            return if set.size() > BASE_NODE_SIZE {
                set.rebuilt()
            } else {
                set
            };
        }

        let children = splice_grown(children, self.depth(), &mut local);
        local.sort_by_key(Decoration::sort_key);
        // A list that was already past the limit is as short as a build gets it.
        let overfull = local.len() > MAX_LOCAL && local.len() > self.local().len();
        let set = if children.len() > BASE_NODE_SIZE {
            Self::grouped(length, local, children)
        } else {
            Self::node(length, local, children)
        };
        if overfull || set.size() <= BASE_NODE_SIZE {
            set.rebuilt()
        } else {
            set
        }
    }

    /// A node one level up from `children`, split in groups of at most
    /// [`BASE_NODE_SIZE`]. Local decorations that fit in a group move down into it.
    fn grouped(length: usize, local: Vec<Decoration>, children: Vec<DecorationSet>) -> Self {
        let per_group = children.len().div_ceil(children.len().div_ceil(BASE_NODE_SIZE));

        let mut bounds = Vec::new();
        let mut pos = 0;
        for group in children.chunks(per_group) {
            let end = pos + group.iter().map(Self::length).sum::<usize>();
            bounds.push((pos, end));
            pos = end;
        }

        let mut kept = Vec::new();
        let mut moved: Vec<Vec<Decoration>> = vec![Vec::new(); bounds.len()];
        for deco in local {
            let index = bounds.partition_point(|&(_, end)| end < deco.to());
            match bounds.get(index) {
                Some(&(start, _)) if start <= deco.from() => {
                    moved[index].push(deco.unshifted(start))
                },
                _ => kept.push(deco),
            }
        }

        let groups: Vec<_> = children
            .chunks(per_group)
            .zip(bounds.iter().zip(moved))
            .map(|(group, (&(start, end), local))| {
                Self::node(end - start, local, group.to_vec())
            })
            .collect();
        tracing::trace!(
            "Split node of {} children into {} groups",
            children.len(),
            groups.len()
        );

        if groups.len() > BASE_NODE_SIZE {
            Self::grouped(length, kept, groups)
        } else {
            Self::node(length, kept, groups)
        }
    }
}

fn sorted(mut decorations: Vec<Decoration>) -> Vec<Decoration> {
    decorations.sort_by_key(Decoration::sort_key);
    decorations
}

/// Pick the index where the next chunk starts, near `nominal`, hoisting as few
/// decorations of the current chunk as possible.
fn choose_split(decorations: &[Decoration], chunk_start: usize, nominal: usize) -> usize {
    let lowest = (chunk_start + 1).max(nominal.saturating_sub(SPLIT_WINDOW));
    let highest = (decorations.len() - 1).min(nominal + SPLIT_WINDOW);
    if lowest > highest {
        return nominal.clamp(chunk_start + 1, decorations.len() - 1);
    }

    (lowest..=highest)
        .min_by_key(|&split| {
            let boundary = decorations[split].from();
            let crossing = decorations[chunk_start..split]
                .iter()
                .filter(|deco| deco.to() > boundary)
                .count();
            (crossing, split.abs_diff(nominal))
        })
        .unwrap_or(nominal)
}

/// Split indices for `chunks` children of about equal size.
fn split_points(decorations: &[Decoration], chunks: usize) -> Vec<usize> {
    let chunk_size = decorations.len().div_ceil(chunks);
    let mut splits = Vec::with_capacity(chunks);
    let mut chunk_start = 0;
    for chunk in 1..chunks {
        let split = choose_split(decorations, chunk_start, chunk * chunk_size);
        splits.push(split);
        chunk_start = split;
    }
    splits
}

/// How many decorations crossing a boundary `splits` would hoist into the parent.
fn hoisted(decorations: &[Decoration], splits: &[usize]) -> usize {
    let mut count = 0;
    let mut chunk_start = 0;
    for &split in splits {
        let boundary = decorations[split].from();
        count += decorations[chunk_start..split]
            .iter()
            .filter(|deco| deco.to() > boundary)
            .count();
        chunk_start = split;
    }
    count
}

/// Replace every child at least `depth` levels deep by its own children, moving its
/// local decorations up into `local`.
fn splice_grown(
    children: Vec<DecorationSet>,
    depth: usize,
    local: &mut Vec<Decoration>,
) -> Vec<DecorationSet> {
    fn splice(
        child: &DecorationSet,
        pos: usize,
        depth: usize,
        local: &mut Vec<Decoration>,
        out: &mut Vec<DecorationSet>,
    ) {
        if child.depth() < depth {
            out.push(child.clone());
            return;
        }
        local.extend(child.local().iter().map(|deco| deco.shifted(pos)));
        let mut start = pos;
        for grandchild in child.children() {
            splice(grandchild, start, depth, local, out);
            start += grandchild.length();
        }
    }

    if children.iter().all(|child| child.depth() < depth) {
        return children;
    }
    let mut out = Vec::with_capacity(children.len() + 1);
    let mut pos = 0;
    for child in &children {
        splice(child, pos, depth, local, &mut out);
        pos += child.length();
    }
    out
}

/// Join runs of adjacent modified children whose decorations fit in one leaf.
fn join_small_runs(children: Vec<DecorationSet>, modified: &[bool]) -> Vec<DecorationSet> {
    fn flush(run: &mut Vec<DecorationSet>, out: &mut Vec<DecorationSet>) {
        if run.len() <= 1 {
            out.append(run);
            return;
        }
        let mut decorations = Vec::new();
        let mut length = 0;
        for child in run.drain(..) {
            child.collect_into(length, &mut decorations);
            length += child.length();
        }
        out.push(DecorationSet::leaf(length, sorted(decorations)));
    }

    let mut out = Vec::with_capacity(children.len());
    let mut run: Vec<DecorationSet> = Vec::new();
    let mut run_size = 0;

    for (child, &modified) in children.into_iter().zip(modified) {
        if modified && !run.is_empty() && run_size + child.size() <= BASE_NODE_SIZE {
            run_size += child.size();
            run.push(child);
            continue;
        }
        flush(&mut run, &mut out);
        run_size = 0;
        if modified {
            run_size = child.size();
            run.push(child);
        } else {
            out.push(child);
        }
    }
    flush(&mut run, &mut out);
    out
}
