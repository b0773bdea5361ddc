//! Randomized tests comparing the tree against a flat list of decorations.
//!
//! Every operation is replayed on a plain `Vec<Decoration>` using the same
//! position-mapping rules, and the resulting positions must match exactly. The tree
//! shape is checked after every step as well.

use rand::{rngs::StdRng, Rng, SeedableRng};
use stoat_decoration::{
    decorated_spans_in_range, Attributes, Bias, Change, ChangeSet, Decoration, DecorationSet,
    DecorationSpec, Span, BASE_NODE_SIZE, MAX_LOCAL,
};

const SEEDS: u64 = 40;
const CLASSES: [&str; 4] = ["a", "b", "c", "d"];

fn random_spec(rng: &mut StdRng) -> DecorationSpec {
    let spec = if rng.gen_bool(0.7) {
        DecorationSpec::class(CLASSES[rng.gen_range(0..CLASSES.len())])
    } else {
        DecorationSpec::none()
    };
    let bias = if rng.gen_bool(0.5) {
        Bias::Left
    } else {
        Bias::Right
    };
    spec.inclusive_start(rng.gen_bool(0.3))
        .inclusive_end(rng.gen_bool(0.3))
        .bias(bias)
}

fn random_decorations(rng: &mut StdRng, count: usize, length: usize) -> Vec<Decoration> {
    (0..count)
        .map(|_| {
            let from = rng.gen_range(0..=length);
            let width = if rng.gen_bool(0.1) {
                rng.gen_range(0..=length - from)
            } else {
                rng.gen_range(0..=(length - from).min(8))
            };
            Decoration::range(from, from + width, random_spec(rng)).unwrap()
        })
        .collect()
}

/// Points and ranges of width up to 3, so no boundary is crossed by many of them.
fn random_short(rng: &mut StdRng, count: usize, length: usize) -> Vec<Decoration> {
    (0..count)
        .map(|_| {
            let from = rng.gen_range(0..=length);
            let width = rng.gen_range(0..=(length - from).min(3));
            Decoration::range(from, from + width, random_spec(rng)).unwrap()
        })
        .collect()
}

fn random_changes(rng: &mut StdRng, length: usize) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut pos = 0;
    let mut doc_len = length;
    for _ in 0..rng.gen_range(1..6) {
        if pos > doc_len {
            break;
        }
        let from = rng.gen_range(pos..=doc_len.min(pos + length / 4 + 1));
        let to = rng.gen_range(from..=doc_len.min(from + 40));
        let len = if rng.gen_bool(0.5) {
            0
        } else {
            rng.gen_range(0..30)
        };
        changes.push(Change::new(from, to, len));
        doc_len = doc_len - (to - from) + len;
        pos = from + len;
    }
    changes
}

fn positions(decorations: &[Decoration]) -> Vec<(usize, usize)> {
    let mut out: Vec<_> = decorations.iter().map(|deco| (deco.from(), deco.to())).collect();
    out.sort_unstable();
    out
}

fn max_local(set: &DecorationSet) -> usize {
    set.children()
        .iter()
        .map(max_local)
        .fold(set.local().len(), usize::max)
}

fn max_children(set: &DecorationSet) -> usize {
    set.children()
        .iter()
        .map(max_children)
        .fold(set.children().len(), usize::max)
}

/// Logarithmic depth and bounded fan-out. Wide ranges may legitimately leave more
/// than `MAX_LOCAL` decorations on a node, so local lists are not checked here.
fn check_shape(set: &DecorationSet) {
    let bound = 4 + set.size().max(1).ilog2() as usize;
    assert!(set.depth() <= bound, "depth {} for size {}", set.depth(), set.size());
    assert!(max_children(set) <= BASE_NODE_SIZE);
}

/// Map a flat list the way a set is expected to.
fn map_flat(decorations: &[Decoration], changes: &ChangeSet) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for deco in decorations {
        let spec = deco.spec();
        if deco.is_point() {
            if let Some(pos) = changes.map_point(deco.from(), spec.bias) {
                out.push((pos, pos));
            }
            continue;
        }
        let start_bias = if spec.inclusive_start {
            Bias::Left
        } else {
            Bias::Right
        };
        let end_bias = if spec.inclusive_end {
            Bias::Right
        } else {
            Bias::Left
        };
        let from = changes.map_pos(deco.from(), start_bias);
        let to = changes.map_pos(deco.to(), end_bias);
        if from < to {
            out.push((from, to));
        }
    }
    out.sort_unstable();
    out
}

/// Spans computed by scanning every decoration for every piece.
fn spans_flat(sets: &[Vec<Decoration>], from: usize, to: usize) -> Vec<Span> {
    let mut pool: Vec<&Decoration> = sets
        .iter()
        .flatten()
        .filter(|deco| deco.attributes().is_some_and(|attrs| !attrs.is_empty()))
        .filter(|deco| deco.from() < to && deco.to() > from)
        .collect();
    pool.sort_by_key(|deco| (deco.from(), deco.to()));

    let mut cuts = vec![from, to];
    for deco in &pool {
        cuts.push(deco.from().clamp(from, to));
        cuts.push(deco.to().clamp(from, to));
    }
    cuts.sort_unstable();
    cuts.dedup();

    cuts.windows(2)
        .map(|window| {
            let mut attrs = Attributes::new();
            for deco in &pool {
                if deco.from() <= window[0] && deco.to() >= window[1] {
                    if let Some(other) = deco.attributes() {
                        attrs.merge(other);
                    }
                }
            }
            Span {
                from: window[0],
                to: window[1],
                attrs,
            }
        })
        .collect()
}

#[test]
fn batched_changes_match_sequential_application() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let list = random_changes(&mut rng, 200);
        let batch = ChangeSet::new(list.clone()).unwrap();

        for pos in 0..=200 {
            for bias in [Bias::Left, Bias::Right] {
                let mut expected = pos;
                let mut point = Some(pos);
                for change in &list {
                    let single = ChangeSet::new([*change]).unwrap();
                    expected = single.map_pos(expected, bias);
                    point = point.and_then(|p| single.map_point(p, bias));
                }
                assert_eq!(batch.map_pos(pos, bias), expected, "seed {seed}, pos {pos}");
                assert_eq!(batch.map_point(pos, bias), point, "seed {seed}, pos {pos}");
            }
        }
    }
}

#[test]
fn built_sets_hold_every_decoration() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let count = rng.gen_range(0..3000);
        let decorations = random_decorations(&mut rng, count, 2000);
        let set = DecorationSet::of(decorations.clone());

        assert_eq!(set.size(), count);
        set.check_invariants().unwrap();
        check_shape(&set);
        assert_eq!(positions(&set.decorations()), positions(&decorations), "seed {seed}");
    }
}

#[test]
fn update_matches_flat_filter() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let decorations = random_decorations(&mut rng, 1500, 2000);
        let added = rng.gen_range(0..100);
        let additions = random_decorations(&mut rng, added, 2100);
        let set = DecorationSet::of(decorations.clone());

        let from = rng.gen_range(0..=set.length());
        let to = rng.gen_range(from..=set.length());
        let modulus = rng.gen_range(2..5);
        let updated = set.update_in_range(
            additions.clone(),
            |start, _, _| start % modulus != 0,
            from..to,
        );

        let mut expected: Vec<_> = decorations
            .into_iter()
            .filter(|deco| {
                let touched = deco.from() <= to && deco.to() >= from;
                !touched || deco.from() % modulus != 0
            })
            .collect();
        expected.extend(additions);

        updated.check_invariants().unwrap();
        check_shape(&updated);
        assert_eq!(positions(&updated.decorations()), positions(&expected), "seed {seed}");
    }
}

#[test]
fn map_matches_flat_mapping() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let count = rng.gen_range(1..2500);
        let decorations = random_decorations(&mut rng, count, 2000);
        let set = DecorationSet::of(decorations.clone());
        let changes = ChangeSet::new(random_changes(&mut rng, set.length())).unwrap();

        let mapped = set.map(&changes);

        mapped.check_invariants().unwrap();
        check_shape(&mapped);
        assert_eq!(mapped.length(), changes.map_pos(set.length(), Bias::Right));
        assert_eq!(positions(&mapped.decorations()), map_flat(&decorations, &changes), "seed {seed}");
    }
}

#[test]
fn repeated_maps_keep_the_tree_valid() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut flat = random_decorations(&mut rng, 2000, 3000);
    let mut set = DecorationSet::of(flat.clone());

    for round in 0..30 {
        let changes = ChangeSet::new(random_changes(&mut rng, set.length())).unwrap();
        set = set.map(&changes);
        set.check_invariants().unwrap();
        check_shape(&set);

        let expected = map_flat(&flat, &changes);
        flat = set.decorations();
        assert_eq!(positions(&flat), expected, "round {round}");
    }
}

#[test]
fn edit_sequences_keep_the_tree_balanced() {
    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut flat = random_short(&mut rng, 1000, 3000);
        let mut set = DecorationSet::of(flat.clone());

        for step in 0..150 {
            let expected = if rng.gen_bool(0.5) {
                let count = rng.gen_range(0..8);
                let additions = random_short(&mut rng, count, set.length());
                let from = rng.gen_range(0..=set.length());
                let to = (from + rng.gen_range(0..50)).min(set.length());
                let modulus = rng.gen_range(2..6);
                set = set.update_in_range(
                    additions.clone(),
                    |start, _, _| start % modulus != 0,
                    from..to,
                );

                let mut kept: Vec<_> = flat
                    .into_iter()
                    .filter(|deco| {
                        deco.from() > to || deco.to() < from || deco.from() % modulus != 0
                    })
                    .collect();
                kept.extend(additions);
                positions(&kept)
            } else {
                let changes = ChangeSet::new(random_changes(&mut rng, set.length())).unwrap();
                set = set.map(&changes);
                map_flat(&flat, &changes)
            };

            flat = set.decorations();
            assert_eq!(positions(&flat), expected, "seed {seed}, step {step}");
            set.check_invariants().unwrap();
            assert!(set.depth() <= 4, "seed {seed}, step {step}: depth {}", set.depth());
            assert!(max_local(&set) <= MAX_LOCAL, "seed {seed}, step {step}");
            assert!(max_children(&set) <= BASE_NODE_SIZE, "seed {seed}, step {step}");
        }
    }
}

#[test]
fn spans_match_flat_scan() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let first = random_decorations(&mut rng, 800, 1000);
        let second = random_decorations(&mut rng, 300, 1000);
        let sets = [DecorationSet::of(first.clone()), DecorationSet::of(second.clone())];

        let from = rng.gen_range(0..1000);
        let to = rng.gen_range(from..=1000);
        let spans = decorated_spans_in_range(&sets, from, to);

        if from == to {
            assert!(spans.is_empty());
            continue;
        }
        assert_eq!(spans.first().map(|span| span.from), Some(from));
        assert_eq!(spans.last().map(|span| span.to), Some(to));
        assert_eq!(spans, spans_flat(&[first, second], from, to), "seed {seed}");
    }
}
