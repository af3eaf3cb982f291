//! Reassembly of closed rings from way fragments and construction of the
//! resulting area geometry.
//!
//! Relations describe their areas by member ways in arbitrary order and
//! direction. A single ring of the area might be split over many ways, which
//! have to be stitched together at their shared end nodes.

use crate::geometry::{Area, MultiPolygon, Point, Polygon};

use ahash::AHashMap;

/// Node ids of a way, not yet resolved to coordinates.
pub type RawWay = Vec<i64>;

/// Inner and outer node id rings of a relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMultiPoly {
    pub inner: Vec<RawWay>,
    pub outer: Vec<RawWay>,
}

/// Maps a node id to its coordinate.
pub trait NodeLookup {
    fn coordinate(&self, id: i64) -> Option<Point>;
}

impl<F: Fn(i64) -> Option<Point>> NodeLookup for F {
    fn coordinate(&self, id: i64) -> Option<Point> {
        self(id)
    }
}

impl NodeLookup for AHashMap<i64, Point> {
    fn coordinate(&self, id: i64) -> Option<Point> {
        self.get(&id).copied()
    }
}

/// A ring has at least 4 ids and ends where it starts.
pub fn is_closed(way: &[i64]) -> bool {
    way.len() >= 4 && way.first() == way.last()
}

/// Tries to join `other` to one of the ends of `chain`.
///
/// Precedence: chain tail to other head, chain tail to other tail, chain head
/// to other head, chain head to other tail. The shared id is kept once.
fn splice(chain: &mut RawWay, other: &[i64]) -> bool {
    let (head, tail) = match (chain.first(), chain.last()) {
        (Some(&head), Some(&tail)) => (head, tail),
        _ => return false,
    };
    let (other_head, other_tail) = match (other.first(), other.last()) {
        (Some(&head), Some(&tail)) => (head, tail),
        _ => return false,
    };

    if tail == other_head {
        chain.extend_from_slice(&other[1..]);
    } else if tail == other_tail {
        chain.extend(other.iter().rev().skip(1));
    } else if head == other_head {
        let mut joined = Vec::with_capacity(chain.len() + other.len());
        joined.extend(other.iter().rev());
        joined.extend_from_slice(&chain[1..]);
        *chain = joined;
    } else if head == other_tail {
        let mut joined = Vec::with_capacity(chain.len() + other.len());
        joined.extend_from_slice(other);
        joined.extend_from_slice(&chain[1..]);
        *chain = joined;
    } else {
        return false;
    }
    true
}

/// Stitches way fragments into closed rings.
///
/// Fragments with less than two ids are ignored. Chains which cannot be
/// closed are dropped; in that case the returned flag is false, while all
/// rings which did close are still returned.
pub fn closed_polys_from_ways(ways: &[RawWay]) -> (Vec<RawWay>, bool) {
    let mut pool: Vec<&RawWay> = ways.iter().filter(|way| way.len() > 1).collect();
    let mut closed = Vec::new();
    let mut all_ok = true;

    while !pool.is_empty() {
        let mut chain = pool.remove(0).clone();
        let mut i = 0;
        while chain.first() != chain.last() && i < pool.len() {
            if splice(&mut chain, pool[i]) {
                pool.remove(i);
                // the extended chain might match a fragment skipped before
                i = 0;
            } else {
                i += 1;
            }
        }

        if is_closed(&chain) {
            closed.push(chain);
        } else {
            all_ok = false;
        }
    }

    (closed, all_ok)
}

/// Stitches inner and outer fragments of a relation independently.
///
/// Without outer fragments nothing is stitched and the result is empty.
/// The flag is true only if all fragments were closed.
pub fn multi_poly_from_ways(inner: &[RawWay], outer: &[RawWay]) -> (RawMultiPoly, bool) {
    if outer.is_empty() {
        return (RawMultiPoly::default(), false);
    }

    let (outer, outer_ok) = closed_polys_from_ways(outer);
    let (inner, inner_ok) = if inner.is_empty() {
        (Vec::new(), true)
    } else {
        closed_polys_from_ways(inner)
    };

    (RawMultiPoly { inner, outer }, outer_ok && inner_ok)
}

fn resolve_ring<L: NodeLookup + ?Sized>(ring: &[i64], lookup: &L) -> Polygon {
    Polygon::new(ring.iter().filter_map(|&id| lookup.coordinate(id)).collect())
}

/// Builds the area geometry of closed rings.
///
/// A single outer ring without holes yields a simple polygon, anything else a
/// multipolygon. Ids unknown to `lookup` are skipped.
pub fn area_from_closed_ways<L: NodeLookup + ?Sized>(
    inner: &[RawWay],
    outer: &[RawWay],
    lookup: &L,
) -> Area {
    let mut outer: Vec<Polygon> = outer
        .iter()
        .map(|ring| resolve_ring(ring, lookup))
        .collect();
    if inner.is_empty() && outer.len() == 1 {
        return Area::Polygon(outer.remove(0));
    }
    let inner = inner.iter().map(|ring| resolve_ring(ring, lookup)).collect();
    Area::MultiPolygon(MultiPolygon::new(inner, outer))
}

impl RawMultiPoly {
    pub fn to_area<L: NodeLookup + ?Sized>(&self, lookup: &L) -> Area {
        area_from_closed_ways(&self.inner, &self.outer, lookup)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn grid(id: i64) -> Option<Point> {
        Some(Point::new((id / 10) as f64, (id % 10) as f64))
    }

    #[test]
    fn test_two_fragments_close() {
        let (rings, ok) = closed_polys_from_ways(&[vec![1, 2, 3], vec![3, 4, 1]]);
        assert!(ok);
        assert_eq!(rings, vec![vec![1, 2, 3, 4, 1]]);
    }

    #[test]
    fn test_disjoint_fragments_fail() {
        let (rings, ok) = closed_polys_from_ways(&[vec![1, 2, 3], vec![4, 5, 6]]);
        assert!(!ok);
        assert!(rings.is_empty());
    }

    #[test]
    fn test_splice_precedence() {
        let spliced = |other: &[i64]| {
            let mut chain = vec![1, 2, 3];
            splice(&mut chain, other).then(|| chain)
        };
        assert_eq!(spliced(&[3, 4]), Some(vec![1, 2, 3, 4]));
        assert_eq!(spliced(&[4, 3]), Some(vec![1, 2, 3, 4]));
        assert_eq!(spliced(&[1, 0]), Some(vec![0, 1, 2, 3]));
        assert_eq!(spliced(&[0, 1]), Some(vec![0, 1, 2, 3]));
        // tail to head wins over head to tail
        assert_eq!(spliced(&[3, 5, 1]), Some(vec![1, 2, 3, 5, 1]));
        assert_eq!(spliced(&[4, 5]), None);

        let (rings, ok) = closed_polys_from_ways(&[vec![1, 2, 3], vec![1, 4, 3]]);
        assert!(ok);
        assert_eq!(rings, vec![vec![1, 2, 3, 4, 1]]);
    }

    #[test]
    fn test_rescan_after_splice() {
        // [3, 4] only matches after [2, 3] was appended
        let ways = vec![vec![1, 2], vec![3, 4], vec![2, 3], vec![4, 1]];
        let (rings, ok) = closed_polys_from_ways(&ways);
        assert!(ok);
        assert_eq!(rings, vec![vec![1, 2, 3, 4, 1]]);
    }

    #[test]
    fn test_partial_failure_keeps_closed_rings() {
        let ways = vec![vec![1, 2, 3], vec![10, 11], vec![3, 4, 1], vec![20, 21, 22, 20]];
        let (rings, ok) = closed_polys_from_ways(&ways);
        assert!(!ok);
        assert_eq!(rings, vec![vec![1, 2, 3, 4, 1], vec![20, 21, 22, 20]]);
    }

    #[test]
    fn test_short_fragments() {
        // single ids are ignored and do not count as failures
        let (rings, ok) = closed_polys_from_ways(&[vec![7], vec![], vec![1, 2, 3, 1]]);
        assert!(ok);
        assert_eq!(rings, vec![vec![1, 2, 3, 1]]);

        // closed, but too short to be a ring
        let (rings, ok) = closed_polys_from_ways(&[vec![1, 2, 1]]);
        assert!(!ok);
        assert!(rings.is_empty());
    }

    #[test]
    fn test_multi_poly_requires_outer() {
        let (rings, ok) = multi_poly_from_ways(&[vec![1, 2, 3, 1]], &[]);
        assert!(!ok);
        assert_eq!(rings, RawMultiPoly::default());
    }

    #[test]
    fn test_multi_poly() {
        let outer = vec![vec![1, 2, 3], vec![3, 4, 1]];
        let inner = vec![vec![5, 6, 7, 5]];
        let (rings, ok) = multi_poly_from_ways(&inner, &outer);
        assert!(ok);
        assert_eq!(rings.outer, vec![vec![1, 2, 3, 4, 1]]);
        assert_eq!(rings.inner, vec![vec![5, 6, 7, 5]]);

        // a broken inner ring fails the whole, but keeps the outer ring
        let (rings, ok) = multi_poly_from_ways(&[vec![5, 6]], &outer);
        assert!(!ok);
        assert_eq!(rings.outer.len(), 1);
        assert!(rings.inner.is_empty());
    }

    #[test]
    fn test_single_outer_is_polygon() {
        let area = area_from_closed_ways(&[], &[vec![11, 12, 22, 21, 11]], &grid);
        let polygon = area.as_polygon().expect("polygon expected");
        assert_eq!(polygon.len(), 5);
        assert_eq!(polygon.point(2), Some(Point::new(2.0, 2.0)));
        let boundary = polygon.boundary().unwrap();
        assert_eq!(boundary.min().y, 1.0);
        assert_eq!(boundary.max().x, 2.0);
    }

    #[test]
    fn test_other_combinations_are_multi_polygons() {
        let outer = vec![vec![11, 15, 55, 51, 11]];
        let inner = vec![vec![22, 23, 33, 22]];
        let area = area_from_closed_ways(&inner, &outer, &grid);
        let mp = area.as_multi_polygon().expect("multipolygon expected");
        assert_eq!(mp.outer().len(), 1);
        assert_eq!(mp.inner().len(), 1);
        assert_eq!(mp.inner()[0].len(), 4);
        assert_eq!(mp.boundary().unwrap().max().y, 5.0);

        let outer = vec![vec![11, 12, 22, 11], vec![33, 34, 44, 33]];
        let area = area_from_closed_ways(&[], &outer, &grid);
        assert_eq!(area.as_multi_polygon().map(|mp| mp.outer().len()), Some(2));

        let area = area_from_closed_ways(&[], &[], &grid);
        assert!(area.as_multi_polygon().is_some());
        assert_eq!(area.boundary(), None);
    }

    #[test]
    fn test_unknown_ids_are_skipped() {
        let lookup: AHashMap<i64, Point> = [1, 2, 4]
            .iter()
            .map(|&id| (id, grid(id).unwrap()))
            .collect();
        let rings = RawMultiPoly {
            inner: Vec::new(),
            outer: vec![vec![1, 2, 3, 4, 1]],
        };
        let area = rings.to_area(&lookup);
        assert_eq!(area.num_points(), 4);
    }

    /// A cycle over `n` distinct ids cut into fragments at `cuts`, fragments
    /// with a set flag in `reverse` are reversed, the list is rotated by
    /// `rotate`.
    fn fragments(n: i64, cuts: &[i64], reverse: &[bool], rotate: usize) -> Vec<RawWay> {
        let cycle: Vec<i64> = (1..=n).chain(std::iter::once(1)).collect();
        let mut bounds = vec![0];
        bounds.extend(cuts.iter().copied());
        bounds.push(n);
        let mut result: Vec<RawWay> = bounds
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let mut fragment = cycle[w[0] as usize..=w[1] as usize].to_vec();
                if reverse[i % reverse.len()] {
                    fragment.reverse();
                }
                fragment
            })
            .collect();
        let len = result.len();
        result.rotate_left(rotate % len);
        result
    }

    proptest! {
        #[test]
        fn single_cycle_closes_into_one_ring(
            (n, cuts) in (3i64..40).prop_flat_map(|n| {
                (Just(n), prop::collection::btree_set(1..n, 0..(n as usize - 1).min(8)))
            }),
            reverse in prop::collection::vec(any::<bool>(), 1..8),
            rotate in 0usize..16,
        ) {
            let cuts: Vec<i64> = cuts.into_iter().collect();
            let ways = fragments(n, &cuts, &reverse, rotate);
            let (rings, ok) = closed_polys_from_ways(&ways);
            prop_assert!(ok);
            prop_assert_eq!(rings.len(), 1);
            let ring = &rings[0];
            prop_assert_eq!(ring.len() as i64, n + 1);
            prop_assert_eq!(ring.first(), ring.last());
            let mut ids = ring[1..].to_vec();
            ids.sort_unstable();
            prop_assert_eq!(ids, (1..=n).collect::<Vec<_>>());
        }

        #[test]
        fn open_fragment_does_not_affect_others(
            n in 3i64..20,
            dangling in prop::collection::vec(1000i64..2000, 2..6),
        ) {
            let mut ways = fragments(n, &[], &[false], 0);
            let mut dangling = dangling;
            dangling.sort_unstable();
            dangling.dedup();
            prop_assume!(dangling.len() > 1);
            ways.insert(0, dangling);
            let (rings, ok) = closed_polys_from_ways(&ways);
            prop_assert!(!ok);
            prop_assert_eq!(rings, vec![fragments(n, &[], &[false], 0).remove(0)]);
        }
    }
}
