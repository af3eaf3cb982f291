//! State shared by all passes of one extraction.

use crate::error::Error;
use crate::extraction_types::ExtractionTypes;
use crate::filter::{and, TagFilter};
use crate::geometry::Point;
use crate::resolver::{NodeLookup, RawWay};
use crate::stats::{Counters, ExtractionStats};

use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard};

/// Node ids needed by the current stage, with their coordinates once
/// fetched.
#[derive(Debug, Default)]
pub struct NodeDictionary(AHashMap<i64, Option<Point>>);

impl NodeDictionary {
    pub fn is_needed(&self, id: i64) -> bool {
        self.0.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<Point> {
        self.0.get(&id).copied().flatten()
    }

    /// Number of needed nodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of needed nodes with a known coordinate.
    pub fn num_resolved(&self) -> usize {
        self.0.values().filter(|p| p.is_some()).count()
    }
}

impl NodeLookup for NodeDictionary {
    fn coordinate(&self, id: i64) -> Option<Point> {
        self.get(id)
    }
}

/// Way ids needed by relations, with their node refs once fetched.
#[derive(Debug, Default)]
pub struct WayDictionary(AHashMap<i64, RawWay>);

impl WayDictionary {
    pub fn is_needed(&self, id: i64) -> bool {
        self.0.contains_key(&id)
    }

    /// Refs of a needed way; empty if the way was not found.
    pub fn get(&self, id: i64) -> Option<&RawWay> {
        self.0.get(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn num_resolved(&self) -> usize {
        self.0.values().filter(|refs| !refs.is_empty()).count()
    }
}

/// Settings of an extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub types: ExtractionTypes,
    pub verbose: bool,
    pub snap_geometry: bool,
}

/// Dictionaries, filter and counters of one extraction.
///
/// Dictionaries only grow while a stage runs. Workers merge their results
/// once per block under the write lock and resolve primitives under the
/// read lock.
#[derive(Debug)]
pub struct ExtractionContext {
    config: Config,
    filter: Box<dyn TagFilter>,
    nodes: RwLock<NodeDictionary>,
    ways: RwLock<WayDictionary>,
    counters: Counters,
}

impl ExtractionContext {
    /// Creates the context, combining the filter of `config.types` with an
    /// optional external filter.
    pub fn new(config: Config, external: Option<Box<dyn TagFilter>>) -> Result<Self, Error> {
        if !config.types.is_extractable() {
            return Err(Error::NothingToExtract(config.types));
        }
        let internal = config
            .types
            .tag_filter()
            .ok_or(Error::NothingToExtract(config.types))?;
        let filter = match external {
            Some(external) => and(internal, external),
            None => internal,
        };
        Ok(Self {
            config,
            filter,
            nodes: Default::default(),
            ways: Default::default(),
            counters: Default::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn verbose(&self) -> bool {
        self.config.verbose
    }

    /// A fresh copy of the composed filter for a worker.
    pub fn filter(&self) -> Box<dyn TagFilter> {
        self.filter.box_clone()
    }

    pub fn nodes(&self) -> RwLockReadGuard<NodeDictionary> {
        self.nodes.read()
    }

    pub fn ways(&self) -> RwLockReadGuard<WayDictionary> {
        self.ways.read()
    }

    /// Marks nodes as needed.
    pub fn request_nodes(&self, ids: impl IntoIterator<Item = i64>) {
        let mut nodes = self.nodes.write();
        for id in ids {
            nodes.0.entry(id).or_insert(None);
        }
    }

    /// Stores coordinates of needed nodes; other ids are ignored.
    pub fn store_nodes(&self, fetched: impl IntoIterator<Item = (i64, Point)>) {
        let snap = self.config.snap_geometry;
        let mut nodes = self.nodes.write();
        for (id, point) in fetched {
            if let Some(slot) = nodes.0.get_mut(&id) {
                *slot = Some(if snap { point.snapped() } else { point });
            }
        }
    }

    /// Marks ways as needed.
    pub fn request_ways(&self, ids: impl IntoIterator<Item = i64>) {
        let mut ways = self.ways.write();
        for id in ids {
            ways.0.entry(id).or_default();
        }
    }

    /// Stores refs of needed ways; other ids are ignored.
    pub fn store_ways(&self, fetched: impl IntoIterator<Item = (i64, RawWay)>) {
        let mut ways = self.ways.write();
        for (id, refs) in fetched {
            if let Some(slot) = ways.0.get_mut(&id) {
                slot.extend(refs);
            }
        }
    }

    pub fn clear_nodes(&self) {
        let mut nodes = self.nodes.write();
        nodes.0.clear();
        nodes.0.shrink_to_fit();
    }

    pub fn clear_ways(&self) {
        let mut ways = self.ways.write();
        ways.0.clear();
        ways.0.shrink_to_fit();
    }

    pub fn count(&self, stats: &ExtractionStats) {
        self.counters.add(stats);
    }

    pub fn stats(&self) -> ExtractionStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::Key;

    fn context(snap_geometry: bool) -> ExtractionContext {
        let config = Config {
            types: ExtractionTypes::ALL,
            verbose: false,
            snap_geometry,
        };
        ExtractionContext::new(config, None).unwrap()
    }

    #[test]
    fn test_nothing_to_extract() {
        for types in [ExtractionTypes::NONE, ExtractionTypes::WAYS, ExtractionTypes::LANDUSE] {
            let config = Config {
                types,
                ..Default::default()
            };
            let external: Box<dyn TagFilter> = Box::new(Key::new(&["name"]));
            match ExtractionContext::new(config, Some(external)) {
                Err(Error::NothingToExtract(t)) => assert_eq!(t, types),
                other => panic!("unexpected result: {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_node_dictionary() {
        let ctx = context(false);
        ctx.request_nodes(vec![1, 2, 3, 2]);
        assert_eq!(ctx.nodes().len(), 3);
        assert!(ctx.nodes().is_needed(2));
        assert_eq!(ctx.nodes().get(2), None);

        ctx.store_nodes(vec![(2, Point::new(1.5, 2.5)), (7, Point::new(0.0, 0.0))]);
        let nodes = ctx.nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes.num_resolved(), 1);
        assert_eq!(nodes.get(2), Some(Point::new(1.5, 2.5)));
        assert_eq!(nodes.coordinate(7), None);
        drop(nodes);

        // requesting again keeps the coordinate
        ctx.request_nodes(vec![2]);
        assert_eq!(ctx.nodes().get(2), Some(Point::new(1.5, 2.5)));

        ctx.clear_nodes();
        assert!(ctx.nodes().is_empty());
    }

    #[test]
    fn test_snapped_nodes() {
        let ctx = context(true);
        ctx.request_nodes(vec![1]);
        let point = Point::new(52.123456789, 13.987654321);
        ctx.store_nodes(vec![(1, point)]);
        assert_eq!(ctx.nodes().get(1), Some(point.snapped()));
    }

    #[test]
    fn test_way_dictionary() {
        let ctx = context(false);
        ctx.request_ways(vec![10, 11]);
        ctx.store_ways(vec![(10, vec![1, 2, 3]), (12, vec![4, 5])]);
        let ways = ctx.ways();
        assert_eq!(ways.len(), 2);
        assert_eq!(ways.num_resolved(), 1);
        assert_eq!(ways.get(10), Some(&vec![1, 2, 3]));
        assert_eq!(ways.get(11), Some(&Vec::new()));
        assert_eq!(ways.get(12), None);
    }
}
