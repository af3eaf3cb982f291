//! Tag filters evaluated against primitives of a block.
//!
//! Filters work on stringtable indexes. Before matching primitives of a new
//! block, `rebuild_cache` has to be called with that block: it resolves the
//! filter strings to indexes of the block's stringtable. A filter returning
//! `false` from `rebuild_cache` cannot match any primitive of the block, so
//! the block can be skipped.
//!
//! Every worker owns its own copy of a filter, see `TagFilter::box_clone`.

use crate::block::{PrimitiveBlock, Tag};

pub trait TagFilter: Send + Sync {
    /// Resolves the filter for `block`. Returns false if no primitive of the
    /// block can match.
    fn rebuild_cache(&mut self, block: &PrimitiveBlock) -> bool;

    /// Checks tags of a primitive from the block the cache was built for.
    fn matches(&self, tags: &[Tag]) -> bool;

    fn box_clone(&self) -> Box<dyn TagFilter>;
}

impl Clone for Box<dyn TagFilter> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl std::fmt::Debug for dyn TagFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "TagFilter")
    }
}

/// Matches everything or nothing.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub bool);

impl TagFilter for Constant {
    fn rebuild_cache(&mut self, _block: &PrimitiveBlock) -> bool {
        self.0
    }

    fn matches(&self, _tags: &[Tag]) -> bool {
        self.0
    }

    fn box_clone(&self) -> Box<dyn TagFilter> {
        Box::new(*self)
    }
}

/// Matches primitives having at least one of the given keys.
#[derive(Debug, Clone, Default)]
pub struct Key {
    keys: Vec<String>,
    cache: Vec<u32>,
}

impl Key {
    pub fn new<S: AsRef<str>>(keys: &[S]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
            cache: Vec::new(),
        }
    }
}

impl TagFilter for Key {
    fn rebuild_cache(&mut self, block: &PrimitiveBlock) -> bool {
        self.cache.clear();
        self.cache
            .extend(self.keys.iter().filter_map(|k| block.find_string(k)));
        !self.cache.is_empty()
    }

    fn matches(&self, tags: &[Tag]) -> bool {
        tags.iter().any(|(k, _)| self.cache.contains(k))
    }

    fn box_clone(&self) -> Box<dyn TagFilter> {
        Box::new(self.clone())
    }
}

/// Matches primitives having at least one of the given key-value pairs.
#[derive(Debug, Clone, Default)]
pub struct KeyValue {
    pairs: Vec<(String, String)>,
    cache: Vec<Tag>,
}

impl KeyValue {
    pub fn new<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Self {
        Self {
            pairs: pairs
                .iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
                .collect(),
            cache: Vec::new(),
        }
    }
}

impl TagFilter for KeyValue {
    fn rebuild_cache(&mut self, block: &PrimitiveBlock) -> bool {
        self.cache.clear();
        self.cache.extend(
            self.pairs
                .iter()
                .filter_map(|(k, v)| Some((block.find_string(k)?, block.find_string(v)?))),
        );
        !self.cache.is_empty()
    }

    fn matches(&self, tags: &[Tag]) -> bool {
        tags.iter().any(|tag| self.cache.contains(tag))
    }

    fn box_clone(&self) -> Box<dyn TagFilter> {
        Box::new(self.clone())
    }
}

/// Matches if all children match.
#[derive(Clone, Debug)]
pub struct And(pub Vec<Box<dyn TagFilter>>);

impl TagFilter for And {
    fn rebuild_cache(&mut self, block: &PrimitiveBlock) -> bool {
        // rebuild every child, a skipped one would keep a stale cache
        self.0
            .iter_mut()
            .fold(true, |ok, filter| filter.rebuild_cache(block) && ok)
    }

    fn matches(&self, tags: &[Tag]) -> bool {
        self.0.iter().all(|filter| filter.matches(tags))
    }

    fn box_clone(&self) -> Box<dyn TagFilter> {
        Box::new(self.clone())
    }
}

/// Matches if any child matches.
#[derive(Clone, Debug)]
pub struct Or(pub Vec<Box<dyn TagFilter>>);

impl TagFilter for Or {
    fn rebuild_cache(&mut self, block: &PrimitiveBlock) -> bool {
        self.0
            .iter_mut()
            .fold(false, |ok, filter| filter.rebuild_cache(block) || ok)
    }

    fn matches(&self, tags: &[Tag]) -> bool {
        self.0.iter().any(|filter| filter.matches(tags))
    }

    fn box_clone(&self) -> Box<dyn TagFilter> {
        Box::new(self.clone())
    }
}

#[derive(Clone, Debug)]
pub struct Not(pub Box<dyn TagFilter>);

impl TagFilter for Not {
    fn rebuild_cache(&mut self, block: &PrimitiveBlock) -> bool {
        self.0.rebuild_cache(block);
        true
    }

    fn matches(&self, tags: &[Tag]) -> bool {
        !self.0.matches(tags)
    }

    fn box_clone(&self) -> Box<dyn TagFilter> {
        Box::new(self.clone())
    }
}

/// Conjunction of two filters.
pub fn and(a: Box<dyn TagFilter>, b: Box<dyn TagFilter>) -> Box<dyn TagFilter> {
    Box::new(And(vec![a, b]))
}

#[cfg(test)]
mod test {
    use super::*;

    fn block() -> PrimitiveBlock {
        let mut block = PrimitiveBlock::new();
        block
            .add_way(1, &[1, 2, 3, 4, 1], &[("building", "yes")])
            .add_way(2, &[1, 2, 3, 4, 1], &[("landuse", "forest"), ("name", "x")])
            .add_way(3, &[1, 2, 3, 4, 1], &[("highway", "residential")]);
        block
    }

    fn matching(filter: &mut dyn TagFilter, block: &PrimitiveBlock) -> Vec<i64> {
        if !filter.rebuild_cache(block) {
            return Vec::new();
        }
        block
            .ways
            .iter()
            .filter(|w| filter.matches(&w.tags))
            .map(|w| w.id)
            .collect()
    }

    #[test]
    fn test_key_filter() {
        let block = block();
        assert_eq!(matching(&mut Key::new(&["building", "landuse"]), &block), vec![1, 2]);
        let mut filter = Key::new(&["amenity"]);
        assert!(!filter.rebuild_cache(&block));
    }

    #[test]
    fn test_key_value_filter() {
        let block = block();
        let mut filter = KeyValue::new(&[("landuse", "forest")]);
        assert_eq!(matching(&mut filter, &block), vec![2]);
        // both strings exist in the block, but not as a pair
        let mut filter = KeyValue::new(&[("building", "forest")]);
        assert_eq!(matching(&mut filter, &block), Vec::<i64>::new());
    }

    #[test]
    fn test_combinators() {
        let block = block();
        let mut filter = Or(vec![
            Box::new(Key::new(&["building"])),
            Box::new(Key::new(&["highway"])),
        ]);
        assert_eq!(matching(&mut filter, &block), vec![1, 3]);

        let mut filter = and(Box::new(filter), Box::new(Not(Box::new(Key::new(&["building"])))));
        assert_eq!(matching(filter.as_mut(), &block), vec![3]);

        let mut filter = And(vec![Box::new(Key::new(&["name"])), Box::new(Constant(false))]);
        assert_eq!(matching(&mut filter, &block), Vec::<i64>::new());
    }

    #[test]
    fn test_cache_is_per_block() {
        let first = block();
        let mut second = PrimitiveBlock::new();
        // different string indexes for the same key
        second
            .add_way(7, &[1, 2, 3, 4, 1], &[("name", "y")])
            .add_way(8, &[1, 2, 3, 4, 1], &[("building", "house")]);

        let mut filter = Key::new(&["building"]).box_clone();
        let mut copy = filter.clone();
        assert_eq!(matching(filter.as_mut(), &first), vec![1]);
        assert_eq!(matching(filter.as_mut(), &second), vec![8]);
        assert_eq!(matching(copy.as_mut(), &second), vec![8]);
    }
}
