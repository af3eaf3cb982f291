use std::fmt;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counters of an extraction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Ways matching the filter and being closed area candidates.
    pub num_relevant_ways: u32,
    /// Relations matching the filter.
    pub num_relevant_relations: u32,
    /// Ways for which an area was emitted.
    pub num_assembled_ways: u32,
    /// Relations for which an area was emitted.
    pub num_assembled_relations: u32,
}

impl AddAssign for ExtractionStats {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.num_relevant_ways += other.num_relevant_ways;
        self.num_relevant_relations += other.num_relevant_relations;
        self.num_assembled_ways += other.num_assembled_ways;
        self.num_assembled_relations += other.num_assembled_relations;
    }
}

impl fmt::Display for ExtractionStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            r#"Assembled:
  ways:         {}/{}
  relations:    {}/{}"#,
            self.num_assembled_ways,
            self.num_relevant_ways,
            self.num_assembled_relations,
            self.num_relevant_relations,
        )
    }
}

/// Counters shared by the workers of an extraction.
///
/// Workers count into a local `ExtractionStats` and add it once per block.
#[derive(Debug, Default)]
pub struct Counters {
    relevant_ways: AtomicU32,
    relevant_relations: AtomicU32,
    assembled_ways: AtomicU32,
    assembled_relations: AtomicU32,
}

impl Counters {
    pub fn add(&self, stats: &ExtractionStats) {
        let add = |counter: &AtomicU32, value: u32| {
            if value != 0 {
                counter.fetch_add(value, Ordering::Relaxed);
            }
        };
        add(&self.relevant_ways, stats.num_relevant_ways);
        add(&self.relevant_relations, stats.num_relevant_relations);
        add(&self.assembled_ways, stats.num_assembled_ways);
        add(&self.assembled_relations, stats.num_assembled_relations);
    }

    pub fn snapshot(&self) -> ExtractionStats {
        ExtractionStats {
            num_relevant_ways: self.relevant_ways.load(Ordering::Relaxed),
            num_relevant_relations: self.relevant_relations.load(Ordering::Relaxed),
            num_assembled_ways: self.assembled_ways.load(Ordering::Relaxed),
            num_assembled_relations: self.assembled_relations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counters() {
        let counters = Counters::default();
        let mut local = ExtractionStats {
            num_relevant_ways: 3,
            num_assembled_ways: 2,
            ..Default::default()
        };
        counters.add(&local);
        local += ExtractionStats {
            num_relevant_relations: 1,
            ..Default::default()
        };
        counters.add(&local);

        let stats = counters.snapshot();
        assert_eq!(stats.num_relevant_ways, 6);
        assert_eq!(stats.num_assembled_ways, 4);
        assert_eq!(stats.num_relevant_relations, 1);
        assert_eq!(stats.num_assembled_relations, 0);
        assert_eq!(
            stats.to_string(),
            "Assembled:\n  ways:         4/6\n  relations:    0/1"
        );
    }
}
