use crate::filter::{Key, KeyValue, Or, TagFilter};

use itertools::Itertools;

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Selection of the areas to extract.
///
/// A mask consists of primitive selectors (`WAYS`, `RELATIONS`) and of
/// categories defining which tags make a primitive an area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtractionTypes(u32);

impl ExtractionTypes {
    pub const NONE: Self = Self(0);
    /// Extract closed ways.
    pub const WAYS: Self = Self(1 << 0);
    /// Extract relations.
    pub const RELATIONS: Self = Self(1 << 1);
    /// `building=*`
    pub const BUILDINGS: Self = Self(1 << 2);
    /// `landuse=*`
    pub const LANDUSE: Self = Self(1 << 3);
    /// `natural=*`
    pub const NATURAL: Self = Self(1 << 4);
    /// `leisure=*`
    pub const LEISURE: Self = Self(1 << 5);
    /// `amenity=*`
    pub const AMENITY: Self = Self(1 << 6);
    /// `water=*` and `waterway=riverbank`
    pub const WATER: Self = Self(1 << 7);
    /// `boundary=administrative`
    pub const BOUNDARIES: Self = Self(1 << 8);
    /// `place=*`
    pub const PLACES: Self = Self(1 << 9);
    /// `type=multipolygon` and `type=boundary`
    pub const MULTIPOLYGONS: Self = Self(1 << 10);

    const PRIMITIVES: Self = Self(Self::WAYS.0 | Self::RELATIONS.0);
    const SPECIAL_BUT_BUILDINGS: Self = Self(
        Self::LANDUSE.0
            | Self::NATURAL.0
            | Self::LEISURE.0
            | Self::AMENITY.0
            | Self::WATER.0
            | Self::BOUNDARIES.0
            | Self::PLACES.0,
    );
    const CATEGORIES: Self =
        Self(Self::SPECIAL_BUT_BUILDINGS.0 | Self::BUILDINGS.0 | Self::MULTIPOLYGONS.0);

    pub const ALL_SPECIAL_BUT_BUILDINGS: Self =
        Self(Self::PRIMITIVES.0 | Self::SPECIAL_BUT_BUILDINGS.0);
    pub const ALL_SPECIAL: Self = Self(Self::ALL_SPECIAL_BUT_BUILDINGS.0 | Self::BUILDINGS.0);
    pub const ALL_MULTIPOLYGONS: Self = Self(Self::RELATIONS.0 | Self::MULTIPOLYGONS.0);
    pub const ALL: Self = Self(Self::PRIMITIVES.0 | Self::CATEGORIES.0);

    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::WAYS, "ways"),
        (Self::RELATIONS, "relations"),
        (Self::BUILDINGS, "buildings"),
        (Self::LANDUSE, "landuse"),
        (Self::NATURAL, "natural"),
        (Self::LEISURE, "leisure"),
        (Self::AMENITY, "amenity"),
        (Self::WATER, "water"),
        (Self::BOUNDARIES, "boundaries"),
        (Self::PLACES, "places"),
        (Self::MULTIPOLYGONS, "multipolygons"),
    ];

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the mask selects at least one primitive kind and at least
    /// one category, i.e. whether there is anything to extract.
    pub fn is_extractable(self) -> bool {
        self.intersects(Self::PRIMITIVES) && self.intersects(Self::CATEGORIES)
    }

    /// Builds the tag filter matching the selected categories.
    ///
    /// Returns `None` if no category is selected.
    pub fn tag_filter(self) -> Option<Box<dyn TagFilter>> {
        let mut keys = Vec::new();
        let mut pairs = Vec::new();
        let categories = [
            (Self::BUILDINGS, "building"),
            (Self::LANDUSE, "landuse"),
            (Self::NATURAL, "natural"),
            (Self::LEISURE, "leisure"),
            (Self::AMENITY, "amenity"),
            (Self::WATER, "water"),
            (Self::PLACES, "place"),
        ];
        for (flag, key) in categories {
            if self.contains(flag) {
                keys.push(key);
            }
        }
        if self.contains(Self::WATER) {
            pairs.push(("waterway", "riverbank"));
        }
        if self.contains(Self::BOUNDARIES) {
            pairs.push(("boundary", "administrative"));
        }
        if self.contains(Self::MULTIPOLYGONS) {
            pairs.push(("type", "multipolygon"));
            pairs.push(("type", "boundary"));
        }

        let mut filters: Vec<Box<dyn TagFilter>> = Vec::new();
        if !keys.is_empty() {
            filters.push(Box::new(Key::new(&keys[..])));
        }
        if !pairs.is_empty() {
            filters.push(Box::new(KeyValue::new(&pairs[..])));
        }
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Box::new(Or(filters))),
        }
    }
}

impl BitOr for ExtractionTypes {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ExtractionTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ExtractionTypes {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ExtractionTypes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if *self == Self::NONE {
            return write!(f, "none");
        }
        let names = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
            .join("|");
        write!(f, "{}", names)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::PrimitiveBlock;

    #[test]
    fn test_extractable() {
        assert!(!ExtractionTypes::NONE.is_extractable());
        assert!(!ExtractionTypes::WAYS.is_extractable());
        assert!(!ExtractionTypes::BUILDINGS.is_extractable());
        assert!((ExtractionTypes::WAYS | ExtractionTypes::BUILDINGS).is_extractable());
        assert!(ExtractionTypes::ALL_MULTIPOLYGONS.is_extractable());
        assert!(ExtractionTypes::ALL_SPECIAL_BUT_BUILDINGS.is_extractable());
        assert!(!ExtractionTypes::ALL_SPECIAL_BUT_BUILDINGS.contains(ExtractionTypes::BUILDINGS));
        assert!(ExtractionTypes::ALL_SPECIAL.contains(ExtractionTypes::BUILDINGS));
        assert!(ExtractionTypes::ALL
            .contains(ExtractionTypes::ALL_SPECIAL | ExtractionTypes::ALL_MULTIPOLYGONS));
    }

    #[test]
    fn test_display() {
        assert_eq!(ExtractionTypes::NONE.to_string(), "none");
        assert_eq!(
            (ExtractionTypes::RELATIONS | ExtractionTypes::MULTIPOLYGONS).to_string(),
            "relations|multipolygons"
        );
        assert_eq!(ExtractionTypes::from_bits(u32::MAX), ExtractionTypes::ALL);
    }

    #[test]
    fn test_tag_filter() {
        let mut block = PrimitiveBlock::new();
        block
            .add_way(1, &[], &[("building", "yes")])
            .add_way(2, &[], &[("landuse", "meadow")])
            .add_way(3, &[], &[("waterway", "riverbank")])
            .add_way(4, &[], &[("boundary", "administrative")])
            .add_way(5, &[], &[("type", "multipolygon")])
            .add_way(6, &[], &[("highway", "primary")]);

        let matching = |types: ExtractionTypes| {
            let mut filter = types.tag_filter().unwrap();
            assert!(filter.rebuild_cache(&block));
            block
                .ways
                .iter()
                .filter(|w| filter.matches(&w.tags))
                .map(|w| w.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(matching(ExtractionTypes::ALL_SPECIAL_BUT_BUILDINGS), vec![2, 3, 4]);
        assert_eq!(matching(ExtractionTypes::ALL_SPECIAL), vec![1, 2, 3, 4]);
        assert_eq!(matching(ExtractionTypes::ALL_MULTIPOLYGONS), vec![5]);
        assert_eq!(matching(ExtractionTypes::ALL), vec![1, 2, 3, 4, 5]);
        assert!(ExtractionTypes::WAYS.tag_filter().is_none());
    }
}
