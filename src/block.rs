//! Owned, decoded primitive blocks.
//!
//! Tags and roles are stored as indexes into the stringtable of the block,
//! the same way they are stored in the pbf format. This allows tag filters to
//! resolve their strings once per block and compare indexes afterwards.

use std::ops::{BitOr, BitOrAssign};

/// Pair of (key, value) indexes into the stringtable of a block.
pub type Tag = (u32, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Way {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: Vec<Tag>,
}

impl Way {
    /// Whether the way is a candidate for a closed area, i.e. it has more
    /// than 4 refs and its first ref equals its last one.
    pub fn is_closed_candidate(&self) -> bool {
        self.refs.len() > 4 && self.refs.first() == self.refs.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub member_type: MemberType,
    pub role_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Vec<Tag>,
}

impl Relation {
    pub fn way_members(&self) -> impl Iterator<Item = &Member> {
        self.members
            .iter()
            .filter(|m| m.member_type == MemberType::Way)
    }
}

/// Set of primitive kinds contained in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Contents(u8);

impl Contents {
    pub const NONE: Contents = Contents(0);
    pub const NODES: Contents = Contents(1);
    pub const WAYS: Contents = Contents(2);
    pub const RELATIONS: Contents = Contents(4);
    pub const ALL: Contents = Contents(7);

    pub fn intersects(self, other: Contents) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, other: Contents) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Contents {
    type Output = Contents;
    fn bitor(self, rhs: Contents) -> Contents {
        Contents(self.0 | rhs.0)
    }
}

impl BitOrAssign for Contents {
    fn bitor_assign(&mut self, rhs: Contents) {
        self.0 |= rhs.0;
    }
}

/// A decoded block of primitives sharing one stringtable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveBlock {
    pub stringtable: Vec<String>,
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
}

impl PrimitiveBlock {
    /// Creates an empty block. Index 0 of the stringtable is reserved for the
    /// empty string, as in pbf.
    pub fn new() -> Self {
        Self {
            stringtable: vec![String::new()],
            ..Default::default()
        }
    }

    pub fn contents(&self) -> Contents {
        let mut contents = Contents::NONE;
        if !self.nodes.is_empty() {
            contents |= Contents::NODES;
        }
        if !self.ways.is_empty() {
            contents |= Contents::WAYS;
        }
        if !self.relations.is_empty() {
            contents |= Contents::RELATIONS;
        }
        contents
    }

    pub fn string(&self, idx: u32) -> &str {
        self.stringtable
            .get(idx as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Returns the index of `s` in the stringtable, if present.
    pub fn find_string(&self, s: &str) -> Option<u32> {
        self.stringtable
            .iter()
            .position(|x| x == s)
            .map(|pos| pos as u32)
    }

    pub fn role(&self, member: &Member) -> &str {
        self.string(member.role_idx)
    }

    pub fn tags<'a>(&'a self, tags: &'a [Tag]) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        tags.iter().map(move |&(k, v)| (self.string(k), self.string(v)))
    }

    /// Inserts a string into the stringtable and returns its index.
    ///
    /// Linear in the size of the table; intended for building small blocks.
    pub fn intern(&mut self, s: &str) -> u32 {
        match self.find_string(s) {
            Some(idx) => idx,
            None => {
                self.stringtable.push(s.to_string());
                (self.stringtable.len() - 1) as u32
            }
        }
    }

    fn intern_tags(&mut self, tags: &[(&str, &str)]) -> Vec<Tag> {
        tags.iter()
            .map(|(k, v)| (self.intern(k), self.intern(v)))
            .collect()
    }

    pub fn add_node(&mut self, id: i64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> &mut Self {
        let tags = self.intern_tags(tags);
        self.nodes.push(Node { id, lat, lon, tags });
        self
    }

    pub fn add_way(&mut self, id: i64, refs: &[i64], tags: &[(&str, &str)]) -> &mut Self {
        let tags = self.intern_tags(tags);
        self.ways.push(Way {
            id,
            refs: refs.to_vec(),
            tags,
        });
        self
    }

    pub fn add_relation(
        &mut self,
        id: i64,
        members: &[(MemberType, i64, &str)],
        tags: &[(&str, &str)],
    ) -> &mut Self {
        let tags = self.intern_tags(tags);
        let members = members
            .iter()
            .map(|&(member_type, id, role)| Member {
                id,
                member_type,
                role_idx: self.intern(role),
            })
            .collect();
        self.relations.push(Relation { id, members, tags });
        self
    }
}

/// Reference to the primitive an area was assembled from.
///
/// Only valid for the duration of the result callback.
#[derive(Debug, Clone, Copy)]
pub enum Primitive<'a> {
    Way(&'a PrimitiveBlock, &'a Way),
    Relation(&'a PrimitiveBlock, &'a Relation),
}

impl<'a> Primitive<'a> {
    pub fn id(&self) -> i64 {
        match self {
            Primitive::Way(_, way) => way.id,
            Primitive::Relation(_, relation) => relation.id,
        }
    }

    pub fn member_type(&self) -> MemberType {
        match self {
            Primitive::Way(..) => MemberType::Way,
            Primitive::Relation(..) => MemberType::Relation,
        }
    }

    pub fn block(&self) -> &'a PrimitiveBlock {
        match self {
            Primitive::Way(block, _) | Primitive::Relation(block, _) => block,
        }
    }

    pub fn raw_tags(&self) -> &'a [Tag] {
        match self {
            Primitive::Way(_, way) => &way.tags,
            Primitive::Relation(_, relation) => &relation.tags,
        }
    }

    pub fn tags(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.block().tags(self.raw_tags())
    }

    pub fn tag(&self, key: &str) -> Option<&'a str> {
        self.tags().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_intern_and_lookup() {
        let mut block = PrimitiveBlock::new();
        block
            .add_way(1, &[1, 2, 3, 4, 1], &[("landuse", "forest"), ("name", "Wald")])
            .add_relation(
                2,
                &[(MemberType::Way, 1, "outer"), (MemberType::Node, 7, "label")],
                &[("type", "multipolygon"), ("landuse", "forest")],
            );

        assert_eq!(block.string(0), "");
        assert_eq!(block.find_string("landuse"), Some(1));
        assert_eq!(block.contents(), Contents::WAYS | Contents::RELATIONS);

        let way = Primitive::Way(&block, &block.ways[0]);
        assert_eq!(way.tag("name"), Some("Wald"));
        assert_eq!(way.tag("building"), None);

        let relation = &block.relations[0];
        let members: Vec<_> = relation.way_members().collect();
        assert_eq!(members.len(), 1);
        assert_eq!(block.role(members[0]), "outer");
        let relation = Primitive::Relation(&block, relation);
        assert_eq!(relation.tags().count(), 2);
        assert_eq!(relation.member_type(), MemberType::Relation);
    }

    #[test]
    fn test_closed_candidate() {
        let way = |refs: &[i64]| Way {
            id: 1,
            refs: refs.to_vec(),
            tags: Vec::new(),
        };
        assert!(way(&[1, 2, 3, 4, 1]).is_closed_candidate());
        // exactly 4 refs is closed, but not a candidate
        assert!(!way(&[1, 2, 3, 1]).is_closed_candidate());
        assert!(!way(&[1, 2, 3, 4, 5]).is_closed_candidate());
        assert!(!way(&[]).is_closed_candidate());
    }

    #[test]
    fn test_contents() {
        assert!(Contents::ALL.contains(Contents::NODES | Contents::WAYS));
        assert!(!Contents::WAYS.intersects(Contents::NODES | Contents::RELATIONS));
        assert!(Contents::NONE.contains(Contents::NONE));
    }
}
