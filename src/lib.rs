//! Extraction of closed areas from OpenStreetMap pbf files.
//!
//! Closed ways become polygons. Relations become polygons or multipolygons:
//! their member ways are stitched into closed outer and inner rings. Which
//! primitives are areas is selected by [`ExtractionTypes`] and an optional
//! additional [`TagFilter`].
//!
//! The input is scanned several times instead of holding all nodes in memory:
//! first the needed ids are discovered, then their data is fetched, and
//! finally the areas are assembled. See [`AreaExtractor`].

pub mod block;
pub mod context;
pub mod error;
pub mod extraction_types;
pub mod extractor;
pub mod filter;
pub mod geometry;
pub mod osmpbf;
pub mod parallel;
pub mod pass;
pub mod relation_stage;
pub mod resolver;
pub mod source;
pub mod stats;
pub mod way_stage;

pub use crate::block::{MemberType, Primitive, PrimitiveBlock};
pub use crate::error::Error;
pub use crate::extraction_types::ExtractionTypes;
pub use crate::extractor::{AreaExtractor, ExtractedArea, ExtractionRequest};
pub use crate::filter::TagFilter;
pub use crate::geometry::{Area, MultiPolygon, Point, Polygon};
pub use crate::osmpbf::PbfSource;
pub use crate::source::{BlockSource, MemorySource};
pub use crate::stats::ExtractionStats;
