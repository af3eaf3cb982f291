use crate::block::{MemberType, Primitive};
use crate::context::{Config, ExtractionContext};
use crate::error::Error;
use crate::extraction_types::ExtractionTypes;
use crate::filter::TagFilter;
use crate::geometry::Area;
use crate::osmpbf::PbfSource;
use crate::pass::PassSettings;
use crate::source::BlockSource;
use crate::stats::ExtractionStats;
use crate::{relation_stage, way_stage};

use log::info;
use parking_lot::Mutex;

use std::path::Path;
use std::time::Instant;

/// What to extract.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub types: ExtractionTypes,
    /// Additional filter, combined with the filter of `types` by AND.
    pub filter: Option<Box<dyn TagFilter>>,
    /// Number of workers per pass, 0 for one per core.
    pub num_threads: usize,
    /// Prefix of log and progress messages.
    pub label: String,
}

impl Default for ExtractionRequest {
    fn default() -> Self {
        Self {
            types: ExtractionTypes::ALL_SPECIAL_BUT_BUILDINGS,
            filter: None,
            num_threads: 0,
            label: "AreaExtractor".to_string(),
        }
    }
}

impl ExtractionRequest {
    pub fn new(types: ExtractionTypes) -> Self {
        Self {
            types,
            ..Default::default()
        }
    }

    pub fn filter<T: TagFilter + 'static>(mut self, filter: T) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = label.into();
        self
    }
}

/// An area together with the primitive it was assembled from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArea {
    /// `Way` or `Relation`
    pub member_type: MemberType,
    pub id: i64,
    pub tags: Vec<(String, String)>,
    pub area: Area,
}

impl ExtractedArea {
    fn new(area: Area, primitive: Primitive) -> Self {
        Self {
            member_type: primitive.member_type(),
            id: primitive.id(),
            tags: primitive
                .tags()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            area,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Extracts closed ways and relations as areas.
///
/// Each extraction scans the source several times. Closed ways need three
/// passes (discovering ways, fetching their nodes, assembling), relations
/// four (discovering relations, fetching their ways, fetching the nodes of
/// these ways, assembling). Only the nodes and ways needed for the requested
/// areas are held in memory.
///
/// ```no_run
/// use osmareas::{AreaExtractor, ExtractionRequest, ExtractionTypes};
///
/// let extractor = AreaExtractor::new().verbose(true);
/// let request = ExtractionRequest::new(ExtractionTypes::ALL_MULTIPOLYGONS);
/// let stats = extractor
///     .extract_file("berlin.osm.pbf", request, |area, primitive| {
///         println!("{} {:?}", primitive.id(), area.boundary());
///     })
///     .unwrap();
/// println!("{}", stats);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaExtractor {
    verbose: bool,
    snap_geometry: bool,
    progress: bool,
}

impl AreaExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log primitives which could not be assembled completely.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Snap coordinates to the 32 bit coordinate grid.
    pub fn snap_geometry(mut self, snap_geometry: bool) -> Self {
        self.snap_geometry = snap_geometry;
        self
    }

    /// Render a progress bar for every pass.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Extracts areas from `source`, calling `callback` for each of them.
    ///
    /// The callback is called concurrently from the workers in no particular
    /// order.
    pub fn extract<S, F>(
        &self,
        source: &S,
        request: ExtractionRequest,
        callback: F,
    ) -> Result<ExtractionStats, Error>
    where
        S: BlockSource,
        F: Fn(Area, Primitive<'_>) + Sync,
    {
        let types = request.types;
        let config = Config {
            types,
            verbose: self.verbose,
            snap_geometry: self.snap_geometry,
        };
        let ctx = ExtractionContext::new(config, request.filter)?;
        let settings = PassSettings {
            num_threads: request.num_threads,
            label: &request.label,
            progress: self.progress,
        };
        info!(
            "{}: Extracting {} from {} blocks",
            request.label,
            types,
            source.len()
        );

        let start = Instant::now();
        if types.contains(ExtractionTypes::WAYS) {
            way_stage::run(source, &ctx, &callback, &settings)?;
            ctx.clear_nodes();
        }
        if types.contains(ExtractionTypes::RELATIONS) {
            relation_stage::run(source, &ctx, &callback, &settings)?;
            ctx.clear_nodes();
            ctx.clear_ways();
        }

        let stats = ctx.stats();
        info!(
            "{}: Assembled {}/{} ways and {}/{} relations in {:.2}s",
            request.label,
            stats.num_assembled_ways,
            stats.num_relevant_ways,
            stats.num_assembled_relations,
            stats.num_relevant_relations,
            start.elapsed().as_secs_f64()
        );
        Ok(stats)
    }

    /// Extracts areas from the pbf file at `path`.
    pub fn extract_file<P, F>(
        &self,
        path: P,
        request: ExtractionRequest,
        callback: F,
    ) -> Result<ExtractionStats, Error>
    where
        P: AsRef<Path>,
        F: Fn(Area, Primitive<'_>) + Sync,
    {
        info!("Building index of PBF blocks...");
        let source = PbfSource::open(path)?;
        info!("PBF block index built: {} data blocks", source.len());
        self.extract(&source, request, callback)
    }

    /// Extracts areas from `source` into a vector, ordered by primitive kind
    /// (ways first) and id.
    pub fn collect<S: BlockSource>(
        &self,
        source: &S,
        request: ExtractionRequest,
    ) -> Result<(Vec<ExtractedArea>, ExtractionStats), Error> {
        let areas = Mutex::new(Vec::new());
        let stats = self.extract(source, request, |area, primitive| {
            let extracted = ExtractedArea::new(area, primitive);
            areas.lock().push(extracted);
        })?;

        let mut areas = areas.into_inner();
        areas.sort_by_key(|a| (a.member_type == MemberType::Relation, a.id));
        Ok((areas, stats))
    }
}
