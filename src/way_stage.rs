//! Extraction of closed ways.
//!
//! 1. Discovery: mark refs of all matching closed ways as needed nodes.
//! 2. Fetching the needed nodes.
//! 3. Build: resolve the refs of the matching ways and emit the polygons.

use crate::block::{Contents, Primitive, PrimitiveBlock};
use crate::context::ExtractionContext;
use crate::geometry::{Area, Polygon};
use crate::pass::{run_pass, NodeFetch, Pass, PassSettings, ScanWorker};
use crate::source::BlockSource;

use log::{info, trace, warn};

use std::io;

pub struct WayRefsDiscovery<'a> {
    ctx: &'a ExtractionContext,
}

impl<'a> WayRefsDiscovery<'a> {
    pub fn new(ctx: &'a ExtractionContext) -> Self {
        Self { ctx }
    }
}

impl Pass for WayRefsDiscovery<'_> {
    type Worker = ScanWorker;

    fn name(&self) -> &'static str {
        "discovering ways"
    }

    fn contents(&self) -> Contents {
        Contents::WAYS
    }

    fn create_worker(&self) -> ScanWorker {
        ScanWorker::new(self.ctx)
    }

    fn process(&self, worker: &mut ScanWorker, block: &PrimitiveBlock) {
        if !worker.filter.rebuild_cache(block) {
            return;
        }
        for way in &block.ways {
            if way.is_closed_candidate() && worker.filter.matches(&way.tags) {
                worker.ids.extend(way.refs.iter().copied());
                worker.stats.num_relevant_ways += 1;
            }
        }
        if !worker.ids.is_empty() {
            self.ctx.request_nodes(worker.ids.drain());
        }
        worker.flush_stats(self.ctx);
    }

    fn finish(&self, label: &str) {
        info!("{}: Found {} ways", label, self.ctx.stats().num_relevant_ways);
        info!("{}: Need to fetch {} nodes", label, self.ctx.nodes().len());
    }
}

/// Emits a polygon for every matching closed way.
///
/// Refs are resolved in order up to the first missing node; the resulting
/// ring might be partial.
pub struct WayBuild<'a, F> {
    ctx: &'a ExtractionContext,
    callback: &'a F,
}

impl<'a, F> WayBuild<'a, F> {
    pub fn new(ctx: &'a ExtractionContext, callback: &'a F) -> Self {
        Self { ctx, callback }
    }
}

impl<F> Pass for WayBuild<'_, F>
where
    F: Fn(Area, Primitive<'_>) + Sync,
{
    type Worker = ScanWorker;

    fn name(&self) -> &'static str {
        "assembling ways"
    }

    fn contents(&self) -> Contents {
        Contents::WAYS
    }

    fn create_worker(&self) -> ScanWorker {
        ScanWorker::new(self.ctx)
    }

    fn process(&self, worker: &mut ScanWorker, block: &PrimitiveBlock) {
        if !worker.filter.rebuild_cache(block) {
            return;
        }
        let nodes = self.ctx.nodes();
        for way in &block.ways {
            if !way.is_closed_candidate() || !worker.filter.matches(&way.tags) {
                continue;
            }

            let mut points = Vec::with_capacity(way.refs.len());
            for &id in &way.refs {
                match nodes.get(id) {
                    Some(point) => points.push(point),
                    None => {
                        if self.ctx.verbose() {
                            warn!("Way {}: missing node {}, ring is incomplete", way.id, id);
                        }
                        break;
                    }
                }
            }
            if points.is_empty() {
                trace!("Way {}: no nodes found", way.id);
                continue;
            }

            let area = Area::Polygon(Polygon::new(points));
            (self.callback)(area, Primitive::Way(block, way));
            worker.stats.num_assembled_ways += 1;
        }
        drop(nodes);
        worker.flush_stats(self.ctx);
    }
}

/// Runs the passes extracting closed ways.
pub fn run<F>(
    source: &dyn BlockSource,
    ctx: &ExtractionContext,
    callback: &F,
    settings: &PassSettings,
) -> io::Result<()>
where
    F: Fn(Area, Primitive<'_>) + Sync,
{
    run_pass(source, &WayRefsDiscovery::new(ctx), settings)?;
    run_pass(source, &NodeFetch::new(ctx), settings)?;
    run_pass(source, &WayBuild::new(ctx, callback), settings)
}
