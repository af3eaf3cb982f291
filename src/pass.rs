//! A pass is one full scan over the blocks of a source.
//!
//! Passes of an extraction run strictly one after another, each one a
//! barrier for the next. Within a pass, blocks are processed by a pool of
//! workers in no particular order. Every worker owns its state (filter copy,
//! local buffers) and merges its results into the shared context once per
//! block.

use crate::block::{Contents, PrimitiveBlock};
use crate::context::ExtractionContext;
use crate::filter::TagFilter;
use crate::geometry::Point;
use crate::parallel::parallel_process;
use crate::source::BlockSource;
use crate::stats::ExtractionStats;

use ahash::AHashSet;
use log::{debug, info};
use parking_lot::Mutex;
use pbr::ProgressBar;

use std::io;
use std::time::Instant;

pub trait Pass: Sync {
    /// State owned by one worker.
    type Worker;

    fn name(&self) -> &'static str;

    /// Blocks not containing any of these kinds are skipped.
    fn contents(&self) -> Contents;

    fn create_worker(&self) -> Self::Worker;

    fn process(&self, worker: &mut Self::Worker, block: &PrimitiveBlock);

    /// Called once after all blocks were processed. `label` prefixes the
    /// summary log lines.
    fn finish(&self, _label: &str) {}
}

/// How passes are run.
#[derive(Debug, Clone, Copy)]
pub struct PassSettings<'a> {
    /// Number of workers, 0 for one per core.
    pub num_threads: usize,
    /// Prefix of log and progress messages.
    pub label: &'a str,
    /// Whether to render a progress bar.
    pub progress: bool,
}

/// Runs `pass` over all relevant blocks of `source`.
///
/// Fails with the first error reading a block.
pub fn run_pass<P: Pass>(
    source: &dyn BlockSource,
    pass: &P,
    settings: &PassSettings,
) -> io::Result<()> {
    let blocks: Vec<usize> = (0..source.len())
        .filter(|&idx| source.contents(idx).intersects(pass.contents()))
        .collect();
    debug!(
        "{}: {} on {}/{} blocks",
        settings.label,
        pass.name(),
        blocks.len(),
        source.len()
    );

    let progress = if settings.progress {
        let mut pb = ProgressBar::new(blocks.len() as u64);
        pb.message(&format!("{}: {} ", settings.label, pass.name()));
        Some(Mutex::new(pb))
    } else {
        None
    };

    let start = Instant::now();
    parallel_process(
        settings.num_threads,
        blocks.into_iter(),
        || pass.create_worker(),
        |worker, idx| -> io::Result<()> {
            let block = source.read_block(idx)?;
            pass.process(worker, &block);
            if let Some(pb) = &progress {
                pb.lock().inc();
            }
            Ok(())
        },
    )?;

    if let Some(pb) = progress {
        pb.into_inner().finish();
    }
    debug!(
        "{}: {} done in {:.2}s",
        settings.label,
        pass.name(),
        start.elapsed().as_secs_f64()
    );
    pass.finish(settings.label);
    Ok(())
}

/// Worker state of passes matching primitives against the filter.
pub struct ScanWorker {
    pub filter: Box<dyn TagFilter>,
    /// Ids collected from the current block.
    pub ids: AHashSet<i64>,
    /// Counts of the current block.
    pub stats: ExtractionStats,
}

impl ScanWorker {
    pub fn new(ctx: &ExtractionContext) -> Self {
        Self {
            filter: ctx.filter(),
            ids: AHashSet::new(),
            stats: ExtractionStats::default(),
        }
    }

    /// Adds the counts of the current block to the context.
    pub fn flush_stats(&mut self, ctx: &ExtractionContext) {
        ctx.count(&std::mem::take(&mut self.stats));
    }
}

/// Fetches coordinates of all nodes marked as needed.
pub struct NodeFetch<'a> {
    ctx: &'a ExtractionContext,
}

impl<'a> NodeFetch<'a> {
    pub fn new(ctx: &'a ExtractionContext) -> Self {
        Self { ctx }
    }
}

impl Pass for NodeFetch<'_> {
    type Worker = Vec<(i64, Point)>;

    fn name(&self) -> &'static str {
        "fetching nodes"
    }

    fn contents(&self) -> Contents {
        Contents::NODES
    }

    fn create_worker(&self) -> Self::Worker {
        Vec::new()
    }

    fn process(&self, fetched: &mut Self::Worker, block: &PrimitiveBlock) {
        {
            let nodes = self.ctx.nodes();
            fetched.extend(
                block
                    .nodes
                    .iter()
                    .filter(|node| nodes.is_needed(node.id))
                    .map(|node| (node.id, Point::new(node.lat, node.lon))),
            );
        }
        if !fetched.is_empty() {
            self.ctx.store_nodes(fetched.drain(..));
        }
    }

    fn finish(&self, label: &str) {
        let nodes = self.ctx.nodes();
        info!("{}: Fetched {}/{} nodes", label, nodes.num_resolved(), nodes.len());
    }
}
