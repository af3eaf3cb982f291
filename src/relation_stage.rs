//! Extraction of relations.
//!
//! 1. Discovery: mark way members of matching relations as needed ways.
//! 2. Fetching the refs of the needed ways, marking them as needed nodes.
//! 3. Fetching the needed nodes.
//! 4. Build: stitch the member ways of each matching relation into rings
//!    and emit the resulting area.

use crate::block::{Contents, Member, Primitive, PrimitiveBlock, Relation};
use crate::context::ExtractionContext;
use crate::geometry::Area;
use crate::pass::{run_pass, NodeFetch, Pass, PassSettings, ScanWorker};
use crate::resolver::{multi_poly_from_ways, RawWay};
use crate::source::BlockSource;

use ahash::AHashSet;
use log::{debug, info, warn};

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Outer,
    Inner,
}

impl Role {
    /// Classifies the role of a relation member, `None` for roles not
    /// describing a ring.
    pub fn classify(role: &str) -> Option<Role> {
        match role {
            "" | "outer" | "exclave" | "Outer" | "outer:FIXME" => Some(Role::Outer),
            "inner" | "enclave" => Some(Role::Inner),
            _ => None,
        }
    }
}

pub struct RelationWaysDiscovery<'a> {
    ctx: &'a ExtractionContext,
}

impl<'a> RelationWaysDiscovery<'a> {
    pub fn new(ctx: &'a ExtractionContext) -> Self {
        Self { ctx }
    }
}

impl Pass for RelationWaysDiscovery<'_> {
    type Worker = ScanWorker;

    fn name(&self) -> &'static str {
        "discovering relations"
    }

    fn contents(&self) -> Contents {
        Contents::RELATIONS
    }

    fn create_worker(&self) -> ScanWorker {
        ScanWorker::new(self.ctx)
    }

    fn process(&self, worker: &mut ScanWorker, block: &PrimitiveBlock) {
        if !worker.filter.rebuild_cache(block) {
            return;
        }
        for relation in &block.relations {
            if worker.filter.matches(&relation.tags) {
                worker.ids.extend(relation.way_members().map(|m| m.id));
                worker.stats.num_relevant_relations += 1;
            }
        }
        if !worker.ids.is_empty() {
            self.ctx.request_ways(worker.ids.drain());
        }
        worker.flush_stats(self.ctx);
    }

    fn finish(&self, label: &str) {
        let stats = self.ctx.stats();
        info!("{}: Found {} relations", label, stats.num_relevant_relations);
        info!("{}: Need to fetch {} ways", label, self.ctx.ways().len());
    }
}

/// Fetches refs of the needed ways and marks them as needed nodes.
pub struct RelationWayRefsFetch<'a> {
    ctx: &'a ExtractionContext,
}

impl<'a> RelationWayRefsFetch<'a> {
    pub fn new(ctx: &'a ExtractionContext) -> Self {
        Self { ctx }
    }
}

#[derive(Default)]
pub struct WayRefsWorker {
    ways: Vec<(i64, RawWay)>,
    refs: AHashSet<i64>,
}

impl Pass for RelationWayRefsFetch<'_> {
    type Worker = WayRefsWorker;

    fn name(&self) -> &'static str {
        "fetching ways"
    }

    fn contents(&self) -> Contents {
        Contents::WAYS
    }

    fn create_worker(&self) -> WayRefsWorker {
        WayRefsWorker::default()
    }

    fn process(&self, worker: &mut WayRefsWorker, block: &PrimitiveBlock) {
        {
            let ways = self.ctx.ways();
            for way in &block.ways {
                if ways.is_needed(way.id) {
                    worker.ways.push((way.id, way.refs.clone()));
                    worker.refs.extend(way.refs.iter().copied());
                }
            }
        }
        if !worker.ways.is_empty() {
            self.ctx.store_ways(worker.ways.drain(..));
            self.ctx.request_nodes(worker.refs.drain());
        }
    }

    fn finish(&self, label: &str) {
        let ways = self.ctx.ways();
        info!("{}: Fetched {}/{} ways", label, ways.num_resolved(), ways.len());
        info!("{}: Need to fetch {} nodes", label, self.ctx.nodes().len());
    }
}

/// Emits an area for every matching relation with at least one closed
/// outer ring.
pub struct RelationBuild<'a, F> {
    ctx: &'a ExtractionContext,
    callback: &'a F,
}

impl<'a, F> RelationBuild<'a, F> {
    pub fn new(ctx: &'a ExtractionContext, callback: &'a F) -> Self {
        Self { ctx, callback }
    }
}

/// Member ways of a relation sorted by role.
#[derive(Debug, Default)]
struct Members {
    inner: Vec<RawWay>,
    outer: Vec<RawWay>,
    missing_ways: bool,
}

impl<F> RelationBuild<'_, F> {
    fn collect_members(&self, block: &PrimitiveBlock, relation: &Relation) -> Members {
        let ways = self.ctx.ways();
        let mut members = Members::default();
        for member in relation.way_members() {
            let refs = match ways.get(member.id) {
                Some(refs) => refs,
                None => {
                    members.missing_ways = true;
                    continue;
                }
            };
            if refs.is_empty() {
                debug!("Relation {}: way {} not found", relation.id, member.id);
                continue;
            }
            match Role::classify(block.role(member)) {
                Some(Role::Outer) => members.outer.push(refs.clone()),
                Some(Role::Inner) => members.inner.push(refs.clone()),
                None => self.unknown_role(block, relation, member),
            }
        }
        members
    }

    fn unknown_role(&self, block: &PrimitiveBlock, relation: &Relation, member: &Member) {
        if self.ctx.verbose() {
            warn!(
                "Relation {}: way {} has unknown role '{}'",
                relation.id,
                member.id,
                block.role(member)
            );
        }
    }
}

impl<F> Pass for RelationBuild<'_, F>
where
    F: Fn(Area, Primitive<'_>) + Sync,
{
    type Worker = ScanWorker;

    fn name(&self) -> &'static str {
        "assembling relations"
    }

    fn contents(&self) -> Contents {
        Contents::RELATIONS
    }

    fn create_worker(&self) -> ScanWorker {
        ScanWorker::new(self.ctx)
    }

    fn process(&self, worker: &mut ScanWorker, block: &PrimitiveBlock) {
        if !worker.filter.rebuild_cache(block) {
            return;
        }
        for relation in &block.relations {
            if !worker.filter.matches(&relation.tags) {
                continue;
            }

            let members = self.collect_members(block, relation);
            if members.outer.is_empty() {
                debug!("Relation {}: no outer ways", relation.id);
                continue;
            }

            let (rings, complete) = multi_poly_from_ways(&members.inner, &members.outer);
            if !complete && !members.missing_ways && self.ctx.verbose() {
                warn!("Relation {}: failed to close all rings", relation.id);
            }
            if rings.outer.is_empty() {
                continue;
            }

            let area = rings.to_area(&*self.ctx.nodes());
            (self.callback)(area, Primitive::Relation(block, relation));
            worker.stats.num_assembled_relations += 1;
        }
        worker.flush_stats(self.ctx);
    }
}

/// Runs the passes extracting relations.
pub fn run<F>(
    source: &dyn BlockSource,
    ctx: &ExtractionContext,
    callback: &F,
    settings: &PassSettings,
) -> io::Result<()>
where
    F: Fn(Area, Primitive<'_>) + Sync,
{
    run_pass(source, &RelationWaysDiscovery::new(ctx), settings)?;
    run_pass(source, &RelationWayRefsFetch::new(ctx), settings)?;
    run_pass(source, &NodeFetch::new(ctx), settings)?;
    run_pass(source, &RelationBuild::new(ctx, callback), settings)
}
