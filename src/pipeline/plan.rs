//! Stage plan of one pipeline run
//!
//! The plan is a directed graph of stage invocations. Every input artifact
//! names the stage that produced it, which gives the edges; the execution
//! order is a topological order of that graph. Stages switched off by the
//! configuration stay in the plan with a skip reason, so the run record
//! shows them.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use super::config::{PipelineRunConfig, Workflow};
use super::error::{PipelineError, PipelineResult};
use crate::stages::{StageId, StageInvocation};
use crate::storage::{ArtifactKind, ArtifactRef, ArtifactStore};

/// One stage of the plan
#[derive(Debug, Clone)]
pub struct StageNode {
    pub invocation: StageInvocation,
    /// Set when the configuration switches the stage off
    pub skip_reason: Option<String>,
}

impl StageNode {
    pub fn id(&self) -> StageId {
        self.invocation.id
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// Dependency graph of stage invocations
#[derive(Debug, Default)]
pub struct StagePlan {
    graph: DiGraph<StageNode, ArtifactKind>,
    index: HashMap<StageId, NodeIndex>,
}

impl StagePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage; edges are resolved by [`StagePlan::connect`]
    pub fn add(&mut self, node: StageNode) -> PipelineResult<NodeIndex> {
        let id = node.id();
        if self.index.contains_key(&id) {
            return Err(PipelineError::config(format!(
                "Stage '{id}' appears twice in the plan"
            )));
        }
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(idx)
    }

    /// Add an edge from each input's producer to its consumer
    pub fn connect(&mut self) -> PipelineResult<()> {
        self.graph.clear_edges();
        let mut edges = Vec::new();
        for consumer in self.graph.node_indices() {
            for input in &self.graph[consumer].invocation.inputs {
                let producer = self.index.get(&input.producer).ok_or_else(|| {
                    PipelineError::config(format!(
                        "Stage '{}' reads {:?} from '{}', which is not part of the plan",
                        self.graph[consumer].id(),
                        input.kind,
                        input.producer
                    ))
                })?;
                edges.push((*producer, consumer, input.kind));
            }
        }
        for (from, to, kind) in edges {
            self.graph.add_edge(from, to, kind);
        }
        Ok(())
    }

    pub fn get(&self, id: StageId) -> Option<&StageNode> {
        self.index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Stages in execution order.
    ///
    /// Kahn's algorithm; among ready stages the one added first runs first,
    /// so the order is stable across runs.
    pub fn order(&self) -> PipelineResult<Vec<&StageNode>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(idx)) = ready.pop() {
            let node = NodeIndex::new(idx);
            order.push(&self.graph[node]);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        if order.len() != self.len() {
            let blocked: Vec<&str> = self
                .graph
                .node_indices()
                .filter(|idx| in_degree[idx.index()] > 0)
                .map(|idx| self.graph[idx].id().name())
                .collect();
            return Err(PipelineError::config(format!(
                "Stage plan has a cycle through: {}",
                blocked.join(", ")
            )));
        }
        Ok(order)
    }

    /// Check every active stage's contract and that it only reads from
    /// active stages
    pub fn validate(&self) -> PipelineResult<()> {
        for node in self.graph.node_weights().filter(|n| !n.is_skipped()) {
            node.invocation.check_contract().map_err(|e| {
                PipelineError::config(format!("Stage '{}' {}", node.id(), e))
            })?;
            for input in &node.invocation.inputs {
                if self.get(input.producer).is_some_and(StageNode::is_skipped) {
                    return Err(PipelineError::config(format!(
                        "Stage '{}' reads {:?} from skipped stage '{}'",
                        node.id(),
                        input.kind,
                        input.producer
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the plan for a validated configuration
    pub fn build(config: &PipelineRunConfig, store: &ArtifactStore) -> PipelineResult<Self> {
        let mut builder = PlanBuilder {
            plan: Self::new(),
            config,
            store,
        };
        match config.workflow {
            Workflow::Untargeted => builder.untargeted()?,
            Workflow::Targeted => builder.targeted()?,
        }
        let mut plan = builder.plan;
        plan.connect()?;
        Ok(plan)
    }
}

struct PlanBuilder<'a> {
    plan: StagePlan,
    config: &'a PipelineRunConfig,
    store: &'a ArtifactStore,
}

impl PlanBuilder<'_> {
    fn art(&self, kind: ArtifactKind, producer: StageId) -> ArtifactRef {
        self.store.artifact(kind, producer)
    }

    fn stage(
        &mut self,
        id: StageId,
        inputs: Vec<ArtifactRef>,
        outputs: &[ArtifactKind],
        skip_reason: Option<&str>,
    ) -> PipelineResult<()> {
        let mut invocation =
            StageInvocation::new(id).with_config(self.config.stage_config(id));
        invocation.inputs = inputs;
        invocation.outputs = outputs.iter().map(|kind| self.art(*kind, id)).collect();
        self.plan.add(StageNode {
            invocation,
            skip_reason: skip_reason.map(str::to_string),
        })?;
        Ok(())
    }

    fn untargeted(&mut self) -> PipelineResult<()> {
        use ArtifactKind as A;
        use StageId as S;

        let adducts_off = (!self.config.adducts.enabled).then_some("adduct detection disabled");
        let requant = self.config.requantification.enabled;
        let requant_off = (!requant).then_some("re-quantification disabled");

        self.stage(S::Stage, vec![], &[A::RawRuns], None)?;
        self.stage(S::Detect, vec![self.art(A::RawRuns, S::Stage)], &[A::FeatureMaps], None)?;
        self.stage(
            S::AlignMaps,
            vec![self.art(A::FeatureMaps, S::Detect)],
            &[A::AlignedFeatureMaps, A::Transformations],
            None,
        )?;
        self.stage(
            S::AlignRuns,
            vec![
                self.art(A::RawRuns, S::Stage),
                self.art(A::Transformations, S::AlignMaps),
            ],
            &[A::AlignedRuns],
            None,
        )?;
        self.stage(
            S::Decharge,
            vec![self.art(A::AlignedFeatureMaps, S::AlignMaps)],
            &[A::DechargedMaps],
            adducts_off,
        )?;
        let maps = match adducts_off {
            None => self.art(A::DechargedMaps, S::Decharge),
            Some(_) => self.art(A::AlignedFeatureMaps, S::AlignMaps),
        };
        self.stage(
            S::MapIds,
            vec![self.art(A::AlignedRuns, S::AlignRuns), maps],
            &[A::IdMappedMaps],
            None,
        )?;
        self.stage(S::Link, vec![self.art(A::IdMappedMaps, S::MapIds)], &[A::Consensus], None)?;

        // Re-quantification branch
        self.stage(
            S::SplitConsensus,
            vec![self.art(A::Consensus, S::Link)],
            &[A::CompleteConsensus, A::MissingConsensus],
            requant_off,
        )?;
        self.stage(
            S::FilterComplete,
            vec![
                self.art(A::CompleteConsensus, S::SplitConsensus),
                self.art(A::IdMappedMaps, S::MapIds),
            ],
            &[A::CompleteFeatureMaps],
            requant_off,
        )?;
        self.stage(
            S::BuildTargets,
            vec![self.art(A::MissingConsensus, S::SplitConsensus)],
            &[A::TargetLibrary],
            requant_off,
        )?;
        self.stage(
            S::Requantify,
            vec![
                self.art(A::AlignedRuns, S::AlignRuns),
                self.art(A::TargetLibrary, S::BuildTargets),
            ],
            &[A::RequantifiedMaps],
            requant_off,
        )?;
        self.stage(
            S::MergeMaps,
            vec![
                self.art(A::CompleteFeatureMaps, S::FilterComplete),
                self.art(A::RequantifiedMaps, S::Requantify),
            ],
            &[A::MergedMaps],
            requant_off,
        )?;
        self.stage(
            S::RequantDecharge,
            vec![self.art(A::MergedMaps, S::MergeMaps)],
            &[A::RequantDechargedMaps],
            requant_off.or(adducts_off),
        )?;
        let merged = match adducts_off {
            None => self.art(A::RequantDechargedMaps, S::RequantDecharge),
            Some(_) => self.art(A::MergedMaps, S::MergeMaps),
        };
        self.stage(
            S::RequantMapIds,
            vec![self.art(A::AlignedRuns, S::AlignRuns), merged],
            &[A::RequantIdMappedMaps],
            requant_off,
        )?;
        self.stage(
            S::RequantLink,
            vec![self.art(A::RequantIdMappedMaps, S::RequantMapIds)],
            &[A::RequantifiedConsensus],
            requant_off,
        )?;

        let (final_maps, final_consensus) = if requant {
            (
                self.art(A::RequantIdMappedMaps, S::RequantMapIds),
                self.art(A::RequantifiedConsensus, S::RequantLink),
            )
        } else {
            (
                self.art(A::IdMappedMaps, S::MapIds),
                self.art(A::Consensus, S::Link),
            )
        };

        self.stage(
            S::ExportSirius,
            vec![self.art(A::AlignedRuns, S::AlignRuns), final_maps],
            &[A::SiriusExport],
            (!self.config.exports.sirius).then_some("SIRIUS export disabled"),
        )?;
        self.stage(
            S::ExportGnps,
            vec![final_consensus, self.art(A::AlignedRuns, S::AlignRuns)],
            &[A::GnpsExport],
            (!self.config.exports.gnps).then_some("GNPS export disabled"),
        )?;

        let mut tables_in = vec![self.art(A::Consensus, S::Link)];
        let mut tables_out = vec![A::FeatureMatrix];
        if requant {
            tables_in.push(self.art(A::RequantifiedConsensus, S::RequantLink));
            tables_in.push(self.art(A::RequantIdMappedMaps, S::RequantMapIds));
            tables_out.push(A::RequantifiedFeatureMatrix);
        }
        self.stage(S::AssembleTables, tables_in, &tables_out, None)?;
        self.stage(
            S::ExportMetadata,
            vec![self.art(A::RawRuns, S::Stage)],
            &[A::MetadataTable],
            None,
        )?;

        let final_matrix = if requant {
            A::RequantifiedFeatureMatrix
        } else {
            A::FeatureMatrix
        };
        self.stage(
            S::AnnotateMs1,
            vec![self.art(final_matrix, S::AssembleTables)],
            &[A::Ms1Annotations],
            (!self.config.annotation.enabled).then_some("MS1 annotation disabled"),
        )?;
        Ok(())
    }

    fn targeted(&mut self) -> PipelineResult<()> {
        use ArtifactKind as A;
        use StageId as S;

        self.stage(S::Stage, vec![], &[A::RawRuns, A::TargetLibrary], None)?;
        self.stage(
            S::TargetedExtract,
            vec![
                self.art(A::RawRuns, S::Stage),
                self.art(A::TargetLibrary, S::Stage),
            ],
            &[A::RequantifiedMaps],
            None,
        )?;
        self.stage(
            S::TargetedTables,
            vec![self.art(A::RequantifiedMaps, S::TargetedExtract)],
            &[
                A::RunTables,
                A::AucTables,
                A::AucCombinedTables,
                A::Summary,
                A::SummaryCombined,
            ],
            None,
        )?;
        self.stage(
            S::ExportMetadata,
            vec![self.art(A::RawRuns, S::Stage)],
            &[A::MetadataTable],
            None,
        )?;
        Ok(())
    }
}
