// Recalls - Staging stages, recall ids and the per-channel recall graph
//
// A tick runs a staging program: an ordered list of stage sets. Each stage
// is dispatched by `match` to the matching `Recall` hook, for every node of
// the channel's recall graph (children before their parent).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EngineError, EngineResult};
use crate::graph::recycling::Recycling;
use crate::graph::scope::SoundScope;
use crate::pool::VectorBufferPool;

/// One named phase of DSP work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Reset,
    FeedInputQueue,
    Automate,
    RunInitPre,
    RunInitInter,
    RunInitPost,
    RunPre,
    RunInter,
    RunPost,
    DoFeedback,
    FeedOutputQueue,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::Reset,
        Stage::FeedInputQueue,
        Stage::Automate,
        Stage::RunInitPre,
        Stage::RunInitInter,
        Stage::RunInitPost,
        Stage::RunPre,
        Stage::RunInter,
        Stage::RunPost,
        Stage::DoFeedback,
        Stage::FeedOutputQueue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Reset => "reset",
            Stage::FeedInputQueue => "feed-input-queue",
            Stage::Automate => "automate",
            Stage::RunInitPre => "run-init-pre",
            Stage::RunInitInter => "run-init-inter",
            Stage::RunInitPost => "run-init-post",
            Stage::RunPre => "run-pre",
            Stage::RunInter => "run-inter",
            Stage::RunPost => "run-post",
            Stage::DoFeedback => "do-feedback",
            Stage::FeedOutputQueue => "feed-output-queue",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| EngineError::InvalidStagingProgram(format!("unknown stage '{}'", s)))
    }
}

/// Stages run together as one program entry, in `Stage::ALL` order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSet(u32);

impl StageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(stages: &[Stage]) -> Self {
        stages.iter().fold(Self::new(), |set, stage| set.with(*stage))
    }

    pub fn with(self, stage: Stage) -> Self {
        StageSet(self.0 | stage.bit())
    }

    pub fn contains(self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Stage> {
        Stage::ALL
            .into_iter()
            .filter(move |stage| self.contains(*stage))
    }
}

/// Ordered stage sets executed once per tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingProgram {
    sets: Vec<StageSet>,
}

impl StagingProgram {
    /// Reject empty programs and empty entries
    pub fn new(sets: Vec<StageSet>) -> EngineResult<Self> {
        if sets.is_empty() {
            return Err(EngineError::InvalidStagingProgram(
                "program has no entries".to_string(),
            ));
        }
        if let Some(position) = sets.iter().position(|set| set.is_empty()) {
            return Err(EngineError::InvalidStagingProgram(format!(
                "entry {} has no stages",
                position
            )));
        }

        Ok(Self { sets })
    }

    /// Parse `[["feed-input-queue", "run-pre"], ["run-inter"]]`-style names
    pub fn from_names<S: AsRef<str>>(entries: &[Vec<S>]) -> EngineResult<Self> {
        let mut sets = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut set = StageSet::new();
            for name in entry {
                set = set.with(name.as_ref().parse::<Stage>()?);
            }
            sets.push(set);
        }

        Self::new(sets)
    }

    pub fn to_names(&self) -> Vec<Vec<String>> {
        self.sets
            .iter()
            .map(|set| set.iter().map(|stage| stage.name().to_string()).collect())
            .collect()
    }

    pub fn sets(&self) -> &[StageSet] {
        &self.sets
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.sets.iter().any(|set| set.contains(stage))
    }
}

impl Default for StagingProgram {
    fn default() -> Self {
        Self {
            sets: vec![
                StageSet::of(&[Stage::FeedInputQueue, Stage::Automate, Stage::RunPre]),
                StageSet::of(&[Stage::RunInter]),
                StageSet::of(&[Stage::RunPost]),
            ],
        }
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Node of the recycling context tree
///
/// A stream's context is a root; every channel it plays through gets a child
/// context. Identity is by pointer.
#[derive(Debug)]
pub struct RecyclingContext {
    pub id: u64,
    parent: Option<Arc<RecyclingContext>>,
}

impl RecyclingContext {
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
        })
    }

    pub fn child(parent: &Arc<RecyclingContext>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent: Some(parent.clone()),
        })
    }

    pub fn parent(&self) -> Option<&Arc<RecyclingContext>> {
        self.parent.as_ref()
    }

    pub fn is_child_of(&self, parent: &Arc<RecyclingContext>) -> bool {
        self.parent.as_ref().is_some_and(|p| Arc::ptr_eq(p, parent))
    }
}

/// Binds a scope to a recycling context
#[derive(Debug, Clone)]
pub struct RecallId {
    pub scope: SoundScope,
    pub context: Arc<RecyclingContext>,
}

impl RecallId {
    pub fn new(scope: SoundScope, context: Arc<RecyclingContext>) -> Self {
        Self { scope, context }
    }

    pub fn same_context(&self, other: &RecallId) -> bool {
        Arc::ptr_eq(&self.context, &other.context)
    }
}

/// Everything a recall may touch while running one stage
pub struct StageContext<'a> {
    pub scope: SoundScope,
    pub recall_id: &'a RecallId,
    pub recyclings: &'a mut [Recycling],
    pub pool: &'a VectorBufferPool,
    pub buffer_size: usize,
}

/// A signal-processing operator of a channel
///
/// Every hook defaults to doing nothing.
pub trait Recall: Send {
    fn name(&self) -> &str;

    fn reset(&mut self, _ctx: &mut StageContext<'_>) {}
    fn feed_input_queue(&mut self, _ctx: &mut StageContext<'_>) {}
    fn automate(&mut self, _ctx: &mut StageContext<'_>) {}
    fn run_init_pre(&mut self, _ctx: &mut StageContext<'_>) {}
    fn run_init_inter(&mut self, _ctx: &mut StageContext<'_>) {}
    fn run_init_post(&mut self, _ctx: &mut StageContext<'_>) {}
    fn run_pre(&mut self, _ctx: &mut StageContext<'_>) {}
    fn run_inter(&mut self, _ctx: &mut StageContext<'_>) {}
    fn run_post(&mut self, _ctx: &mut StageContext<'_>) {}
    fn do_feedback(&mut self, _ctx: &mut StageContext<'_>) {}
    fn feed_output_queue(&mut self, _ctx: &mut StageContext<'_>) {}

    fn run_stage(&mut self, stage: Stage, ctx: &mut StageContext<'_>) {
        match stage {
            Stage::Reset => self.reset(ctx),
            Stage::FeedInputQueue => self.feed_input_queue(ctx),
            Stage::Automate => self.automate(ctx),
            Stage::RunInitPre => self.run_init_pre(ctx),
            Stage::RunInitInter => self.run_init_inter(ctx),
            Stage::RunInitPost => self.run_init_post(ctx),
            Stage::RunPre => self.run_pre(ctx),
            Stage::RunInter => self.run_inter(ctx),
            Stage::RunPost => self.run_post(ctx),
            Stage::DoFeedback => self.do_feedback(ctx),
            Stage::FeedOutputQueue => self.feed_output_queue(ctx),
        }
    }
}

pub struct RecallNode {
    recall: Box<dyn Recall>,
    children: Vec<RecallNode>,
}

impl RecallNode {
    pub fn new(recall: impl Recall + 'static) -> Self {
        Self {
            recall: Box::new(recall),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: RecallNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        self.recall.name()
    }

    fn run_stage(&mut self, stage: Stage, ctx: &mut StageContext<'_>) {
        for child in self.children.iter_mut() {
            child.run_stage(stage, ctx);
        }
        self.recall.run_stage(stage, ctx);
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(RecallNode::count).sum::<usize>()
    }
}

/// Recall tree of one channel
#[derive(Default)]
pub struct RecallGraph {
    roots: Vec<RecallNode>,
}

impl RecallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: RecallNode) {
        self.roots.push(node);
    }

    /// Depth-first, children before their parent, roots in insertion order
    pub fn run_stage(&mut self, stage: Stage, ctx: &mut StageContext<'_>) {
        for root in self.roots.iter_mut() {
            root.run_stage(stage, ctx);
        }
    }

    pub fn len(&self) -> usize {
        self.roots.iter().map(RecallNode::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
