// Channel - One line of an audio stream: recall graph, recyclings, pattern
//
// Lock order when more than one is needed: recall ids, recalls, recyclings.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::graph::recall::{
    RecallGraph, RecallId, RecallNode, RecyclingContext, StageContext, StageSet, StagingProgram,
};
use crate::graph::recycling::Recycling;
use crate::graph::scope::{ScopeMask, SoundScope};
use crate::pattern::PatternStore;
use crate::pool::VectorBufferPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSide {
    Input,
    Output,
}

pub struct Channel {
    /// Position in the stream (inputs first, then outputs)
    pub index: usize,
    pub side: ChannelSide,
    pub pad: usize,
    pub audio_channel: usize,
    super_threaded: AtomicBool,
    recall_ids: RwLock<Vec<RecallId>>,
    recalls: Mutex<RecallGraph>,
    recyclings: Mutex<Vec<Recycling>>,
    pattern: RwLock<PatternStore>,
}

impl Channel {
    pub fn new(
        index: usize,
        side: ChannelSide,
        pad: usize,
        audio_channel: usize,
        recycling_count: usize,
        buffer_size: usize,
    ) -> Self {
        let recyclings = (0..recycling_count)
            .map(|id| Recycling::new(id, buffer_size))
            .collect();

        Self {
            index,
            side,
            pad,
            audio_channel,
            super_threaded: AtomicBool::new(false),
            recall_ids: RwLock::new(Vec::new()),
            recalls: Mutex::new(RecallGraph::new()),
            recyclings: Mutex::new(recyclings),
            pattern: RwLock::new(PatternStore::new(pad)),
        }
    }

    pub fn is_super_threaded(&self) -> bool {
        self.super_threaded.load(Ordering::Acquire)
    }

    /// Delegate this channel to its own worker thread
    pub fn set_super_threaded(&self, super_threaded: bool) {
        self.super_threaded.store(super_threaded, Ordering::Release);
    }

    pub fn add_recall_id(&self, recall_id: RecallId) {
        self.recall_ids.write().push(recall_id);
    }

    /// Remove every recall id of a scope; returns how many were removed
    pub fn remove_recall_ids(&self, scope: SoundScope) -> usize {
        let mut ids = self.recall_ids.write();
        let before = ids.len();
        ids.retain(|id| id.scope != scope);
        before - ids.len()
    }

    /// Drop the signals of `scope` from every recycling
    pub fn clear_scope_signals(&self, scope: SoundScope) -> usize {
        self.recyclings
            .lock()
            .iter_mut()
            .map(|recycling| recycling.remove_scope(scope))
            .sum()
    }

    /// Whether anything is playing in `scope` on this channel
    pub fn check_scope(&self, scope: SoundScope) -> bool {
        self.recall_ids.read().iter().any(|id| id.scope == scope)
    }

    /// The recall id whose context is a child of `parent`
    pub fn child_recall_id(&self, parent: &Arc<RecyclingContext>) -> Option<RecallId> {
        self.recall_ids
            .read()
            .iter()
            .find(|id| id.context.is_child_of(parent))
            .cloned()
    }

    pub fn add_recall(&self, node: RecallNode) {
        self.recalls.lock().push(node);
    }

    pub fn recyclings(&self) -> MutexGuard<'_, Vec<Recycling>> {
        self.recyclings.lock()
    }

    pub fn pattern(&self) -> RwLockReadGuard<'_, PatternStore> {
        self.pattern.read()
    }

    pub fn pattern_mut(&self) -> RwLockWriteGuard<'_, PatternStore> {
        self.pattern.write()
    }

    /// Run one program entry for one scope
    ///
    /// Without a recall id for `scope` this is a no-op.
    pub fn run_stage_set(
        &self,
        scope: SoundScope,
        set: StageSet,
        pool: &VectorBufferPool,
        buffer_size: usize,
    ) {
        let ids = self.recall_ids.read();
        if !ids.iter().any(|id| id.scope == scope) {
            return;
        }

        let mut recalls = self.recalls.lock();
        let mut recyclings = self.recyclings.lock();

        for recall_id in ids.iter().filter(|id| id.scope == scope) {
            let mut ctx = StageContext {
                scope,
                recall_id,
                recyclings: recyclings.as_mut_slice(),
                pool,
                buffer_size,
            };

            for stage in set.iter() {
                recalls.run_stage(stage, &mut ctx);
            }
        }
    }

    /// Run the whole program for every scope of `scopes`
    pub fn run_program(
        &self,
        scopes: ScopeMask,
        program: &StagingProgram,
        pool: &VectorBufferPool,
        buffer_size: usize,
    ) {
        for scope in scopes.iter() {
            if !self.check_scope(scope) {
                continue;
            }

            for set in program.sets() {
                self.run_stage_set(scope, *set, pool, buffer_size);
            }
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("index", &self.index)
            .field("side", &self.side)
            .field("pad", &self.pad)
            .field("audio_channel", &self.audio_channel)
            .field("super_threaded", &self.is_super_threaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::recall::{Recall, Stage};
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        runs: Arc<AtomicUsize>,
    }

    impl Recall for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn run_inter(&mut self, ctx: &mut StageContext<'_>) {
            assert_eq!(ctx.recyclings.len(), 2);
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn channel_with_counter() -> (Channel, Arc<AtomicUsize>) {
        let channel = Channel::new(0, ChannelSide::Input, 0, 0, 2, 64);
        let runs = Arc::new(AtomicUsize::new(0));
        channel.add_recall(RecallNode::new(Counter { runs: runs.clone() }));
        (channel, runs)
    }

    #[test]
    fn test_missing_recall_id_is_skipped() {
        let (channel, runs) = channel_with_counter();
        let pool = VectorBufferPool::reserve_all(1, 64);

        channel.run_program(ScopeMask::active(None), &StagingProgram::default(), &pool, 64);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_runs_only_scopes_with_recall_ids() {
        let (channel, runs) = channel_with_counter();
        let pool = VectorBufferPool::reserve_all(1, 64);
        channel.add_recall_id(RecallId::new(SoundScope::Notation, RecyclingContext::root()));

        channel.run_program(ScopeMask::active(None), &StagingProgram::default(), &pool, 64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        channel.run_program(ScopeMask::active(Some(SoundScope::Wave)), &StagingProgram::default(), &pool, 64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        channel.run_stage_set(SoundScope::Notation, StageSet::of(&[Stage::RunPre]), &pool, 64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_child_recall_id_lookup() {
        let channel = Channel::new(0, ChannelSide::Input, 0, 0, 1, 64);
        let parent = RecyclingContext::root();
        let child = RecyclingContext::child(&parent);

        assert!(channel.child_recall_id(&parent).is_none());
        channel.add_recall_id(RecallId::new(SoundScope::Sequencer, parent.clone()));
        assert!(channel.child_recall_id(&parent).is_none());

        channel.add_recall_id(RecallId::new(SoundScope::Sequencer, child.clone()));
        let found = channel.child_recall_id(&parent).unwrap();
        assert!(Arc::ptr_eq(&found.context, &child));

        assert_eq!(channel.remove_recall_ids(SoundScope::Sequencer), 2);
        assert!(!channel.check_scope(SoundScope::Sequencer));
    }
}
