/*!
Progress tracking for long loops that can be checkpointed mid-way.
*/

use std::fmt;

use crate::codec::Precision;
use crate::inserter::{PersistState, StateInserter};
use crate::tag::{Tag, TagContext};
use crate::traverser::{required, RestoreState, StateTraverser};
use crate::Result;

const RANGE_TAG: Tag = Tag::new("a", "range");
const STEPS_TAG: Tag = Tag::new("b", "steps");
const STEP_PROGRESS_TAG: Tag = Tag::new("c", "step_progress");
const POS_TAG: Tag = Tag::new("d", "pos");
const LAST_PROGRESS_TAG: Tag = Tag::new("e", "last_progress");

pub(crate) const TAG_CONTEXT: TagContext = TagContext::new(
    "loop_progress",
    &[RANGE_TAG, STEPS_TAG, STEP_PROGRESS_TAG, POS_TAG, LAST_PROGRESS_TAG],
);

/// Receives the progress made since the previous report.
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Reports loop progress in a fixed number of coarse steps.
///
/// # Example
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use modelstate_core::state::LoopProgress;
///
/// let total = Arc::new(Mutex::new(0.0));
/// let sink = Arc::clone(&total);
/// let mut progress = LoopProgress::new(100)
///     .with_callback(Box::new(move |delta| *sink.lock().unwrap() += delta));
/// for _ in 0..100 {
///     progress.increment(1);
/// }
/// assert!((*total.lock().unwrap() - 1.0).abs() < 1e-9);
/// ```
pub struct LoopProgress {
    range: usize,
    steps: usize,
    step_progress: f64,
    pos: usize,
    last_progress: usize,
    record_progress: ProgressCallback,
}

impl LoopProgress {
    /// Default number of reports over the whole loop.
    pub const STEPS: usize = 32;

    /// Track a loop of `range` iterations reporting a total of 1.
    pub fn new(range: usize) -> Self {
        Self::with_scale(range, 1.0, Self::STEPS)
    }

    /// Track a loop of `range` iterations reporting a total of `scale` over
    /// at most `steps` reports.
    pub fn with_scale(range: usize, scale: f64, steps: usize) -> Self {
        let steps = steps.min(range).max(1);
        Self {
            range,
            steps,
            step_progress: scale / steps as f64,
            pos: 0,
            last_progress: 0,
            record_progress: Box::new(|_| {}),
        }
    }

    /// Attach a progress monitor.
    pub fn with_callback(mut self, record_progress: ProgressCallback) -> Self {
        self.record_progress = record_progress;
        self
    }

    /// Replace the progress monitor, e.g. after restoring.
    pub fn progress_callback(&mut self, record_progress: ProgressCallback) {
        self.record_progress = record_progress;
    }

    /// Advance by `i` iterations, reporting any completed steps.
    pub fn increment(&mut self, i: usize) {
        self.pos = self.pos.saturating_add(i);
        if self.range == 0 {
            return;
        }
        let completed = (self.steps as u128 * self.pos as u128 / self.range as u128)
            .min(self.steps as u128) as usize;
        if completed > self.last_progress {
            (self.record_progress)(self.step_progress * (completed - self.last_progress) as f64);
            self.last_progress = completed;
        }
    }

    /// Grow or shrink the loop range.
    pub fn increment_range(&mut self, delta: isize) {
        self.range = self.range.saturating_add_signed(delta);
    }

    /// Re-report the progress that was made before the state was saved.
    pub fn resume_restored(&self) {
        (self.record_progress)(self.step_progress * self.last_progress as f64);
    }

    pub fn range(&self) -> usize {
        self.range
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Fraction of the loop completed so far, in whole steps.
    pub fn fraction_complete(&self) -> f64 {
        self.last_progress as f64 / self.steps as f64
    }
}

impl Default for LoopProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for LoopProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopProgress")
            .field("range", &self.range)
            .field("steps", &self.steps)
            .field("step_progress", &self.step_progress)
            .field("pos", &self.pos)
            .field("last_progress", &self.last_progress)
            .finish_non_exhaustive()
    }
}

impl PartialEq for LoopProgress {
    fn eq(&self, other: &Self) -> bool {
        self.range == other.range
            && self.steps == other.steps
            && self.step_progress.to_bits() == other.step_progress.to_bits()
            && self.pos == other.pos
            && self.last_progress == other.last_progress
    }
}

impl PersistState for LoopProgress {
    fn accept_persist_inserter(&self, inserter: &mut StateInserter) {
        inserter.insert_value(RANGE_TAG, self.range);
        inserter.insert_value(STEPS_TAG, self.steps);
        inserter.insert_f64(STEP_PROGRESS_TAG, self.step_progress, Precision::Full);
        inserter.insert_value(POS_TAG, self.pos);
        inserter.insert_value(LAST_PROGRESS_TAG, self.last_progress);
    }
}

impl RestoreState for LoopProgress {
    fn accept_restore_traverser(traverser: &mut StateTraverser<'_>) -> Result<Self> {
        let mut range: Option<usize> = None;
        let mut steps: Option<usize> = None;
        let mut step_progress: Option<f64> = None;
        let mut pos = 0usize;
        let mut last_progress = 0usize;
        traverser.each_node(|traverser| {
            let name = traverser.name();
            if RANGE_TAG == name {
                range = Some(traverser.value_as()?);
            } else if STEPS_TAG == name {
                steps = Some(traverser.value_as()?);
            } else if STEP_PROGRESS_TAG == name {
                step_progress = Some(traverser.value_as()?);
            } else if POS_TAG == name {
                pos = traverser.value_as()?;
            } else if LAST_PROGRESS_TAG == name {
                last_progress = traverser.value_as()?;
            }
            Ok(())
        })?;
        Ok(Self {
            range: required(range, RANGE_TAG, "loop progress")?,
            steps: required(steps, STEPS_TAG, "loop progress")?,
            step_progress: required(step_progress, STEP_PROGRESS_TAG, "loop progress")?,
            pos,
            last_progress,
            record_progress: Box::new(|_| {}),
        })
    }
}
