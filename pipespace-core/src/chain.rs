//! Stage Chain
//!
//! Stage order is persisted without an index column: every stage stores the
//! ID of the stage before it, and the first stage stores [`HEAD`]. This module
//! turns a bag of stored stages back into their order, and assigns links so
//! that a caller-supplied order becomes the stored order.

use std::collections::HashMap;
use thiserror::Error;

use crate::domain::stage::PipelineStage;

/// Previous-stage reference of the first stage in a pipeline
pub const HEAD: i64 = 0;

/// Integrity violations of a stored stage chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("no stage starts the chain")]
    MissingHead,

    #[error("{0} stages claim to start the chain")]
    MultipleHeads(usize),

    #[error("stages {first} and {second} both follow stage {prev}")]
    AmbiguousPrevious { prev: i64, first: i64, second: i64 },

    #[error("{0} stage(s) are unreachable from the head of the chain")]
    Unreachable(usize),
}

/// Order stored stages by following previous-stage references from the head.
///
/// Stages that cannot be reached from the head are dropped. When two stages
/// claim the same predecessor, the one seen first wins and the other is
/// treated as unreachable.
pub fn linearize(stages: Vec<PipelineStage>) -> Vec<PipelineStage> {
    let total = stages.len();

    let mut followers: HashMap<i64, usize> = HashMap::with_capacity(total);
    for (idx, stage) in stages.iter().enumerate() {
        followers.entry(stage.prev_stage_id).or_insert(idx);
    }

    let mut slots: Vec<Option<PipelineStage>> = stages.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(total);
    let mut prev = HEAD;

    while ordered.len() < total {
        let Some(&idx) = followers.get(&prev) else {
            break;
        };
        let Some(stage) = slots[idx].take() else {
            break;
        };
        prev = stage.id;
        ordered.push(stage);
    }

    ordered
}

/// Cursor that links stages one after another as they are saved.
///
/// Stage IDs are only known once a new stage has been inserted, so linking
/// and advancing are separate steps:
///
/// ```
/// use pipespace_core::chain::Rechain;
/// use pipespace_core::domain::stage::{PipelineStage, TriggerMode};
///
/// let mut chain = Rechain::new();
/// let mut build = PipelineStage::new("build", TriggerMode::Auto, vec![]);
/// chain.link(&mut build);
/// build.id = 11; // assigned by the store
/// chain.advance(build.id);
///
/// let mut deploy = PipelineStage::new("deploy", TriggerMode::Manual, vec![]);
/// chain.link(&mut deploy);
/// assert_eq!(build.prev_stage_id, 0);
/// assert_eq!(deploy.prev_stage_id, 11);
/// ```
#[derive(Debug, Default)]
pub struct Rechain {
    prev: i64,
}

impl Rechain {
    pub fn new() -> Self {
        Self { prev: HEAD }
    }

    /// Point `stage` at the last stage passed to [`Rechain::advance`]
    pub fn link(&self, stage: &mut PipelineStage) {
        stage.prev_stage_id = self.prev;
    }

    pub fn advance(&mut self, stage_id: i64) {
        self.prev = stage_id;
    }
}

/// Relink stages that already carry IDs so that slice order becomes chain order
pub fn rechain(stages: &mut [PipelineStage]) {
    let mut chain = Rechain::new();
    for stage in stages.iter_mut() {
        chain.link(stage);
        chain.advance(stage.id);
    }
}

/// Check that stored stages form exactly one chain covering every stage
pub fn verify(stages: &[PipelineStage]) -> Result<(), ChainError> {
    if stages.is_empty() {
        return Ok(());
    }

    let heads = stages.iter().filter(|s| s.prev_stage_id == HEAD).count();
    match heads {
        0 => return Err(ChainError::MissingHead),
        1 => {}
        n => return Err(ChainError::MultipleHeads(n)),
    }

    let mut followers: HashMap<i64, i64> = HashMap::with_capacity(stages.len());
    for stage in stages {
        if let Some(first) = followers.insert(stage.prev_stage_id, stage.id) {
            return Err(ChainError::AmbiguousPrevious {
                prev: stage.prev_stage_id,
                first,
                second: stage.id,
            });
        }
    }

    let mut visited = 0;
    let mut prev = HEAD;
    while visited < stages.len() {
        let Some(&id) = followers.get(&prev) else {
            break;
        };
        visited += 1;
        prev = id;
    }

    if visited < stages.len() {
        return Err(ChainError::Unreachable(stages.len() - visited));
    }

    Ok(())
}
