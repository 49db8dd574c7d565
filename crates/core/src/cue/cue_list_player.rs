use std::sync::Arc;

use parking_lot::Mutex;

use super::cue::{CueId, CueList};
use super::executor::CueExecutor;
use crate::error::EngineError;

/// Steps through a cue list, restarting the executor on every move.
///
/// The position only changes when the target cue was accepted by the executor.
pub struct CueListPlayer {
    executor: Arc<CueExecutor>,
    cue_list: CueList,
    current: Mutex<Option<usize>>,
}

impl CueListPlayer {
    pub fn new(executor: Arc<CueExecutor>, cue_list: CueList) -> Self {
        Self {
            executor,
            cue_list,
            current: Mutex::new(None),
        }
    }

    pub fn cue_list(&self) -> &CueList {
        &self.cue_list
    }

    /// Position of the last cue that was started, if any.
    pub fn current_index(&self) -> Option<usize> {
        *self.current.lock()
    }

    pub fn current(&self) -> Option<CueId> {
        self.current_index()
            .and_then(|index| self.cue_list.cue_ids.get(index).copied())
    }

    /// Run the next cue. The first call runs the first cue.
    pub async fn go(&self) -> Result<CueId, EngineError> {
        let next = self.current_index().map_or(0, |index| index + 1);
        self.go_to(next).await
    }

    /// Run the previous cue.
    pub async fn back(&self) -> Result<CueId, EngineError> {
        match self.current_index() {
            Some(index) if index > 0 => self.go_to(index - 1).await,
            _ => Err(EngineError::CueListBoundary(0)),
        }
    }

    pub async fn go_to(&self, index: usize) -> Result<CueId, EngineError> {
        let cue_id = *self
            .cue_list
            .cue_ids
            .get(index)
            .ok_or(EngineError::CueListBoundary(index))?;

        self.executor.stop_execution();
        self.executor.execute_cue(cue_id).await?;

        *self.current.lock() = Some(index);
        log::info!(
            "Cue list '{}' at position {} (cue {})",
            self.cue_list.name,
            index,
            cue_id
        );
        Ok(cue_id)
    }

    /// Stop whatever is running without moving the position.
    pub fn stop(&self) {
        self.executor.stop_execution();
    }
}
