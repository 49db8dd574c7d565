use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cuelight_devices::DeviceId;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{sleep_until, Instant};

use super::cue::{Cue, CueId, CueStep};
use super::task_registry::{TaskKey, TaskRegistry};
use super::transition::TransitionRunner;
use crate::error::EngineError;
use crate::show::ShowStore;
use crate::transport::DeviceTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub frame_interval: Duration,
    /// After the nominal end of a cue, keep reporting it as running until its
    /// step and transition tasks have actually finished.
    pub await_transitions_on_completion: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            await_transitions_on_completion: true,
        }
    }
}

/// Snapshot of the single process-wide execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStatus {
    pub is_running: bool,
    pub cue_id: Option<CueId>,
    /// `order` of the most recently started step.
    pub current_step: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub total_steps: usize,
}

impl ExecutionStatus {
    pub fn idle() -> Self {
        Self::default()
    }

    fn running(cue_id: CueId, total_steps: usize) -> Self {
        Self {
            is_running: true,
            cue_id: Some(cue_id),
            current_step: None,
            start_time: Some(Utc::now()),
            total_steps,
        }
    }
}

/// Absolute deadlines of a cue, resolved before anything is committed.
struct SchedulePlan {
    step_starts: Vec<Instant>,
    completes_at: Instant,
}

impl SchedulePlan {
    fn new(cue: &Cue, started: Instant) -> Result<Self, String> {
        let at = |offset: Duration| {
            started
                .checked_add(offset)
                .ok_or_else(|| format!("offset {:?} is out of range", offset))
        };

        let step_starts = cue
            .steps
            .iter()
            .map(|step| at(step.offset()))
            .collect::<Result<Vec<_>, _>>()?;
        let completes_at = at(cue.total_duration())?;

        Ok(Self {
            step_starts,
            completes_at,
        })
    }
}

struct ExecutionState {
    status: ExecutionStatus,
    epoch: u64,
}

/// Runs at most one cue at a time.
///
/// Every step start is scheduled eagerly at its offset; once a step fires, each
/// of its devices gets its own transition task. Starting a transition on a
/// device cancels whatever transition was driving it.
pub struct CueExecutor {
    store: Arc<dyn ShowStore>,
    runner: TransitionRunner,
    settings: ExecutorSettings,
    state: Mutex<ExecutionState>,
    tasks: TaskRegistry,
}

impl CueExecutor {
    pub fn new(
        store: Arc<dyn ShowStore>,
        transport: Arc<dyn DeviceTransport>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            store,
            runner: TransitionRunner::new(transport, settings.frame_interval),
            settings,
            state: Mutex::new(ExecutionState {
                status: ExecutionStatus::idle(),
                epoch: 0,
            }),
            tasks: TaskRegistry::new(),
        }
    }

    /// Start executing a cue in the background.
    ///
    /// Returns once every step is scheduled. Fails without side effects if a
    /// cue is already running, the cue doesn't exist or has no steps, or one of
    /// its deadlines can't be represented.
    pub async fn execute_cue(self: &Arc<Self>, cue_id: CueId) -> Result<(), EngineError> {
        if self.is_executing() {
            return Err(EngineError::AlreadyExecuting);
        }

        let cue = self
            .store
            .cue(cue_id)
            .await?
            .ok_or(EngineError::CueNotFound(cue_id))?;
        if cue.steps.is_empty() {
            return Err(EngineError::EmptyCue(cue_id));
        }

        let plan = SchedulePlan::new(&cue, Instant::now())
            .map_err(|reason| EngineError::InvalidCue { cue_id, reason })?;

        let epoch = {
            let mut state = self.state.lock();
            if state.status.is_running {
                return Err(EngineError::AlreadyExecuting);
            }
            let epoch = self.tasks.reset();
            state.epoch = epoch;
            state.status = ExecutionStatus::running(cue_id, cue.steps.len());
            epoch
        };

        log::info!(
            "Executing cue {} '{}' with {} step(s)",
            cue.id,
            cue.name,
            cue.steps.len()
        );
        self.schedule(cue, plan, epoch);
        Ok(())
    }

    fn schedule(self: &Arc<Self>, cue: Cue, plan: SchedulePlan, epoch: u64) {
        let cue_id = cue.id;

        for (index, (step, fire_at)) in cue.steps.into_iter().zip(plan.step_starts).enumerate() {
            log::debug!(
                "Scheduling step {} at +{:.3}s ({} device(s))",
                step.order,
                step.time_offset,
                step.device_ids.len()
            );

            let executor = Arc::clone(self);
            self.tasks.spawn(TaskKey::StepStart(index), epoch, async move {
                sleep_until(fire_at).await;
                executor.fire_step(step, epoch).await;
            });
        }

        let executor = Arc::clone(self);
        let completes_at = plan.completes_at;
        self.tasks.spawn(TaskKey::Completion, epoch, async move {
            sleep_until(completes_at).await;
            if executor.settings.await_transitions_on_completion {
                executor
                    .tasks
                    .wait_until_drained(TaskKey::Completion)
                    .await;
            }
            executor.finish(cue_id, epoch);
        });
    }

    async fn fire_step(&self, step: CueStep, epoch: u64) {
        {
            let mut state = self.state.lock();
            if state.epoch != epoch || !state.status.is_running {
                return;
            }
            state.status.current_step = Some(step.order);
        }

        log::info!(
            "Step {} fired on {} device(s)",
            step.order,
            step.device_ids.len()
        );

        let step = Arc::new(step);
        let mut devices = Vec::with_capacity(step.device_ids.len());
        let mut handles = Vec::with_capacity(step.device_ids.len());
        for &device_id in &step.device_ids {
            let runner = self.runner.clone();
            let task_step = Arc::clone(&step);
            let spawned = self.tasks.spawn(TaskKey::Transition(device_id), epoch, async move {
                runner.run(device_id, &task_step).await;
            });

            match spawned {
                Some(handle) => {
                    devices.push(device_id);
                    handles.push(handle);
                }
                // Execution was stopped while this step was firing.
                None => return,
            }
        }

        for (device_id, result) in devices.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => log::debug!(
                    "Step {} transition on device {} was cancelled",
                    step.order,
                    device_id
                ),
                Err(e) => log::error!(
                    "Step {} transition on device {} failed: {}",
                    step.order,
                    device_id,
                    e
                ),
            }
        }

        log::info!("Step {} completed", step.order);
    }

    fn finish(&self, cue_id: CueId, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch == epoch && state.status.is_running {
            state.status = ExecutionStatus::idle();
            log::info!("Cue {} completed", cue_id);
        }
    }

    /// Cancel every pending step, running transition and the completion
    /// deadline, then go idle. Devices keep whatever value they last received.
    pub fn stop_execution(&self) {
        let mut state = self.state.lock();
        let was_running = state.status.cue_id;
        state.epoch = self.tasks.reset();
        state.status = ExecutionStatus::idle();
        drop(state);

        if let Some(cue_id) = was_running {
            log::info!("Stopped execution of cue {}", cue_id);
        }
    }

    pub fn get_execution_status(&self) -> ExecutionStatus {
        self.state.lock().status.clone()
    }

    pub fn is_executing(&self) -> bool {
        self.state.lock().status.is_running
    }

    /// Devices currently being driven by a transition.
    pub fn active_transitions(&self) -> Vec<DeviceId> {
        self.tasks.active_transitions()
    }

    /// Number of scheduled or running tasks of any kind.
    pub fn outstanding_tasks(&self) -> usize {
        self.tasks.len()
    }
}
