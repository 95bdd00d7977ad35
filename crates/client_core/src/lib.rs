use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::{
    domain::{ParameterSet, TaskId},
    protocol::{TaskResult, TaskStatusResponse},
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

pub mod config;
pub mod error;
pub mod history;
pub mod projection;
pub mod service;

pub use config::{load_settings, ClientSettings};
pub use error::{ConfigError, ServiceError};
pub use history::{History, HistoryEntry};
pub use projection::{parameter_panel, project, BoxDimensions, ParameterSlider};
pub use service::{GenerationService, HttpGenerationService};

pub const GENERIC_SUBMIT_FAILURE: &str = "Failed to submit task";
pub const GENERIC_TASK_FAILURE: &str = "Task failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Idle,
    Submitting,
    Processing,
    Completed,
    Failed,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Submitting => "submitting",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Error
        )
    }

    /// True while a request is outstanding; the submit control should be inert.
    pub fn is_busy(self) -> bool {
        matches!(self, TaskStatus::Submitting | TaskStatus::Processing)
    }
}

/// Lifecycle snapshot of the controller's current task.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Submitting {
        prompt: String,
    },
    Processing {
        task_id: TaskId,
        prompt: String,
    },
    Completed {
        task_id: TaskId,
        prompt: String,
        result: TaskResult,
    },
    Failed {
        task_id: TaskId,
        prompt: String,
        message: String,
    },
    /// Task creation itself failed; no task id was ever assigned.
    Error {
        prompt: String,
        message: String,
    },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Idle => TaskStatus::Idle,
            TaskState::Submitting { .. } => TaskStatus::Submitting,
            TaskState::Processing { .. } => TaskStatus::Processing,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Failed { .. } => TaskStatus::Failed,
            TaskState::Error { .. } => TaskStatus::Error,
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            TaskState::Processing { task_id, .. }
            | TaskState::Completed { task_id, .. }
            | TaskState::Failed { task_id, .. } => Some(task_id),
            TaskState::Idle | TaskState::Submitting { .. } | TaskState::Error { .. } => None,
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        match self {
            TaskState::Idle => None,
            TaskState::Submitting { prompt }
            | TaskState::Processing { prompt, .. }
            | TaskState::Completed { prompt, .. }
            | TaskState::Failed { prompt, .. }
            | TaskState::Error { prompt, .. } => Some(prompt),
        }
    }

    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            TaskState::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskState::Failed { message, .. } | TaskState::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Drives one generation task at a time through submission, polling and completion.
///
/// Every new submission supersedes the previous task: its poll loop is aborted
/// before the creation request goes out, and replies that belong to an older
/// submission are discarded. Dropping the controller aborts any active loop.
pub struct TaskController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    service: Arc<dyn GenerationService>,
    poll_interval: Duration,
    state: watch::Sender<TaskState>,
    control: Mutex<ControlState>,
}

struct ControlState {
    generation: u64,
    history: History,
    poller: Option<ActivePoll>,
}

struct ActivePoll {
    task_id: TaskId,
    handle: JoinHandle<()>,
}

enum Creation {
    Prompt,
    Regeneration,
}

impl TaskController {
    pub fn new(service: Arc<dyn GenerationService>, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(TaskState::Idle);
        Self {
            inner: Arc::new(ControllerInner {
                service,
                poll_interval,
                state,
                control: Mutex::new(ControlState {
                    generation: 0,
                    history: History::new(),
                    poller: None,
                }),
            }),
        }
    }

    pub fn from_settings(service: Arc<dyn GenerationService>, settings: &ClientSettings) -> Self {
        Self::new(service, settings.poll_interval)
    }

    pub fn current_state(&self) -> TaskState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.inner.state.subscribe()
    }

    pub fn history(&self) -> History {
        self.inner.lock_control().history.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .lock_control()
            .poller
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Starts a new task for `prompt`. Blank prompts are ignored.
    pub async fn submit(&self, prompt: &str) -> TaskState {
        if prompt.trim().is_empty() {
            debug!("task: ignoring blank prompt");
            return self.current_state();
        }

        let prompt = prompt.to_string();
        let generation = self.inner.begin(TaskState::Submitting {
            prompt: prompt.clone(),
        });
        info!(generation, "task: submitting prompt");

        let created = self.inner.service.create_task(&prompt).await;
        self.inner
            .accept_creation(generation, prompt, created, Creation::Prompt);
        self.current_state()
    }

    /// Asks the service to rebuild the completed model with edited parameters.
    ///
    /// Only valid once the current task has completed with a `model_id`; otherwise
    /// the state is left untouched. The new task keeps the original prompt.
    pub async fn regenerate(&self, parameters: ParameterSet) -> TaskState {
        let target = match &*self.inner.state.borrow() {
            TaskState::Completed { prompt, result, .. } => result
                .model_id
                .clone()
                .map(|model_id| (prompt.clone(), model_id)),
            _ => None,
        };
        let Some((prompt, model_id)) = target else {
            debug!("task: regenerate ignored; no completed model");
            return self.current_state();
        };

        let generation = self.inner.begin(TaskState::Submitting {
            prompt: prompt.clone(),
        });
        info!(generation, model_id = %model_id, "task: submitting regeneration");

        let created = self.inner.service.regenerate(&model_id, &parameters).await;
        self.inner
            .accept_creation(generation, prompt, created, Creation::Regeneration);
        self.current_state()
    }

    /// Cancels any active poll loop and discards replies still in flight.
    pub fn shutdown(&self) {
        let mut control = self.inner.lock_control();
        control.generation += 1;
        if let Some(active) = control.poller.take() {
            active.handle.abort();
            debug!(task_id = %active.task_id, "task: poll loop cancelled on shutdown");
        }
    }
}

impl Drop for TaskController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ControllerInner {
    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, state: TaskState) -> u64 {
        let mut control = self.lock_control();
        control.generation += 1;
        if let Some(active) = control.poller.take() {
            active.handle.abort();
            debug!(task_id = %active.task_id, "task: superseded poll loop cancelled");
        }
        self.state.send_replace(state);
        control.generation
    }

    fn accept_creation(
        self: &Arc<Self>,
        generation: u64,
        prompt: String,
        created: Result<TaskId, ServiceError>,
        kind: Creation,
    ) {
        let mut control = self.lock_control();
        if control.generation != generation {
            debug!(generation, "task: dropping superseded creation reply");
            return;
        }

        match created {
            Ok(task_id) => {
                if matches!(kind, Creation::Prompt) {
                    control.history.push(prompt.clone());
                }
                info!(task_id = %task_id, "task: processing");
                self.state.send_replace(TaskState::Processing {
                    task_id: task_id.clone(),
                    prompt,
                });
                let handle = tokio::spawn(poll_until_settled(
                    Arc::clone(self),
                    task_id.clone(),
                    generation,
                ));
                control.poller = Some(ActivePoll { task_id, handle });
            }
            Err(err) => {
                warn!(error = %err, "task: submission failed");
                self.state.send_replace(TaskState::Error {
                    prompt,
                    message: err.submission_message(),
                });
            }
        }
    }

    fn settle(&self, generation: u64, task_id: TaskId, outcome: TaskStatusResponse) {
        let mut control = self.lock_control();
        if control.generation != generation {
            return;
        }
        let prompt = self
            .state
            .borrow()
            .prompt()
            .map(str::to_string)
            .unwrap_or_default();
        let next = match outcome {
            TaskStatusResponse::Completed { result } => {
                info!(task_id = %task_id, parameters = result.parameters.len(), "task: completed");
                TaskState::Completed {
                    task_id,
                    prompt,
                    result,
                }
            }
            TaskStatusResponse::Failed { error } => {
                let message = error
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_TASK_FAILURE.to_string());
                warn!(task_id = %task_id, error = %message, "task: failed remotely");
                TaskState::Failed {
                    task_id,
                    prompt,
                    message,
                }
            }
            TaskStatusResponse::Processing => return,
        };
        control.poller = None;
        self.state.send_replace(next);
    }
}

/// Polls the task once per interval until the service reports a terminal status.
///
/// The first request goes out one full interval after the task is accepted. Each
/// request is awaited before the next tick, and ticks missed meanwhile collapse
/// into one, so at most one status request is ever in flight. Request failures
/// are logged and retried on the next tick with no ceiling.
async fn poll_until_settled(inner: Arc<ControllerInner>, task_id: TaskId, generation: u64) {
    let period = inner.poll_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match inner.service.task_status(&task_id).await {
            Ok(TaskStatusResponse::Processing) => {
                debug!(task_id = %task_id, "task: still processing");
            }
            Ok(outcome) => {
                inner.settle(generation, task_id, outcome);
                return;
            }
            Err(err) => {
                warn!(
                    task_id = %task_id,
                    error = %err,
                    "task: status poll failed; retrying next tick"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod service_tests;
