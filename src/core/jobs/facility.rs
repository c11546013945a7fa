// src/core/jobs/facility.rs

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinError;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_error::SpanTrace;

use crate::config::WorkerSettings;
use crate::core::error::Result;
use crate::core::models::JobId;

/// What the facility knows about a task at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Started,
    Success(Value),
    Failure(FailureInfo),
}

/// The raw failure as the facility recorded it, before any coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureInfo {
    /// The task returned an error value of any shape.
    Returned(Value),
    Panicked { message: String, traceback: String },
    TimeLimitExceeded { limit_secs: u64 },
    /// The task ended without leaving a result behind.
    Lost(String),
}

/// Where submitted tasks run and where their results are kept.
#[async_trait]
pub trait ExecutionFacility: Send + Sync {
    /// Hands a task over and returns its id without waiting for it to run.
    async fn submit(&self, task_name: &str, args: Value) -> Result<JobId>;

    /// Current state of a task; `None` when the id is unknown or its result expired.
    async fn query(&self, job_id: &JobId) -> Option<TaskState>;
}

/// Executes one named task. `Err` carries the task's own failure payload.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task_name: &str, args: Value) -> std::result::Result<Value, Value>;
}

struct JobRecord {
    state: TaskState,
    finished_at: Option<Instant>,
}

impl JobRecord {
    fn is_expired(&self, retention: Duration) -> bool {
        self.finished_at.is_some_and(|at| at.elapsed() > retention)
    }
}

/// In-process facility on the tokio runtime.
#[derive(Clone)]
pub struct LocalExecutor {
    handler: Arc<dyn TaskHandler>,
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    semaphore: Arc<Semaphore>,
    time_limit: Option<Duration>,
    retention: Duration,
}

impl LocalExecutor {
    pub fn new(
        handler: Arc<dyn TaskHandler>,
        concurrency: usize,
        time_limit: Option<Duration>,
        retention: Duration,
    ) -> Self {
        Self {
            handler,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            time_limit,
            retention,
        }
    }

    pub fn from_settings(handler: Arc<dyn TaskHandler>, settings: &WorkerSettings) -> Self {
        Self::new(
            handler,
            settings.concurrency,
            settings.task_time_limit(),
            settings.result_retention(),
        )
    }

    async fn set_state(&self, job_id: &JobId, state: TaskState) {
        let terminal = matches!(state, TaskState::Success(_) | TaskState::Failure(_));
        let mut jobs = self.jobs.write().await;
        if let Some(record) = jobs.get_mut(job_id) {
            record.state = state;
            if terminal {
                record.finished_at = Some(Instant::now());
            }
        }
    }

    async fn run(self, job_id: JobId, task_name: String, args: Value) {
        let span = info_span!("task", job_id = %job_id, task = %task_name);
        async {
            let _permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Worker pool closed before the task could start.");
                    let lost = FailureInfo::Lost(format!("Worker pool closed: {}", e));
                    self.set_state(&job_id, TaskState::Failure(lost)).await;
                    return;
                }
            };

            self.set_state(&job_id, TaskState::Started).await;
            info!("Task started.");

            let handler = Arc::clone(&self.handler);
            let name = task_name.clone();
            let worker = tokio::spawn(
                async move { handler.handle(&name, args).await }.instrument(tracing::Span::current()),
            );
            let abort = worker.abort_handle();

            let state = match self.time_limit {
                Some(limit) => match tokio::time::timeout(limit, worker).await {
                    Ok(joined) => joined_state(joined),
                    Err(_) => {
                        abort.abort();
                        warn!(limit_secs = limit.as_secs(), "Task exceeded its time limit and was aborted.");
                        TaskState::Failure(FailureInfo::TimeLimitExceeded { limit_secs: limit.as_secs() })
                    }
                },
                None => joined_state(worker.await),
            };

            match &state {
                TaskState::Success(_) => info!("Task succeeded."),
                _ => info!("Task failed."),
            }
            self.set_state(&job_id, state).await;
        }
        .instrument(span)
        .await
    }
}

fn joined_state(joined: std::result::Result<std::result::Result<Value, Value>, JoinError>) -> TaskState {
    match joined {
        Ok(Ok(value)) => TaskState::Success(value),
        Ok(Err(payload)) => TaskState::Failure(FailureInfo::Returned(payload)),
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            let traceback = format!("task panicked: {}\n{}", message, SpanTrace::capture());
            error!(panic = %message, "Task panicked.");
            TaskState::Failure(FailureInfo::Panicked { message, traceback })
        }
        Err(e) => {
            warn!(error = %e, "Task was cancelled.");
            TaskState::Failure(FailureInfo::Lost(format!("Task was cancelled: {}", e)))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl ExecutionFacility for LocalExecutor {
    async fn submit(&self, task_name: &str, args: Value) -> Result<JobId> {
        let job_id = JobId::generate();
        {
            let mut jobs = self.jobs.write().await;
            let before = jobs.len();
            jobs.retain(|_, record| !record.is_expired(self.retention));
            if jobs.len() < before {
                debug!(dropped = before - jobs.len(), "Dropped expired task results.");
            }
            jobs.insert(
                job_id.clone(),
                JobRecord {
                    state: TaskState::Pending,
                    finished_at: None,
                },
            );
        }

        tokio::spawn(self.clone().run(job_id.clone(), task_name.to_string(), args));
        info!(job_id = %job_id, task = task_name, "Task submitted.");
        Ok(job_id)
    }

    async fn query(&self, job_id: &JobId) -> Option<TaskState> {
        let mut jobs = self.jobs.write().await;
        if jobs.get(job_id)?.is_expired(self.retention) {
            debug!(job_id = %job_id, "Task result expired.");
            jobs.remove(job_id);
            return None;
        }
        jobs.get(job_id).map(|record| record.state.clone())
    }
}
