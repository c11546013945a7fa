// src/core/jobs/mod.rs

pub mod dispatcher;
pub mod facility;
pub mod tasks;
pub mod tracker;

use std::sync::Arc;

use crate::config::Settings;
use self::dispatcher::JobDispatcher;
use self::facility::{ExecutionFacility, LocalExecutor};
use self::tasks::ScanTaskHandler;
use self::tracker::JobTracker;

/// Dispatcher and tracker sharing one execution facility.
#[derive(Clone)]
pub struct ScanEngine {
    pub dispatcher: JobDispatcher,
    pub tracker: JobTracker,
}

impl ScanEngine {
    pub fn new(facility: Arc<dyn ExecutionFacility>) -> Self {
        Self {
            dispatcher: JobDispatcher::new(Arc::clone(&facility)),
            tracker: JobTracker::new(facility),
        }
    }

    /// An engine that runs scans on the current tokio runtime.
    pub fn local(settings: &Settings) -> Self {
        let handler = Arc::new(ScanTaskHandler::new(settings.scanner.clone()));
        Self::new(Arc::new(LocalExecutor::from_settings(handler, &settings.worker)))
    }
}
