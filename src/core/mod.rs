// src/core/mod.rs

// The library half of the application: canonical models, the tool adapters,
// the job layer that runs them, and the policy and reporting functions that
// consume their results.

/// Canonical vulnerability model, scan configurations and job shapes.
pub mod models;

/// Caller-facing error type and the failure taxonomy.
pub mod error;

/// Tool adapters (TLS, HTTP headers, ZAP, Nuclei).
pub mod scanner;

/// Execution facility, dispatcher and status tracker.
pub mod jobs;

pub mod policy;
pub mod reporting;
