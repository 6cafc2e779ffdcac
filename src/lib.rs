//! Driver onboarding orchestration core.
//!
//! Fans a driver's application out to background-check, insurance, payment
//! and storage providers, aggregates the outcomes into one status, persists
//! each run and supports retrying individual steps.

pub mod config;
pub mod error;
pub mod providers;
pub mod routes;
pub mod store;
pub mod subject;
pub mod workflow;
