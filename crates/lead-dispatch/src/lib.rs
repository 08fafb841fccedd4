//! Lead dispatch: fair, explainable allocation of inbound service leads to contractors.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
