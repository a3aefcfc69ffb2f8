mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::GazelinkOrchestrator;
pub use types::{ComponentState, RunOptions, ShutdownReason, ShutdownTrigger};
