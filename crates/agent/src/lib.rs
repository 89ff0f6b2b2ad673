pub mod runner;

pub use runner::{AgentOutcome, AgentRunner, TaskKind};
