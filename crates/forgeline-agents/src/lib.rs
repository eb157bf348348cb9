//! The `Agent` contract and the five concrete pipeline agents
//! (architecture, code, test, quality, build).

mod agent;
mod architecture;
mod build;
mod code;
mod context;
mod quality;
mod test_agent;

pub use agent::{Agent, AgentInput, ModuleCode, ModuleTest};
pub use architecture::ArchitectureAgent;
pub use build::BuildAgent;
pub use code::CodeAgent;
pub use context::{AgentOutcome, RunContext};
pub use quality::QualityAgent;
pub use test_agent::TestAgent;
