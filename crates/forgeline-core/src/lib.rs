//! Shared error taxonomy and data model for the Forgeline firmware
//! generation pipeline: the types every other `forgeline-*` crate builds
//! on.

mod artifact;
mod error;
mod run;
mod spec;
mod types;

pub use artifact::{ArtifactListing, ArtifactMetadata};
pub use error::{ForgeError, ForgeResult};
pub use run::{stage_weight, RunDescriptor, RunState};
pub use spec::{ModuleSpec, RunOptions, Specification};
pub use types::{
    ArtifactFormat, ArtifactType, ModelProvider, ModuleKind, OptimizationGoal, Priority,
    RunStatus, Severity,
};
