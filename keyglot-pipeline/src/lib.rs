//! keyglot-pipeline: orchestration layer that drives the wrong-layout
//! detection and correction loop on top of `keyglot-core`'s language
//! primitives. A host backend feeds keystrokes and platform queries
//! in; `CorrectionPipeline` is the single entry point.

pub mod buffer;
pub mod config;
pub mod cycling;
pub mod history;
pub mod pipeline;
pub mod platform;
pub mod replace;
pub mod router;

pub use config::Configuration;
pub use cycling::{CyclingState, CyclingStateMachine, ResolvedCycle};
pub use history::{CorrectionEvent, CorrectionHistory};
pub use pipeline::{CorrectionPipeline, PipelineAction};
pub use router::{RouteOutcome, RouterContext, SkipReason, ValidationFailure};
