//! Linking flow: phase computation and the orchestrator that drives it.

mod orchestrator;
mod phase;

pub use self::orchestrator::{LinkOrchestrator, LinkView, SafeLinkRequest};
pub use self::phase::{LinkAction, Phase, compute_phase};
