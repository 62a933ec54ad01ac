//! Streaming generation pipeline: a controller drives one session at a
//! time from request to saved artifact, reconciling stream events into
//! a key-addressed unit grid and recovering silently from stream
//! faults.

pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod reconcile;
pub mod recovery;
pub mod rewards;
pub mod session;
pub mod transport;
pub mod wire;

pub use config::PipelineConfig;
pub use controller::{PipelineController, PipelineView};
pub use error::PipelineError;
pub use session::{GenerationSession, SessionStep};
