//! koe - chord extraction service.
//!
//! Downloads audio, transcribes it through a remote backend when one is
//! configured (classical signal analysis otherwise), and returns the chord
//! progression along with a multi-track MIDI file.

pub mod artifacts;
pub mod auth;
pub mod context;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod serve;
pub mod service;
pub mod telemetry;
pub mod transcriber;

pub use artifacts::{ArtifactId, ArtifactStore, FsArtifactStore};
pub use error::ApiError;
pub use serve::{router, AppState};
pub use service::{pipeline_config, ChordService};
