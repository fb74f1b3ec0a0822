//! Coordination engine
//!
//! Pauses the managed player while another application plays audio and
//! resumes it afterwards, but only if the engine paused it and the user
//! hasn't taken over in between. Driven by detector signals plus a periodic
//! poll of the player; see [`EngineHandle`] for the public surface.

mod actor;
mod commands;
mod handle;
mod ownership;
mod timer;
mod types;


pub use handle::EngineHandle;
pub use types::{
    EngineSettings, EngineSnapshot, EngineState, PlaybackSignal, PlaybackSituation,
    PlayerObservation, StateChange, Strategy,
};
