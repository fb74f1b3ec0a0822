//! Still Music
//!
//! Keeps a managed music player out of the way of other audio: pauses it
//! while another application plays and resumes it afterwards, unless the
//! user took over in between.

pub mod cli;
pub mod config;
pub mod detector;
pub mod engine;
pub mod paths;
pub mod player;
