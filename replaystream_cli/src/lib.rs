//! replaystream command line interface
//!
//! Exposes the command implementations and configuration loading so they can
//! be tested without spawning the binary.

pub mod commands;
pub mod config;
