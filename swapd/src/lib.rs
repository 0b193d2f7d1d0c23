//! Library half of the `swapd` binary, split out so integration tests can
//! drive the bundled in-memory capability implementations directly instead
//! of spawning the compiled daemon.

pub mod config;
pub mod inmemory;
pub mod run;
pub mod sig_down;
pub mod telemetry;
