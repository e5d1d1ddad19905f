// LogStitch - platform/mod.rs
//
// Platform layer: config directories, config.toml, input sources.
// Dependencies: core (decoding and option types), util.
// Must NOT depend on: app.

pub mod config;
pub mod fs;
