// LogStitch - core/mod.rs
//
// Core business logic layer: capture groups, profiles, template compilation,
// timestamp assembly, decoding, parsing and export.
// Must NOT depend on: app, platform, or the filesystem directly.

pub mod capture;
pub mod decode;
pub mod export;
pub mod model;
pub mod parser;
pub mod pattern;
pub mod profile;
pub mod temporal;
