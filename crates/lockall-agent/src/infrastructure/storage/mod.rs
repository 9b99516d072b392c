//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the agent's TOML file from the platform
//! config directory, falls back to defaults on first run, and converts the
//! on-disk schema into the typed settings the rest of the agent consumes.

pub mod config;
