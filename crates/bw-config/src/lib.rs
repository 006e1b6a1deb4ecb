//! Typed configuration for Bulwark.
//!
//! This crate replaces ad-hoc nested-dict configuration with explicit,
//! validated structs:
//! - [`HardeningConfig`] with named sections (preflight gate policy,
//!   dependency lists, rollback settings, script locations)
//! - Deterministic resolution (CLI > env > local file > XDG > defaults)
//! - Unknown keys rejected at load time, not at first access

pub mod policy;
pub mod resolve;

pub use policy::{
    Dependencies, GatePolicy, HardeningConfig, RollbackSettings, ScriptSettings,
};
pub use resolve::{ConfigResolution, ConfigResolver, ConfigSource};
