//! The supervision engine (SPEC_FULL.md §2-§5): the `Instance`/`ProgramGroup`
//! data model, the `Registry` that owns every group under one mutex, the
//! `Monitor`'s reconciliation tick, and the reload engine's diff/apply.

pub mod group;
pub mod instance;
pub mod monitor;
pub mod registry;
pub mod reload;
