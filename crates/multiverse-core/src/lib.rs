//! Concurrent Game-of-Life engine for the multiverse server.
//!
//! This crate owns the simulation: independent toroidal universes, the
//! bounded multiverse that evolves them in parallel each tick, and the tick
//! driver that publishes the serialized state on a fixed schedule.
//!
//! # Modules
//!
//! - [`grid`] -- Toroidal boolean grid, the B3/S23 rule, and fingerprints.
//! - [`universe`] -- One grid with generation counting and stagnation
//!   detection.
//! - [`multiverse`] -- Fixed-capacity ordered collection with parallel
//!   evolution, stale eviction, and merging.
//! - [`config`] -- Configuration loading from `multiverse-config.yaml` with
//!   environment overrides.
//! - [`runner`] -- The non-reentrant tick driver and the [`TickCallback`]
//!   seam used to publish each tick.
//!
//! [`TickCallback`]: runner::TickCallback

pub mod config;
pub mod grid;
pub mod multiverse;
pub mod runner;
pub mod universe;

// Re-export primary types at crate root.
pub use config::MultiverseConfig;
pub use grid::{Grid, GridError};
pub use multiverse::{
    EvolveReport, InsertMode, MergeOutcome, Multiverse, MultiverseError, SharedMultiverse,
};
pub use runner::{TickCallback, TickDriver};
pub use universe::{Universe, UniverseSeed, UniverseView};
