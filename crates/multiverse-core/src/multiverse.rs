//! The bounded, ordered collection of universes.
//!
//! [`Multiverse`] owns every live [`Universe`] in slot order and never holds
//! more than its capacity. Structural operations (insert, reset, merge, and
//! the evolve-then-evict cycle) take `&mut self`; callers share one instance
//! through [`SharedMultiverse`], whose mutex is the single coarse lock that
//! serializes control requests against the tick driver.
//!
//! During [`Multiverse::evolve`] every universe is advanced in parallel on
//! the rayon pool. Universes own disjoint grids, so no synchronization is
//! needed between them; the call returns only after all of them finished.

use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::grid::Grid;
use crate::universe::{Evolution, Universe, UniverseView};

/// Default number of universe slots.
pub const DEFAULT_CAPACITY: usize = 24;

/// Number of universes placed side by side in one row of a merged grid.
pub const UNIVERSES_PER_ROW: usize = 4;

/// Colour given to the universe produced by [`Multiverse::merge`].
pub const MERGED_UNIVERSE_COLOUR: &str = "#F00";

/// A multiverse behind the coarse lock shared by the tick driver and the
/// control handlers.
pub type SharedMultiverse = Arc<Mutex<Multiverse>>;

/// Errors returned by structural operations on a [`Multiverse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MultiverseError {
    /// Every slot is occupied.
    #[error("multiverse is full ({capacity} universes)")]
    Full {
        /// The configured capacity.
        capacity: usize,
    },
}

/// Where a newly created universe is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// After the last occupied slot.
    #[default]
    Append,
    /// Before the first occupied slot.
    Prepend,
}

impl InsertMode {
    /// Map the `game.universe_prepend` config flag to a mode.
    pub const fn from_prepend(prepend: bool) -> Self {
        if prepend { Self::Prepend } else { Self::Append }
    }
}

/// Result of one evolve-and-evict cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvolveReport {
    /// Universes evolved this tick.
    pub evolved: usize,
    /// Universes that reached a fixed point this tick.
    pub became_static: usize,
    /// Static universes removed because they exceeded the stale TTL.
    pub evicted: usize,
}

/// Result of [`Multiverse::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Fewer than two universes were present; nothing changed.
    Skipped {
        /// Number of universes present.
        count: usize,
    },
    /// All universes were replaced by one tiled universe.
    Merged {
        /// Number of universes that were tiled together.
        sources: usize,
        /// Height of the merged grid.
        height: usize,
        /// Width of the merged grid.
        width: usize,
    },
}

/// Fixed-capacity ordered collection of universes.
#[derive(Debug, Clone)]
pub struct Multiverse {
    universes: Vec<Universe>,
    capacity: usize,
}

impl Multiverse {
    /// Create an empty multiverse with the given number of slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            universes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Wrap this multiverse in the shared lock.
    pub fn into_shared(self) -> SharedMultiverse {
        Arc::new(Mutex::new(self))
    }

    /// Maximum number of universes.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.universes.len()
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.universes.is_empty()
    }

    /// Whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.universes.len() >= self.capacity
    }

    /// Occupied universes in slot order.
    pub fn universes(&self) -> &[Universe] {
        &self.universes
    }

    /// Insert after the last occupied slot.
    pub fn append(&mut self, universe: Universe) -> Result<(), MultiverseError> {
        self.ensure_room()?;
        self.universes.push(universe);
        Ok(())
    }

    /// Insert before the first occupied slot, shifting the others right.
    pub fn prepend(&mut self, universe: Universe) -> Result<(), MultiverseError> {
        self.ensure_room()?;
        self.universes.insert(0, universe);
        Ok(())
    }

    /// Insert according to `mode`.
    pub fn insert(&mut self, universe: Universe, mode: InsertMode) -> Result<(), MultiverseError> {
        match mode {
            InsertMode::Append => self.append(universe),
            InsertMode::Prepend => self.prepend(universe),
        }
    }

    /// Drop every universe. Returns how many were removed.
    pub fn reset(&mut self) -> usize {
        let removed = self.universes.len();
        self.universes.clear();
        info!(removed, "Multiverse reset");
        removed
    }

    /// Evolve every universe once, then evict those static for at least `stale_ttl`.
    pub fn evolve(&mut self, stale_ttl: Duration) -> EvolveReport {
        self.evolve_at(Utc::now(), stale_ttl)
    }

    /// [`Multiverse::evolve`] with an explicit clock reading shared by every universe.
    pub fn evolve_at(&mut self, now: DateTime<Utc>, stale_ttl: Duration) -> EvolveReport {
        let became_static = self
            .universes
            .par_iter_mut()
            .map(|universe| universe.evolve_at(now))
            .filter(|outcome| *outcome == Evolution::BecameStatic)
            .count();

        let evolved = self.universes.len();
        self.universes.retain(|universe| {
            let stale = universe.is_stale(now, stale_ttl);
            if stale {
                info!(%universe, "Removing stale static universe");
            }
            !stale
        });
        let evicted = evolved.saturating_sub(self.universes.len());

        let report = EvolveReport {
            evolved,
            became_static,
            evicted,
        };
        debug!(?report, "Multiverse evolved");
        report
    }

    /// Replace all universes with a single universe tiling their cells.
    ///
    /// Tiles are laid out [`UNIVERSES_PER_ROW`] per row, left to right and
    /// top to bottom in slot order. Every tile is as large as the largest
    /// source grid and each source sits at its tile's top-left corner.
    pub fn merge(&mut self) -> MergeOutcome {
        let count = self.universes.len();
        if count <= 1 {
            warn!(count, "Merge needs at least two universes, skipping");
            return MergeOutcome::Skipped { count };
        }

        let tile_height = self
            .universes
            .iter()
            .map(|u| u.grid().height())
            .max()
            .unwrap_or(0);
        let tile_width = self
            .universes
            .iter()
            .map(|u| u.grid().width())
            .max()
            .unwrap_or(0);
        let tile_rows = count.div_ceil(UNIVERSES_PER_ROW);
        let height = tile_rows.saturating_mul(tile_height);
        let width = UNIVERSES_PER_ROW.saturating_mul(tile_width);

        let mut merged = match Grid::dead(height, width) {
            Ok(grid) => grid,
            Err(e) => {
                error!(error = %e, height, width, "Cannot allocate merged grid");
                return MergeOutcome::Skipped { count };
            }
        };

        for (index, universe) in self.universes.iter().enumerate() {
            let top = (index / UNIVERSES_PER_ROW).saturating_mul(tile_height);
            let left = (index % UNIVERSES_PER_ROW).saturating_mul(tile_width);
            merged.blit(universe.grid(), top, left);
        }

        info!(sources = count, height, width, "Merging universes");
        self.universes.clear();
        self.universes
            .push(Universe::new(merged, MERGED_UNIVERSE_COLOUR));

        MergeOutcome::Merged {
            sources: count,
            height,
            width,
        }
    }

    /// Public fields of every universe in slot order.
    pub fn to_serializable(&self) -> Vec<UniverseView<'_>> {
        self.universes.iter().map(Universe::view).collect()
    }

    /// Serialize [`Multiverse::to_serializable`] as a JSON array.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_serializable())
    }

    /// Text rendering of every grid, for trace output.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, universe) in self.universes.iter().enumerate() {
            // Writing to a String cannot fail.
            let _ = writeln!(out, "Universe #{index} ({universe}):");
            let _ = writeln!(out, "{}", universe.render());
        }
        out
    }

    fn ensure_room(&self) -> Result<(), MultiverseError> {
        if self.is_full() {
            return Err(MultiverseError::Full {
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for Multiverse {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Display for Multiverse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Multiverse with {}/{} universes",
            self.universes.len(),
            self.capacity
        )
    }
}
