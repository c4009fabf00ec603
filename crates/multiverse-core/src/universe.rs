//! A single Game-of-Life universe with stagnation detection.
//!
//! A [`Universe`] owns one [`Grid`] plus its evolution bookkeeping. Each call
//! to [`Universe::evolve`] advances the generation counter by one. Once an
//! evolution would leave the grid unchanged the universe is frozen: it is
//! marked static, the moment is recorded, and the grid is never recomputed
//! again. The fingerprint of the current grid is kept so the fixed-point
//! check compares two hashes instead of two grids.
//!
//! # State machine
//!
//! ```text
//! Active --(grid unchanged)--> Static --(static for >= ttl)--> evicted by the Multiverse
//! ```
//!
//! There is no transition back from `Static`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::Grid;

/// What a single call to [`Universe::evolve_at`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evolution {
    /// The grid moved to a new generation.
    Advanced,
    /// The grid reached a fixed point during this call and is now static.
    BecameStatic,
    /// The universe was already static; only the counter moved.
    Frozen,
}

/// Client-supplied description of a universe to create.
///
/// This is also the shape of each element of the broadcast payload.
#[derive(Debug, Clone, Deserialize)]
pub struct UniverseSeed {
    /// Initial cells.
    pub cells: Grid,
    /// Opaque display colour.
    pub colour: String,
}

/// Borrowed public view of a universe, serialized into the update stream.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UniverseView<'a> {
    /// Current cells.
    pub cells: &'a Grid,
    /// Display colour.
    pub colour: &'a str,
}

/// One independent cellular-automaton grid and its evolution state.
#[derive(Debug, Clone)]
pub struct Universe {
    grid: Grid,
    colour: String,
    generation: u64,
    alive_count: usize,
    static_since: Option<DateTime<Utc>>,
    fingerprint: blake3::Hash,
}

impl Universe {
    /// Create an active universe at generation 0.
    pub fn new(grid: Grid, colour: impl Into<String>) -> Self {
        let alive_count = grid.alive_count();
        let fingerprint = grid.fingerprint();
        Self {
            grid,
            colour: colour.into(),
            generation: 0,
            alive_count,
            static_since: None,
            fingerprint,
        }
    }

    /// Current cells.
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Display colour.
    pub fn colour(&self) -> &str {
        &self.colour
    }

    /// Number of completed evolutions.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Live cells as of the most recent evolution.
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Whether the universe has reached a fixed point.
    pub const fn is_static(&self) -> bool {
        self.static_since.is_some()
    }

    /// When the universe became static, if it has.
    pub const fn static_since(&self) -> Option<DateTime<Utc>> {
        self.static_since
    }

    /// Advance one generation, stamping a static transition with the current time.
    pub fn evolve(&mut self) -> Evolution {
        self.evolve_at(Utc::now())
    }

    /// Advance one generation, stamping a static transition with `now`.
    pub fn evolve_at(&mut self, now: DateTime<Utc>) -> Evolution {
        self.generation = self.generation.saturating_add(1);

        if self.is_static() {
            return Evolution::Frozen;
        }

        let next = self.grid.step();
        let fingerprint = next.fingerprint();
        if fingerprint == self.fingerprint {
            self.static_since = Some(now);
            return Evolution::BecameStatic;
        }

        self.alive_count = next.alive_count();
        self.grid = next;
        self.fingerprint = fingerprint;
        Evolution::Advanced
    }

    /// Whether the universe has been static for at least `ttl` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.static_since.is_some_and(|since| {
            // A clock step backwards reads as zero age.
            let age = now.signed_duration_since(since).to_std().unwrap_or_default();
            age >= ttl
        })
    }

    /// Public fields for serialization.
    pub fn view(&self) -> UniverseView<'_> {
        UniverseView {
            cells: &self.grid,
            colour: &self.colour,
        }
    }

    /// Text rendering of the grid for debug output.
    pub fn render(&self) -> String {
        self.grid.render()
    }
}

impl From<UniverseSeed> for Universe {
    fn from(seed: UniverseSeed) -> Self {
        Self::new(seed.cells, seed.colour)
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "colour: {} static: {} generation: {} alive: {}",
            self.colour,
            self.is_static(),
            self.generation,
            self.alive_count
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn blinker_horizontal() -> Grid {
        let mut grid = Grid::dead(5, 5).unwrap();
        for x in 1..=3 {
            grid.set(2, x, true);
        }
        grid
    }

    fn blinker_vertical() -> Grid {
        let mut grid = Grid::dead(5, 5).unwrap();
        for y in 1..=3 {
            grid.set(y, 2, true);
        }
        grid
    }

    fn block() -> Grid {
        let mut grid = Grid::dead(6, 6).unwrap();
        for (y, x) in [(2, 2), (2, 3), (3, 2), (3, 3)] {
            grid.set(y, x, true);
        }
        grid
    }

    #[test]
    fn new_universe_counts_live_cells() {
        let universe = Universe::new(blinker_horizontal(), "#0F0");
        assert_eq!(universe.alive_count(), 3);
        assert_eq!(universe.generation(), 0);
        assert!(!universe.is_static());
    }

    #[test]
    fn blinker_oscillates_without_going_static() {
        let mut universe = Universe::new(blinker_horizontal(), "#0F0");

        assert_eq!(universe.evolve(), Evolution::Advanced);
        assert_eq!(universe.grid(), &blinker_vertical());

        assert_eq!(universe.evolve(), Evolution::Advanced);
        assert_eq!(universe.grid(), &blinker_horizontal());

        for _ in 0..20 {
            assert_eq!(universe.evolve(), Evolution::Advanced);
        }
        assert!(!universe.is_static());
        assert_eq!(universe.generation(), 22);
        assert_eq!(universe.alive_count(), 3);
    }

    #[test]
    fn dead_grid_goes_static_after_one_evolution() {
        let mut universe = Universe::new(Grid::dead(5, 5).unwrap(), "#000");
        assert_eq!(universe.evolve(), Evolution::BecameStatic);
        assert!(universe.is_static());
        assert_eq!(universe.generation(), 1);
    }

    #[test]
    fn static_universe_keeps_grid_and_counts_generations() {
        let mut universe = Universe::new(block(), "#00F");
        assert_eq!(universe.evolve(), Evolution::BecameStatic);
        let frozen = universe.grid().clone();
        let since = universe.static_since();

        for _ in 0..5 {
            assert_eq!(universe.evolve(), Evolution::Frozen);
        }
        assert_eq!(universe.grid(), &frozen);
        assert_eq!(universe.static_since(), since);
        assert_eq!(universe.generation(), 6);
        assert_eq!(universe.alive_count(), 4);
    }

    #[test]
    fn pattern_that_settles_goes_static_the_tick_after() {
        // Three cells in an L become a block after one step.
        let mut grid = Grid::dead(6, 6).unwrap();
        for (y, x) in [(2, 2), (2, 3), (3, 2)] {
            grid.set(y, x, true);
        }
        let mut universe = Universe::new(grid, "#FFF");

        assert_eq!(universe.evolve(), Evolution::Advanced);
        assert_eq!(universe.grid(), &block());
        assert_eq!(universe.evolve(), Evolution::BecameStatic);
    }

    #[test]
    fn staleness_respects_ttl() {
        let now = Utc::now();
        let mut universe = Universe::new(Grid::dead(3, 3).unwrap(), "#000");
        assert!(!universe.is_stale(now, Duration::ZERO));

        universe.evolve_at(now);
        assert!(universe.is_stale(now, Duration::ZERO));
        assert!(!universe.is_stale(now, Duration::from_secs(5)));
        assert!(universe.is_stale(now + TimeDelta::seconds(5), Duration::from_secs(5)));
    }

    #[test]
    fn view_serializes_public_fields_only() {
        let universe = Universe::new(Grid::from_rows(vec![vec![true]]).unwrap(), "#ABC");
        let json = serde_json::to_value(universe.view()).unwrap();
        assert_eq!(json, serde_json::json!({"cells": [[true]], "colour": "#ABC"}));
    }

    #[test]
    fn seed_decodes_from_json() {
        let seed: UniverseSeed =
            serde_json::from_str(r##"{"cells":[[false,true]],"colour":"#123"}"##).unwrap();
        let universe = Universe::from(seed);
        assert_eq!(universe.colour(), "#123");
        assert_eq!(universe.alive_count(), 1);
    }

    #[test]
    fn display_summarises_state() {
        let universe = Universe::new(blinker_horizontal(), "#0F0");
        assert_eq!(
            universe.to_string(),
            "colour: #0F0 static: false generation: 0 alive: 3"
        );
    }
}
