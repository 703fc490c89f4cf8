//! Deterministic order-grid computation and backtest simulator for a
//! perpetual-futures grid trading engine.
//!
//! The crate is split into a pure numeric core (lattice rounding, position
//! algebra, grid construction, order-intent assembly) and a thin ambient
//! layer (configuration, errors, an exchange-adapter trait, a backtest
//! simulator that drives the core over historical ticks). Only the ambient
//! layer touches I/O; everything under [`lattice`], [`position`], and
//! [`grid`] is pure and synchronous.

pub mod backtest;
pub mod config;
pub mod error;
pub mod exchange;
pub mod grid;
pub mod lattice;
pub mod position;

pub use error::{GridError, Result};
