//! Layered application configuration: built-in defaults, an optional TOML
//! file, and environment overrides (prefix `GRIDCORE`), loading the
//! per-side grid configuration and market parameters the core needs.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// The 14-knob per-side configuration vector that drives grid shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideConfig {
    pub grid_span: f64,
    pub wallet_exposure_limit: f64,
    pub max_n_entry_orders: usize,
    pub initial_qty_pct: f64,
    pub initial_eprice_ema_dist: f64,
    pub eprice_pprice_diff: f64,
    pub eprice_exp_base: f64,
    pub secondary_allocation: f64,
    pub secondary_pprice_diff: f64,
    pub min_markup: f64,
    pub markup_range: f64,
    pub n_close_orders: usize,
    pub auto_unstuck_wallet_exposure_threshold: f64,
    pub auto_unstuck_ema_dist: f64,
    pub ema_span_min: f64,
    pub ema_span_max: f64,
}

impl SideConfig {
    /// Validates the semantic invariants the numeric core assumes hold.
    /// Called once after deserialization; violations are not recoverable.
    pub fn validate(&self) -> crate::Result<()> {
        if self.secondary_allocation >= 1.0 {
            return Err(GridError::InvalidConfig(
                "secondary_allocation cannot be >= 1.0".to_string(),
            ));
        }
        if self.max_n_entry_orders == 0 {
            return Err(GridError::InvalidConfig(
                "max_n_entry_orders must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Market metadata the core consumes: the subset of an exchange's
/// instrument reference data that actually feeds the lattice and cost
/// formulas, independent of any one exchange's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketParams {
    pub symbol: String,
    pub price_step: f64,
    pub qty_step: f64,
    pub min_qty: f64,
    pub min_cost: f64,
    pub c_mult: f64,
    pub inverse: bool,
}

/// Grid-engine configuration for both sides of a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub long: SideConfig,
    pub short: SideConfig,
    pub do_long: bool,
    pub do_short: bool,
}

impl GridConfig {
    pub fn validate(&self) -> crate::Result<()> {
        self.long.validate()?;
        self.short.validate()?;
        Ok(())
    }
}

/// Backtest-specific settings layered on top of [`GridConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub starting_balance: f64,
    pub maker_fee: f64,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub spot: bool,
    #[serde(default)]
    pub hedge_mode: bool,
    pub market: MarketParams,
    pub grid: GridConfig,
}

/// Loads [`BacktestConfig`] from built-in defaults, an optional TOML file
/// at `path`, and environment variables prefixed `GRIDCORE_` (e.g.
/// `GRIDCORE_STARTING_BALANCE=2000`), in that order of increasing
/// precedence.
///
/// # Errors
///
/// Returns [`GridError::Config`] if the file is malformed or the merged
/// configuration cannot deserialize into [`BacktestConfig`], or
/// [`GridError::InvalidConfig`] if it deserializes but violates a
/// semantic invariant (e.g. `secondary_allocation >= 1.0`).
pub fn load_backtest_config(path: &str) -> crate::Result<BacktestConfig> {
    let config = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::with_prefix("GRIDCORE").separator("__"))
        .build()?;
    let parsed: BacktestConfig = config.try_deserialize()?;
    parsed.grid.validate()?;
    Ok(parsed)
}
