//! Configuration loading tests.

use gridcore::config::{load_backtest_config, GridConfig, MarketParams, SideConfig};

fn side() -> SideConfig {
    SideConfig {
        grid_span: 0.5,
        wallet_exposure_limit: 1.0,
        max_n_entry_orders: 8,
        initial_qty_pct: 0.01,
        initial_eprice_ema_dist: 0.0,
        eprice_pprice_diff: 0.002,
        eprice_exp_base: 1.618,
        secondary_allocation: 0.0,
        secondary_pprice_diff: 0.25,
        min_markup: 0.005,
        markup_range: 0.02,
        n_close_orders: 5,
        auto_unstuck_wallet_exposure_threshold: 0.1,
        auto_unstuck_ema_dist: 0.0,
        ema_span_min: 60.0,
        ema_span_max: 120.0,
    }
}

#[test]
fn missing_config_file_and_no_env_overrides_fails_to_deserialize() {
    // No TOML file at this path and no GRIDCORE_* overrides either, so the
    // merged source has nothing to deserialize a BacktestConfig from.
    let result = load_backtest_config("tests/fixtures/does_not_exist.toml");
    assert!(result.is_err());
}

#[test]
fn grid_config_rejects_invalid_secondary_allocation() {
    let mut long = side();
    long.secondary_allocation = 1.0;
    let cfg = GridConfig { long, short: side(), do_long: true, do_short: false };
    assert!(cfg.validate().is_err());
}

#[test]
fn grid_config_accepts_well_formed_sides() {
    let cfg = GridConfig { long: side(), short: side(), do_long: true, do_short: true };
    assert!(cfg.validate().is_ok());
}

#[test]
fn market_params_round_trip_through_serde_json() {
    let market = MarketParams {
        symbol: "BTC/USDT:USDT".to_string(),
        price_step: 0.01,
        qty_step: 0.001,
        min_qty: 0.001,
        min_cost: 5.0,
        c_mult: 1.0,
        inverse: false,
    };
    let json = serde_json::to_string(&market).unwrap();
    let back: MarketParams = serde_json::from_str(&json).unwrap();
    assert_eq!(market, back);
}
