//! End-to-end backtest exercise: builds a config and a synthetic tick
//! stream, drives `run_backtest`, and checks the invariants a caller
//! outside the crate would actually rely on.

use gridcore::backtest::{run_backtest, Tick};
use gridcore::config::{BacktestConfig, GridConfig, MarketParams, SideConfig};

fn market() -> MarketParams {
    MarketParams {
        symbol: "BTC/USDT:USDT".to_string(),
        price_step: 0.01,
        qty_step: 0.001,
        min_qty: 0.001,
        min_cost: 5.0,
        c_mult: 1.0,
        inverse: false,
    }
}

fn side() -> SideConfig {
    SideConfig {
        grid_span: 0.4,
        wallet_exposure_limit: 1.0,
        max_n_entry_orders: 6,
        initial_qty_pct: 0.02,
        initial_eprice_ema_dist: 0.0,
        eprice_pprice_diff: 0.002,
        eprice_exp_base: 1.618,
        secondary_allocation: 0.0,
        secondary_pprice_diff: 0.25,
        min_markup: 0.005,
        markup_range: 0.02,
        n_close_orders: 4,
        auto_unstuck_wallet_exposure_threshold: 0.1,
        auto_unstuck_ema_dist: 0.0,
        ema_span_min: 1.0,
        ema_span_max: 3.0,
    }
}

fn config(do_long: bool, do_short: bool) -> BacktestConfig {
    BacktestConfig {
        starting_balance: 1000.0,
        maker_fee: -0.0002,
        latency_ms: 100,
        spot: false,
        hedge_mode: false,
        market: market(),
        grid: GridConfig { long: side(), short: side(), do_long, do_short },
    }
}

/// A synthetic random-walk tick stream, deterministic across runs (no RNG,
/// just a bounded oscillation) so P9 (simulator determinism) is checkable.
fn walk_ticks(n: usize, start: f64) -> Vec<Tick> {
    let mut price = start;
    (0..n)
        .map(|i| {
            let drift = ((i % 53) as f64 - 26.0) * 0.015 + ((i % 11) as f64 - 5.0) * 0.004;
            price = (price + drift).max(1.0);
            Tick { timestamp_ms: i as i64 * 1000, qty: 1.0, price: (price * 100.0).round() / 100.0 }
        })
        .collect()
}

#[test]
fn long_only_backtest_produces_stats_and_respects_exposure_cap() {
    let cfg = config(true, false);
    let ticks = walk_ticks(2000, 100.0);
    let result = run_backtest(&ticks, &cfg).expect("backtest should run to completion");

    assert!(!result.stats.is_empty(), "expected at least one equity snapshot");
    for snap in &result.stats {
        assert!(snap.short_psize == 0.0, "short side disabled, should never accumulate a position");
        assert!(snap.balance.is_finite() && snap.equity.is_finite());
    }
    for fill in &result.fills {
        assert!(fill.balance.is_finite() && fill.equity.is_finite());
        assert!(!fill.tag.is_empty());
    }
}

#[test]
fn both_sides_enabled_never_breaches_wallet_exposure_by_more_than_slack() {
    let cfg = config(true, true);
    let ticks = walk_ticks(2000, 100.0);
    let result = run_backtest(&ticks, &cfg).expect("backtest should run to completion");

    let limit = cfg.grid.long.wallet_exposure_limit;
    for snap in &result.stats {
        if snap.long_psize > 0.0 {
            let we = gridcore::lattice::qty_to_cost(snap.long_psize, snap.long_pprice, cfg.market.inverse, cfg.market.c_mult)
                / snap.balance.max(1e-9);
            assert!(we <= limit * 1.02, "long WE {we} exceeded slack-adjusted limit {}", limit * 1.02);
        }
    }
}

#[test]
fn determinism_same_ticks_same_config_yields_identical_result() {
    let cfg = config(true, false);
    let ticks = walk_ticks(1500, 100.0);
    let a = run_backtest(&ticks, &cfg).unwrap();
    let b = run_backtest(&ticks, &cfg).unwrap();

    assert_eq!(a.fills.len(), b.fills.len());
    for (fa, fb) in a.fills.iter().zip(b.fills.iter()) {
        assert_eq!(fa.tag, fb.tag);
        assert_eq!(fa.timestamp_ms, fb.timestamp_ms);
        assert!((fa.fill_qty - fb.fill_qty).abs() < 1e-12);
        assert!((fa.fill_price - fb.fill_price).abs() < 1e-12);
        assert!((fa.balance - fb.balance).abs() < 1e-12);
    }
    assert_eq!(a.stats.len(), b.stats.len());
}

#[test]
fn tick_stream_shorter_than_ema_warmup_is_rejected() {
    let cfg = config(true, false);
    let ticks = walk_ticks(2, 100.0);
    assert!(run_backtest(&ticks, &cfg).is_err());
}
