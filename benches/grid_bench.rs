//! Benchmarks for the two numerically iterative hot paths in the grid
//! core: the whole-grid weighting solver and a multi-thousand-tick
//! backtest run.

use criterion::{criterion_group, criterion_main, Criterion};

use gridcore::backtest::{run_backtest, Tick};
use gridcore::config::{BacktestConfig, GridConfig, MarketParams, SideConfig};
use gridcore::grid::entry::calc_whole_long_entry_grid;

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
        grid_span: 0.5,
        wallet_exposure_limit: 1.0,
        max_n_entry_orders: 10,
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

fn bench_weighting_solver(c: &mut Criterion) {
    let market = market();
    let side = side();
    c.bench_function("calc_whole_long_entry_grid", |b| {
        b.iter(|| calc_whole_long_entry_grid(1000.0, 100.0, &market, &side, None));
    });
}

fn bench_backtest(c: &mut Criterion) {
    let cfg = BacktestConfig {
        starting_balance: 1000.0,
        maker_fee: -0.0002,
        latency_ms: 100,
        spot: false,
        hedge_mode: false,
        market: market(),
        grid: GridConfig { long: side(), short: side(), do_long: true, do_short: false },
    };
    let mut price = 100.0_f64;
    let ticks: Vec<Tick> = (0..20_000)
        .map(|i| {
            price += ((i % 37) as f64 - 18.0) * 0.01;
            Tick { timestamp_ms: i as i64 * 1000, qty: 1.0, price }
        })
        .collect();
    c.bench_function("backtest_20k_ticks", |b| {
        b.iter(|| run_backtest(&ticks, &cfg).unwrap());
    });
}

criterion_group!(benches, bench_weighting_solver, bench_backtest);
criterion_main!(benches);
