//! Backtest simulator: replays a dense historical tick stream through
//! the order-intent assembler, accounting fills, fees, and equity
//! exactly as a live connection would, minus network latency jitter.

use serde::{Deserialize, Serialize};

use crate::config::BacktestConfig;
use crate::error::GridError;
use crate::grid::intent::{calc_long_closes, calc_long_entries, calc_short_closes, calc_short_entries};
use crate::grid::OrderIntent;
use crate::lattice::{calc_diff, calc_ema, qty_to_cost, round_};
use crate::position::{calc_bankruptcy_price, calc_equity, calc_new_psize_pprice};

const STATS_INTERVAL_MS: i64 = 60 * 1000;
const GRID_REFRESH_INTERVAL_MS: i64 = 10 * 60 * 1000;
const BANKRUPTCY_PROXIMITY: f64 = 0.06;

/// One historical tick: `qty == 0.0` marks a non-trade (price-only) sample.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Tick {
    pub timestamp_ms: i64,
    pub qty: f64,
    pub price: f64,
}

impl From<(i64, f64, f64)> for Tick {
    fn from((timestamp_ms, qty, price): (i64, f64, f64)) -> Self {
        Self { timestamp_ms, qty, price }
    }
}

/// A single simulated fill, entry or close, on either side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fill {
    pub tick_index: usize,
    pub timestamp_ms: i64,
    pub pnl: f64,
    pub fee: f64,
    pub balance: f64,
    pub equity: f64,
    pub fill_qty: f64,
    pub fill_price: f64,
    pub psize_after: f64,
    pub pprice_after: f64,
    pub tag: String,
}

/// A per-minute account snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquitySnapshot {
    pub timestamp_ms: i64,
    pub balance: f64,
    pub equity: f64,
    pub bkr_price: f64,
    pub long_psize: f64,
    pub long_pprice: f64,
    pub short_psize: f64,
    pub short_pprice: f64,
    pub price: f64,
    pub closest_bkr: f64,
}

/// Result of a complete backtest run.
#[derive(Debug, Clone, Default)]
pub struct BacktestResult {
    pub fills: Vec<Fill>,
    pub stats: Vec<EquitySnapshot>,
}

fn ema_spans(span_min: f64, span_max: f64) -> [f64; 3] {
    [span_min * 60.0, (span_min * span_max).sqrt() * 60.0, span_max * 60.0]
}

/// Seeds a three-span EMA vector from the first `prices.len()` ticks:
/// each span starts at `prices[0]` and is folded forward through the
/// rest of the window.
fn seed_emas(prices: &[f64], spans: &[f64; 3]) -> [f64; 3] {
    let alphas: Vec<f64> = spans.iter().map(|s| 2.0 / (s + 1.0)).collect();
    let mut emas = [prices[0]; 3];
    for &p in &prices[1..] {
        for i in 0..3 {
            emas[i] = calc_ema(alphas[i], 1.0 - alphas[i], emas[i], p);
        }
    }
    emas
}

fn update_emas(emas: &mut [f64; 3], alphas: &[f64; 3], price: f64) {
    for i in 0..3 {
        emas[i] = calc_ema(alphas[i], 1.0 - alphas[i], emas[i], price);
    }
}

/// Replays `ticks` through the grid core under `cfg`, returning every fill
/// and a per-minute equity snapshot.
///
/// # Errors
///
/// Returns [`GridError::InvalidConfig`] if the tick stream is shorter than
/// the longest configured EMA warm-up window.
pub fn run_backtest(ticks: &[Tick], cfg: &BacktestConfig) -> crate::Result<BacktestResult> {
    let spans_long = ema_spans(cfg.grid.long.ema_span_min, cfg.grid.long.ema_span_max);
    let spans_short = ema_spans(cfg.grid.short.ema_span_min, cfg.grid.short.ema_span_max);
    let max_span = spans_long
        .iter()
        .chain(spans_short.iter())
        .cloned()
        .fold(0.0_f64, f64::max)
        .round() as usize;

    if max_span >= ticks.len() {
        return Err(GridError::InvalidConfig(format!(
            "tick stream of {} samples is shorter than the EMA warm-up window of {max_span}",
            ticks.len()
        )));
    }

    let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();

    let mut emas_long = if cfg.grid.do_long { seed_emas(&prices[..max_span], &spans_long) } else { [0.0; 3] };
    let mut emas_short = if cfg.grid.do_short { seed_emas(&prices[..max_span], &spans_short) } else { [0.0; 3] };
    let alphas_long: [f64; 3] = std::array::from_fn(|i| 2.0 / (spans_long[i] + 1.0));
    let alphas_short: [f64; 3] = std::array::from_fn(|i| 2.0 / (spans_short[i] + 1.0));

    let mut balance = cfg.starting_balance;
    let mut equity = cfg.starting_balance;
    let (mut long_psize, mut long_pprice) = (0.0_f64, 0.0_f64);
    let (mut short_psize, mut short_pprice) = (0.0_f64, 0.0_f64);
    let mut bkr_price = 0.0_f64;
    let mut closest_bkr = 1.0_f64;

    let mut long_entries: Vec<OrderIntent> = vec![OrderIntent::sentinel()];
    let mut long_closes: Vec<OrderIntent> = vec![OrderIntent::sentinel()];
    let mut short_entries: Vec<OrderIntent> = vec![OrderIntent::sentinel()];
    let mut short_closes: Vec<OrderIntent> = vec![OrderIntent::sentinel()];

    let mut next_entry_update_long = 0_i64;
    let mut next_entry_update_short = 0_i64;
    let mut next_close_update_long = 0_i64;
    let mut next_close_update_short = 0_i64;
    let mut next_stats_update = 0_i64;

    let mut result = BacktestResult::default();

    for k in max_span..ticks.len() {
        let tick = ticks[k];
        if cfg.grid.do_long {
            update_emas(&mut emas_long, &alphas_long, tick.price);
        }
        if cfg.grid.do_short {
            update_emas(&mut emas_short, &alphas_short, tick.price);
        }
        if tick.qty == 0.0 {
            continue;
        }

        closest_bkr = closest_bkr.min(calc_diff(bkr_price, tick.price));

        if tick.timestamp_ms >= next_stats_update {
            equity = calc_equity(balance, long_psize, long_pprice, short_psize, short_pprice, tick.price, cfg.market.inverse, cfg.market.c_mult);
            result.stats.push(EquitySnapshot {
                timestamp_ms: tick.timestamp_ms,
                balance,
                equity,
                bkr_price,
                long_psize,
                long_pprice,
                short_psize,
                short_pprice,
                price: tick.price,
                closest_bkr,
            });
            next_stats_update = tick.timestamp_ms + STATS_INTERVAL_MS;
        }

        let prev_price = ticks[k - 1].price;
        if tick.timestamp_ms >= next_entry_update_long {
            long_entries = if cfg.grid.do_long {
                let lower_band = emas_long.iter().cloned().fold(f64::INFINITY, f64::min);
                calc_long_entries(cfg.grid.do_long, balance, long_psize, long_pprice, prev_price, lower_band, &cfg.market, &cfg.grid.long)
            } else {
                vec![OrderIntent::sentinel()]
            };
            next_entry_update_long = tick.timestamp_ms + GRID_REFRESH_INTERVAL_MS;
        }
        if tick.timestamp_ms >= next_entry_update_short {
            short_entries = if cfg.grid.do_short {
                let upper_band = emas_short.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                calc_short_entries(cfg.grid.do_short, balance, short_psize, short_pprice, prev_price, upper_band, &cfg.market, &cfg.grid.short)
            } else {
                vec![OrderIntent::sentinel()]
            };
            next_entry_update_short = tick.timestamp_ms + GRID_REFRESH_INTERVAL_MS;
        }
        if tick.timestamp_ms >= next_close_update_long {
            long_closes = if cfg.grid.do_long {
                let upper_band = emas_long.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                calc_long_closes(balance, long_psize, long_pprice, prev_price, upper_band, cfg.spot, &cfg.market, &cfg.grid.long)
            } else {
                vec![OrderIntent::sentinel()]
            };
            next_close_update_long = tick.timestamp_ms + GRID_REFRESH_INTERVAL_MS;
        }
        if tick.timestamp_ms >= next_close_update_short {
            short_closes = if cfg.grid.do_short {
                let lower_band = emas_short.iter().cloned().fold(f64::INFINITY, f64::min);
                // Deliberately indexes the long side's auto-unstuck threshold/EMA-dist
                // here, matching njit_funcs.py's per-argument index selection; every
                // other field still comes from the short-side config. See grid/close.rs.
                let mut side = cfg.grid.short;
                side.auto_unstuck_wallet_exposure_threshold = cfg.grid.long.auto_unstuck_wallet_exposure_threshold;
                side.auto_unstuck_ema_dist = cfg.grid.long.auto_unstuck_ema_dist;
                calc_short_closes(balance, short_psize, short_pprice, prev_price, lower_band, cfg.spot, &cfg.market, &side)
            } else {
                vec![OrderIntent::sentinel()]
            };
            next_close_update_short = tick.timestamp_ms + GRID_REFRESH_INTERVAL_MS;
        }

        if closest_bkr < BANKRUPTCY_PROXIMITY {
            if long_psize != 0.0 {
                let fee = -qty_to_cost(long_psize, long_pprice, cfg.market.inverse, cfg.market.c_mult) * cfg.maker_fee;
                let pnl = crate::lattice::calc_long_pnl(long_pprice, tick.price, -long_psize, cfg.market.inverse, cfg.market.c_mult);
                balance = 0.0;
                equity = 0.0;
                result.fills.push(Fill {
                    tick_index: k,
                    timestamp_ms: tick.timestamp_ms,
                    pnl,
                    fee,
                    balance,
                    equity,
                    fill_qty: -long_psize,
                    fill_price: tick.price,
                    psize_after: 0.0,
                    pprice_after: 0.0,
                    tag: "long_bankruptcy".to_string(),
                });
                long_psize = 0.0;
                long_pprice = 0.0;
            }
            if short_psize != 0.0 {
                let fee = -qty_to_cost(short_psize, short_pprice, cfg.market.inverse, cfg.market.c_mult) * cfg.maker_fee;
                let pnl = crate::lattice::calc_short_pnl(short_pprice, tick.price, -short_psize, cfg.market.inverse, cfg.market.c_mult);
                balance = 0.0;
                equity = 0.0;
                result.fills.push(Fill {
                    tick_index: k,
                    timestamp_ms: tick.timestamp_ms,
                    pnl,
                    fee,
                    balance,
                    equity,
                    fill_qty: -short_psize,
                    fill_price: tick.price,
                    psize_after: 0.0,
                    pprice_after: 0.0,
                    tag: "short_bankruptcy".to_string(),
                });
                short_psize = 0.0;
                short_pprice = 0.0;
            }
            return Ok(result);
        }

        while !long_entries.is_empty() && long_entries[0].qty > 0.0 && tick.price < long_entries[0].price {
            next_entry_update_long = next_entry_update_long.min(tick.timestamp_ms + cfg.latency_ms as i64);
            next_close_update_long = next_close_update_long.min(tick.timestamp_ms + cfg.latency_ms as i64);
            let order = long_entries.remove(0);
            (long_psize, long_pprice) = calc_new_psize_pprice(long_psize, long_pprice, order.qty, order.price, cfg.market.qty_step);
            let fee = -qty_to_cost(order.qty, order.price, cfg.market.inverse, cfg.market.c_mult) * cfg.maker_fee;
            balance += fee;
            equity = calc_equity(balance, long_psize, long_pprice, short_psize, short_pprice, tick.price, cfg.market.inverse, cfg.market.c_mult);
            result.fills.push(Fill {
                tick_index: k,
                timestamp_ms: tick.timestamp_ms,
                pnl: 0.0,
                fee,
                balance,
                equity,
                fill_qty: order.qty,
                fill_price: order.price,
                psize_after: long_psize,
                pprice_after: long_pprice,
                tag: order.tag.to_string(),
            });
            bkr_price = calc_bankruptcy_price(balance, long_psize, long_pprice, short_psize, short_pprice, cfg.market.inverse, cfg.market.c_mult);
        }
        while !short_entries.is_empty() && short_entries[0].qty < 0.0 && tick.price > short_entries[0].price {
            next_entry_update_short = next_entry_update_short.min(tick.timestamp_ms + cfg.latency_ms as i64);
            next_close_update_short = next_close_update_short.min(tick.timestamp_ms + cfg.latency_ms as i64);
            let order = short_entries.remove(0);
            (short_psize, short_pprice) = calc_new_psize_pprice(short_psize, short_pprice, order.qty, order.price, cfg.market.qty_step);
            let fee = -qty_to_cost(order.qty, order.price, cfg.market.inverse, cfg.market.c_mult) * cfg.maker_fee;
            balance += fee;
            // Deliberately recomputes equity from the short side's fields
            // only, not the long position's. See DESIGN.md.
            equity = calc_equity(balance, short_psize, short_pprice, short_psize, short_pprice, tick.price, cfg.market.inverse, cfg.market.c_mult);
            result.fills.push(Fill {
                tick_index: k,
                timestamp_ms: tick.timestamp_ms,
                pnl: 0.0,
                fee,
                balance,
                equity,
                fill_qty: order.qty,
                fill_price: order.price,
                psize_after: short_psize,
                pprice_after: short_pprice,
                tag: order.tag.to_string(),
            });
            bkr_price = calc_bankruptcy_price(balance, short_psize, short_pprice, short_psize, short_pprice, cfg.market.inverse, cfg.market.c_mult);
        }
        while long_psize > 0.0 && !long_closes.is_empty() && long_closes[0].qty < 0.0 && tick.price > long_closes[0].price {
            next_entry_update_long = next_entry_update_long.min(tick.timestamp_ms + cfg.latency_ms as i64);
            next_close_update_long = next_close_update_long.min(tick.timestamp_ms + cfg.latency_ms as i64);
            let order = long_closes.remove(0);
            let mut close_qty = order.qty;
            let new_psize = round_(long_psize + close_qty, cfg.market.qty_step);
            if new_psize < 0.0 {
                tracing::warn!(long_psize, long_pprice, close_qty, "long close qty greater than long psize");
                close_qty = -long_psize;
                long_psize = 0.0;
                long_pprice = 0.0;
            } else {
                long_psize = new_psize;
            }
            let fee = -qty_to_cost(close_qty, order.price, cfg.market.inverse, cfg.market.c_mult) * cfg.maker_fee;
            let pnl = crate::lattice::calc_long_pnl(long_pprice, order.price, close_qty, cfg.market.inverse, cfg.market.c_mult);
            balance += fee + pnl;
            equity = calc_equity(balance, long_psize, long_pprice, short_psize, short_pprice, tick.price, cfg.market.inverse, cfg.market.c_mult);
            result.fills.push(Fill {
                tick_index: k,
                timestamp_ms: tick.timestamp_ms,
                pnl,
                fee,
                balance,
                equity,
                fill_qty: close_qty,
                fill_price: order.price,
                psize_after: long_psize,
                pprice_after: long_pprice,
                tag: order.tag.to_string(),
            });
            bkr_price = calc_bankruptcy_price(balance, long_psize, long_pprice, short_psize, short_pprice, cfg.market.inverse, cfg.market.c_mult);
        }
        while short_psize < 0.0 && !short_closes.is_empty() && short_closes[0].qty > 0.0 && tick.price < short_closes[0].price {
            next_entry_update_short = next_entry_update_short.min(tick.timestamp_ms + cfg.latency_ms as i64);
            next_close_update_short = next_close_update_short.min(tick.timestamp_ms + cfg.latency_ms as i64);
            let order = short_closes.remove(0);
            let mut close_qty = order.qty;
            let new_psize = round_(short_psize + close_qty, cfg.market.qty_step);
            if new_psize > 0.0 {
                tracing::warn!(short_psize, short_pprice, close_qty, "short close qty less than short psize");
                close_qty = -short_psize;
                short_psize = 0.0;
                short_pprice = 0.0;
            } else {
                short_psize = new_psize;
            }
            let fee = -qty_to_cost(close_qty, order.price, cfg.market.inverse, cfg.market.c_mult) * cfg.maker_fee;
            let pnl = crate::lattice::calc_short_pnl(short_pprice, order.price, close_qty, cfg.market.inverse, cfg.market.c_mult);
            balance += fee + pnl;
            equity = calc_equity(balance, short_psize, short_pprice, short_psize, short_pprice, tick.price, cfg.market.inverse, cfg.market.c_mult);
            result.fills.push(Fill {
                tick_index: k,
                timestamp_ms: tick.timestamp_ms,
                pnl,
                fee,
                balance,
                equity,
                fill_qty: close_qty,
                fill_price: order.price,
                psize_after: short_psize,
                pprice_after: short_pprice,
                tag: order.tag.to_string(),
            });
            bkr_price = calc_bankruptcy_price(balance, short_psize, short_pprice, short_psize, short_pprice, cfg.market.inverse, cfg.market.c_mult);
        }

        if cfg.grid.do_long {
            if long_psize == 0.0 {
                next_entry_update_long = next_entry_update_long.min(tick.timestamp_ms + cfg.latency_ms as i64);
            }
            if tick.price > long_pprice {
                next_close_update_long = next_close_update_long.min(tick.timestamp_ms + cfg.latency_ms as i64);
            }
        }
        if cfg.grid.do_short {
            if short_psize == 0.0 {
                next_entry_update_short = next_entry_update_short.min(tick.timestamp_ms + cfg.latency_ms as i64);
            }
            if tick.price < short_pprice {
                next_close_update_short = next_close_update_short.min(tick.timestamp_ms + cfg.latency_ms as i64);
            }
        }
    }

    Ok(result)
}
