//! Close-grid builder: constructs the stepped take-profit ladder and
//! the emergency auto-unstuck close.

use crate::config::{MarketParams, SideConfig};
use crate::grid::OrderTag;
use crate::lattice::{calc_min_entry_qty, cost_to_qty, interpolate, linspace, qty_to_cost, round_, round_dn, round_up};

/// Maker-fee-implied breakeven markup: spot pays the taker-equivalent
/// round-trip fee, futures the maker round-trip.
fn breakeven_markup(spot: bool) -> f64 {
    if spot { 0.0021 } else { 0.00041 }
}

fn find_close_qty_bringing_wallet_exposure_to_target(
    balance: f64,
    psize: f64,
    pprice: f64,
    target_we: f64,
    close_price: f64,
    market: &MarketParams,
    pnl: impl Fn(f64, f64, f64) -> f64,
) -> f64 {
    let wallet_exposure = qty_to_cost(psize, pprice, market.inverse, market.c_mult) / balance;
    if wallet_exposure <= target_we {
        return 0.0;
    }
    let guess1 = round_(
        cost_to_qty(balance * (wallet_exposure - target_we), close_price, market.inverse, market.c_mult),
        market.qty_step,
    );
    let guess2 = round_((guess1 * 1.2).max(guess1 + market.qty_step), market.qty_step);
    let eval = |guess: f64| -> f64 {
        qty_to_cost(psize.abs() - guess, pprice, market.inverse, market.c_mult)
            / (balance + pnl(pprice, close_price, guess))
    };
    let val1 = eval(guess1);
    let val2 = eval(guess2);
    let mut guess = round_(interpolate(target_we, &[val1, val2], &[guess1, guess2]), market.qty_step);
    let mut val = eval(guess);
    if (val - target_we).abs() / target_we > 0.15 {
        let retried = round_(interpolate(target_we, &[val1, val], &[guess1, guess]), market.qty_step);
        val = eval(retried);
        guess = retried;
        if (val - target_we).abs() / target_we > 0.15 {
            tracing::debug!(
                balance, psize, pprice, target_we, close_price, guess, val,
                "close qty solver exceeded error tolerance"
            );
        }
    }
    guess
}

/// Additional long-close qty whose fill brings WE down to `target_we`.
#[must_use]
pub fn find_long_close_qty_bringing_wallet_exposure_to_target(
    balance: f64,
    psize: f64,
    pprice: f64,
    target_we: f64,
    close_price: f64,
    market: &MarketParams,
) -> f64 {
    find_close_qty_bringing_wallet_exposure_to_target(balance, psize, pprice, target_we, close_price, market, |e, c, q| {
        crate::lattice::calc_long_pnl(e, c, q, market.inverse, market.c_mult)
    })
}

/// Additional short-close qty whose fill brings WE down to `target_we`.
#[must_use]
pub fn find_short_close_qty_bringing_wallet_exposure_to_target(
    balance: f64,
    psize: f64,
    pprice: f64,
    target_we: f64,
    close_price: f64,
    market: &MarketParams,
) -> f64 {
    find_close_qty_bringing_wallet_exposure_to_target(balance, psize, pprice, target_we, close_price, market, |e, c, q| {
        crate::lattice::calc_short_pnl(e, c, q, market.inverse, market.c_mult)
    })
}

/// Builds the long close grid: a stepped take-profit ladder from
/// `long_pprice * (1 + min_markup)` to `long_pprice * (1 + min_markup +
/// markup_range)`, or a single auto-unstuck close if WE is past the
/// configured threshold.
#[must_use]
pub fn calc_long_close_grid(
    balance: f64,
    long_psize: f64,
    long_pprice: f64,
    lowest_ask: f64,
    upper_ema_band: f64,
    spot: bool,
    market: &MarketParams,
    side: &SideConfig,
) -> Vec<(f64, f64, OrderTag)> {
    if long_psize == 0.0 {
        return vec![(0.0, 0.0, OrderTag::None)];
    }
    let minm = long_pprice * (1.0 + side.min_markup);
    if spot
        && round_dn(long_psize, market.qty_step)
            < calc_min_entry_qty(minm, market.inverse, market.qty_step, market.min_qty, market.min_cost)
    {
        return vec![(0.0, 0.0, OrderTag::None)];
    }
    if long_psize
        < cost_to_qty(balance, long_pprice, market.inverse, market.c_mult)
            * side.wallet_exposure_limit
            * side.initial_qty_pct
            * 0.5
    {
        let close_price = lowest_ask.max(round_up(long_pprice * (1.0 + breakeven_markup(spot)), market.price_step));
        return vec![(-round_(long_psize, market.qty_step), close_price, OrderTag::LongNclose)];
    }

    let close_prices: Vec<f64> = linspace(minm, long_pprice * (1.0 + side.min_markup + side.markup_range), side.n_close_orders)
        .into_iter()
        .map(|p| round_up(p, market.price_step))
        .filter(|&p| p >= lowest_ask)
        .collect();

    if close_prices.is_empty() {
        return vec![(-long_psize, lowest_ask, OrderTag::LongNclose)];
    }
    if close_prices.len() == 1 {
        return vec![(-long_psize, close_prices[0], OrderTag::LongNclose)];
    }

    let wallet_exposure = qty_to_cost(long_psize, long_pprice, market.inverse, market.c_mult) / balance;
    let threshold = side.wallet_exposure_limit * (1.0 - side.auto_unstuck_wallet_exposure_threshold) * 1.01;
    if side.auto_unstuck_wallet_exposure_threshold != 0.0 && wallet_exposure > threshold {
        let auto_unstuck_price =
            lowest_ask.max(round_up(upper_ema_band * (1.0 + side.auto_unstuck_ema_dist), market.price_step));
        if auto_unstuck_price < close_prices[0] {
            let auto_unstuck_qty =
                find_long_close_qty_bringing_wallet_exposure_to_target(balance, long_psize, long_pprice, threshold, auto_unstuck_price, market);
            if auto_unstuck_qty
                > calc_min_entry_qty(auto_unstuck_price, market.inverse, market.qty_step, market.min_qty, market.min_cost)
            {
                return vec![(-auto_unstuck_qty, auto_unstuck_price, OrderTag::LongAutoUnstuckClose)];
            }
        }
    }

    let min_close_qty = calc_min_entry_qty(close_prices[0], market.inverse, market.qty_step, market.min_qty, market.min_cost);
    let default_qty = round_dn(long_psize / close_prices.len() as f64, market.qty_step);
    if default_qty == 0.0 {
        return vec![(-long_psize, close_prices[0], OrderTag::LongNclose)];
    }
    let default_qty = min_close_qty.max(default_qty);

    let mut closes: Vec<(f64, f64, OrderTag)> = Vec::new();
    let mut remaining = long_psize;
    for &close_price in &close_prices {
        let stop_threshold = min_close_qty
            .max(cost_to_qty(balance, close_price, market.inverse, market.c_mult) * side.wallet_exposure_limit * side.initial_qty_pct * 0.5)
            .max(default_qty * 0.5);
        if remaining < stop_threshold {
            break;
        }
        let close_qty = remaining.min(default_qty.max(min_close_qty));
        closes.push((-close_qty, close_price, OrderTag::LongNclose));
        remaining = round_(remaining - close_qty, market.qty_step);
    }
    if remaining != 0.0 {
        if let Some(last) = closes.last_mut() {
            last.0 = round_(last.0 - remaining, market.qty_step);
        } else {
            closes = vec![(-long_psize, close_prices[0], OrderTag::LongNclose)];
        }
    }
    closes
}

/// Short-side counterpart of [`calc_long_close_grid`].
///
/// Takes a single `side` config for every field it reads (markup, close-order
/// count, auto-unstuck threshold/EMA-dist). The backtest driver deliberately
/// builds the `side` it passes here from the short-side config with only the
/// two auto-unstuck fields overridden from the long side, matching the
/// source's per-argument index selection — see `backtest.rs` and `DESIGN.md`.
#[must_use]
pub fn calc_short_close_grid(
    balance: f64,
    short_psize: f64,
    short_pprice: f64,
    highest_bid: f64,
    lower_ema_band: f64,
    spot: bool,
    market: &MarketParams,
    side: &SideConfig,
) -> Vec<(f64, f64, OrderTag)> {
    if short_psize == 0.0 {
        return vec![(0.0, 0.0, OrderTag::None)];
    }
    let minm = short_pprice * (1.0 - side.min_markup);
    let abs_short_psize = short_psize.abs();
    if spot
        && round_dn(abs_short_psize, market.qty_step)
            < calc_min_entry_qty(minm, market.inverse, market.qty_step, market.min_qty, market.min_cost)
    {
        return vec![(0.0, 0.0, OrderTag::None)];
    }
    if abs_short_psize
        < cost_to_qty(balance, short_pprice, market.inverse, market.c_mult)
            * side.wallet_exposure_limit
            * side.initial_qty_pct
            * 0.5
    {
        let close_price = highest_bid.min(round_dn(short_pprice * (1.0 - breakeven_markup(spot)), market.price_step));
        return vec![(round_(abs_short_psize, market.qty_step), close_price, OrderTag::ShortNclose)];
    }

    let close_prices: Vec<f64> = linspace(minm, short_pprice * (1.0 - side.min_markup - side.markup_range), side.n_close_orders)
        .into_iter()
        .map(|p| round_dn(p, market.price_step))
        .filter(|&p| p <= highest_bid)
        .collect();

    if close_prices.is_empty() {
        return vec![(round_(abs_short_psize, market.qty_step), highest_bid, OrderTag::ShortNclose)];
    }
    if close_prices.len() == 1 {
        return vec![(round_(abs_short_psize, market.qty_step), close_prices[0], OrderTag::ShortNclose)];
    }

    let wallet_exposure = qty_to_cost(short_psize, short_pprice, market.inverse, market.c_mult) / balance;
    let threshold = side.wallet_exposure_limit * (1.0 - side.auto_unstuck_wallet_exposure_threshold) * 1.01;
    if side.auto_unstuck_wallet_exposure_threshold != 0.0 && wallet_exposure > threshold {
        let auto_unstuck_price =
            highest_bid.min(round_dn(lower_ema_band * (1.0 - side.auto_unstuck_ema_dist), market.price_step));
        if auto_unstuck_price > close_prices[0] {
            let auto_unstuck_qty =
                find_short_close_qty_bringing_wallet_exposure_to_target(balance, short_psize, short_pprice, threshold, auto_unstuck_price, market);
            if auto_unstuck_qty
                > calc_min_entry_qty(auto_unstuck_price, market.inverse, market.qty_step, market.min_qty, market.min_cost)
            {
                return vec![(auto_unstuck_qty, auto_unstuck_price, OrderTag::ShortAutoUnstuckClose)];
            }
        }
    }

    let min_close_qty = calc_min_entry_qty(close_prices[0], market.inverse, market.qty_step, market.min_qty, market.min_cost);
    let default_qty = round_dn(abs_short_psize / close_prices.len() as f64, market.qty_step);
    if default_qty == 0.0 {
        return vec![(round_(abs_short_psize, market.qty_step), close_prices[0], OrderTag::ShortNclose)];
    }
    let default_qty = min_close_qty.max(default_qty);

    let mut closes: Vec<(f64, f64, OrderTag)> = Vec::new();
    let mut remaining = round_(abs_short_psize, market.qty_step);
    for &close_price in &close_prices {
        let stop_threshold = min_close_qty
            .max(cost_to_qty(balance, close_price, market.inverse, market.c_mult) * side.wallet_exposure_limit * side.initial_qty_pct * 0.5)
            .max(default_qty * 0.5);
        if remaining < stop_threshold {
            break;
        }
        let close_qty = remaining.min(default_qty.max(min_close_qty));
        closes.push((close_qty, close_price, OrderTag::ShortNclose));
        remaining = round_(remaining - close_qty, market.qty_step);
    }
    if remaining != 0.0 {
        if let Some(last) = closes.last_mut() {
            last.0 = round_(last.0 + remaining, market.qty_step);
        } else {
            closes = vec![(abs_short_psize, close_prices[0], OrderTag::ShortNclose)];
        }
    }
    closes
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn flat_position_returns_sentinel() {
        let closes = calc_long_close_grid(1000.0, 0.0, 0.0, 101.0, 102.0, false, &market(), &side());
        assert_eq!(closes, vec![(0.0, 0.0, OrderTag::None)]);
    }

    #[test]
    fn close_sum_equals_position_size() {
        let psize = 0.2;
        let pprice = 100.0;
        let closes = calc_long_close_grid(1000.0, psize, pprice, 101.0, 102.0, false, &market(), &side());
        let sum: f64 = closes.iter().map(|c| c.0).sum();
        assert!((sum + psize).abs() < 1e-6, "sum={sum} psize={psize}");
    }

    #[test]
    fn close_prices_strictly_above_markup_floor() {
        let pprice = 100.0;
        let closes = calc_long_close_grid(1000.0, 0.2, pprice, 50.0, 102.0, false, &market(), &side());
        let floor = pprice * (1.0 + side().min_markup);
        for (_, price, _) in &closes {
            assert!(*price >= floor - 1e-6, "price {price} below floor {floor}");
        }
    }

    #[test]
    fn auto_unstuck_close_triggers_past_threshold() {
        // balance=1000, long position cost=950 (WE=0.95) -> threshold ~0.909.
        let balance = 1000.0;
        let pprice = 100.0;
        let psize = 9.5; // cost = 950
        let mut s = side();
        s.wallet_exposure_limit = 1.0;
        s.auto_unstuck_wallet_exposure_threshold = 0.1;
        s.auto_unstuck_ema_dist = 0.0;
        let upper_ema = pprice * 1.02;
        let lowest_ask = pprice * 1.005;
        let closes = calc_long_close_grid(balance, psize, pprice, lowest_ask, upper_ema, false, &market(), &s);
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].2, OrderTag::LongAutoUnstuckClose);
    }

    #[test]
    fn short_close_sum_equals_position_size() {
        let psize = -0.2;
        let pprice = 100.0;
        let closes = calc_short_close_grid(1000.0, psize, pprice, 99.0, 98.0, false, &market(), &side());
        let sum: f64 = closes.iter().map(|c| c.0).sum();
        assert!((sum + psize).abs() < 1e-6);
    }
}
