//! Order-intent assembler: combines the approximator and the
//! close-grid builder with live market state into the list of orders
//! that should currently be resting for one side of one symbol.

use crate::config::{MarketParams, SideConfig};
use crate::grid::approximate::{approximate_long_grid, approximate_short_grid};
use crate::grid::close::{calc_long_close_grid, calc_short_close_grid};
use crate::grid::entry::{calc_initial_entry_qty, find_qty_bringing_wallet_exposure_to_target};
use crate::grid::{OrderIntent, OrderTag};
use crate::lattice::{calc_diff, calc_min_entry_qty, cost_to_qty, qty_to_cost, round_, round_dn, round_up};

/// Current long entry order(s), given live position and quotes.
#[must_use]
pub fn calc_long_entries(
    do_long: bool,
    balance: f64,
    psize: f64,
    pprice: f64,
    highest_bid: f64,
    lower_ema_band: f64,
    market: &MarketParams,
    side: &SideConfig,
) -> Vec<OrderIntent> {
    let min_entry_qty = calc_min_entry_qty(highest_bid, market.inverse, market.qty_step, market.min_qty, market.min_cost);
    if !do_long && psize <= min_entry_qty {
        return vec![OrderIntent::sentinel()];
    }

    if psize == 0.0 {
        let entry_price =
            highest_bid.min(round_dn(lower_ema_band * (1.0 - side.initial_eprice_ema_dist), market.price_step));
        let entry_qty = calc_initial_entry_qty(balance, entry_price, market, side);
        return vec![OrderIntent { qty: entry_qty, price: entry_price, tag: OrderTag::LongIentry }];
    }

    let wallet_exposure = qty_to_cost(psize, pprice, market.inverse, market.c_mult) / balance;
    if wallet_exposure >= side.wallet_exposure_limit {
        return vec![OrderIntent::sentinel()];
    }
    if side.auto_unstuck_wallet_exposure_threshold != 0.0 {
        let threshold = side.wallet_exposure_limit * (1.0 - side.auto_unstuck_wallet_exposure_threshold) * 0.99;
        if wallet_exposure > threshold {
            let auto_unstuck_entry_price =
                highest_bid.min(round_dn(lower_ema_band * (1.0 - side.auto_unstuck_ema_dist), market.price_step));
            let auto_unstuck_qty = find_qty_bringing_wallet_exposure_to_target(
                balance, psize, pprice, side.wallet_exposure_limit, auto_unstuck_entry_price, market,
            );
            return vec![OrderIntent { qty: auto_unstuck_qty, price: auto_unstuck_entry_price, tag: OrderTag::LongAutoUnstuckEntry }];
        }
    }

    let grid = approximate_long_grid(balance, psize, pprice, market, side);
    if grid.is_empty() {
        return vec![OrderIntent::sentinel()];
    }
    if calc_diff(grid[0].cum_pprice, grid[0].price) < 0.00001 {
        let entry_price = highest_bid;
        let min_entry_qty = calc_min_entry_qty(entry_price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
        let max_entry_qty = round_(
            cost_to_qty(balance * side.wallet_exposure_limit * side.initial_qty_pct, entry_price, market.inverse, market.c_mult),
            market.qty_step,
        );
        let entry_qty = min_entry_qty.max(max_entry_qty.min(grid[0].qty));
        if qty_to_cost(entry_qty, entry_price, market.inverse, market.c_mult) / balance > side.wallet_exposure_limit * 1.1 {
            tracing::warn!(balance, psize, pprice, entry_price, entry_qty, "abnormally large partial long_ientry");
        }
        return vec![OrderIntent { qty: entry_qty, price: entry_price, tag: OrderTag::LongIentry }];
    }

    let mut entries: Vec<OrderIntent> = Vec::new();
    for (i, row) in grid.iter().enumerate() {
        if row.cum_psize < psize * 1.05 || row.price > pprice * 0.9995 {
            continue;
        }
        if row.cum_wallet_exposure > side.wallet_exposure_limit * 1.01 {
            break;
        }
        let entry_price = highest_bid.min(row.price);
        let min_entry_qty = calc_min_entry_qty(entry_price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
        let qty = min_entry_qty.max(row.qty);
        let tag = if i == grid.len() - 1 && side.secondary_allocation > 0.05 {
            OrderTag::LongSecondaryRentry
        } else {
            OrderTag::LongPrimaryRentry
        };
        if entries.last().is_none_or(|last: &OrderIntent| last.price != entry_price) {
            entries.push(OrderIntent { qty, price: entry_price, tag });
        }
    }
    if entries.is_empty() {
        vec![OrderIntent::sentinel()]
    } else {
        entries
    }
}

/// Short-side counterpart of [`calc_long_entries`].
#[must_use]
pub fn calc_short_entries(
    do_short: bool,
    balance: f64,
    psize: f64,
    pprice: f64,
    lowest_ask: f64,
    upper_ema_band: f64,
    market: &MarketParams,
    side: &SideConfig,
) -> Vec<OrderIntent> {
    let min_entry_qty = calc_min_entry_qty(lowest_ask, market.inverse, market.qty_step, market.min_qty, market.min_cost);
    let abs_psize = psize.abs();
    if !do_short && abs_psize <= min_entry_qty {
        return vec![OrderIntent::sentinel()];
    }

    if psize == 0.0 {
        let entry_price =
            lowest_ask.max(round_up(upper_ema_band * (1.0 + side.initial_eprice_ema_dist), market.price_step));
        let entry_qty = calc_initial_entry_qty(balance, entry_price, market, side);
        return vec![OrderIntent { qty: -entry_qty, price: entry_price, tag: OrderTag::ShortIentry }];
    }

    let wallet_exposure = qty_to_cost(psize, pprice, market.inverse, market.c_mult) / balance;
    if wallet_exposure >= side.wallet_exposure_limit {
        return vec![OrderIntent::sentinel()];
    }
    if side.auto_unstuck_wallet_exposure_threshold != 0.0 {
        let threshold = side.wallet_exposure_limit * (1.0 - side.auto_unstuck_wallet_exposure_threshold) * 0.99;
        if wallet_exposure > threshold {
            let auto_unstuck_entry_price =
                lowest_ask.max(round_up(upper_ema_band * (1.0 + side.auto_unstuck_ema_dist), market.price_step));
            let auto_unstuck_qty = find_qty_bringing_wallet_exposure_to_target(
                balance, psize, pprice, side.wallet_exposure_limit, auto_unstuck_entry_price, market,
            );
            return vec![OrderIntent { qty: -auto_unstuck_qty, price: auto_unstuck_entry_price, tag: OrderTag::ShortAutoUnstuckEntry }];
        }
    }

    let grid = approximate_short_grid(balance, psize, pprice, market, side);
    if grid.is_empty() {
        return vec![OrderIntent::sentinel()];
    }
    if calc_diff(grid[0].cum_pprice, grid[0].price) < 0.00001 {
        let entry_price = lowest_ask;
        let min_entry_qty = calc_min_entry_qty(entry_price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
        let max_entry_qty = round_(
            cost_to_qty(balance * side.wallet_exposure_limit * side.initial_qty_pct, entry_price, market.inverse, market.c_mult),
            market.qty_step,
        );
        let entry_qty = -min_entry_qty.max(max_entry_qty.min(grid[0].qty.abs()));
        if qty_to_cost(entry_qty, entry_price, market.inverse, market.c_mult) / balance > side.wallet_exposure_limit * 1.1 {
            tracing::warn!(balance, psize, pprice, entry_price, entry_qty, "abnormally large partial short_ientry");
        }
        return vec![OrderIntent { qty: entry_qty, price: entry_price, tag: OrderTag::ShortIentry }];
    }

    let mut entries: Vec<OrderIntent> = Vec::new();
    for (i, row) in grid.iter().enumerate() {
        if row.cum_psize > psize * 1.05 || row.price < pprice * 0.9995 {
            continue;
        }
        if row.cum_wallet_exposure > side.wallet_exposure_limit * 1.01 {
            break;
        }
        let entry_price = lowest_ask.max(row.price);
        let min_entry_qty = calc_min_entry_qty(entry_price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
        let qty = -min_entry_qty.max(row.qty.abs());
        let tag = if i == grid.len() - 1 && side.secondary_allocation > 0.05 {
            OrderTag::ShortSecondaryRentry
        } else {
            OrderTag::ShortPrimaryRentry
        };
        if entries.last().is_none_or(|last: &OrderIntent| last.price != entry_price) {
            entries.push(OrderIntent { qty, price: entry_price, tag });
        }
    }
    if entries.is_empty() {
        vec![OrderIntent::sentinel()]
    } else {
        entries
    }
}

/// Current long close order(s): delegates to C5 directly (no additional
/// gating beyond what the close-grid builder already performs).
#[must_use]
pub fn calc_long_closes(
    balance: f64,
    psize: f64,
    pprice: f64,
    lowest_ask: f64,
    upper_ema_band: f64,
    spot: bool,
    market: &MarketParams,
    side: &SideConfig,
) -> Vec<OrderIntent> {
    calc_long_close_grid(balance, psize, pprice, lowest_ask, upper_ema_band, spot, market, side)
        .into_iter()
        .map(|(qty, price, tag)| OrderIntent { qty, price, tag })
        .collect()
}

/// Short-side counterpart of [`calc_long_closes`].
#[must_use]
pub fn calc_short_closes(
    balance: f64,
    psize: f64,
    pprice: f64,
    highest_bid: f64,
    lower_ema_band: f64,
    spot: bool,
    market: &MarketParams,
    side: &SideConfig,
) -> Vec<OrderIntent> {
    calc_short_close_grid(balance, psize, pprice, highest_bid, lower_ema_band, spot, market, side)
        .into_iter()
        .map(|(qty, price, tag)| OrderIntent { qty, price, tag })
        .collect()
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
            initial_qty_pct: 0.02,
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
    fn no_op_when_flat_and_closed() {
        let entries = calc_long_entries(false, 1000.0, 0.0, 0.0, 100.0, 100.0, &market(), &side());
        assert_eq!(entries, vec![OrderIntent::sentinel()]);
    }

    #[test]
    fn initial_long_entry_matches_seed_scenario() {
        // balance=1000, wallet_exposure_limit=1.0, initial_qty_pct=0.02,
        // best_bid=100, lower_ema=100 -> qty = round(1000*1.0*0.02/100, 0.001) = 0.2.
        let entries = calc_long_entries(true, 1000.0, 0.0, 0.0, 100.0, 100.0, &market(), &side());
        assert_eq!(entries.len(), 1);
        assert!((entries[0].qty - 0.2).abs() < 1e-9);
        assert!((entries[0].price - 100.0).abs() < 1e-9);
        assert_eq!(entries[0].tag, OrderTag::LongIentry);
    }

    #[test]
    fn closes_delegate_to_close_grid() {
        let closes = calc_long_closes(1000.0, 0.2, 100.0, 101.0, 102.0, false, &market(), &side());
        let sum: f64 = closes.iter().map(|c| c.qty).sum();
        assert!((sum + 0.2).abs() < 1e-6);
    }

    #[test]
    fn full_exposure_returns_sentinel() {
        let entries = calc_long_entries(true, 1000.0, 10.0, 100.0, 99.0, 99.0, &market(), &side());
        assert_eq!(entries, vec![OrderIntent::sentinel()]);
    }
}
