//! Grid approximator: projects the theoretical whole grid onto a
//! live, possibly partially-filled position and reports only the entries
//! still outstanding.

use crate::config::{MarketParams, SideConfig};
use crate::grid::entry::{calc_whole_long_entry_grid, calc_whole_short_entry_grid};
use crate::grid::GridRow;
use crate::lattice::{calc_diff, calc_min_entry_qty, qty_to_cost, round_};
use crate::position::calc_new_psize_pprice;

/// Finds the row whose `cum_psize` is closest (relative) to `psize`,
/// returning `(grid, relative_diff, index)`.
fn closest_row(grid: &[GridRow], psize: f64) -> (f64, usize) {
    grid.iter()
        .enumerate()
        .map(|(i, row)| (calc_diff(row.cum_psize, psize), i))
        .fold((f64::INFINITY, 0usize), |best, cur| if cur.0 < best.0 { cur } else { best })
}

fn closest_row_abs(grid: &[GridRow], abs_psize: f64) -> (f64, usize) {
    grid.iter()
        .enumerate()
        .map(|(i, row)| (calc_diff(row.cum_psize.abs(), abs_psize), i))
        .fold((f64::INFINITY, 0usize), |best, cur| if cur.0 < best.0 { cur } else { best })
}

/// Reprojects the theoretical long entry grid onto a live `(psize,
/// pprice)`, returning the rows still outstanding.
#[must_use]
pub fn approximate_long_grid(balance: f64, psize: f64, pprice: f64, market: &MarketParams, side: &SideConfig) -> Vec<GridRow> {
    assert!(pprice != 0.0, "cannot make grid without pprice");
    if psize == 0.0 {
        return calc_whole_long_entry_grid(balance, pprice, market, side, None);
    }

    let eval = |price_guess: f64, psize_: f64| -> (Vec<GridRow>, f64, usize) {
        let price_guess = round_(price_guess, market.price_step);
        let grid = calc_whole_long_entry_grid(balance, price_guess, market, side, None);
        let (diff, i) = closest_row(&grid, psize_);
        (grid, diff, i)
    };

    let (grid0, _, i0) = eval(pprice, psize);
    let (mut grid, diff, i) = eval(pprice * (pprice / grid0[i0].cum_pprice), psize);

    if diff < 0.01 {
        let (refined, _, ri) = eval(grid[0].price * (pprice / grid[i].cum_pprice), psize);
        return refined[ri + 1..].to_vec();
    }

    // No close match: assume a partial fill at the next rung.
    let mut k = 0usize;
    while k < grid.len() - 1 && grid[k].cum_psize <= psize * 0.99999 {
        k += 1;
    }
    if k == 0 {
        let min_ientry_qty = calc_min_entry_qty(grid[0].price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
        grid[0].qty = min_ientry_qty.max(round_(grid[0].qty - psize, market.qty_step));
        grid[0].cum_psize = round_(psize + grid[0].qty, market.qty_step);
        grid[0].cum_wallet_exposure = qty_to_cost(grid[0].cum_psize, grid[0].cum_pprice, market.inverse, market.c_mult) / balance;
        return grid;
    }
    if k == grid.len() {
        return Vec::new();
    }

    let (mut psize_h, mut pprice_h) = (psize, pprice);
    for _ in 0..5 {
        let remaining_qty = round_(grid[k].cum_psize - psize_h, market.qty_step);
        let (npsize, npprice) = calc_new_psize_pprice(psize_h, pprice_h, remaining_qty, grid[k].price, market.qty_step);
        psize_h = npsize;
        pprice_h = npprice;
        let (g, _, _) = eval(npprice, npsize);
        grid = g;
        if k >= grid.len() {
            k = grid.len() - 1;
            continue;
        }
        let (g2, _, _) = eval(npprice * (npprice / grid[k].cum_pprice), npsize);
        grid = g2;
        k = 0;
        while k < grid.len() - 1 && grid[k].cum_psize <= psize * 0.99999 {
            k += 1;
        }
    }
    let min_entry_qty = calc_min_entry_qty(grid[k].price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
    grid[k].qty = min_entry_qty.max(round_(grid[k].cum_psize - psize, market.qty_step));
    grid[k..].to_vec()
}

/// Short-side counterpart of [`approximate_long_grid`].
#[must_use]
pub fn approximate_short_grid(balance: f64, psize: f64, pprice: f64, market: &MarketParams, side: &SideConfig) -> Vec<GridRow> {
    assert!(pprice != 0.0, "cannot make grid without pprice");
    let abs_psize = psize.abs();
    if psize == 0.0 {
        return calc_whole_short_entry_grid(balance, pprice, market, side, None);
    }

    let eval = |price_guess: f64, psize_: f64| -> (Vec<GridRow>, f64, usize) {
        let price_guess = round_(price_guess, market.price_step);
        let grid = calc_whole_short_entry_grid(balance, price_guess, market, side, None);
        let (diff, i) = closest_row_abs(&grid, psize_.abs());
        (grid, diff, i)
    };

    let (grid0, _, i0) = eval(pprice, psize);
    let (mut grid, diff, i) = eval(pprice * (pprice / grid0[i0].cum_pprice), psize);

    if diff < 0.01 {
        let (refined, _, ri) = eval(grid[0].price * (pprice / grid[i].cum_pprice), psize);
        return refined[ri + 1..].to_vec();
    }

    let mut k = 0usize;
    while k < grid.len() - 1 && grid[k].cum_psize.abs() <= abs_psize * 0.99999 {
        k += 1;
    }
    if k == 0 {
        let min_ientry_qty = calc_min_entry_qty(grid[0].price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
        grid[0].qty = -min_ientry_qty.max(round_(grid[0].qty.abs() - abs_psize, market.qty_step));
        grid[0].cum_psize = round_(psize + grid[0].qty, market.qty_step);
        grid[0].cum_wallet_exposure = qty_to_cost(grid[0].cum_psize, grid[0].cum_pprice, market.inverse, market.c_mult) / balance;
        return grid;
    }
    if k == grid.len() {
        return Vec::new();
    }

    let (mut psize_h, mut pprice_h) = (psize, pprice);
    for _ in 0..5 {
        let remaining_qty = round_(grid[k].cum_psize - psize_h, market.qty_step);
        let (npsize, npprice) = calc_new_psize_pprice(psize_h, pprice_h, remaining_qty, grid[k].price, market.qty_step);
        psize_h = npsize;
        pprice_h = npprice;
        let (g, _, _) = eval(npprice, npsize);
        grid = g;
        if k >= grid.len() {
            k = grid.len() - 1;
            continue;
        }
        let (g2, _, _) = eval(npprice * (npprice / grid[k].cum_pprice), npsize);
        grid = g2;
        k = 0;
        while k < grid.len() - 1 && grid[k].cum_psize.abs() <= abs_psize * 0.99999 {
            k += 1;
        }
    }
    let min_entry_qty = calc_min_entry_qty(grid[k].price, market.inverse, market.qty_step, market.min_qty, market.min_cost);
    grid[k].qty = -min_entry_qty.max(round_(grid[k].cum_psize.abs() - abs_psize, market.qty_step));
    grid[k..].to_vec()
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
    fn no_position_returns_whole_grid() {
        let grid = approximate_long_grid(1000.0, 0.0, 100.0, &market(), &side());
        assert_eq!(grid.len(), 8);
    }

    #[test]
    fn partial_initial_fill_reduces_row_zero_qty() {
        // Row 0 qty is ~0.2 at price 100 for this config; psize=0.05 at
        // pprice=100 should reduce it to round(0.2 - 0.05, qty_step).
        let whole = approximate_long_grid(1000.0, 0.0, 100.0, &market(), &side());
        let iqty = whole[0].qty;
        let grid = approximate_long_grid(1000.0, 0.05, 100.0, &market(), &side());
        assert!((grid[0].qty - (iqty - 0.05)).abs() < 1e-6, "row0 qty = {}", grid[0].qty);
    }
}
