//! Whole-grid builder: constructs a theoretical entry ladder that
//! exactly consumes a wallet-exposure budget, solving numerically for the
//! one free parameter (`eprice_pprice_diff_wallet_exposure_weighting`)
//! that makes the last rung land on the target.

use crate::config::{MarketParams, SideConfig};
use crate::grid::GridRow;
use crate::lattice::{
    basespace, calc_min_entry_qty, cost_to_qty, interpolate, qty_to_cost, round_, round_dn, round_up,
};
use crate::position::calc_new_psize_pprice;

/// Row-i long entry qty solved so the post-fill cumulative position price
/// sits `eprice_pprice_diff` away from `entry_price`.
fn calc_long_entry_qty(psize: f64, pprice: f64, entry_price: f64, eprice_pprice_diff: f64) -> f64 {
    -(psize * (entry_price * eprice_pprice_diff + entry_price - pprice) / (entry_price * eprice_pprice_diff))
}

/// Row-i short entry qty, symmetric to [`calc_long_entry_qty`].
fn calc_short_entry_qty(psize: f64, pprice: f64, entry_price: f64, eprice_pprice_diff: f64) -> f64 {
    -((psize * (entry_price * (eprice_pprice_diff - 1.0) + pprice)) / (entry_price * eprice_pprice_diff))
}

/// Qty of the initial ("row 0") entry: the larger of the effective
/// minimum and the configured fraction of the wallet-exposure budget.
#[must_use]
pub fn calc_initial_entry_qty(balance: f64, initial_entry_price: f64, market: &MarketParams, side: &SideConfig) -> f64 {
    calc_min_entry_qty(initial_entry_price, market.inverse, market.qty_step, market.min_qty, market.min_cost).max(
        round_(
            cost_to_qty(
                balance * side.wallet_exposure_limit * side.initial_qty_pct,
                initial_entry_price,
                market.inverse,
                market.c_mult,
            ),
            market.qty_step,
        ),
    )
}

/// Evaluates a full long entry grid for a given
/// `eprice_pprice_diff_wallet_exposure_weighting` guess, without solving
/// for it. `max_n_entry_orders` rows are priced geometrically between
/// `initial_entry_price` and `initial_entry_price * (1 - grid_span)`.
#[must_use]
pub fn eval_long_entry_grid(
    balance: f64,
    initial_entry_price: f64,
    market: &MarketParams,
    side: &SideConfig,
    weighting: f64,
    prev_pprice: Option<f64>,
) -> Vec<GridRow> {
    let n = side.max_n_entry_orders;
    let prices: Vec<f64> = basespace(
        initial_entry_price,
        initial_entry_price * (1.0 - side.grid_span),
        side.eprice_exp_base,
        n,
    )
    .into_iter()
    .map(|p| round_dn(p, market.price_step))
    .collect();

    let mut grid = vec![GridRow::default(); n];
    grid[0].price = prices[0];
    grid[0].qty = calc_initial_entry_qty(balance, initial_entry_price, market, side);
    grid[0].cum_psize = grid[0].qty;
    grid[0].cum_pprice = prev_pprice.unwrap_or(grid[0].price);
    grid[0].cum_wallet_exposure =
        qty_to_cost(grid[0].cum_psize, grid[0].cum_pprice, market.inverse, market.c_mult) / balance;

    let (mut psize, mut pprice) = (grid[0].cum_psize, grid[0].cum_pprice);
    for i in 1..n {
        grid[i].price = prices[i];
        let adjusted_diff = side.eprice_pprice_diff * (1.0 + grid[i - 1].cum_wallet_exposure * weighting);
        let mut qty = round_(calc_long_entry_qty(psize, pprice, grid[i].price, adjusted_diff), market.qty_step);
        if qty < calc_min_entry_qty(grid[i].price, market.inverse, market.qty_step, market.min_qty, market.min_cost) {
            qty = 0.0;
        }
        let (new_psize, new_pprice) = calc_new_psize_pprice(psize, pprice, qty, grid[i].price, market.qty_step);
        psize = new_psize;
        pprice = new_pprice;
        grid[i].qty = qty;
        grid[i].cum_psize = psize;
        grid[i].cum_pprice = pprice;
        grid[i].cum_wallet_exposure = qty_to_cost(psize, pprice, market.inverse, market.c_mult) / balance;
    }
    grid
}

/// Short-side counterpart of [`eval_long_entry_grid`]: prices rise toward
/// `initial_entry_price * (1 + grid_span)` and quantities are negative.
#[must_use]
pub fn eval_short_entry_grid(
    balance: f64,
    initial_entry_price: f64,
    market: &MarketParams,
    side: &SideConfig,
    weighting: f64,
    prev_pprice: Option<f64>,
) -> Vec<GridRow> {
    let n = side.max_n_entry_orders;
    let prices: Vec<f64> = basespace(
        initial_entry_price,
        initial_entry_price * (1.0 + side.grid_span),
        side.eprice_exp_base,
        n,
    )
    .into_iter()
    .map(|p| round_up(p, market.price_step))
    .collect();

    let mut grid = vec![GridRow::default(); n];
    grid[0].price = prices[0];
    grid[0].qty = -calc_initial_entry_qty(balance, initial_entry_price, market, side);
    grid[0].cum_psize = grid[0].qty;
    grid[0].cum_pprice = prev_pprice.unwrap_or(grid[0].price);
    grid[0].cum_wallet_exposure =
        qty_to_cost(grid[0].cum_psize, grid[0].cum_pprice, market.inverse, market.c_mult) / balance;

    let (mut psize, mut pprice) = (grid[0].cum_psize, grid[0].cum_pprice);
    for i in 1..n {
        grid[i].price = prices[i];
        let adjusted_diff = side.eprice_pprice_diff * (1.0 + grid[i - 1].cum_wallet_exposure * weighting);
        let mut qty = round_(calc_short_entry_qty(psize, pprice, grid[i].price, adjusted_diff), market.qty_step);
        if -qty < calc_min_entry_qty(grid[i].price, market.inverse, market.qty_step, market.min_qty, market.min_cost) {
            qty = 0.0;
        }
        let (new_psize, new_pprice) = calc_new_psize_pprice(psize, pprice, qty, grid[i].price, market.qty_step);
        psize = new_psize;
        pprice = new_pprice;
        grid[i].qty = qty;
        grid[i].cum_psize = psize;
        grid[i].cum_pprice = pprice;
        grid[i].cum_wallet_exposure = qty_to_cost(psize, pprice, market.inverse, market.c_mult) / balance;
    }
    grid
}

/// Solves for the weighting parameter `w` such that `eval_*_entry_grid`'s
/// last row lands on `side.wallet_exposure_limit` within 1% relative
/// error, bisecting between a too-low and too-high bracket.
#[must_use]
pub fn find_eprice_pprice_diff_wallet_exposure_weighting(
    is_long: bool,
    balance: f64,
    initial_entry_price: f64,
    market: &MarketParams,
    side: &SideConfig,
    prev_pprice: Option<f64>,
) -> f64 {
    let eval = |w: f64| -> f64 {
        let grid = if is_long {
            eval_long_entry_grid(balance, initial_entry_price, market, side, w, prev_pprice)
        } else {
            eval_short_entry_grid(balance, initial_entry_price, market, side, w, prev_pprice)
        };
        grid.last().map_or(0.0, |r| r.cum_wallet_exposure)
    };

    let error_tolerance = 0.01;
    let max_n_iters = 20;

    let mut guess = 0.0;
    let mut val = eval(guess);
    if val < side.wallet_exposure_limit {
        return guess;
    }
    let mut too_low = (guess, val);

    guess = 1000.0;
    val = eval(guess);
    if val > side.wallet_exposure_limit {
        guess = 10_000.0;
        val = eval(guess);
        if val > side.wallet_exposure_limit {
            guess = 100_000.0;
            val = eval(guess);
            if val > side.wallet_exposure_limit {
                return guess;
            }
        }
    }
    let mut too_high = (guess, val);

    // The bootstrap guess here inverts (xs, ys) relative to every other
    // `interpolate` call site in this module and in close.rs (which all use
    // xs=vals, ys=guesses): it passes xs=guesses, ys=vals instead, matching
    // njit_funcs.py's own argument order at this one call site. Preserved
    // verbatim for backtest-reproducibility; see DESIGN.md.
    guess = interpolate(
        side.wallet_exposure_limit,
        &[too_low.0, too_high.0],
        &[too_low.1, too_high.1],
    );
    val = eval(guess);
    if val < side.wallet_exposure_limit {
        too_high = (guess, val);
    } else {
        too_low = (guess, val);
    }

    let mut old_guess = 0.0;
    let mut best_guess = ((val - side.wallet_exposure_limit).abs() / side.wallet_exposure_limit, guess, val);
    for i in 1..=max_n_iters {
        let diff = (val - side.wallet_exposure_limit).abs() / side.wallet_exposure_limit;
        if diff < best_guess.0 {
            best_guess = (diff, guess, val);
        }
        if diff < error_tolerance {
            return best_guess.1;
        }
        if i >= max_n_iters || (old_guess - guess).abs() / guess < error_tolerance * 0.1 {
            return best_guess.1;
        }
        old_guess = guess;
        guess = (too_high.0 + too_low.0) / 2.0;
        val = eval(guess);
        if val < side.wallet_exposure_limit {
            too_high = (guess, val);
        } else {
            too_low = (guess, val);
        }
    }
    best_guess.1
}

/// Additional qty whose fill brings `cost(new_position)/balance` to
/// `target_we`, via two-point interpolation.
/// Emits a `tracing::debug!` trace (never an error) if the best guess's
/// residual relative error exceeds 0.15.
#[must_use]
pub fn find_qty_bringing_wallet_exposure_to_target(
    balance: f64,
    psize: f64,
    pprice: f64,
    target_we: f64,
    entry_price: f64,
    market: &MarketParams,
) -> f64 {
    use crate::position::calc_wallet_exposure_if_filled;

    let wallet_exposure = qty_to_cost(psize, pprice, market.inverse, market.c_mult) / balance;
    if wallet_exposure >= target_we * 0.98 {
        return 0.0;
    }
    let guess1 = round_(
        cost_to_qty(balance * (target_we - wallet_exposure), entry_price, market.inverse, market.c_mult),
        market.qty_step,
    );
    let guess2 = round_((guess1 * 1.2).max(guess1 + market.qty_step), market.qty_step);
    let val1 = calc_wallet_exposure_if_filled(
        balance, psize, pprice, guess1, entry_price, market.inverse, market.c_mult, market.qty_step,
    );
    let val2 = calc_wallet_exposure_if_filled(
        balance, psize, pprice, guess2, entry_price, market.inverse, market.c_mult, market.qty_step,
    );
    let guess = round_(interpolate(target_we, &[val1, val2], &[guess1, guess2]), market.qty_step);
    let val = calc_wallet_exposure_if_filled(
        balance, psize, pprice, guess, entry_price, market.inverse, market.c_mult, market.qty_step,
    );
    if (val - target_we).abs() / target_we > 0.15 {
        tracing::debug!(
            balance, psize, pprice, target_we, entry_price, guess, val,
            "find_qty_bringing_wallet_exposure_to_target exceeded error tolerance"
        );
    }
    guess
}

/// Truncates allocations below 5% to zero. Allocations `>= 1.0` are a
/// configuration error caught by [`SideConfig::validate`] at load time, so
/// by the time a grid is built here the value is already known-good.
fn effective_secondary_allocation(secondary_allocation: f64) -> f64 {
    if secondary_allocation <= 0.05 { 0.0 } else { secondary_allocation }
}

/// Builds the full theoretical long entry grid (primary rungs plus, when
/// `secondary_allocation > 0.05`, one trailing secondary rung), targeting
/// `side.wallet_exposure_limit` exactly. Only rows with positive qty
/// survive in the returned grid — dead rows (qty rounded to zero) are
/// dropped.
#[must_use]
pub fn calc_whole_long_entry_grid(
    balance: f64,
    initial_entry_price: f64,
    market: &MarketParams,
    side: &SideConfig,
    prev_pprice: Option<f64>,
) -> Vec<GridRow> {
    let secondary_allocation = effective_secondary_allocation(side.secondary_allocation);
    let primary_allocation = 1.0 - secondary_allocation;
    let mut primary_side = *side;
    primary_side.wallet_exposure_limit = side.wallet_exposure_limit * primary_allocation;
    primary_side.initial_qty_pct = side.initial_qty_pct / primary_allocation;

    let weighting =
        find_eprice_pprice_diff_wallet_exposure_weighting(true, balance, initial_entry_price, market, &primary_side, prev_pprice);
    let mut grid = eval_long_entry_grid(balance, initial_entry_price, market, &primary_side, weighting, prev_pprice);

    if secondary_allocation > 0.0 {
        if let Some(last) = grid.last().copied() {
            let entry_price =
                round_dn(last.cum_pprice * (1.0 - side.secondary_pprice_diff), market.price_step).min(last.price);
            let qty = find_qty_bringing_wallet_exposure_to_target(
                balance, last.cum_psize, last.cum_pprice, side.wallet_exposure_limit, entry_price, market,
            );
            let (new_psize, new_pprice) = calc_new_psize_pprice(last.cum_psize, last.cum_pprice, qty, entry_price, market.qty_step);
            grid.push(GridRow {
                qty,
                price: entry_price,
                cum_psize: new_psize,
                cum_pprice: new_pprice,
                cum_wallet_exposure: qty_to_cost(new_psize, new_pprice, market.inverse, market.c_mult) / balance,
            });
        }
    }
    grid.retain(|row| row.qty > 0.0);
    grid
}

/// Short-side counterpart of [`calc_whole_long_entry_grid`].
#[must_use]
pub fn calc_whole_short_entry_grid(
    balance: f64,
    initial_entry_price: f64,
    market: &MarketParams,
    side: &SideConfig,
    prev_pprice: Option<f64>,
) -> Vec<GridRow> {
    let secondary_allocation = effective_secondary_allocation(side.secondary_allocation);
    let primary_allocation = 1.0 - secondary_allocation;
    let mut primary_side = *side;
    primary_side.wallet_exposure_limit = side.wallet_exposure_limit * primary_allocation;
    primary_side.initial_qty_pct = side.initial_qty_pct / primary_allocation;

    let weighting =
        find_eprice_pprice_diff_wallet_exposure_weighting(false, balance, initial_entry_price, market, &primary_side, prev_pprice);
    let mut grid = eval_short_entry_grid(balance, initial_entry_price, market, &primary_side, weighting, prev_pprice);

    if secondary_allocation > 0.0 {
        if let Some(last) = grid.last().copied() {
            let entry_price =
                round_up(last.cum_pprice * (1.0 + side.secondary_pprice_diff), market.price_step).max(last.price);
            let qty = -find_qty_bringing_wallet_exposure_to_target(
                balance, last.cum_psize, last.cum_pprice, side.wallet_exposure_limit, entry_price, market,
            );
            let (new_psize, new_pprice) = calc_new_psize_pprice(last.cum_psize, last.cum_pprice, qty, entry_price, market.qty_step);
            grid.push(GridRow {
                qty,
                price: entry_price,
                cum_psize: new_psize,
                cum_pprice: new_pprice,
                cum_wallet_exposure: qty_to_cost(new_psize, new_pprice, market.inverse, market.c_mult) / balance,
            });
        }
    }
    grid.retain(|row| row.qty < 0.0);
    grid
}
