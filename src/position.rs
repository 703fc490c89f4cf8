//! Position algebra: weighted-average fill pricing, wallet exposure, and
//! bankruptcy-price calculation.

use crate::lattice::{calc_long_pnl, calc_short_pnl, nan_to_0, qty_to_cost, round_};

/// One side of a position: a signed size and its weighted-average price.
/// Long size is `>= 0`, short size is `<= 0`. Price is `0.0` iff size is
/// `0.0` — there is no such thing as a flat position with a stale price.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub size: f64,
    pub price: f64,
}

impl Position {
    #[must_use]
    pub fn flat() -> Self {
        Self { size: 0.0, price: 0.0 }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }

    /// Notional cost of this position.
    #[must_use]
    pub fn cost(&self, inverse: bool, c_mult: f64) -> f64 {
        qty_to_cost(self.size, self.price, inverse, c_mult)
    }

    /// Wallet exposure: `cost(position) / balance`.
    #[must_use]
    pub fn wallet_exposure(&self, balance: f64, inverse: bool, c_mult: f64) -> f64 {
        self.cost(inverse, c_mult) / balance
    }
}

/// New `(size, price)` after filling `qty` at `price` against an existing
/// position. If `qty == 0` the position is unchanged. If the new size
/// rounds to zero, both fields reset to zero rather than leaving a stale
/// price behind (P7 round-trip invariant).
#[must_use]
pub fn calc_new_psize_pprice(psize: f64, pprice: f64, qty: f64, price: f64, qty_step: f64) -> (f64, f64) {
    if qty == 0.0 {
        return (psize, pprice);
    }
    let new_psize = round_(psize + qty, qty_step);
    if new_psize == 0.0 {
        return (0.0, 0.0);
    }
    let new_pprice = nan_to_0(pprice) * (psize / new_psize) + price * (qty / new_psize);
    (new_psize, new_pprice)
}

/// Wallet exposure the position would have after filling `qty` at `price`.
#[must_use]
pub fn calc_wallet_exposure_if_filled(
    balance: f64,
    psize: f64,
    pprice: f64,
    qty: f64,
    price: f64,
    inverse: bool,
    c_mult: f64,
    qty_step: f64,
) -> f64 {
    let psize = round_(psize.abs(), qty_step);
    let qty = round_(qty.abs(), qty_step);
    let (new_psize, new_pprice) = calc_new_psize_pprice(psize, pprice, qty, price, qty_step);
    qty_to_cost(new_psize, new_pprice, inverse, c_mult) / balance
}

/// Mark price at which account equity reaches zero given both sides'
/// positions. Returns `0.0` when the denominator vanishes (flat book);
/// clamped to `>= 0.0` otherwise.
#[must_use]
pub fn calc_bankruptcy_price(
    balance: f64,
    long_psize: f64,
    long_pprice: f64,
    short_psize: f64,
    short_pprice: f64,
    inverse: bool,
    c_mult: f64,
) -> f64 {
    let long_pprice = nan_to_0(long_pprice);
    let short_pprice = nan_to_0(short_pprice);
    let long_psize = long_psize * c_mult;
    let abs_short_psize = short_psize.abs() * c_mult;
    let bankruptcy_price = if inverse {
        let short_cost = if short_pprice > 0.0 { abs_short_psize / short_pprice } else { 0.0 };
        let long_cost = if long_pprice > 0.0 { long_psize / long_pprice } else { 0.0 };
        let denominator = short_cost - long_cost - balance;
        if denominator == 0.0 {
            return 0.0;
        }
        (abs_short_psize - long_psize) / denominator
    } else {
        let denominator = long_psize - abs_short_psize;
        if denominator == 0.0 {
            return 0.0;
        }
        (-balance + long_psize * long_pprice - abs_short_psize * short_pprice) / denominator
    };
    bankruptcy_price.max(0.0)
}

/// Account equity: balance plus unrealized PnL on both sides at `last_price`.
#[must_use]
pub fn calc_equity(
    balance: f64,
    long_psize: f64,
    long_pprice: f64,
    short_psize: f64,
    short_pprice: f64,
    last_price: f64,
    inverse: bool,
    c_mult: f64,
) -> f64 {
    let mut equity = balance;
    if long_pprice != 0.0 && long_psize != 0.0 {
        equity += calc_long_pnl(long_pprice, last_price, long_psize, inverse, c_mult);
    }
    if short_pprice != 0.0 && short_psize != 0.0 {
        equity += calc_short_pnl(short_pprice, last_price, short_psize, inverse, c_mult);
    }
    equity
}
