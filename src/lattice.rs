//! Lattice rounding and numeric primitives shared by every other module.
//!
//! Every quantity the core emits sits on a price or quantity lattice whose
//! quantum is defined per-symbol (`price_step`, `qty_step`). Rounding
//! divides, applies floor/ceil/round, multiplies back, then rounds again
//! to `SAFETY_ROUNDING` decimal places to absorb the binary-float drift
//! the first multiply-back introduces. This is deliberate: the downstream
//! solvers rely on the same drift-absorption behavior to converge.

/// Decimal places used to re-round after a step division/multiplication,
/// absorbing IEEE-754 drift.
const SAFETY_ROUNDING: i32 = 10;

/// Direction to round towards when snapping a value onto a step lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundDir {
    Down,
    Up,
    Nearest,
}

fn round_to_decimals(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

/// Rounds `x` onto the lattice defined by `step`, in the given direction.
#[must_use]
pub fn round_to_step(x: f64, step: f64, dir: RoundDir) -> f64 {
    if step == 0.0 {
        return x;
    }
    let divided = round_to_decimals(x / step, SAFETY_ROUNDING);
    let snapped = match dir {
        RoundDir::Down => divided.floor(),
        RoundDir::Up => divided.ceil(),
        RoundDir::Nearest => divided.round(),
    };
    round_to_decimals(snapped * step, SAFETY_ROUNDING)
}

/// Rounds down to the nearest multiple of `step`.
#[must_use]
pub fn round_dn(x: f64, step: f64) -> f64 {
    round_to_step(x, step, RoundDir::Down)
}

/// Rounds up to the nearest multiple of `step`.
#[must_use]
pub fn round_up(x: f64, step: f64) -> f64 {
    round_to_step(x, step, RoundDir::Up)
}

/// Rounds to the nearest multiple of `step`.
#[must_use]
pub fn round_(x: f64, step: f64) -> f64 {
    round_to_step(x, step, RoundDir::Nearest)
}

/// Rounds `n` to `d` significant digits of magnitude.
#[must_use]
pub fn round_dynamic(n: f64, d: i32) -> f64 {
    if n == 0.0 {
        return n;
    }
    let magnitude = n.abs().log10().floor() as i32;
    round_to_decimals(n, d - magnitude - 1)
}

/// NaN-safe coercion to zero.
#[must_use]
pub fn nan_to_0(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x }
}

/// Single-value (or, via repeated calls, vector) exponential moving
/// average update: `prev * (1 - alpha) + x * alpha`.
#[must_use]
pub fn calc_ema(alpha: f64, one_minus_alpha: f64, prev: f64, x: f64) -> f64 {
    prev * one_minus_alpha + x * alpha
}

/// Updates a vector of EMAs sharing per-index alphas in one pass. Used for
/// the three-span EMA bands kept per side in the backtest simulator.
pub fn calc_emas(alphas: &[f64], alphas_: &[f64], prev: &mut [f64], x: f64) {
    for i in 0..prev.len() {
        prev[i] = calc_ema(alphas[i], alphas_[i], prev[i], x);
    }
}

/// Effective minimum order quantity at `price`: `min_qty` on inverse
/// markets, `max(min_qty, ceil(min_cost/price))` on linear markets.
#[must_use]
pub fn calc_min_entry_qty(
    price: f64,
    inverse: bool,
    qty_step: f64,
    min_qty: f64,
    min_cost: f64,
) -> f64 {
    if inverse {
        min_qty
    } else {
        let from_cost = if price > 0.0 {
            round_up(min_cost / price, qty_step)
        } else {
            0.0
        };
        min_qty.max(from_cost)
    }
}

/// Converts a notional cost into a quantity at `price`.
#[must_use]
pub fn cost_to_qty(cost: f64, price: f64, inverse: bool, c_mult: f64) -> f64 {
    if inverse {
        cost * price / c_mult
    } else if price > 0.0 {
        cost / price
    } else {
        0.0
    }
}

/// Converts a quantity into notional cost at `price`.
#[must_use]
pub fn qty_to_cost(qty: f64, price: f64, inverse: bool, c_mult: f64) -> f64 {
    if inverse {
        (if price > 0.0 { (qty / price).abs() } else { 0.0 }) * c_mult
    } else {
        (qty * price).abs()
    }
}

/// Realized/unrealized PnL for a long position closing `qty` at `close_price`.
#[must_use]
pub fn calc_long_pnl(entry_price: f64, close_price: f64, qty: f64, inverse: bool, c_mult: f64) -> f64 {
    if inverse {
        if entry_price == 0.0 || close_price == 0.0 {
            return 0.0;
        }
        qty.abs() * c_mult * (1.0 / entry_price - 1.0 / close_price)
    } else {
        qty.abs() * (close_price - entry_price)
    }
}

/// Realized/unrealized PnL for a short position closing `qty` at `close_price`.
#[must_use]
pub fn calc_short_pnl(entry_price: f64, close_price: f64, qty: f64, inverse: bool, c_mult: f64) -> f64 {
    if inverse {
        if entry_price == 0.0 || close_price == 0.0 {
            return 0.0;
        }
        qty.abs() * c_mult * (1.0 / close_price - 1.0 / entry_price)
    } else {
        qty.abs() * (entry_price - close_price)
    }
}

/// Relative difference `|x - y| / |y|`.
#[must_use]
pub fn calc_diff(x: f64, y: f64) -> f64 {
    (x - y).abs() / y.abs()
}

/// Geometric-like sequence of `n` values spanning `[a, b]`. When `base ==
/// 1.0` this degenerates to a plain linear sequence; otherwise it rescales
/// `base^i` for `i` in `[0, n)` onto `[a, b]`. Used to space entry-grid
/// prices so early rungs are closer together than late ones.
#[must_use]
pub fn basespace(a: f64, b: f64, base: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![a];
    }
    if base == 1.0 {
        return linspace(a, b, n);
    }
    let raw: Vec<f64> = (0..n).map(|i| base.powi(i as i32)).collect();
    let lo = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    raw.iter().map(|v| (v - lo) / (hi - lo) * (b - a) + a).collect()
}

/// Evenly spaced sequence of `n` values from `a` to `b` inclusive.
#[must_use]
pub fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![a];
    }
    let step = (b - a) / (n - 1) as f64;
    (0..n).map(|i| a + step * i as f64).collect()
}

/// Lagrange interpolation of `x` given sample points `(xs, ys)`. Used by
/// the wallet-exposure solvers to invert a monotonic-ish function from two
/// evaluated points.
#[must_use]
pub fn interpolate(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let mut total = 0.0;
    for j in 0..xs.len() {
        let mut term = ys[j];
        for m in 0..xs.len() {
            if m != j {
                term *= (x - xs[m]) / (xs[j] - xs[m]);
            }
        }
        total += term;
    }
    total
}
