//! The pure numeric grid core: whole-grid construction, live
//! reprojection, close-grid construction, and order-intent
//! assembly.
//!
//! Every function below is pure and synchronous and never returns `Err`
//! for data-dependent conditions — the only way to misuse it is to pass a
//! [`crate::config::SideConfig`] that fails its own `validate()`, which is
//! checked once at configuration-load time, not on every call.

pub mod approximate;
pub mod close;
pub mod entry;
pub mod intent;

use serde::{Deserialize, Serialize};

/// One row of a theoretical entry grid: this rung's own qty/price, plus
/// the cumulative position state after it (and every earlier rung) fills.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridRow {
    pub qty: f64,
    pub price: f64,
    pub cum_psize: f64,
    pub cum_pprice: f64,
    pub cum_wallet_exposure: f64,
}

/// A single resting order the core wants placed: signed `qty` (positive =
/// buy, negative = sell), `price`, and a stable `tag` describing why.
/// `(0.0, 0.0, OrderTag::None)` is the sentinel meaning "nothing to do."
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub qty: f64,
    pub price: f64,
    pub tag: OrderTag,
}

impl OrderIntent {
    #[must_use]
    pub fn sentinel() -> Self {
        Self { qty: 0.0, price: 0.0, tag: OrderTag::None }
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.qty == 0.0 && self.price == 0.0
    }
}

/// Stable, externally-visible order-reason tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTag {
    None,
    LongIentry,
    LongPrimaryRentry,
    LongSecondaryRentry,
    LongNclose,
    LongAutoUnstuckEntry,
    LongAutoUnstuckClose,
    LongBankruptcy,
    ShortIentry,
    ShortPrimaryRentry,
    ShortSecondaryRentry,
    ShortNclose,
    ShortAutoUnstuckEntry,
    ShortAutoUnstuckClose,
    ShortBankruptcy,
}

impl OrderTag {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderTag::None => "",
            OrderTag::LongIentry => "long_ientry",
            OrderTag::LongPrimaryRentry => "long_primary_rentry",
            OrderTag::LongSecondaryRentry => "long_secondary_rentry",
            OrderTag::LongNclose => "long_nclose",
            OrderTag::LongAutoUnstuckEntry => "long_auto_unstuck_entry",
            OrderTag::LongAutoUnstuckClose => "long_auto_unstuck_close",
            OrderTag::LongBankruptcy => "long_bankruptcy",
            OrderTag::ShortIentry => "short_ientry",
            OrderTag::ShortPrimaryRentry => "short_primary_rentry",
            OrderTag::ShortSecondaryRentry => "short_secondary_rentry",
            OrderTag::ShortNclose => "short_nclose",
            OrderTag::ShortAutoUnstuckEntry => "short_auto_unstuck_entry",
            OrderTag::ShortAutoUnstuckClose => "short_auto_unstuck_close",
            OrderTag::ShortBankruptcy => "short_bankruptcy",
        }
    }
}

impl std::fmt::Display for OrderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
