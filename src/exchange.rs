//! Exchange adapter contract: the narrow capability set a live driver
//! needs from one exchange connection, modeled as a trait with
//! per-exchange implementations, plus a [`BacktestAdapter`] that replays a
//! historical tick file instead of a live connection.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::Tick;
use crate::config::MarketParams;
use crate::error::GridError;
use crate::grid::OrderTag;

/// Best bid/ask/last snapshot for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
}

/// One resting order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub symbol: String,
    pub qty: Decimal,
    pub price: Decimal,
    pub tag: OrderTag,
}

/// Acknowledgement returned by a successful [`ExchangeAdapter::place_order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: String,
}

/// Both sides' position state for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SidePositions {
    pub long_psize: f64,
    pub long_pprice: f64,
    pub short_psize: f64,
    pub short_pprice: f64,
}

/// The capability set the grid core needs from a live exchange connection.
///
/// All I/O-bound methods are `async fn` since every concrete adapter will
/// issue network requests; the numeric core itself stays pure and
/// synchronous and never touches this trait directly — only the live
/// driver that wraps the order-intent assembler does.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Fetches the tradeable market universe.
    async fn fetch_markets(&self) -> crate::Result<Vec<MarketParams>>;

    /// Fetches available balance in `quote`.
    async fn fetch_balance(&self, quote: &str) -> crate::Result<f64>;

    /// Fetches current positions, keyed by symbol.
    async fn fetch_positions(&self) -> crate::Result<HashMap<String, SidePositions>>;

    /// Fetches currently resting orders across all symbols.
    async fn fetch_open_orders(&self) -> crate::Result<Vec<OpenOrder>>;

    /// Fetches the latest ticker for every subscribed symbol.
    async fn fetch_tickers(&self) -> crate::Result<HashMap<String, Ticker>>;

    /// Places a resting limit order. `qty` is signed: positive buys,
    /// negative sells.
    async fn place_order(&self, symbol: &str, qty: f64, price: f64, tag: OrderTag) -> crate::Result<OrderAck>;

    /// Cancels a previously-placed order by id.
    async fn cancel_order(&self, symbol: &str, id: &str) -> crate::Result<()>;
}

/// Replays a pre-loaded tick stream in place of a live exchange connection.
///
/// Unlike a real adapter, every method here is infallible and synchronous
/// under the hood — the `async fn` signatures exist only to satisfy
/// [`ExchangeAdapter`], so the same live-driver code path that works
/// against a real exchange also works against recorded history.
pub struct BacktestAdapter {
    symbol: String,
    market: MarketParams,
    ticks: Vec<Tick>,
    cursor: std::sync::atomic::AtomicUsize,
    balance: std::sync::Mutex<f64>,
    positions: std::sync::Mutex<SidePositions>,
    open_orders: std::sync::Mutex<Vec<OpenOrder>>,
    next_order_id: std::sync::atomic::AtomicU64,
}

impl BacktestAdapter {
    /// Builds an adapter over an already-loaded tick stream, starting at a
    /// given balance.
    #[must_use]
    pub fn new(symbol: String, market: MarketParams, ticks: Vec<Tick>, starting_balance: f64) -> Self {
        Self {
            symbol,
            market,
            ticks,
            cursor: std::sync::atomic::AtomicUsize::new(0),
            balance: std::sync::Mutex::new(starting_balance),
            positions: std::sync::Mutex::new(SidePositions::default()),
            open_orders: std::sync::Mutex::new(Vec::new()),
            next_order_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Reads ticks from a newline-delimited JSON file, one `[timestamp_ms,
    /// qty, price]` triple per line.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Io`] if the file cannot be read, or
    /// [`GridError::Json`] if a line fails to deserialize as a triple.
    pub fn load_ticks(path: &str) -> crate::Result<Vec<Tick>> {
        let contents = std::fs::read_to_string(path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let triple: (i64, f64, f64) = serde_json::from_str(line)?;
                Ok(Tick::from(triple))
            })
            .collect()
    }

    /// Advances the replay cursor by one tick, returning it, or `None` at
    /// end of stream.
    pub fn advance(&self) -> Option<Tick> {
        let idx = self.cursor.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.ticks.get(idx).copied()
    }
}

#[async_trait]
impl ExchangeAdapter for BacktestAdapter {
    async fn fetch_markets(&self) -> crate::Result<Vec<MarketParams>> {
        Ok(vec![self.market.clone()])
    }

    async fn fetch_balance(&self, _quote: &str) -> crate::Result<f64> {
        Ok(*self.balance.lock().expect("balance mutex poisoned"))
    }

    async fn fetch_positions(&self) -> crate::Result<HashMap<String, SidePositions>> {
        let mut map = HashMap::new();
        map.insert(self.symbol.clone(), *self.positions.lock().expect("positions mutex poisoned"));
        Ok(map)
    }

    async fn fetch_open_orders(&self) -> crate::Result<Vec<OpenOrder>> {
        Ok(self.open_orders.lock().expect("open_orders mutex poisoned").clone())
    }

    async fn fetch_tickers(&self) -> crate::Result<HashMap<String, Ticker>> {
        let idx = self.cursor.load(std::sync::atomic::Ordering::SeqCst).saturating_sub(1);
        let price = self.ticks.get(idx).map_or(0.0, |t| t.price);
        let last = Decimal::from_f64_retain(price).unwrap_or_default();
        let mut map = HashMap::new();
        map.insert(self.symbol.clone(), Ticker { bid: last, ask: last, last });
        Ok(map)
    }

    async fn place_order(&self, symbol: &str, qty: f64, price: f64, tag: OrderTag) -> crate::Result<OrderAck> {
        let id = self.next_order_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst).to_string();
        let order = OpenOrder {
            id: id.clone(),
            symbol: symbol.to_string(),
            qty: Decimal::from_f64_retain(qty).ok_or_else(|| GridError::Adapter(anyhow::anyhow!("qty {qty} is not representable as Decimal")))?,
            price: Decimal::from_f64_retain(price).ok_or_else(|| GridError::Adapter(anyhow::anyhow!("price {price} is not representable as Decimal")))?,
            tag,
        };
        self.open_orders.lock().expect("open_orders mutex poisoned").push(order);
        Ok(OrderAck { id })
    }

    async fn cancel_order(&self, _symbol: &str, id: &str) -> crate::Result<()> {
        self.open_orders.lock().expect("open_orders mutex poisoned").retain(|o| o.id != id);
        Ok(())
    }
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

    #[tokio::test]
    async fn backtest_adapter_reports_starting_balance() {
        let adapter = BacktestAdapter::new("BTC/USDT:USDT".to_string(), market(), Vec::new(), 1000.0);
        assert_eq!(adapter.fetch_balance("USDT").await.unwrap(), 1000.0);
    }

    #[tokio::test]
    async fn place_and_cancel_order_round_trips() {
        let adapter = BacktestAdapter::new("BTC/USDT:USDT".to_string(), market(), Vec::new(), 1000.0);
        let ack = adapter.place_order("BTC/USDT:USDT", 0.1, 100.0, OrderTag::LongIentry).await.unwrap();
        assert_eq!(adapter.fetch_open_orders().await.unwrap().len(), 1);
        adapter.cancel_order("BTC/USDT:USDT", &ack.id).await.unwrap();
        assert!(adapter.fetch_open_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn advance_walks_ticks_in_order() {
        let ticks = vec![Tick { timestamp_ms: 0, qty: 1.0, price: 100.0 }, Tick { timestamp_ms: 1000, qty: 1.0, price: 101.0 }];
        let adapter = BacktestAdapter::new("BTC/USDT:USDT".to_string(), market(), ticks, 1000.0);
        assert_eq!(adapter.advance().unwrap().price, 100.0);
        assert_eq!(adapter.advance().unwrap().price, 101.0);
        assert!(adapter.advance().is_none());
    }
}
