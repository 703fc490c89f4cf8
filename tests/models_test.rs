//! Serialization round-trips for the crate's externally-visible data
//! model: order intents/tags, position snapshots, and exchange-adapter
//! wire types.

use gridcore::exchange::{OpenOrder, SidePositions, Ticker};
use gridcore::grid::{OrderIntent, OrderTag};
use gridcore::position::Position;
use rust_decimal_macros::dec;

#[test]
fn order_tag_serializes_to_stable_snake_case_strings() {
    let pairs = [
        (OrderTag::LongIentry, "\"long_ientry\""),
        (OrderTag::LongPrimaryRentry, "\"long_primary_rentry\""),
        (OrderTag::LongSecondaryRentry, "\"long_secondary_rentry\""),
        (OrderTag::LongNclose, "\"long_nclose\""),
        (OrderTag::LongAutoUnstuckEntry, "\"long_auto_unstuck_entry\""),
        (OrderTag::LongAutoUnstuckClose, "\"long_auto_unstuck_close\""),
        (OrderTag::LongBankruptcy, "\"long_bankruptcy\""),
        (OrderTag::ShortIentry, "\"short_ientry\""),
        (OrderTag::ShortPrimaryRentry, "\"short_primary_rentry\""),
        (OrderTag::ShortSecondaryRentry, "\"short_secondary_rentry\""),
        (OrderTag::ShortNclose, "\"short_nclose\""),
        (OrderTag::ShortAutoUnstuckEntry, "\"short_auto_unstuck_entry\""),
        (OrderTag::ShortAutoUnstuckClose, "\"short_auto_unstuck_close\""),
        (OrderTag::ShortBankruptcy, "\"short_bankruptcy\""),
    ];
    for (tag, expected) in pairs {
        assert_eq!(serde_json::to_string(&tag).unwrap(), expected);
        assert_eq!(tag.as_str(), &expected[1..expected.len() - 1]);
    }
}

#[test]
fn order_tag_display_matches_as_str() {
    assert_eq!(OrderTag::LongNclose.to_string(), "long_nclose");
    assert_eq!(OrderTag::None.to_string(), "");
}

#[test]
fn order_intent_sentinel_round_trips_through_json() {
    let sentinel = OrderIntent::sentinel();
    assert!(sentinel.is_sentinel());
    let json = serde_json::to_string(&sentinel).unwrap();
    let back: OrderIntent = serde_json::from_str(&json).unwrap();
    assert_eq!(sentinel, back);
}

#[test]
fn order_intent_round_trips_through_json() {
    let intent = OrderIntent { qty: 0.2, price: 100.0, tag: OrderTag::LongIentry };
    let json = serde_json::to_string(&intent).unwrap();
    let back: OrderIntent = serde_json::from_str(&json).unwrap();
    assert_eq!(intent, back);
}

#[test]
fn position_round_trips_through_json() {
    let position = Position { size: 1.5, price: 100.25 };
    let json = serde_json::to_string(&position).unwrap();
    let back: Position = serde_json::from_str(&json).unwrap();
    assert_eq!(position, back);
}

#[test]
fn flat_position_has_zero_size_and_price() {
    let flat = Position::flat();
    assert!(flat.is_flat());
    assert_eq!(flat.size, 0.0);
    assert_eq!(flat.price, 0.0);
}

#[test]
fn side_positions_default_is_flat_both_sides() {
    let positions = SidePositions::default();
    assert_eq!(positions.long_psize, 0.0);
    assert_eq!(positions.short_psize, 0.0);
}

#[test]
fn ticker_round_trips_through_json_with_decimal_precision() {
    let ticker = Ticker { bid: dec!(42150.50), ask: dec!(42155.00), last: dec!(42152.00) };
    let json = serde_json::to_string(&ticker).unwrap();
    let back: Ticker = serde_json::from_str(&json).unwrap();
    assert_eq!(ticker, back);
}

#[test]
fn open_order_round_trips_through_json() {
    let order = OpenOrder {
        id: "O123ABC".to_string(),
        symbol: "BTC/USDT:USDT".to_string(),
        qty: dec!(0.2),
        price: dec!(100.00),
        tag: OrderTag::LongIentry,
    };
    let json = serde_json::to_string(&order).unwrap();
    let back: OpenOrder = serde_json::from_str(&json).unwrap();
    assert_eq!(order, back);
}
