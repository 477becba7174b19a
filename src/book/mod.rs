//! Aggregation order book for the taker venue.
//!
//! Keeps one price->volume map per side and answers "what does it cost to
//! clear N units" queries by walking levels best-to-worst and accumulating a
//! volume-weighted average price. The book stores no ordering; sorting is a
//! property of the query.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::provider::types::{AggregatedQuote, BookEntry};
use crate::utils::decimal::round_price;

/// Price-level book with ask and bid sides keyed by price.
///
/// Levels at the same price merge (the price is the key); an update carrying
/// an order count of zero removes the level.
#[derive(Debug, Default, Clone)]
pub struct AggregationOrderBook {
    asks: BTreeMap<Decimal, Decimal>,
    bids: BTreeMap<Decimal, Decimal>,
}

impl AggregationOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole book with a snapshot.
    pub fn apply_snapshot(&mut self, entries: &[BookEntry]) {
        self.asks.clear();
        self.bids.clear();
        for entry in entries {
            self.apply_update(entry);
        }
    }

    /// Upsert or remove a single price level.
    ///
    /// The sign of `entry.volume` selects the side (negative = ask, positive
    /// = bid); the magnitude is the level's resting volume. An entry with
    /// `order_count == 0` removes the level.
    pub fn apply_update(&mut self, entry: &BookEntry) {
        if entry.volume == Decimal::ZERO {
            // Zero resting volume clears the level; the sign no longer tells
            // us the side, so clear the price on both.
            self.asks.remove(&entry.price);
            self.bids.remove(&entry.price);
            return;
        }

        let side = if entry.volume < Decimal::ZERO {
            &mut self.asks
        } else {
            &mut self.bids
        };

        if entry.order_count == 0 {
            side.remove(&entry.price);
        } else {
            side.insert(entry.price, entry.volume.abs());
        }
    }

    /// Volume-weighted average ask price to clear `target_volume` units.
    ///
    /// Walks asks from best (lowest) to worst, accumulating volume and cost
    /// until the accumulated volume exceeds the target. The last level is
    /// never split, so the returned volume may exceed the request. Returns
    /// `None` when the ask side is empty.
    pub fn aggregated_ask(&self, target_volume: Decimal) -> Option<AggregatedQuote> {
        Self::aggregate(self.asks.iter(), target_volume)
    }

    /// Volume-weighted average bid price to clear `target_volume` units.
    ///
    /// Same as [`aggregated_ask`](Self::aggregated_ask) but walking bids from
    /// best (highest) to worst.
    pub fn aggregated_bid(&self, target_volume: Decimal) -> Option<AggregatedQuote> {
        Self::aggregate(self.bids.iter().rev(), target_volume)
    }

    fn aggregate<'a, I>(levels: I, target_volume: Decimal) -> Option<AggregatedQuote>
    where
        I: Iterator<Item = (&'a Decimal, &'a Decimal)>,
    {
        if target_volume == Decimal::ZERO {
            return Some(AggregatedQuote::zero());
        }

        let mut total_volume = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        let mut saw_level = false;

        for (price, volume) in levels {
            saw_level = true;
            total_volume += volume;
            total_cost += price * volume;
            if total_volume > target_volume {
                break;
            }
        }

        if !saw_level {
            return None;
        }

        Some(AggregatedQuote {
            volume: total_volume,
            price: round_price(total_cost / total_volume),
        })
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }
}
