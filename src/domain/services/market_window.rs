use std::collections::{HashMap, VecDeque};

use crate::domain::services::indicators::Candle;

/// Bounded per-instrument history of price samples.
///
/// Append-only from the caller's point of view: new candles push the
/// oldest out once the retention limit is reached. The window never
/// grows beyond `retention` candles per symbol.
pub struct MarketWindow {
    retention: usize,
    candles: HashMap<String, VecDeque<Candle>>,
}

impl MarketWindow {
    pub fn new(retention: usize) -> Self {
        MarketWindow {
            retention,
            candles: HashMap::new(),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Append one candle, evicting the oldest when full. Out-of-order
    /// candles (timestamp not after the newest held one) are dropped so
    /// a stale fetch cannot corrupt the sequence.
    pub fn push(&mut self, symbol: &str, candle: Candle) {
        let window = self
            .candles
            .entry(symbol.to_string())
            .or_insert_with(VecDeque::new);
        if let Some(last) = window.back() {
            if candle.timestamp <= last.timestamp {
                return;
            }
        }
        window.push_back(candle);
        while window.len() > self.retention {
            window.pop_front();
        }
    }

    /// Replace a symbol's history wholesale from a fresh fetch, keeping
    /// only the retention-window tail.
    pub fn replace(&mut self, symbol: &str, mut history: Vec<Candle>) {
        if history.len() > self.retention {
            history.drain(..history.len() - self.retention);
        }
        self.candles
            .insert(symbol.to_string(), history.into_iter().collect());
    }

    pub fn candles(&mut self, symbol: &str) -> &[Candle] {
        match self.candles.get_mut(symbol) {
            Some(window) => window.make_contiguous(),
            None => &[],
        }
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.candles.get(symbol).map_or(0, |w| w.len())
    }

    pub fn last_close(&self, symbol: &str) -> Option<f64> {
        self.candles
            .get(symbol)
            .and_then(|w| w.back())
            .map(|c| c.close.value())
    }
}
