use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Local};

/// Minimum number of samples before a chart is worth drawing.
pub const MIN_CHART_POINTS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistorySample {
    pub timestamp: DateTime<Local>,
    pub price: f64,
}

/// Bounded per-symbol price history, oldest first.
#[derive(Debug)]
pub struct HistoryStore {
    max_history: usize,
    samples: HashMap<String, VecDeque<HistorySample>>,
}

impl HistoryStore {
    pub fn new(max_history: usize) -> Self {
        HistoryStore {
            max_history: max_history.max(1),
            samples: HashMap::new(),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Append a sample, evicting the oldest one when the symbol is at capacity.
    pub fn append(&mut self, symbol: &str, sample: HistorySample) {
        let cap = self.max_history;
        let series = self
            .samples
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(cap));
        while series.len() >= cap {
            series.pop_front();
        }
        series.push_back(sample);
    }

    pub fn samples(&self, symbol: &str) -> Vec<HistorySample> {
        self.samples
            .get(symbol)
            .map(|series| series.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.samples.get(symbol).map(VecDeque::len).unwrap_or(0)
    }

    pub fn has_sufficient_data(&self, symbol: &str, min_points: usize) -> bool {
        self.len(symbol) >= min_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(base: DateTime<Local>, secs: i64, price: f64) -> HistorySample {
        HistorySample {
            timestamp: base + Duration::seconds(secs),
            price,
        }
    }

    #[test]
    fn test_unknown_symbol_is_empty() {
        let store = HistoryStore::new(5);
        assert!(store.samples("PKO.WA").is_empty());
        assert!(!store.has_sufficient_data("PKO.WA", MIN_CHART_POINTS));
    }

    #[test]
    fn test_append_keeps_chronological_order() {
        let base = Local::now();
        let mut store = HistoryStore::new(5);
        for i in 0..3 {
            store.append("PKO.WA", sample(base, i, 40.0 + i as f64));
        }
        let prices: Vec<f64> = store.samples("PKO.WA").iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![40.0, 41.0, 42.0]);
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let base = Local::now();
        let cap = 4;
        let mut store = HistoryStore::new(cap);
        for i in 0..25 {
            store.append("CDR.WA", sample(base, i, i as f64));
            assert!(store.len("CDR.WA") <= cap);
        }
        let kept: Vec<f64> = store.samples("CDR.WA").iter().map(|s| s.price).collect();
        assert_eq!(kept, vec![21.0, 22.0, 23.0, 24.0]);

        let stamps: Vec<_> = store.samples("CDR.WA").iter().map(|s| s.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_symbols_are_independent() {
        let base = Local::now();
        let mut store = HistoryStore::new(2);
        store.append("PKO.WA", sample(base, 0, 1.0));
        store.append("PKO.WA", sample(base, 1, 2.0));
        store.append("PKO.WA", sample(base, 2, 3.0));
        store.append("PZU.WA", sample(base, 0, 9.0));
        assert_eq!(store.len("PKO.WA"), 2);
        assert_eq!(store.len("PZU.WA"), 1);
    }

    #[test]
    fn test_sufficient_data_threshold() {
        let base = Local::now();
        let mut store = HistoryStore::new(10);
        store.append("PKO.WA", sample(base, 0, 1.0));
        assert!(!store.has_sufficient_data("PKO.WA", MIN_CHART_POINTS));
        store.append("PKO.WA", sample(base, 1, 1.5));
        assert!(store.has_sufficient_data("PKO.WA", MIN_CHART_POINTS));
    }

    #[test]
    fn test_zero_cap_is_raised_to_one() {
        let mut store = HistoryStore::new(0);
        store.append("PKO.WA", sample(Local::now(), 0, 1.0));
        store.append("PKO.WA", sample(Local::now(), 1, 2.0));
        assert_eq!(store.max_history(), 1);
        assert_eq!(store.samples("PKO.WA")[0].price, 2.0);
    }
}
