use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use tracing::{info, warn};

use crate::{error::MonitorError, quote::normalize_symbol};

/// One configured symbol and the price it was bought at.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchItem {
    /// Bare symbol as written in the watch-list, upper-cased.
    pub symbol: String,
    /// 0.00 means "no position": profit/loss is not shown.
    pub purchase_price: f64,
    /// Provider-facing symbol with the exchange suffix.
    pub display_symbol: String,
}

impl WatchItem {
    pub fn new(symbol: &str, purchase_price: f64, suffix: &str) -> Self {
        let symbol = symbol.trim().to_uppercase();
        WatchItem {
            display_symbol: normalize_symbol(&symbol, suffix),
            symbol,
            purchase_price,
        }
    }
}

/// A watch-list line that could not be used.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedLine {
    pub line_no: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct WatchList {
    pub items: Vec<WatchItem>,
    pub skipped: Vec<SkippedLine>,
}

impl WatchList {
    /// Parse newline-delimited `SYMBOL[,PURCHASE_PRICE]` records.
    pub fn parse<R: BufRead>(reader: R, suffix: &str) -> std::io::Result<Self> {
        let mut list = WatchList::default();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line) {
                Ok((symbol, price)) => list.upsert(WatchItem::new(&symbol, price, suffix)),
                Err(reason) => {
                    warn!(line = idx + 1, %reason, "skipping watch-list entry");
                    list.skipped.push(SkippedLine {
                        line_no: idx + 1,
                        reason,
                    });
                }
            }
        }

        Ok(list)
    }

    /// Load and validate a watch-list file. Zero usable entries is fatal.
    pub fn load(path: &Path, suffix: &str) -> Result<Self, MonitorError> {
        let file = File::open(path).map_err(|e| MonitorError::WatchList {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let list = Self::parse(BufReader::new(file), suffix).map_err(|e| MonitorError::WatchList {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if list.items.is_empty() {
            return Err(MonitorError::NoWatchItems(path.to_path_buf()));
        }

        info!(
            path = %path.display(),
            symbols = %list.items.iter().map(|i| i.symbol.as_str()).collect::<Vec<_>>().join(", "),
            skipped = list.skipped.len(),
            "loaded watch-list"
        );
        Ok(list)
    }

    // A repeated symbol keeps its first position but takes the later price.
    fn upsert(&mut self, item: WatchItem) {
        match self.items.iter_mut().find(|i| i.display_symbol == item.display_symbol) {
            Some(existing) => existing.purchase_price = item.purchase_price,
            None => self.items.push(item),
        }
    }
}

fn parse_line(line: &str) -> Result<(String, f64), String> {
    let (symbol, price) = match line.split_once(',') {
        Some((symbol, price)) => (symbol.trim(), Some(price.trim())),
        None => (line, None),
    };

    if symbol.is_empty() {
        return Err("missing symbol".to_string());
    }
    if symbol.chars().any(char::is_whitespace) {
        return Err(format!("invalid symbol '{}'", symbol));
    }

    let purchase_price = match price {
        None | Some("") => 0.0,
        Some(raw) => {
            let value: f64 = raw
                .parse()
                .map_err(|_| format!("invalid purchase price '{}'", raw))?;
            if !value.is_finite() || value < 0.0 {
                return Err(format!("invalid purchase price '{}'", raw));
            }
            value
        }
    };

    Ok((symbol.to_uppercase(), purchase_price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn parse(text: &str) -> WatchList {
        WatchList::parse(Cursor::new(text), ".WA").unwrap()
    }

    #[test]
    fn test_symbols_with_and_without_price() {
        let list = parse("PKO,45.50\ncdr\nKGHM, 120.00\n");
        assert_eq!(list.items.len(), 3);
        assert_eq!(list.items[0].symbol, "PKO");
        assert_eq!(list.items[0].purchase_price, 45.50);
        assert_eq!(list.items[0].display_symbol, "PKO.WA");
        assert_eq!(list.items[1].symbol, "CDR");
        assert_eq!(list.items[1].purchase_price, 0.0);
        assert_eq!(list.items[2].purchase_price, 120.0);
        assert!(list.skipped.is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let list = parse("# my stocks\n\n   \nPKO\n# PZU,10\n");
        assert_eq!(list.items.len(), 1);
        assert!(list.skipped.is_empty());
    }

    #[test]
    fn test_explicit_zero_price_suppresses_pnl() {
        let list = parse("PKO,0.00\n");
        assert_eq!(list.items[0].purchase_price, 0.0);
    }

    #[test]
    fn test_malformed_lines_skipped_with_diagnostic() {
        let list = parse("PKO,abc\n,12.0\nCDR,-3\nPZU,55.20\n");
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].symbol, "PZU");
        assert_eq!(list.skipped.len(), 3);
        assert_eq!(list.skipped[0].line_no, 1);
        assert!(list.skipped[0].reason.contains("abc"));
        assert_eq!(list.skipped[1].reason, "missing symbol");
    }

    #[test]
    fn test_suffix_already_present_is_kept() {
        let list = parse("PKO.WA,10\n");
        assert_eq!(list.items[0].display_symbol, "PKO.WA");
    }

    #[test]
    fn test_duplicate_symbol_keeps_position_takes_last_price() {
        let list = parse("PKO,10\nCDR\npko,12\nPKO.WA,13\n");
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].symbol, "PKO");
        assert_eq!(list.items[0].purchase_price, 13.0);
    }

    #[test]
    fn test_load_file_without_valid_entries_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# only comments").unwrap();
        writeln!(file, "PKO,oops").unwrap();
        let result = WatchList::load(file.path(), ".WA");
        assert!(matches!(result, Err(MonitorError::NoWatchItems(_))));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = WatchList::load(&dir.path().join("akcje.txt"), ".WA");
        assert!(matches!(result, Err(MonitorError::WatchList { .. })));
    }
}
