use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::scraper::cleaner::parse_price;

// ── Commodity reference ───────────────────────────────────────────────────────

/// One entry of the static commodity catalogue: the source's commodity id and
/// the head label it expects alongside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommodityRef {
    #[serde(rename = "Commodity")]
    pub code: String,
    #[serde(rename = "CommodityHead")]
    pub head_code: String,
}

impl CommodityRef {
    pub fn new(code: impl Into<String>, head_code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            head_code: head_code.into(),
        }
    }
}

// ── Scraped row ───────────────────────────────────────────────────────────────

/// One table row keyed by its header label, values as printed on the page.
pub type RawPriceRow = HashMap<String, String>;

// ── Price record ──────────────────────────────────────────────────────────────

/// One scraped row: prices for one market, commodity and day.
///
/// Prices are kept exactly as the source printed them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub market: String,
    pub district: String,
    pub commodity: String,
    pub variety: String,
    pub grade: String,
    pub min_price: String,
    pub max_price: String,
    pub modal_price: String,
    pub price_date: NaiveDate,
    pub scraped_at: NaiveDateTime,
}

impl PriceRecord {
    pub fn min_price_value(&self) -> Option<f64> {
        parse_price(&self.min_price)
    }

    pub fn max_price_value(&self) -> Option<f64> {
        parse_price(&self.max_price)
    }

    pub fn modal_price_value(&self) -> Option<f64> {
        parse_price(&self.modal_price)
    }
}

// ── Date window ───────────────────────────────────────────────────────────────

/// The `days` most recent calendar days ending at (and including) `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// `days` must be at least 1.
    pub fn ending_at(end: NaiveDate, days: u32) -> Self {
        let back = u64::from(days.max(1) - 1);
        let start = end.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Oldest to newest.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }
}
