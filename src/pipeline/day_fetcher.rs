//! Fan-out of one date's fetch across every tracked commodity.

use crate::errors::ScrapeError;
use crate::models::{CommodityRef, PriceRecord};
use crate::scraper::PageFetcher;
use crate::scraper::cleaner::{build_records, to_price_record};
use crate::scraper::parsers::extract_tables;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommodityOutcome {
    Rows(usize),
    NoData,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CommodityResult {
    pub commodity: CommodityRef,
    pub outcome: CommodityOutcome,
}

/// Everything scraped for one date, plus how each commodity fared.
#[derive(Debug, Clone)]
pub struct DayFetch {
    pub date: NaiveDate,
    pub records: Vec<PriceRecord>,
    pub results: Vec<CommodityResult>,
}

impl DayFetch {
    pub fn failures(&self) -> Vec<(CommodityRef, String)> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                CommodityOutcome::Failed(reason) => Some((r.commodity.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Commodities that did not fail, whether or not they had rows.
    pub fn settled(&self) -> Vec<CommodityRef> {
        self.results
            .iter()
            .filter(|r| !matches!(r.outcome, CommodityOutcome::Failed(_)))
            .map(|r| r.commodity.clone())
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&CommodityOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

pub struct DayFetcher {
    fetcher: Arc<dyn PageFetcher>,
    max_concurrency: usize,
}

impl DayFetcher {
    /// `max_concurrency` of 1 fetches commodities one after another.
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_concurrency: usize) -> Self {
        Self {
            fetcher,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn fetch_day(&self, commodities: &[CommodityRef], date: NaiveDate) -> DayFetch {
        let sem = Arc::new(Semaphore::new(self.max_concurrency));
        let scraped_at = Utc::now().naive_utc();
        let mut handles = Vec::with_capacity(commodities.len());

        for commodity in commodities {
            let task_commodity = commodity.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let sem = Arc::clone(&sem);

            let handle = tokio::spawn(async move {
                // Never closed, so the permit is always granted
                let _permit = sem.acquire().await;
                scrape_commodity(&*fetcher, &task_commodity, date, scraped_at).await
            });

            handles.push((commodity.clone(), handle));
        }

        let mut records = Vec::new();
        let mut results = Vec::with_capacity(handles.len());

        for (commodity, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(rows)) if rows.is_empty() => {
                    debug!("{} ({}) {}: no data", commodity.code, commodity.head_code, date);
                    CommodityOutcome::NoData
                }
                Ok(Ok(rows)) => {
                    debug!("{} ({}) {}: {} rows", commodity.code, commodity.head_code, date, rows.len());
                    let n = rows.len();
                    records.extend(rows);
                    CommodityOutcome::Rows(n)
                }
                Ok(Err(e)) => {
                    warn!("{} ({}) {}: {}", commodity.code, commodity.head_code, date, e);
                    CommodityOutcome::Failed(e.to_string())
                }
                Err(e) => {
                    error!("Task panic for {} on {}: {}", commodity.code, date, e);
                    CommodityOutcome::Failed(format!("task failed: {e}"))
                }
            };
            results.push(CommodityResult { commodity, outcome });
        }

        DayFetch { date, records, results }
    }
}

/// One commodity, one day: fetch, take the first table, keep well-formed rows.
async fn scrape_commodity(
    fetcher: &dyn PageFetcher,
    commodity: &CommodityRef,
    date: NaiveDate,
    scraped_at: NaiveDateTime,
) -> Result<Vec<PriceRecord>, ScrapeError> {
    let html = fetcher.fetch_page(commodity, date, date).await?;
    let tables = extract_tables(&html)?;

    let Some(table) = tables.first() else {
        return Ok(Vec::new());
    };

    Ok(build_records(table)
        .iter()
        .filter_map(|row| to_price_record(row, date, scraped_at))
        .collect())
}
