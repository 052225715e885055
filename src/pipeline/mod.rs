//! Sync orchestrator: ties scraper → storage together.
//!
//! ## Run shape
//!
//! `SyncEngine::sync(window_days)`:
//!   1. Ask the store which dates of the rolling window already have rows
//!   2. For each missing date, oldest first, fetch every commodity concurrently
//!      and append the day's rows in one batch before moving to the next date
//!   3. Optionally re-fetch commodities that failed on otherwise populated days
//!   4. Delete rows older than the window
//!
//! A date with zero rows stays missing and is retried by the next run. A
//! commodity failure never aborts the run; a store failure always does.

pub mod day_fetcher;
pub mod gaps;
pub mod retention;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::AppConfig;
use crate::errors::{ConfigError, SyncError};
use crate::loader::load_commodities;
use crate::models::{CommodityRef, DateWindow};
use crate::scraper::{AgmarknetScraper, PageFetcher};
use crate::storage::{PriceStore, Repository, RunTotals};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use self::day_fetcher::{CommodityOutcome, DayFetch, DayFetcher};
use self::retention::RetentionPruner;

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub rows_added: usize,
    pub commodities_with_rows: usize,
    pub commodities_without_data: usize,
    pub failed_commodities: Vec<String>,
}

impl DayReport {
    fn new(day: &DayFetch, rows_added: usize) -> Self {
        Self {
            date: day.date,
            rows_added,
            commodities_with_rows: day.count(|o| matches!(o, CommodityOutcome::Rows(_))),
            commodities_without_data: day.count(|o| *o == CommodityOutcome::NoData),
            failed_commodities: day.failures().into_iter().map(|(c, _)| c.code).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub window: DateWindow,
    pub dates_already_present: usize,
    /// One entry per missing date, in processing order.
    pub days: Vec<DayReport>,
    /// Partial days re-attempted for their failed commodities.
    pub retried: Vec<DayReport>,
    pub rows_pruned: usize,
}

impl SyncReport {
    pub fn dates_processed(&self) -> usize {
        self.days.len()
    }

    pub fn rows_added(&self) -> usize {
        self.days
            .iter()
            .chain(&self.retried)
            .map(|d| d.rows_added)
            .sum()
    }

    pub fn rows_on(&self, date: NaiveDate) -> usize {
        self.days
            .iter()
            .chain(&self.retried)
            .filter(|d| d.date == date)
            .map(|d| d.rows_added)
            .sum()
    }

    /// Dates that produced nothing this run and remain missing.
    pub fn empty_dates(&self) -> Vec<NaiveDate> {
        self.days
            .iter()
            .filter(|d| d.rows_added == 0)
            .map(|d| d.date)
            .collect()
    }

    pub fn failed_fetches(&self) -> usize {
        self.days
            .iter()
            .chain(&self.retried)
            .map(|d| d.failed_commodities.len())
            .sum()
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// A zero-day window would prune everything but today.
fn check_window(window_days: u32) -> Result<(), ConfigError> {
    if window_days == 0 {
        return Err(ConfigError::Invalid {
            key: "sync.window_days",
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Pause between two dates.
    pub date_delay: Duration,
    pub retry_failed_commodities: bool,
}

pub struct SyncEngine<S: PriceStore> {
    store: S,
    days: DayFetcher,
    commodities: Vec<CommodityRef>,
    options: SyncOptions,
}

impl<S: PriceStore> SyncEngine<S> {
    pub fn new(
        store: S,
        fetcher: Arc<dyn PageFetcher>,
        commodities: Vec<CommodityRef>,
        max_concurrency: usize,
        options: SyncOptions,
    ) -> Result<Self, ConfigError> {
        if commodities.is_empty() {
            return Err(ConfigError::Invalid {
                key: "commodities",
                reason: "reference list is empty".into(),
            });
        }
        if max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.max_concurrency",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            store,
            days: DayFetcher::new(fetcher, max_concurrency),
            commodities,
            options,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sync the `window_days` most recent days ending today (local time).
    pub async fn sync(&self, window_days: u32) -> Result<SyncReport, SyncError> {
        self.sync_as_of(Local::now().date_naive(), window_days).await
    }

    pub async fn sync_as_of(
        &self,
        today: NaiveDate,
        window_days: u32,
    ) -> Result<SyncReport, SyncError> {
        check_window(window_days)?;

        let window = DateWindow::ending_at(today, window_days);
        let present = self.store.list_distinct_dates(&window)?;
        let missing = gaps::missing_dates(&window, &present);

        info!(
            "Window {} → {} ({} days): {} dates present, {} missing, {} commodities",
            window.start,
            window.end,
            window.len(),
            present.len(),
            missing.len(),
            self.commodities.len()
        );

        let mut report = SyncReport {
            window,
            dates_already_present: present.len(),
            days: Vec::with_capacity(missing.len()),
            retried: Vec::new(),
            rows_pruned: 0,
        };

        for (i, &date) in missing.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            report.days.push(self.sync_date(date).await?);
        }

        if self.options.retry_failed_commodities {
            let fresh: BTreeSet<NaiveDate> = missing.iter().copied().collect();
            report.retried = self.retry_partial_days(&window, &fresh).await?;
        }

        // Every append for this run has landed; only now is it safe to prune
        report.rows_pruned = RetentionPruner::new(&self.store).prune(window.start)?;

        info!(
            "Sync done: {} dates processed, {} rows added, {} empty dates, {} failed fetches, {} pruned",
            report.dates_processed(),
            report.rows_added(),
            report.empty_dates().len(),
            report.failed_fetches(),
            report.rows_pruned
        );

        Ok(report)
    }

    async fn sync_date(&self, date: NaiveDate) -> Result<DayReport, SyncError> {
        info!("Fetching data for missing date: {}", date);
        let day = self.days.fetch_day(&self.commodities, date).await;

        if day.records.is_empty() {
            info!("No data scraped for {}", date);
            return Ok(DayReport::new(&day, 0));
        }

        let written = self.store.append_day(date, &day.records, &day.failures())?;
        info!("Appended {} rows for {}", written, date);

        Ok(DayReport::new(&day, written))
    }

    async fn retry_partial_days(
        &self,
        window: &DateWindow,
        skip: &BTreeSet<NaiveDate>,
    ) -> Result<Vec<DayReport>, SyncError> {
        let pending = self.store.list_failed_fetches(window)?;
        let mut reports = Vec::new();

        for (date, commodities) in pending {
            if skip.contains(&date) || !window.contains(date) || commodities.is_empty() {
                continue;
            }

            self.pause().await;
            info!("Retrying {} failed commodities for {}", commodities.len(), date);
            let day = self.days.fetch_day(&commodities, date).await;

            let written = self.store.append_day(date, &day.records, &day.failures())?;
            self.store.clear_failed_fetches(date, &day.settled())?;

            reports.push(DayReport::new(&day, written));
        }

        Ok(reports)
    }

    async fn pause(&self) {
        if !self.options.date_delay.is_zero() {
            tokio::time::sleep(self.options.date_delay).await;
        }
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

/// Builds a [`SyncEngine`] over DuckDB and the live source from configuration.
pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn open_repository(&self) -> Result<Repository> {
        let repo = Repository::open(&self.config.storage.db_path)
            .context("Failed to open DuckDB")?;
        if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }
        Ok(repo)
    }

    pub fn engine(&self) -> Result<SyncEngine<Repository>> {
        // Reference data first: without it nothing else should be touched
        let commodities = load_commodities(&self.config.sync.commodities_path)?;
        let repo = self.open_repository()?;
        let scraper = Arc::new(
            AgmarknetScraper::new(&self.config.scraper).context("Failed to build scraper")?,
        );

        let options = SyncOptions {
            date_delay: Duration::from_millis(self.config.sync.date_delay_ms),
            retry_failed_commodities: self.config.sync.retry_failed_commodities,
        };

        Ok(SyncEngine::new(
            repo,
            scraper,
            commodities,
            self.config.sync.max_concurrency,
            options,
        )?)
    }

    pub async fn run(&self, window_days: u32) -> Result<SyncReport> {
        let engine = self.engine()?;
        let repo = engine.store();
        let run_id = repo.begin_scrape_run(window_days)?;

        match engine.sync(window_days).await {
            Ok(report) => {
                let totals = RunTotals {
                    dates_processed: report.dates_processed(),
                    rows_added: report.rows_added(),
                    rows_pruned: report.rows_pruned,
                    error: None,
                    report: serde_json::to_string(&report).ok(),
                };
                repo.finish_scrape_run(run_id, &totals)?;

                let (min_date, max_date) = repo.date_range().unwrap_or((None, None));
                info!("=== Done: DB range {:?} → {:?} ===", min_date, max_date);
                Ok(report)
            }
            Err(e) => {
                let msg = e.to_string();
                let totals = RunTotals {
                    error: Some(&msg),
                    ..Default::default()
                };
                if let Err(log_err) = repo.finish_scrape_run(run_id, &totals) {
                    warn!("Could not record failed run {}: {}", run_id, log_err);
                }
                Err(e).context("Sync run aborted")
            }
        }
    }

    /// Prune outside a sync run, using today's window.
    pub fn prune(&self, window_days: u32) -> Result<usize> {
        check_window(window_days)?;
        let repo = self.open_repository()?;
        let window = DateWindow::ending_at(Local::now().date_naive(), window_days);
        Ok(RetentionPruner::new(&repo).prune(window.start)?)
    }
}
