use crate::errors::StoreError;
use crate::models::{CommodityRef, DateWindow, PriceRecord};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection, Row};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

// ── Store contract ────────────────────────────────────────────────────────────

/// What the sync engine needs from persistence.
///
/// The failure-marker methods back the optional per-commodity retry; stores
/// that do not track partial days can leave the defaults.
pub trait PriceStore {
    /// Write one date's batch. Returns the number of rows written.
    fn append_records(&self, records: &[PriceRecord]) -> Result<usize, StoreError>;

    /// Distinct price dates present inside `window`.
    fn list_distinct_dates(&self, window: &DateWindow) -> Result<BTreeSet<NaiveDate>, StoreError>;

    /// Delete every row dated strictly before `cutoff`.
    fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize, StoreError>;

    fn record_failed_fetches(
        &self,
        _date: NaiveDate,
        _failed: &[(CommodityRef, String)],
    ) -> Result<(), StoreError> {
        Ok(())
    }

    /// One date's rows together with the commodities that failed on it.
    /// Stores that can should write both or neither, otherwise a date could
    /// count as present while its failure markers are lost.
    fn append_day(
        &self,
        date: NaiveDate,
        records: &[PriceRecord],
        failed: &[(CommodityRef, String)],
    ) -> Result<usize, StoreError> {
        self.record_failed_fetches(date, failed)?;
        self.append_records(records)
    }

    fn list_failed_fetches(
        &self,
        _window: &DateWindow,
    ) -> Result<BTreeMap<NaiveDate, Vec<CommodityRef>>, StoreError> {
        Ok(BTreeMap::new())
    }

    fn clear_failed_fetches(
        &self,
        _date: NaiveDate,
        _commodities: &[CommodityRef],
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<S: PriceStore + ?Sized> PriceStore for &S {
    fn append_records(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
        (**self).append_records(records)
    }

    fn list_distinct_dates(&self, window: &DateWindow) -> Result<BTreeSet<NaiveDate>, StoreError> {
        (**self).list_distinct_dates(window)
    }

    fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        (**self).delete_older_than(cutoff)
    }

    fn record_failed_fetches(
        &self,
        date: NaiveDate,
        failed: &[(CommodityRef, String)],
    ) -> Result<(), StoreError> {
        (**self).record_failed_fetches(date, failed)
    }

    fn append_day(
        &self,
        date: NaiveDate,
        records: &[PriceRecord],
        failed: &[(CommodityRef, String)],
    ) -> Result<usize, StoreError> {
        (**self).append_day(date, records, failed)
    }

    fn list_failed_fetches(
        &self,
        window: &DateWindow,
    ) -> Result<BTreeMap<NaiveDate, Vec<CommodityRef>>, StoreError> {
        (**self).list_failed_fetches(window)
    }

    fn clear_failed_fetches(
        &self,
        date: NaiveDate,
        commodities: &[CommodityRef],
    ) -> Result<(), StoreError> {
        (**self).clear_failed_fetches(date, commodities)
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS market_prices (
    market      VARCHAR   NOT NULL,
    district    VARCHAR   NOT NULL DEFAULT '',
    commodity   VARCHAR   NOT NULL DEFAULT '',
    variety     VARCHAR   NOT NULL DEFAULT '',
    grade       VARCHAR   NOT NULL DEFAULT '',
    -- Raw text as scraped; coerce on read
    min_price   VARCHAR   NOT NULL DEFAULT '',
    max_price   VARCHAR   NOT NULL DEFAULT '',
    modal_price VARCHAR   NOT NULL DEFAULT '',
    price_date  DATE      NOT NULL,
    scraped_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (market, district, commodity, variety, grade, price_date)
);

CREATE TABLE IF NOT EXISTS fetch_failures (
    price_date      DATE      NOT NULL,
    commodity_code  VARCHAR   NOT NULL,
    commodity_head  VARCHAR   NOT NULL,
    error_msg       VARCHAR,
    recorded_at     TIMESTAMP NOT NULL,
    PRIMARY KEY (price_date, commodity_code)
);

CREATE SEQUENCE IF NOT EXISTS scrape_runs_id_seq START 1;

CREATE TABLE IF NOT EXISTS scrape_runs (
    id               BIGINT PRIMARY KEY DEFAULT nextval('scrape_runs_id_seq'),
    started_at       TIMESTAMP NOT NULL,
    finished_at      TIMESTAMP,
    status           VARCHAR NOT NULL DEFAULT 'running',
    window_days      INTEGER NOT NULL,
    dates_processed  INTEGER DEFAULT 0,
    rows_added       BIGINT DEFAULT 0,
    rows_pruned      BIGINT DEFAULT 0,
    error_msg        VARCHAR,
    report           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_prices_date               ON market_prices (price_date);
CREATE INDEX IF NOT EXISTS idx_prices_commodity          ON market_prices (commodity);
CREATE INDEX IF NOT EXISTS idx_prices_district           ON market_prices (district);
CREATE INDEX IF NOT EXISTS idx_prices_commodity_district ON market_prices (commodity, district);
"#;

const PRICE_COLUMNS: &str = "market, district, commodity, variety, grade, \
                             min_price, max_price, modal_price, price_date, scraped_at";

fn price_from_row(r: &Row<'_>) -> duckdb::Result<PriceRecord> {
    Ok(PriceRecord {
        market: r.get(0)?,
        district: r.get(1)?,
        commodity: r.get(2)?,
        variety: r.get(3)?,
        grade: r.get(4)?,
        min_price: r.get(5)?,
        max_price: r.get(6)?,
        modal_price: r.get(7)?,
        price_date: r.get(8)?,
        scraped_at: r.get(9)?,
    })
}

/// Totals written to the run log when a sync finishes.
#[derive(Debug, Default)]
pub struct RunTotals<'a> {
    pub dates_processed: usize,
    pub rows_added: usize,
    pub rows_pruned: usize,
    pub error: Option<&'a str>,
    pub report: Option<String>,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL)?;
        self.conn.execute_batch(INDEXES)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Prices ────────────────────────────────────────────────────────────────

    pub fn price_count(&self) -> Result<i64, StoreError> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM market_prices")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn commodity_count(&self) -> Result<i64, StoreError> {
        let mut s = self.conn.prepare("SELECT COUNT(DISTINCT commodity) FROM market_prices")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), StoreError> {
        let mut s = self
            .conn
            .prepare("SELECT MIN(price_date), MAX(price_date) FROM market_prices")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    pub fn count_on(&self, date: NaiveDate) -> Result<i64, StoreError> {
        let mut s = self
            .conn
            .prepare("SELECT COUNT(*) FROM market_prices WHERE price_date = ?")?;
        Ok(s.query_row(params![date], |r| r.get(0))?)
    }

    /// Prices for a commodity in a district, per market, newest first.
    /// Both arguments are case-insensitive LIKE patterns.
    pub fn market_prices(
        &self,
        commodity: &str,
        district: &str,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM market_prices \
             WHERE commodity ILIKE ? AND district ILIKE ? \
             ORDER BY market, price_date DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![commodity, district], price_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self, window_days: u32) -> Result<i64, StoreError> {
        let id = self.conn.query_row(
            "INSERT INTO scrape_runs (started_at, status, window_days) \
             VALUES (?, 'running', ?) RETURNING id",
            params![Utc::now().naive_utc(), window_days],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_scrape_run(&self, run_id: i64, totals: &RunTotals<'_>) -> Result<(), StoreError> {
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               dates_processed = ?, rows_added = ?, rows_pruned = ?,
               error_msg = ?, report = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if totals.error.is_none() { "success" } else { "error" },
                totals.dates_processed as i64,
                totals.rows_added as i64,
                totals.rows_pruned as i64,
                totals.error,
                totals.report,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_scrape_run(&self) -> Result<Option<(i64, String)>, StoreError> {
        let mut s = self
            .conn
            .prepare("SELECT id, status FROM scrape_runs ORDER BY id DESC LIMIT 1")?;
        let mut rows = s.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
        Ok(rows.next().transpose()?)
    }
}

impl PriceStore for Repository {
    /// Upsert: a re-fetched date overwrites prices instead of duplicating rows.
    fn append_records(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let written = upsert_prices(&tx, records)?;
        tx.commit()?;
        debug!("{} price rows written", written);
        Ok(written)
    }

    fn append_day(
        &self,
        date: NaiveDate,
        records: &[PriceRecord],
        failed: &[(CommodityRef, String)],
    ) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let written = upsert_prices(&tx, records)?;
        upsert_failures(&tx, date, failed)?;
        tx.commit()?;
        debug!("{} price rows, {} failure markers written for {}", written, failed.len(), date);
        Ok(written)
    }

    fn list_distinct_dates(&self, window: &DateWindow) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT price_date FROM market_prices WHERE price_date BETWEEN ? AND ?",
        )?;
        let dates = stmt
            .query_map(params![window.start, window.end], |r| r.get(0))?
            .collect::<duckdb::Result<BTreeSet<NaiveDate>>>()?;
        Ok(dates)
    }

    fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute(
            "DELETE FROM market_prices WHERE price_date < ?",
            params![cutoff],
        )?;
        tx.execute(
            "DELETE FROM fetch_failures WHERE price_date < ?",
            params![cutoff],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn record_failed_fetches(
        &self,
        date: NaiveDate,
        failed: &[(CommodityRef, String)],
    ) -> Result<(), StoreError> {
        if failed.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        upsert_failures(&tx, date, failed)?;
        tx.commit()?;
        Ok(())
    }

    fn list_failed_fetches(
        &self,
        window: &DateWindow,
    ) -> Result<BTreeMap<NaiveDate, Vec<CommodityRef>>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT price_date, commodity_code, commodity_head FROM fetch_failures \
             WHERE price_date BETWEEN ? AND ? ORDER BY price_date, commodity_code",
        )?;
        let rows = stmt
            .query_map(params![window.start, window.end], |r| {
                Ok((
                    r.get::<_, NaiveDate>(0)?,
                    CommodityRef::new(r.get::<_, String>(1)?, r.get::<_, String>(2)?),
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        let mut by_date: BTreeMap<NaiveDate, Vec<CommodityRef>> = BTreeMap::new();
        for (date, commodity) in rows {
            by_date.entry(date).or_default().push(commodity);
        }
        Ok(by_date)
    }

    fn clear_failed_fetches(
        &self,
        date: NaiveDate,
        commodities: &[CommodityRef],
    ) -> Result<(), StoreError> {
        if commodities.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        for commodity in commodities {
            tx.execute(
                "DELETE FROM fetch_failures WHERE price_date = ? AND commodity_code = ?",
                params![date, commodity.code],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ── Write helpers (run inside the caller's transaction) ──────────────────────

fn upsert_prices(conn: &Connection, records: &[PriceRecord]) -> Result<usize, StoreError> {
    // Last occurrence of a key wins; DuckDB refuses to touch a row twice
    // in one transaction.
    let mut latest: HashMap<(&str, &str, &str, &str, &str, NaiveDate), &PriceRecord> =
        HashMap::with_capacity(records.len());
    for rec in records {
        let key = (
            rec.market.as_str(),
            rec.district.as_str(),
            rec.commodity.as_str(),
            rec.variety.as_str(),
            rec.grade.as_str(),
            rec.price_date,
        );
        latest.insert(key, rec);
    }

    let sql = format!(
        "INSERT INTO market_prices ({PRICE_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (market, district, commodity, variety, grade, price_date) DO UPDATE SET \
             min_price   = excluded.min_price, \
             max_price   = excluded.max_price, \
             modal_price = excluded.modal_price, \
             scraped_at  = excluded.scraped_at"
    );

    for rec in latest.values() {
        conn.execute(
            &sql,
            params![
                rec.market,
                rec.district,
                rec.commodity,
                rec.variety,
                rec.grade,
                rec.min_price,
                rec.max_price,
                rec.modal_price,
                rec.price_date,
                rec.scraped_at,
            ],
        )?;
    }

    Ok(latest.len())
}

fn upsert_failures(
    conn: &Connection,
    date: NaiveDate,
    failed: &[(CommodityRef, String)],
) -> Result<(), StoreError> {
    let now = Utc::now().naive_utc();
    for (commodity, reason) in failed {
        conn.execute(
            r#"INSERT INTO fetch_failures
                   (price_date, commodity_code, commodity_head, error_msg, recorded_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (price_date, commodity_code) DO UPDATE SET
                   error_msg   = excluded.error_msg,
                   recorded_at = excluded.recorded_at"#,
            params![date, commodity.code, commodity.head_code, reason, now],
        )?;
    }
    Ok(())
}
