//! Canned page source for pipeline tests.

use crate::errors::FetchError;
use crate::models::CommodityRef;
use crate::scraper::PageFetcher;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

enum Canned {
    Html(String),
    Status(u16),
}

/// Serves canned pages per (commodity code, date). Anything not registered
/// gets a page without tables.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<(String, NaiveDate), Canned>,
    calls: Mutex<Vec<(String, NaiveDate)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    latency: Duration,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `rows` are (market, commodity, modal price).
    pub fn rows(mut self, code: &str, date: NaiveDate, rows: &[(&str, &str, &str)]) -> Self {
        self.pages
            .insert((code.to_string(), date), Canned::Html(price_page(date, rows)));
        self
    }

    pub fn html(mut self, code: &str, date: NaiveDate, html: &str) -> Self {
        self.pages
            .insert((code.to_string(), date), Canned::Html(html.to_string()));
        self
    }

    pub fn failing(mut self, code: &str, date: NaiveDate, status: u16) -> Self {
        self.pages
            .insert((code.to_string(), date), Canned::Status(status));
        self
    }

    pub fn calls(&self) -> Vec<(String, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_on(&self, date: NaiveDate) -> usize {
        self.calls().iter().filter(|(_, d)| *d == date).count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch_page(
        &self,
        commodity: &CommodityRef,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String, FetchError> {
        assert_eq!(from, to, "day fetches use a one-day range");
        self.calls.lock().unwrap().push((commodity.code.clone(), from));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.pages.get(&(commodity.code.clone(), from)) {
            Some(Canned::Html(html)) => Ok(html.clone()),
            Some(Canned::Status(status)) => Err(FetchError::Status {
                status: *status,
                url: format!("stub://{}/{}", commodity.code, from),
            }),
            None => Ok("<html><body><p>No Data Found</p></body></html>".to_string()),
        }
    }
}

/// A listing page shaped like the source's: price table first, then a
/// trailer row with fewer cells.
pub fn price_page(date: NaiveDate, rows: &[(&str, &str, &str)]) -> String {
    let date = date.format("%d %b %Y");
    let mut html = String::from(
        "<html><body><table>\
         <tr><th>Sl no.</th><th>District Name</th><th>Market Name</th><th>Commodity</th>\
         <th>Variety</th><th>Grade</th><th>Min Price (Rs./Quintal)</th>\
         <th>Max Price (Rs./Quintal)</th><th>Modal Price (Rs./Quintal)</th><th>Price Date</th></tr>",
    );
    for (i, (market, commodity, modal)) in rows.iter().enumerate() {
        html.push_str(&format!(
            "<tr><td>{}</td><td>Agra</td><td>{market}</td><td>{commodity}</td>\
             <td>Other</td><td>FAQ</td><td>{modal}</td><td>{modal}</td><td>{modal}</td>\
             <td>{date}</td></tr>",
            i + 1
        ));
    }
    html.push_str("<tr><td colspan=\"10\">Total records</td></tr></table>");
    html.push_str("<table><tr><th>Legend</th></tr><tr><td>FAQ</td></tr></table></body></html>");
    html
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}
