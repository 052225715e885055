pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::errors::FetchError;
use crate::models::CommodityRef;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use url::Url;

use self::http_client::HttpClient;

/// Date format the search form expects, e.g. `09-Jan-2025`.
pub const QUERY_DATE_FORMAT: &str = "%d-%b-%Y";

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable price-listing source.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Raw markup of the listing for one commodity over `[from, to]`.
    async fn fetch_page(
        &self,
        commodity: &CommodityRef,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String, FetchError>;
}

// ── agmarknet scraper ─────────────────────────────────────────────────────────

pub struct AgmarknetScraper {
    client: HttpClient,
    base_url: Url,
}

impl AgmarknetScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: Url::parse(&config.base_url)
                .with_context(|| format!("Invalid base URL {:?}", config.base_url))?,
        })
    }

    /// Search URL for one commodity across all states, districts and markets.
    pub fn page_url(&self, commodity: &CommodityRef, from: NaiveDate, to: NaiveDate) -> Url {
        search_url(&self.base_url, commodity, from, to)
    }
}

pub fn search_url(base: &Url, commodity: &CommodityRef, from: NaiveDate, to: NaiveDate) -> Url {
    let from = from.format(QUERY_DATE_FORMAT).to_string();
    let to = to.format(QUERY_DATE_FORMAT).to_string();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("Tx_Commodity", &commodity.code)
        .append_pair("Tx_State", "0")
        .append_pair("Tx_District", "0")
        .append_pair("Tx_Market", "0")
        .append_pair("DateFrom", &from)
        .append_pair("DateTo", &to)
        .append_pair("Fr_Date", &from)
        .append_pair("To_Date", &to)
        .append_pair("Tx_Trend", "0")
        .append_pair("Tx_CommodityHead", &commodity.head_code)
        .append_pair("Tx_StateHead", "--Select--")
        .append_pair("Tx_DistrictHead", "--Select--")
        .append_pair("Tx_MarketHead", "--Select--");
    url
}

#[async_trait]
impl PageFetcher for AgmarknetScraper {
    async fn fetch_page(
        &self,
        commodity: &CommodityRef,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String, FetchError> {
        let url = self.page_url(commodity, from, to);
        debug!("{} ({}) {} → {}", commodity.code, commodity.head_code, from, to);
        self.client.get_text(&url).await
    }
}
