use crate::models::{PriceRecord, RawPriceRow};
use crate::scraper::parsers::Table;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse price: strip everything except digits, dot, minus.
/// "Rs 1,234.56" → 1234.56 | "2450" → 2450.0
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "NR" || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Parse dates: "09 Jan 2025" (price table), "09-Jan-2025" (query string) or ISO
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    ["%d %b %Y", "%d-%b-%Y", "%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Collapse a header label for matching: "Min Price(Rs./Quintal)" and
/// "Min Price (Rs./Quintal)" compare equal.
fn header_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// ── Table → rows ──────────────────────────────────────────────────────────────

/// Zip each data row with the header labels. Rows whose cell count differs
/// from the header's are dropped; they are the page's spacer/footer rows.
pub fn build_records(table: &Table) -> Vec<RawPriceRow> {
    let headers = table.headers();

    table
        .rows()
        .iter()
        .filter(|row| row.len() == headers.len())
        .map(|row| {
            headers
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<RawPriceRow>()
        })
        .collect()
}

// ── Row → PriceRecord ─────────────────────────────────────────────────────────

/// Map one labelled row onto a [`PriceRecord`].
///
/// `fetched_for` stands in for the price date when the row carries none.
/// Rows without a market name are rejected.
pub fn to_price_record(
    row: &RawPriceRow,
    fetched_for: NaiveDate,
    scraped_at: NaiveDateTime,
) -> Option<PriceRecord> {
    let mut rec = PriceRecord {
        market: String::new(),
        district: String::new(),
        commodity: String::new(),
        variety: String::new(),
        grade: String::new(),
        min_price: String::new(),
        max_price: String::new(),
        modal_price: String::new(),
        price_date: fetched_for,
        scraped_at,
    };

    for (label, value) in row {
        let key = header_key(label);
        let value = value.trim().to_string();
        match key.as_str() {
            "marketname" | "market" => rec.market = value,
            "districtname" | "district" => rec.district = value,
            "commodity" => rec.commodity = value,
            "variety" => rec.variety = value,
            "grade" => rec.grade = value,
            "pricedate" | "reporteddate" => match parse_date(&value) {
                Some(d) => rec.price_date = d,
                None => debug!("Unparseable price date {:?}, using {}", value, fetched_for),
            },
            k if k.starts_with("minprice") => rec.min_price = value,
            k if k.starts_with("maxprice") => rec.max_price = value,
            k if k.starts_with("modalprice") => rec.modal_price = value,
            _ => {}
        }
    }

    if rec.market.is_empty() {
        return None;
    }
    Some(rec)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn price_table(rows: Vec<Vec<String>>) -> Table {
        Table::new(
            strings(&[
                "District Name",
                "Market Name",
                "Commodity",
                "Variety",
                "Grade",
                "Min Price (Rs./Quintal)",
                "Max Price (Rs./Quintal)",
                "Modal Price (Rs./Quintal)",
                "Price Date",
            ]),
            rows,
        )
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("2450"), Some(2450.0));
        assert_eq!(parse_price("1,234.56"), Some(1234.56));
        assert_eq!(parse_price(" NR "), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("09 Jan 2025"), Some(d("2025-01-09")));
        assert_eq!(parse_date("09-Jan-2025"), Some(d("2025-01-09")));
        assert_eq!(parse_date("2025-01-09"), Some(d("2025-01-09")));
        assert_eq!(parse_date("09/01/2025"), Some(d("2025-01-09")));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn keeps_rows_matching_header_width_and_drops_the_rest() {
        let table = price_table(vec![
            strings(&[
                "Agra", "Achnera", "Wheat", "Dara", "FAQ", "2400", "2500", "2450", "09 Jan 2025",
            ]),
            strings(&["Total", "2"]),
            strings(&[
                "Agra", "Agra", "Wheat", "Dara", "FAQ", "2400", "2600", "2500", "09 Jan 2025", "x",
            ]),
        ]);

        let rows = build_records(&table);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Market Name"], "Achnera");
        assert_eq!(rows[0]["Modal Price (Rs./Quintal)"], "2450");
    }

    #[test]
    fn maps_headers_onto_price_record_fields() {
        let table = price_table(vec![strings(&[
            "Agra", "Achnera", "Wheat", "Dara", "FAQ", "2400", "2500", "2,450", "08 Jan 2025",
        ])]);
        let now = d("2025-01-09").and_hms_opt(6, 0, 0).unwrap();

        let rows = build_records(&table);
        let rec = to_price_record(&rows[0], d("2025-01-09"), now).unwrap();

        assert_eq!(rec.market, "Achnera");
        assert_eq!(rec.district, "Agra");
        assert_eq!(rec.commodity, "Wheat");
        assert_eq!(rec.variety, "Dara");
        assert_eq!(rec.grade, "FAQ");
        assert_eq!(rec.min_price, "2400");
        assert_eq!(rec.max_price, "2500");
        assert_eq!(rec.modal_price, "2,450");
        assert_eq!(rec.price_date, d("2025-01-08"));
        assert_eq!(rec.scraped_at, now);
    }

    #[test]
    fn header_spacing_variants_match() {
        let row: RawPriceRow = [
            ("Market Name".to_string(), "Kota".to_string()),
            ("Min Price(Rs./Quintal)".to_string(), "1800".to_string()),
            ("Price Date".to_string(), "garbled".to_string()),
        ]
        .into_iter()
        .collect();
        let now = d("2025-01-09").and_hms_opt(6, 0, 0).unwrap();

        let rec = to_price_record(&row, d("2025-01-09"), now).unwrap();
        assert_eq!(rec.min_price, "1800");
        assert_eq!(rec.price_date, d("2025-01-09"));
    }

    #[test]
    fn row_without_market_is_rejected() {
        let row: RawPriceRow = [("Commodity".to_string(), "Rice".to_string())]
            .into_iter()
            .collect();
        let now = d("2025-01-09").and_hms_opt(6, 0, 0).unwrap();
        assert!(to_price_record(&row, d("2025-01-09"), now).is_none());
    }
}
