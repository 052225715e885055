use crate::errors::ParseError;
use scraper::{ElementRef, Html, Selector};

/// One HTML table reduced to text: the header labels of its first row and the
/// data cells of every row after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector {
        selector: css,
        reason: format!("{e:?}"),
    })
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Tables ────────────────────────────────────────────────────────────────────

/// Every `<table>` in document order. A page without tables yields an empty
/// list, which is the source's way of saying "no data for this day".
pub fn extract_tables(html: &str) -> Result<Vec<Table>, ParseError> {
    let doc = Html::parse_document(html);

    let table_sel = selector("table")?;
    let tr_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;

    let mut tables = Vec::new();
    for table in doc.select(&table_sel) {
        let mut trs = table.select(&tr_sel);

        let headers: Vec<String> = match trs.next() {
            Some(first) => first.select(&th_sel).map(cell_text).collect(),
            None => Vec::new(),
        };

        let rows: Vec<Vec<String>> = trs
            .map(|tr| tr.select(&td_sel).map(cell_text).collect())
            .collect();

        tables.push(Table::new(headers, rows));
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRICE_PAGE: &str = r#"
        <html><body>
          <table id="cphBody_GridPriceData">
            <tr>
              <th>Sl no.</th><th>District Name</th><th>Market Name</th>
              <th>Commodity</th><th>Modal Price (Rs./Quintal)</th>
            </tr>
            <tr><td>1</td><td> Agra </td><td>Achnera</td><td>Wheat</td><td>2450</td></tr>
            <tr><td>2</td><td>Agra</td><td>Agra</td><td>Wheat</td><td>2500</td></tr>
          </table>
          <table><tr><th>Footer</th></tr></table>
        </body></html>
    "#;

    #[test]
    fn extracts_headers_and_trimmed_rows() {
        let tables = extract_tables(PRICE_PAGE).unwrap();
        assert_eq!(tables.len(), 2);

        let t = &tables[0];
        assert_eq!(
            t.headers(),
            ["Sl no.", "District Name", "Market Name", "Commodity", "Modal Price (Rs./Quintal)"]
        );
        assert_eq!(t.rows().len(), 2);
        assert_eq!(t.rows()[0][1], "Agra");
        assert_eq!(t.rows()[1][4], "2500");
    }

    #[test]
    fn page_without_tables_is_empty_not_error() {
        let tables = extract_tables("<html><body><p>No Data Found</p></body></html>").unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn table_without_rows_has_no_headers() {
        let tables = extract_tables("<table></table>").unwrap();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].headers().is_empty());
        assert!(tables[0].rows().is_empty());
    }
}
