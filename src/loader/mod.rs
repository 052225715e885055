//! Commodity reference list loader.
//!
//! The list is a CSV with `Commodity` and `CommodityHead` columns, one row per
//! commodity tracked on the price-listing source. Without it there is nothing
//! to sync, so every problem here is a startup error.

use crate::errors::ConfigError;
use crate::models::CommodityRef;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

pub fn load_commodities(path: &Path) -> Result<Vec<CommodityRef>, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::MissingReference(path.to_path_buf()));
    }

    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| ConfigError::Reference { path: path.to_path_buf(), source })?;

    parse_commodities(reader, path)
}

fn parse_commodities<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    path: &Path,
) -> Result<Vec<CommodityRef>, ConfigError> {
    let mut seen = HashSet::new();
    let mut commodities = Vec::new();

    for result in reader.deserialize::<CommodityRef>() {
        let commodity =
            result.map_err(|source| ConfigError::Reference { path: path.to_path_buf(), source })?;

        if commodity.code.is_empty() {
            warn!("Skipping commodity row without a code in {:?}", path);
            continue;
        }
        if !seen.insert(commodity.code.clone()) {
            warn!("Duplicate commodity code {} in {:?}", commodity.code, path);
            continue;
        }
        commodities.push(commodity);
    }

    if commodities.is_empty() {
        return Err(ConfigError::EmptyReference(path.to_path_buf()));
    }

    info!("{} commodities loaded from {:?}", commodities.len(), path);
    Ok(commodities)
}
