use crate::models::DateWindow;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Window dates with no stored rows, oldest first.
pub fn missing_dates(window: &DateWindow, present: &BTreeSet<NaiveDate>) -> Vec<NaiveDate> {
    window.dates().filter(|d| !present.contains(d)).collect()
}
