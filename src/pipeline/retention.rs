use crate::errors::StoreError;
use crate::storage::PriceStore;
use chrono::NaiveDate;
use tracing::info;

/// Drops everything dated before the rolling window.
pub struct RetentionPruner<'a, S: PriceStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: PriceStore + ?Sized> RetentionPruner<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Rows dated exactly `cutoff` stay.
    pub fn prune(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let deleted = self.store.delete_older_than(cutoff)?;
        info!("Deleted {} rows older than {}", deleted, cutoff);
        Ok(deleted)
    }
}
