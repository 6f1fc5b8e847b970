#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Transaction repository for the joined price-paid + postcode table.
//!
//! The pricing pipeline only needs one query: every transaction inside a
//! spatio-temporal [`TransactionWindow`]. [`TransactionRepository`] is that
//! seam. [`prices_db::DuckDbRepository`] serves it from a `DuckDB` file and
//! [`MemoryRepository`] from a vector already in memory.
//!
//! Handles are opened by the caller and passed explicitly; dropping one
//! closes the underlying connection.

pub mod paths;
pub mod prices_db;

pub use prices_db::DuckDbRepository;

use pricepaid_property_models::{Transaction, TransactionWindow};

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (e.g. creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Read access to stored transactions.
pub trait TransactionRepository {
    /// Returns transactions dated in `[window.start, window.end)` whose
    /// coordinates lie inside `window.bbox` (edges inclusive), ordered by
    /// id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be queried.
    fn transactions_in_window(
        &self,
        window: &TransactionWindow,
    ) -> Result<Vec<Transaction>, DbError>;

    /// Returns the total number of stored transactions.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be queried.
    fn count(&self) -> Result<u64, DbError>;
}

/// A repository over transactions already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    transactions: Vec<Transaction>,
}

impl MemoryRepository {
    #[must_use]
    pub const fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }
}

impl TransactionRepository for MemoryRepository {
    fn transactions_in_window(
        &self,
        window: &TransactionWindow,
    ) -> Result<Vec<Transaction>, DbError> {
        let mut selected: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| window.contains(t.date_of_transfer, t.latitude, t.longitude))
            .cloned()
            .collect();
        selected.sort_by_key(|t| t.id);
        Ok(selected)
    }

    fn count(&self) -> Result<u64, DbError> {
        Ok(self.transactions.len() as u64)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDate;
    use pricepaid_property_models::{PropertyType, TenureType, Transaction};

    pub fn transaction(id: u64, price: u64, date: NaiveDate, lat: f64, lon: f64) -> Transaction {
        Transaction {
            id,
            price,
            date_of_transfer: date,
            postcode: format!("CB{id} 1AA"),
            property_type: PropertyType::Flat,
            new_build_flag: id % 2 == 0,
            tenure_type: TenureType::Leasehold,
            locality: String::new(),
            town_city: "CAMBRIDGE".to_string(),
            district: "CAMBRIDGE".to_string(),
            county: "CAMBRIDGESHIRE".to_string(),
            country: "England".to_string(),
            latitude: lat,
            longitude: lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pricepaid_property_models::TransactionWindow;

    use super::test_support::transaction;
    use super::*;

    #[test]
    fn memory_repository_filters_window() {
        let date = NaiveDate::from_ymd_opt(2020, 4, 14).unwrap();
        let window = TransactionWindow::around(52.2, 0.12, date, 15.0, 300).unwrap();

        let repo = MemoryRepository::new(vec![
            transaction(3, 100_000, date, 52.2, 0.12),
            transaction(1, 200_000, date, 52.2, 0.12),
            // on the north edge
            transaction(2, 300_000, date, window.bbox.north, 0.12),
            // outside the box
            transaction(4, 400_000, date, 53.0, 0.12),
            // end date is excluded
            transaction(5, 500_000, window.end, 52.2, 0.12),
        ]);

        let ids: Vec<u64> = repo
            .transactions_in_window(&window)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(repo.count().unwrap(), 5);
    }
}
