//! `DuckDB` storage for the joined `prices_coordinates_data` table.
//!
//! One row per price-paid transaction with its postcode's latitude and
//! longitude already attached. Bulk loading from the Land Registry CSVs
//! happens elsewhere; this module owns the schema, a batched insert used
//! by loaders and tests, and the window query the pricing pipeline runs.

use std::path::Path;
use std::str::FromStr as _;

use chrono::NaiveDate;
use duckdb::Connection;
use pricepaid_property_models::{PropertyType, TenureType, Transaction, TransactionWindow};

use crate::{DbError, TransactionRepository};

/// Number of rows per INSERT chunk (`DuckDB` handles large batches well).
const CHUNK_SIZE: usize = 5_000;

/// Columns of `prices_coordinates_data` in select order.
pub const COLUMNS: &[&str] = &[
    "db_id",
    "price",
    "date_of_transfer",
    "postcode",
    "property_type",
    "new_build_flag",
    "tenure_type",
    "locality",
    "town_city",
    "district",
    "county",
    "country",
    "latitude",
    "longitude",
];

/// A `DuckDB`-backed [`TransactionRepository`].
///
/// Owns its connection; dropping the repository closes it.
pub struct DuckDbRepository {
    conn: Connection,
}

impl DuckDbRepository {
    /// Opens (or creates) the database file and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "SET threads = 4;
             SET memory_limit = '512MB';",
        )?;

        Self::from_connection(conn)
    }

    /// Opens the database at [`crate::paths::default_db_path`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_default() -> Result<Self, DbError> {
        Self::open(&crate::paths::default_db_path())
    }

    /// Opens a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if schema creation fails.
    pub fn from_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Closes the connection, surfacing any error the drop would swallow.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if `DuckDB` fails to close cleanly.
    pub fn close(self) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, e)| DbError::DuckDb(e))
    }

    /// Returns the id a loader should assign to the next inserted row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn next_id(&self) -> Result<u64, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT COALESCE(MAX(db_id), 0) + 1 FROM prices_coordinates_data")?;
        let next: i64 = stmt.query_row([], |row| row.get(0))?;
        to_u64(next, "db_id")
    }

    /// Inserts a batch of transactions, replacing rows with the same id.
    ///
    /// Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a value cannot be bound or the insert fails.
    pub fn insert_transactions(&self, transactions: &[Transaction]) -> Result<u64, DbError> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0u64;

        for chunk in transactions.chunks(CHUNK_SIZE) {
            let mut sql = String::from(
                "INSERT OR REPLACE INTO prices_coordinates_data (
                    db_id, price, date_of_transfer, postcode, property_type,
                    new_build_flag, tenure_type, locality, town_city, district,
                    county, country, latitude, longitude
                ) VALUES ",
            );

            for (i, _) in chunk.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str("(?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
            }

            let mut stmt = self.conn.prepare(&sql)?;
            let mut param_idx = 1usize;

            for t in chunk {
                stmt.raw_bind_parameter(param_idx, to_i64(t.id, "db_id")?)?;
                stmt.raw_bind_parameter(param_idx + 1, to_i64(t.price, "price")?)?;
                stmt.raw_bind_parameter(
                    param_idx + 2,
                    t.date_of_transfer.format("%Y-%m-%d").to_string(),
                )?;
                stmt.raw_bind_parameter(param_idx + 3, &t.postcode)?;
                stmt.raw_bind_parameter(param_idx + 4, t.property_type.code())?;
                stmt.raw_bind_parameter(param_idx + 5, if t.new_build_flag { "Y" } else { "N" })?;
                stmt.raw_bind_parameter(param_idx + 6, t.tenure_type.code())?;
                stmt.raw_bind_parameter(param_idx + 7, &t.locality)?;
                stmt.raw_bind_parameter(param_idx + 8, &t.town_city)?;
                stmt.raw_bind_parameter(param_idx + 9, &t.district)?;
                stmt.raw_bind_parameter(param_idx + 10, &t.county)?;
                stmt.raw_bind_parameter(param_idx + 11, &t.country)?;
                stmt.raw_bind_parameter(param_idx + 12, t.latitude)?;
                stmt.raw_bind_parameter(param_idx + 13, t.longitude)?;

                param_idx += 14;
            }

            let rows = stmt.raw_execute()?;
            total_inserted += u64::try_from(rows).unwrap_or(0);
        }

        log::debug!("Inserted {total_inserted} transactions");
        Ok(total_inserted)
    }

    /// Counts empty or NULL values in every column.
    ///
    /// Useful for judging which joined columns are reliable enough to use
    /// as features.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a count query fails.
    pub fn column_empty_counts(&self) -> Result<Vec<(String, u64)>, DbError> {
        let mut counts = Vec::with_capacity(COLUMNS.len());

        for column in COLUMNS {
            let count: i64 = self
                .conn
                .prepare(&format!(
                    "SELECT COUNT(*) FROM prices_coordinates_data
                     WHERE {column} IS NULL OR CAST({column} AS TEXT) = ''"
                ))?
                .query_row([], |row| row.get(0))?;
            log::debug!("Counted empty values for column {column}");
            counts.push(((*column).to_string(), to_u64(count, column)?));
        }

        Ok(counts)
    }
}

impl TransactionRepository for DuckDbRepository {
    fn transactions_in_window(
        &self,
        window: &TransactionWindow,
    ) -> Result<Vec<Transaction>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT db_id, price, date_of_transfer::TEXT, postcode, property_type,
                    new_build_flag, tenure_type, locality, town_city, district,
                    county, country, latitude, longitude
             FROM prices_coordinates_data
             WHERE date_of_transfer >= CAST(? AS DATE)
               AND date_of_transfer < CAST(? AS DATE)
               AND latitude BETWEEN ? AND ?
               AND longitude BETWEEN ? AND ?
             ORDER BY db_id",
        )?;

        let mut rows = stmt.query(duckdb::params![
            window.start.format("%Y-%m-%d").to_string(),
            window.end.format("%Y-%m-%d").to_string(),
            window.bbox.south,
            window.bbox.north,
            window.bbox.west,
            window.bbox.east,
        ])?;

        let mut transactions = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let price: i64 = row.get(1)?;
            let date: String = row.get(2)?;
            let property_type: String = row.get(4)?;
            let new_build_flag: String = row.get(5)?;
            let tenure_type: String = row.get(6)?;

            transactions.push(Transaction {
                id: to_u64(id, "db_id")?,
                price: to_u64(price, "price")?,
                date_of_transfer: parse_date(&date)?,
                postcode: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                property_type: PropertyType::from_str(&property_type).map_err(|e| {
                    DbError::Conversion {
                        message: format!("row {id}: property_type '{property_type}': {e}"),
                    }
                })?,
                new_build_flag: new_build_flag == "Y",
                tenure_type: TenureType::from_str(&tenure_type).map_err(|e| {
                    DbError::Conversion {
                        message: format!("row {id}: tenure_type '{tenure_type}': {e}"),
                    }
                })?,
                locality: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                town_city: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                district: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                county: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                country: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                latitude: row.get(12)?,
                longitude: row.get(13)?,
            });
        }

        log::info!(
            "Selected {} transactions between {} and {}",
            transactions.len(),
            window.start,
            window.end
        );

        Ok(transactions)
    }

    fn count(&self) -> Result<u64, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM prices_coordinates_data")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        to_u64(count, "count")
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS prices_coordinates_data (
            db_id BIGINT NOT NULL PRIMARY KEY,
            price BIGINT NOT NULL,
            date_of_transfer DATE NOT NULL,
            postcode TEXT NOT NULL,
            property_type TEXT NOT NULL,
            new_build_flag TEXT NOT NULL,
            tenure_type TEXT NOT NULL,
            locality TEXT,
            town_city TEXT,
            district TEXT,
            county TEXT,
            country TEXT,
            latitude DOUBLE NOT NULL,
            longitude DOUBLE NOT NULL
        );",
    )?;

    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| DbError::Conversion {
        message: format!("invalid date_of_transfer '{s}': {e}"),
    })
}

fn to_u64(value: i64, column: &str) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("negative {column}: {value}"),
    })
}

fn to_i64(value: u64, column: &str) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("{column} out of range: {value}"),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::test_support::transaction;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn round_trips_transactions() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let original = transaction(1, 325_000, date(2020, 4, 14), 52.2, 0.12);
        assert_eq!(repo.insert_transactions(&[original.clone()]).unwrap(), 1);

        let window = TransactionWindow::around(52.2, 0.12, date(2020, 4, 14), 15.0, 300).unwrap();
        let loaded = repo.transactions_in_window(&window).unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn window_query_filters_dates_and_box() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let center = date(2020, 4, 14);
        let window = TransactionWindow::around(52.2, 0.12, center, 15.0, 300).unwrap();

        repo.insert_transactions(&[
            transaction(4, 100_000, center, 52.2, 0.12),
            transaction(1, 200_000, window.start, 52.2, 0.12),
            transaction(2, 300_000, window.end, 52.2, 0.12),
            transaction(3, 400_000, center, 52.2, window.bbox.east),
            transaction(5, 500_000, center, 52.2, window.bbox.east + 0.001),
        ])
        .unwrap();

        let ids: Vec<u64> = repo
            .transactions_in_window(&window)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(repo.count().unwrap(), 5);
        assert_eq!(repo.next_id().unwrap(), 6);
    }

    #[test]
    fn counts_empty_values_per_column() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.insert_transactions(&[
            transaction(1, 100_000, date(2020, 1, 1), 52.2, 0.12),
            transaction(2, 100_000, date(2020, 1, 1), 52.2, 0.12),
        ])
        .unwrap();

        let counts = repo.column_empty_counts().unwrap();
        assert_eq!(counts.len(), COLUMNS.len());

        let locality = counts.iter().find(|(c, _)| c == "locality").unwrap();
        assert_eq!(locality.1, 2);
        let price = counts.iter().find(|(c, _)| c == "price").unwrap();
        assert_eq!(price.1, 0);
    }
}
