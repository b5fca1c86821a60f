use super::{AGGREGATE_NAME, RecordStore, StoreError, TableName, Tabular};
use crate::models::CleanedValue;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS watchlist_run_ids START 1;

CREATE TABLE IF NOT EXISTS table_columns (
    db          VARCHAR  NOT NULL,
    ticker      VARCHAR  NOT NULL,
    table_name  VARCHAR  NOT NULL,
    col_pos     INTEGER  NOT NULL,
    name        VARCHAR  NOT NULL
);

CREATE TABLE IF NOT EXISTS table_rows (
    db          VARCHAR  NOT NULL,
    ticker      VARCHAR  NOT NULL,
    table_name  VARCHAR  NOT NULL,
    row_pos     INTEGER  NOT NULL,
    row_index   VARCHAR  NOT NULL
);

CREATE TABLE IF NOT EXISTS table_cells (
    db          VARCHAR  NOT NULL,
    ticker      VARCHAR  NOT NULL,
    table_name  VARCHAR  NOT NULL,
    row_pos     INTEGER  NOT NULL,
    col_pos     INTEGER  NOT NULL,
    -- NULL in all three is a missing value
    num         DOUBLE,
    day         DATE,
    txt         VARCHAR
);

CREATE TABLE IF NOT EXISTS watchlist_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('watchlist_run_ids'),
    db                  VARCHAR NOT NULL,
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    tickers_processed   INTEGER DEFAULT 0,
    tickers_skipped     INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

// No primary keys: a rewrite deletes and re-inserts the same positions in one
// transaction, which DuckDB's unique indexes reject.
const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_cells_ticker ON table_cells (db, ticker);
CREATE INDEX IF NOT EXISTS idx_rows_ticker  ON table_rows (db, ticker);
"#;

/// Tables to clear before a table is rewritten.
const TABLE_PARTS: [&str; 3] = ["table_columns", "table_rows", "table_cells"];

// ── Store ─────────────────────────────────────────────────────────────────────

/// Cell-level store for any number of watchlist databases in one DuckDB
/// file. `db` names the database this handle reads and writes.
pub struct DuckDbRecordStore {
    conn: Connection,
    db: String,
}

impl DuckDbRecordStore {
    pub fn open(path: &Path, db: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn, db: db.into() })
    }

    pub fn open_in_memory(db: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            db: db.into(),
        })
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

    // ── Watchlist run log ─────────────────────────────────────────────────────

    pub fn begin_run(&self) -> Result<i64, StoreError> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO watchlist_runs (db, started_at, status) VALUES (?, ?, 'running') RETURNING id",
            params![self.db, Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        processed: usize,
        skipped: usize,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r#"UPDATE watchlist_runs SET
               finished_at = ?, status = ?,
               tickers_processed = ?, tickers_skipped = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                processed as i64,
                skipped as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    fn write(&self, ticker: &str, table: &str, data: &Tabular) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        for part in TABLE_PARTS {
            tx.execute(
                &format!("DELETE FROM {} WHERE db = ? AND ticker = ? AND table_name = ?", part),
                params![self.db, ticker, table],
            )?;
        }

        for (pos, name) in data.columns.iter().enumerate() {
            tx.execute(
                "INSERT INTO table_columns (db, ticker, table_name, col_pos, name) VALUES (?, ?, ?, ?, ?)",
                params![self.db, ticker, table, pos as i64, name],
            )?;
        }

        for (row_pos, (index, cells)) in data.rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO table_rows (db, ticker, table_name, row_pos, row_index) VALUES (?, ?, ?, ?, ?)",
                params![self.db, ticker, table, row_pos as i64, index],
            )?;
            for (col_pos, cell) in cells.iter().enumerate() {
                let (num, day, txt) = split_cell(cell);
                tx.execute(
                    r#"INSERT INTO table_cells
                           (db, ticker, table_name, row_pos, col_pos, num, day, txt)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
                    params![self.db, ticker, table, row_pos as i64, col_pos as i64, num, day, txt],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn read(&self, ticker: &str, table: &str) -> Result<Option<Tabular>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM table_columns WHERE db = ? AND ticker = ? AND table_name = ? ORDER BY col_pos",
        )?;
        let columns: Vec<String> = stmt
            .query_map(params![self.db, ticker, table], |r| r.get(0))?
            .collect::<Result<_, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT row_index FROM table_rows WHERE db = ? AND ticker = ? AND table_name = ? ORDER BY row_pos",
        )?;
        let indexes: Vec<String> = stmt
            .query_map(params![self.db, ticker, table], |r| r.get(0))?
            .collect::<Result<_, _>>()?;

        if columns.is_empty() && indexes.is_empty() {
            return Ok(None);
        }

        let mut data = Tabular::new(columns);
        data.rows = indexes.into_iter().map(|i| (i, Vec::new())).collect();

        let mut stmt = self.conn.prepare(
            r#"SELECT row_pos, num, day, txt FROM table_cells
               WHERE db = ? AND ticker = ? AND table_name = ?
               ORDER BY row_pos, col_pos"#,
        )?;
        let cells = stmt.query_map(params![self.db, ticker, table], |r| {
            let row_pos: i64 = r.get(0)?;
            let num: Option<f64> = r.get(1)?;
            let day: Option<NaiveDate> = r.get(2)?;
            let txt: Option<String> = r.get(3)?;
            Ok((row_pos, join_cell(num, day, txt)))
        })?;
        for cell in cells {
            let (row_pos, value) = cell?;
            let row = data
                .rows
                .get_mut(row_pos as usize)
                .ok_or_else(|| StoreError::Malformed(format!("{}/{}: cell for row {}", ticker, table, row_pos)))?;
            row.1.push(value);
        }
        Ok(Some(data))
    }
}

fn split_cell(cell: &CleanedValue) -> (Option<f64>, Option<NaiveDate>, Option<String>) {
    match cell {
        CleanedValue::Number(n) => (Some(*n), None, None),
        CleanedValue::Date(d) => (None, Some(*d), None),
        CleanedValue::Text(t) => (None, None, Some(t.clone())),
        CleanedValue::Missing => (None, None, None),
    }
}

fn join_cell(num: Option<f64>, day: Option<NaiveDate>, txt: Option<String>) -> CleanedValue {
    match (num, day, txt) {
        (Some(n), _, _) => CleanedValue::number(n),
        (_, Some(d), _) => CleanedValue::Date(d),
        (_, _, Some(t)) => CleanedValue::Text(t),
        _ => CleanedValue::Missing,
    }
}

impl RecordStore for DuckDbRecordStore {
    fn write_table(&self, ticker: &str, table: TableName, data: &Tabular) -> Result<(), StoreError> {
        self.write(ticker, table.file_stem(), data)
    }

    fn read_table(&self, ticker: &str, table: TableName) -> Result<Tabular, StoreError> {
        self.read(ticker, table.file_stem())?
            .ok_or_else(|| StoreError::NotFound {
                ticker: ticker.to_string(),
                table,
            })
    }

    fn exists(&self, ticker: &str) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM table_rows WHERE db = ? AND ticker = ?",
            params![self.db, ticker],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn write_aggregate(&self, data: &Tabular) -> Result<(), StoreError> {
        self.write(AGGREGATE_NAME, AGGREGATE_NAME, data)
    }

    fn tickers(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT ticker FROM table_rows WHERE db = ? AND table_name <> ? ORDER BY ticker",
        )?;
        let tickers = stmt
            .query_map(params![self.db, AGGREGATE_NAME], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(db: &str) -> DuckDbRecordStore {
        let store = DuckDbRecordStore::open_in_memory(db).unwrap();
        store.run_migrations().unwrap();
        store
    }

    #[test]
    fn test_round_trip() {
        let store = store("tech_10-28-2021");
        let date = NaiveDate::from_ymd_opt(2021, 10, 28).unwrap();

        let mut data = Tabular::new(vec!["AAPL".into(), "Rating Since".into()]);
        data.push("ford", vec![CleanedValue::Number(4.0), CleanedValue::Date(date)]);
        data.push("theStreet", vec![CleanedValue::Text("buy".into()), CleanedValue::Missing]);

        assert!(!store.exists("AAPL").unwrap());
        store.write_table("AAPL", TableName::Analysts, &data).unwrap();
        assert!(store.exists("AAPL").unwrap());
        assert_eq!(store.read_table("AAPL", TableName::Analysts).unwrap(), data);

        // rewriting replaces the previous content
        let mut smaller = Tabular::new(vec!["AAPL".into()]);
        smaller.push("Beta", vec![CleanedValue::Number(1.2)]);
        store.write_table("AAPL", TableName::Analysts, &smaller).unwrap();
        assert_eq!(store.read_table("AAPL", TableName::Analysts).unwrap(), smaller);

        assert!(matches!(
            store.read_table("AAPL", TableName::Combined),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_tickers_exclude_aggregate() {
        let store = store("tech");
        let mut data = Tabular::new(vec!["x".into()]);
        data.push("Beta", vec![CleanedValue::Number(1.0)]);
        store.write_table("MSFT", TableName::Combined, &data).unwrap();
        store.write_table("AAPL", TableName::Combined, &data).unwrap();
        store.write_aggregate(&data).unwrap();
        assert_eq!(store.tickers().unwrap(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_run_log() {
        let store = store("tech");
        let id = store.begin_run().unwrap();
        store.finish_run(id, 3, 1, None).unwrap();
        let status: String = store
            .conn
            .query_row("SELECT status FROM watchlist_runs WHERE id = ?", params![id], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "success");
    }
}
