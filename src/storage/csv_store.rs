use super::{AGGREGATE_NAME, INDEX_COLUMN, RecordStore, StoreError, TableName, Tabular};
use crate::models::CleanedValue;
use crate::utils::run_dir_name;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One watchlist database on disk:
/// `<root>/<name>_<MM-DD-YYYY>/<TICKER>/<table>.csv` plus `big_df.csv`.
pub struct CsvRecordStore {
    dir: PathBuf,
}

impl CsvRecordStore {
    /// Database directory for a run of watchlist `name` on `date`, created if
    /// needed.
    pub fn create(root: &Path, name: &str, date: NaiveDate) -> Result<Self, StoreError> {
        let dir = root.join(run_dir_name(name, date));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// An existing database directory.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, ticker: &str, table: TableName) -> PathBuf {
        self.dir.join(ticker).join(format!("{}.csv", table.file_stem()))
    }

    /// Any table as a standalone CSV file, index column first.
    pub fn write_csv(path: &Path, data: &Tabular) -> Result<(), StoreError> {
        let mut wtr = csv::Writer::from_path(path)?;
        let mut header = vec![INDEX_COLUMN];
        header.extend(data.columns.iter().map(String::as_str));
        wtr.write_record(&header)?;
        for (index, cells) in &data.rows {
            let mut record = vec![index.clone()];
            record.extend(cells.iter().map(CleanedValue::to_cell));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn read_csv(path: &Path) -> Result<Tabular, StoreError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let columns = rdr.headers()?.iter().skip(1).map(str::to_string).collect();
        let mut data = Tabular::new(columns);
        for record in rdr.records() {
            let record = record?;
            let mut fields = record.iter();
            let Some(index) = fields.next() else {
                continue;
            };
            data.push(index, fields.map(CleanedValue::from_cell).collect());
        }
        Ok(data)
    }
}

impl RecordStore for CsvRecordStore {
    fn write_table(&self, ticker: &str, table: TableName, data: &Tabular) -> Result<(), StoreError> {
        let path = self.table_path(ticker, table);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("Writing {}", path.display());
        Self::write_csv(&path, data)
    }

    fn read_table(&self, ticker: &str, table: TableName) -> Result<Tabular, StoreError> {
        let path = self.table_path(ticker, table);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                ticker: ticker.to_string(),
                table,
            });
        }
        Self::read_csv(&path)
    }

    fn exists(&self, ticker: &str) -> Result<bool, StoreError> {
        Ok(self.dir.join(ticker).is_dir())
    }

    fn write_aggregate(&self, data: &Tabular) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        Self::write_csv(&self.dir.join(format!("{}.csv", AGGREGATE_NAME)), data)
    }

    fn tickers(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CleanedValue;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tds_csv_{}_{}", name, std::process::id()));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    #[test]
    fn test_round_trip() {
        let root = scratch("round_trip");
        let date = NaiveDate::from_ymd_opt(2021, 10, 28).unwrap();
        let store = CsvRecordStore::create(&root, "tech", date).unwrap();
        assert!(store.dir().ends_with("tech_10-28-2021"));

        let mut data = Tabular::new(vec!["AAPL".into(), "Rating Since".into()]);
        data.push("ford", vec![CleanedValue::Number(4.0), CleanedValue::Date(date)]);
        data.push("theStreet", vec![CleanedValue::Text("buy".into()), CleanedValue::Missing]);
        data.push("Beta, 5yr", vec![CleanedValue::Number(1.0 / 3.0), CleanedValue::Missing]);

        assert!(!store.exists("AAPL").unwrap());
        store.write_table("AAPL", TableName::Analysts, &data).unwrap();
        assert!(store.exists("AAPL").unwrap());

        let back = store.read_table("AAPL", TableName::Analysts).unwrap();
        assert_eq!(back, data);

        let err = store.read_table("AAPL", TableName::Combined).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        store.write_table("MSFT", TableName::Combined, &data).unwrap();
        store.write_aggregate(&data).unwrap();
        assert_eq!(store.tickers().unwrap(), vec!["AAPL", "MSFT"]);
        assert!(store.dir().join("big_df.csv").is_file());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_text_cells_that_look_typed() {
        use crate::models::{CombinedRecord, Section};
        use crate::normalize::normalize;

        let root = scratch("typed_text");
        let store = CsvRecordStore::open(&root);

        let (name, value) = normalize(Section::Summary, "Shares Rank", "12");
        assert_eq!(value, CleanedValue::Text("12".into()));

        let mut rec = CombinedRecord::new("AAPL");
        rec.fields.insert(name, value);
        rec.fields.insert("Note", CleanedValue::Text("NaN".into()));
        rec.fields.insert("Ceiling", CleanedValue::Text("inf".into()));
        rec.fields.insert("Label Date", CleanedValue::Text("2021-10-28".into()));
        rec.fields.insert("Blank", CleanedValue::Text(String::new()));
        rec.fields.insert("Beta", CleanedValue::Number(1.25));
        rec.fields.insert("Gap", CleanedValue::Missing);

        store
            .write_table("AAPL", TableName::Combined, &Tabular::from_combined(&rec))
            .unwrap();
        let back = store
            .read_table("AAPL", TableName::Combined)
            .unwrap()
            .into_combined()
            .unwrap();
        assert_eq!(back, rec);

        fs::remove_dir_all(&root).ok();
    }
}
