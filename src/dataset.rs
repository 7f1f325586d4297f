//! Customer records and CSV loading/export.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};

pub const CUSTOMER_ID_COLUMN: &str = "CustomerID";
pub const GENDER_COLUMN: &str = "Gender";
pub const AGE_COLUMN: &str = "Age";
pub const INCOME_COLUMN: &str = "Annual Income (k$)";
pub const SPENDING_COLUMN: &str = "Spending Score (1-100)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("male") {
            Some(Gender::Male)
        } else if raw.eq_ignore_ascii_case("female") {
            Some(Gender::Female)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed CSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: i64,
    pub gender: Option<Gender>,
    pub age: Option<u32>,
    pub annual_income: f64,
    pub spending_score: f64,
}

/// The currently loaded customers, in file order.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<CustomerRecord>,
    /// Header names exactly as they appeared in the source file.
    pub columns: Vec<String>,
}

/// Positions of the recognised columns inside a CSV header.
#[derive(Debug)]
struct ColumnMap {
    id: usize,
    gender: Option<usize>,
    age: Option<usize>,
    income: usize,
    spending: usize,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self> {
        let id_names = [CUSTOMER_ID_COLUMN, "customer_id", "customerid", "id"];
        let id = find_column(headers, &id_names, None).ok_or_else(|| missing(CUSTOMER_ID_COLUMN))?;
        let income = find_column(headers, &[INCOME_COLUMN, "annual_income"], Some("income"))
            .ok_or_else(|| missing(INCOME_COLUMN))?;
        let spending = find_column(headers, &[SPENDING_COLUMN, "spending_score"], Some("spend"))
            .ok_or_else(|| missing(SPENDING_COLUMN))?;
        Ok(Self {
            id,
            gender: find_column(headers, &[GENDER_COLUMN], None),
            age: find_column(headers, &[AGE_COLUMN], None),
            income,
            spending,
        })
    }
}

fn missing(column: &str) -> SegmentError {
    SegmentError::Parse(format!("missing required column '{}'", column))
}

/// Exact (case-insensitive) match on any candidate first, then substring match.
fn find_column(headers: &[String], candidates: &[&str], contains: Option<&str>) -> Option<usize> {
    for candidate in candidates {
        if let Some(pos) = headers.iter().position(|h| h.eq_ignore_ascii_case(candidate)) {
            return Some(pos);
        }
    }
    let needle = contains?;
    headers
        .iter()
        .position(|h| h.to_ascii_lowercase().contains(needle))
}

fn cell<'a>(record: &'a csv::StringRecord, idx: usize) -> &'a str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn parse_number(raw: &str, column: &str, row: usize) -> Result<f64> {
    let value: f64 = raw.parse().map_err(|_| {
        SegmentError::Parse(format!("row {}: invalid {} value '{}'", row, column, raw))
    })?;
    if !value.is_finite() {
        return Err(SegmentError::Parse(format!(
            "row {}: {} must be finite, got '{}'",
            row, column, raw
        )));
    }
    Ok(value)
}

impl Dataset {
    /// Parse a customer CSV from any reader.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(|e| SegmentError::Parse(format!("unreadable header: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let map = ColumnMap::resolve(&columns)?;
        debug!("resolved columns {:?} from header {:?}", map, columns);

        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for (i, result) in rdr.records().enumerate() {
            let row = i + 1;
            let record = result
                .map_err(|e| SegmentError::Parse(format!("error reading record {}: {}", row, e)))?;

            let raw_id = cell(&record, map.id);
            let customer_id: i64 = raw_id.parse().map_err(|_| {
                SegmentError::Parse(format!(
                    "row {}: invalid {} '{}'",
                    row, CUSTOMER_ID_COLUMN, raw_id
                ))
            })?;
            if !seen.insert(customer_id) {
                return Err(SegmentError::Parse(format!(
                    "row {}: duplicate {} {}",
                    row, CUSTOMER_ID_COLUMN, customer_id
                )));
            }

            let gender = match map.gender.map(|idx| cell(&record, idx)) {
                None | Some("") => None,
                Some(raw) => Some(Gender::parse(raw).ok_or_else(|| {
                    SegmentError::Parse(format!("row {}: unknown gender '{}'", row, raw))
                })?),
            };

            let age = match map.age.map(|idx| cell(&record, idx)) {
                None | Some("") => None,
                Some(raw) => match raw.parse::<u32>() {
                    Ok(age) if age > 0 => Some(age),
                    _ => {
                        return Err(SegmentError::Parse(format!(
                            "row {}: age must be a positive integer, got '{}'",
                            row, raw
                        )))
                    }
                },
            };

            let annual_income = parse_number(cell(&record, map.income), INCOME_COLUMN, row)?;
            if annual_income < 0.0 {
                return Err(SegmentError::Parse(format!(
                    "row {}: {} must be >= 0, got {}",
                    row, INCOME_COLUMN, annual_income
                )));
            }

            let spending_score = parse_number(cell(&record, map.spending), SPENDING_COLUMN, row)?;
            if !(1.0..=100.0).contains(&spending_score) {
                return Err(SegmentError::Parse(format!(
                    "row {}: {} must be within [1, 100], got {}",
                    row, SPENDING_COLUMN, spending_score
                )));
            }

            records.push(CustomerRecord {
                customer_id,
                gender,
                age,
                annual_income,
                spending_score,
            });
        }

        if records.is_empty() {
            return Err(SegmentError::Parse("no data rows found".to_string()));
        }

        info!("loaded {} customers with columns {:?}", records.len(), columns);
        Ok(Self { records, columns })
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path).map_err(|e| {
            SegmentError::Parse(format!("failed to open {:?}: {}", path.as_ref(), e))
        })?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Deterministic stand-in used when nothing has been uploaded yet:
    /// 200 customers in five income/spending groups of 40.
    pub fn sample(seed: u64) -> Self {
        const GROUPS: [((u32, u32), (u32, u32)); 5] = [
            ((80, 140), (70, 100)),
            ((80, 140), (1, 30)),
            ((15, 40), (70, 100)),
            ((15, 40), (1, 30)),
            ((40, 80), (30, 70)),
        ];

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut records = Vec::with_capacity(200);
        for (group, (income, spending)) in GROUPS.iter().enumerate() {
            for j in 0..40 {
                let gender = if rng.gen_bool(0.5) { Gender::Male } else { Gender::Female };
                records.push(CustomerRecord {
                    customer_id: (group * 40 + j + 1) as i64,
                    gender: Some(gender),
                    age: Some(rng.gen_range(18..70)),
                    annual_income: rng.gen_range(income.0..income.1) as f64,
                    spending_score: rng.gen_range(spending.0..spending.1) as f64,
                });
            }
        }

        Self {
            records,
            columns: vec![
                CUSTOMER_ID_COLUMN.to_string(),
                GENDER_COLUMN.to_string(),
                AGE_COLUMN.to_string(),
                INCOME_COLUMN.to_string(),
                SPENDING_COLUMN.to_string(),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MALL: &str = "CustomerID,Gender,Age,Annual Income (k$),Spending Score (1-100)\n\
                        1,Male,19,15,39\n\
                        2,Male,21,15,81\n\
                        3,Female,20,16,6\n\
                        4,Female,23,16,77\n\
                        5,Female,31,17,40\n";

    #[test]
    fn test_parse_mall_csv() {
        let ds = Dataset::from_csv_str(MALL).unwrap();
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.columns.len(), 5);
        assert_eq!(ds.records[2].gender, Some(Gender::Female));
        assert_eq!(ds.records[4].age, Some(31));
        assert_eq!(ds.records[1].spending_score, 81.0);
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let ds =
            Dataset::from_csv_str("CustomerID,annual_income,spending_score\n7,50,50\n").unwrap();
        assert_eq!(ds.records[0].gender, None);
        assert_eq!(ds.records[0].age, None);
        assert_eq!(ds.records[0].customer_id, 7);
    }

    #[test]
    fn test_fuzzy_income_column() {
        let ds = Dataset::from_csv_str("CustomerID,Yearly Income,Spend\n1,20,30\n").unwrap();
        assert_eq!(ds.records[0].annual_income, 20.0);
        assert_eq!(ds.records[0].spending_score, 30.0);
    }

    #[test]
    fn test_missing_spending_column_is_named() {
        let err = Dataset::from_csv_str("CustomerID,Annual Income (k$)\n1,15\n").unwrap_err();
        assert!(matches!(err, SegmentError::Parse(_)));
        assert!(err.to_string().contains(SPENDING_COLUMN));
    }

    #[test]
    fn test_bad_cells_rejected() {
        let header = "CustomerID,Gender,Age,Annual Income (k$),Spending Score (1-100)\n";
        for row in [
            "1,Male,19,abc,39",
            "1,Male,19,15,0",
            "1,Male,19,15,101",
            "1,Male,0,15,39",
            "1,Other,19,15,39",
            "x,Male,19,15,39",
            "1,Male,19,-1,39",
        ] {
            let text = format!("{}{}\n", header, row);
            let err = Dataset::from_csv_str(&text).unwrap_err();
            assert!(matches!(err, SegmentError::Parse(_)), "row {:?} gave {:?}", row, err);
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = Dataset::from_csv_str("CustomerID,annual_income,spending_score\n1,5,5\n1,6,6\n")
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = Dataset::from_csv_str("CustomerID,annual_income,spending_score\n").unwrap_err();
        assert!(matches!(err, SegmentError::Parse(_)));
    }

    #[test]
    fn test_sample_is_deterministic() {
        let a = Dataset::sample(42);
        let b = Dataset::sample(42);
        assert_eq!(a.len(), 200);
        assert_eq!(a.records, b.records);
        assert!(a.records[..40]
            .iter()
            .all(|r| r.annual_income >= 80.0 && r.spending_score >= 70.0));
    }
}
