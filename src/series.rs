use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::EngineError;

/// One end-of-day observation for a single ticker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Daily price series for one ticker. Dates are strictly increasing with no
/// gaps inside the covered range; the upstream cleaning step guarantees this,
/// the constructor only re-checks the ordering.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn from_points(points: Vec<PricePoint>) -> Result<Self> {
        for win in points.windows(2) {
            if win[1].date <= win[0].date {
                bail!(
                    "price series dates not strictly increasing: {} then {}",
                    win[0].date,
                    win[1].date
                );
            }
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }
}

/// Date-indexed table of adjusted closes for the whole universe, as produced
/// by the external cleaning step. Wide CSV layout: `date,TICKER,TICKER,...`.
#[derive(Debug, Clone)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    columns: HashMap<String, Vec<f64>>,
}

impl PriceTable {
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open price table {}", path_ref.display()))?;
        let mut lines = BufReader::new(file).lines();

        let header = match lines.next() {
            Some(line) => line.context("failed to read price table header")?,
            None => bail!("price table {} is empty", path_ref.display()),
        };
        let mut fields = header.split(',').map(str::trim);
        match fields.next() {
            Some("date") => {}
            other => bail!(
                "price table header must start with 'date', got {:?}",
                other.unwrap_or("")
            ),
        }
        let tickers: Vec<String> = fields.map(|t| t.to_string()).collect();
        if tickers.is_empty() {
            bail!("price table {} has no ticker columns", path_ref.display());
        }

        let mut dates = Vec::new();
        let mut columns: HashMap<String, Vec<f64>> =
            tickers.iter().map(|t| (t.clone(), Vec::new())).collect();

        for (row_idx, line) in lines.enumerate() {
            let line = line.context("failed to read price table row")?;
            if line.trim().is_empty() {
                continue;
            }
            let mut cells = line.split(',').map(str::trim);
            let date_cell = cells
                .next()
                .with_context(|| format!("row {} has no date cell", row_idx + 2))?;
            let date = NaiveDate::parse_from_str(date_cell, "%Y-%m-%d")
                .with_context(|| format!("row {}: invalid date '{}'", row_idx + 2, date_cell))?;
            if let Some(last) = dates.last() {
                if date <= *last {
                    bail!("row {}: dates not strictly increasing at {}", row_idx + 2, date);
                }
            }
            dates.push(date);
            for ticker in &tickers {
                let cell = cells.next().with_context(|| {
                    format!("row {}: missing value for {}", row_idx + 2, ticker)
                })?;
                let value: f64 = cell.parse().with_context(|| {
                    format!("row {}: invalid price '{}' for {}", row_idx + 2, cell, ticker)
                })?;
                columns.get_mut(ticker).unwrap().push(value);
            }
        }

        if dates.is_empty() {
            bail!("price table {} has no rows", path_ref.display());
        }

        Ok(Self { dates, columns })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn series(&self, ticker: &str) -> Result<PriceSeries> {
        let column = self
            .columns
            .get(ticker)
            .with_context(|| format!("ticker {} not found in price table", ticker))?;
        let points = self
            .dates
            .iter()
            .zip(column.iter())
            .map(|(date, value)| PricePoint {
                date: *date,
                value: *value,
            })
            .collect();
        PriceSeries::from_points(points)
    }
}

/// Two price series joined on their common dates. Positions in `y` and `x`
/// correspond one-to-one with `dates`.
#[derive(Debug, Clone)]
pub struct PairSeries {
    pub y_ticker: String,
    pub x_ticker: String,
    dates: Vec<NaiveDate>,
    y: Vec<f64>,
    x: Vec<f64>,
}

impl PairSeries {
    /// Inner join on dates, the same alignment the cleaning collaborator's
    /// consumers perform. Leaves degenerate-length checks to the estimator.
    pub fn align(
        y_ticker: &str,
        x_ticker: &str,
        y: &PriceSeries,
        x: &PriceSeries,
    ) -> Result<Self, EngineError> {
        let x_by_date: HashMap<NaiveDate, f64> =
            x.points().iter().map(|p| (p.date, p.value)).collect();

        let mut dates = Vec::new();
        let mut y_vals = Vec::new();
        let mut x_vals = Vec::new();
        for point in y.points() {
            if let Some(x_val) = x_by_date.get(&point.date) {
                dates.push(point.date);
                y_vals.push(point.value);
                x_vals.push(*x_val);
            }
        }

        if dates.is_empty() {
            return Err(EngineError::InsufficientData {
                required: 2,
                actual: 0,
            });
        }

        Ok(Self {
            y_ticker: y_ticker.to_string(),
            x_ticker: x_ticker.to_string(),
            dates,
            y: y_vals,
            x: x_vals,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_wide_csv_table() {
        let file = write_csv(
            "date,KO,PEP\n2024-01-02,60.0,170.0\n2024-01-03,60.5,171.2\n2024-01-04,59.8,169.9\n",
        );
        let table = PriceTable::from_csv_path(file.path()).unwrap();
        assert_eq!(table.len(), 3);
        let ko = table.series("KO").unwrap();
        assert_eq!(ko.len(), 3);
        assert_eq!(ko.points()[1].value, 60.5);
        assert!(table.series("XOM").is_err());
    }

    #[test]
    fn rejects_non_increasing_dates() {
        let file = write_csv("date,KO\n2024-01-03,60.0\n2024-01-02,60.5\n");
        assert!(PriceTable::from_csv_path(file.path()).is_err());
    }

    #[test]
    fn rejects_missing_cells() {
        let file = write_csv("date,KO,PEP\n2024-01-02,60.0\n");
        assert!(PriceTable::from_csv_path(file.path()).is_err());
    }

    #[test]
    fn align_takes_inner_join_on_dates() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let y = PriceSeries::from_points(vec![
            PricePoint { date: d(1), value: 10.0 },
            PricePoint { date: d(2), value: 11.0 },
            PricePoint { date: d(4), value: 12.0 },
        ])
        .unwrap();
        let x = PriceSeries::from_points(vec![
            PricePoint { date: d(2), value: 20.0 },
            PricePoint { date: d(3), value: 21.0 },
            PricePoint { date: d(4), value: 22.0 },
        ])
        .unwrap();
        let pair = PairSeries::align("Y", "X", &y, &x).unwrap();
        assert_eq!(pair.dates(), &[d(2), d(4)]);
        assert_eq!(pair.y(), &[11.0, 12.0]);
        assert_eq!(pair.x(), &[20.0, 22.0]);
    }

    #[test]
    fn align_with_no_overlap_is_insufficient_data() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let y = PriceSeries::from_points(vec![PricePoint { date: d(1), value: 10.0 }]).unwrap();
        let x = PriceSeries::from_points(vec![PricePoint { date: d(2), value: 20.0 }]).unwrap();
        assert!(matches!(
            PairSeries::align("Y", "X", &y, &x),
            Err(EngineError::InsufficientData { .. })
        ));
    }
}
