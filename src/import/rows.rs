use crate::import::error::ImportError;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;

/// Header name -> column position of an uploaded file.
pub struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let mut index = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            index.entry(h.trim().to_ascii_lowercase()).or_insert(i);
        }
        Self { index }
    }

    pub fn require(&self, name: &str) -> Result<usize, ImportError> {
        self.optional(name)
            .ok_or_else(|| ImportError::MissingColumn(name.to_string()))
    }

    pub fn optional(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

pub struct Row<'r> {
    record: &'r StringRecord,
    line: u64,
}

impl Row<'_> {
    pub fn text(&self, idx: usize) -> &str {
        self.record.get(idx).unwrap_or("")
    }

    pub fn int(&self, idx: usize, column: &'static str) -> Result<i64, ImportError> {
        let raw = self.text(idx);
        raw.parse::<i64>()
            .map_err(|_| ImportError::malformed(self.line, column, raw))
    }

    pub fn float(&self, idx: usize, column: &'static str) -> Result<f64, ImportError> {
        let raw = self.text(idx);
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ImportError::malformed(self.line, column, raw)),
        }
    }

    /// Empty cells and missing columns read as `None`.
    pub fn opt_float(
        &self,
        idx: Option<usize>,
        column: &'static str,
    ) -> Result<Option<f64>, ImportError> {
        match idx {
            Some(i) if !self.text(i).is_empty() => self.float(i, column).map(Some),
            _ => Ok(None),
        }
    }

    pub fn opt_int(
        &self,
        idx: Option<usize>,
        column: &'static str,
    ) -> Result<Option<i64>, ImportError> {
        match idx {
            Some(i) if !self.text(i).is_empty() => self.int(i, column).map(Some),
            _ => Ok(None),
        }
    }
}

/// A row shape of a tab-separated upload.
pub trait TsvRow: Sized {
    type Layout;

    fn layout(columns: &Columns) -> Result<Self::Layout, ImportError>;
    fn parse(layout: &Self::Layout, row: &Row<'_>) -> Result<Self, ImportError>;
}

/// Lazily decodes `data` (tab-separated, header row first) into `T`s. A
/// missing required column fails before any row is produced.
pub fn read_rows<'a, T>(
    data: &'a [u8],
) -> Result<impl Iterator<Item = Result<T, ImportError>> + 'a, ImportError>
where
    T: TsvRow + 'a,
    T::Layout: 'a,
{
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);
    let columns = Columns::new(reader.headers()?);
    let layout = T::layout(&columns)?;

    Ok(reader.into_records().map(move |record| {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        T::parse(&layout, &Row { record: &record, line })
    }))
}

/// Bit-exact float wrapper so field tuples can be hashed and compared.
/// `-0.0` is folded into `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatKey(u64);

impl From<f64> for FloatKey {
    fn from(v: f64) -> Self {
        let v = if v == 0.0 { 0.0 } else { v };
        FloatKey(v.to_bits())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: i64,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl TsvRow for NodeRow {
    type Layout = [usize; 4];

    fn layout(columns: &Columns) -> Result<Self::Layout, ImportError> {
        Ok([
            columns.require("id")?,
            columns.require("name")?,
            columns.require("x")?,
            columns.require("y")?,
        ])
    }

    fn parse(l: &Self::Layout, row: &Row<'_>) -> Result<Self, ImportError> {
        Ok(NodeRow {
            id: row.int(l[0], "id")?,
            name: row.text(l[1]).to_string(),
            x: row.float(l[2], "x")?,
            y: row.float(l[3], "y")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRow {
    pub id: i64,
    pub name: String,
    pub expression: String,
}

impl TsvRow for FunctionRow {
    type Layout = [usize; 3];

    fn layout(columns: &Columns) -> Result<Self::Layout, ImportError> {
        Ok([
            columns.require("id")?,
            columns.require("name")?,
            columns.require("expression")?,
        ])
    }

    fn parse(l: &Self::Layout, row: &Row<'_>) -> Result<Self, ImportError> {
        Ok(FunctionRow {
            id: row.int(l[0], "id")?,
            name: row.text(l[1]).to_string(),
            expression: row.text(l[2]).to_string(),
        })
    }
}

/// Link row as uploaded; references are natural ids.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRow {
    pub id: i64,
    pub name: String,
    pub origin: i64,
    pub destination: i64,
    pub function: i64,
    pub lanes: f64,
    pub length: f64,
    pub speed: f64,
    pub capacity: f64,
}

impl TsvRow for LinkRow {
    type Layout = [usize; 9];

    fn layout(columns: &Columns) -> Result<Self::Layout, ImportError> {
        Ok([
            columns.require("id")?,
            columns.require("name")?,
            columns.require("origin")?,
            columns.require("destination")?,
            columns.require("function")?,
            columns.require("lanes")?,
            columns.require("length")?,
            columns.require("speed")?,
            columns.require("capacity")?,
        ])
    }

    fn parse(l: &Self::Layout, row: &Row<'_>) -> Result<Self, ImportError> {
        Ok(LinkRow {
            id: row.int(l[0], "id")?,
            name: row.text(l[1]).to_string(),
            origin: row.int(l[2], "origin")?,
            destination: row.int(l[3], "destination")?,
            function: row.int(l[4], "function")?,
            lanes: row.float(l[5], "lanes")?,
            length: row.float(l[6], "length")?,
            speed: row.float(l[7], "speed")?,
            capacity: row.float(l[8], "capacity")?,
        })
    }
}

/// One OD cell. The value column is `population` for demand matrices and
/// `travel time` for the public-transit matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct OdRow {
    pub origin: i64,
    pub destination: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TravelTimeRow(pub OdRow);

impl TsvRow for OdRow {
    type Layout = [usize; 3];

    fn layout(columns: &Columns) -> Result<Self::Layout, ImportError> {
        Ok([
            columns.require("origin")?,
            columns.require("destination")?,
            columns.require("population")?,
        ])
    }

    fn parse(l: &Self::Layout, row: &Row<'_>) -> Result<Self, ImportError> {
        Ok(OdRow {
            origin: row.int(l[0], "origin")?,
            destination: row.int(l[1], "destination")?,
            value: row.float(l[2], "population")?,
        })
    }
}

impl TsvRow for TravelTimeRow {
    type Layout = [usize; 3];

    fn layout(columns: &Columns) -> Result<Self::Layout, ImportError> {
        Ok([
            columns.require("origin")?,
            columns.require("destination")?,
            columns.require("travel time")?,
        ])
    }

    fn parse(l: &Self::Layout, row: &Row<'_>) -> Result<Self, ImportError> {
        Ok(TravelTimeRow(OdRow {
            origin: row.int(l[0], "origin")?,
            destination: row.int(l[1], "destination")?,
            value: row.float(l[2], "travel time")?,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingRow {
    pub link: i64,
    pub user_type: Option<i64>,
    pub value: f64,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl TsvRow for PricingRow {
    type Layout = (usize, Option<usize>, usize, Option<usize>, Option<usize>);

    fn layout(columns: &Columns) -> Result<Self::Layout, ImportError> {
        Ok((
            columns.require("link")?,
            columns.optional("usertype"),
            columns.require("value")?,
            columns.optional("start"),
            columns.optional("end"),
        ))
    }

    fn parse(l: &Self::Layout, row: &Row<'_>) -> Result<Self, ImportError> {
        Ok(PricingRow {
            link: row.int(l.0, "link")?,
            user_type: row.opt_int(l.1, "usertype")?,
            value: row.float(l.2, "value")?,
            start: row.opt_float(l.3, "start")?,
            end: row.opt_float(l.4, "end")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_quoted_and_reordered_columns() {
        let data = b"name\tid\texpression\nFreeFlow\t1\t\"3600*(length/speed)\"\n";
        let rows: Vec<FunctionRow> = read_rows(data).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(
            rows,
            vec![FunctionRow {
                id: 1,
                name: "FreeFlow".to_string(),
                expression: "3600*(length/speed)".to_string(),
            }]
        );
    }

    #[test]
    fn missing_column_fails_up_front() {
        let data = b"id\tname\tx\n1\tZone1\t0\n";
        match read_rows::<NodeRow>(data) {
            Err(ImportError::MissingColumn(c)) => assert_eq!(c, "y"),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("expected a missing column"),
        }
    }

    #[test]
    fn malformed_number_reports_line_and_column() {
        let data = b"id\tname\tx\ty\n1\tZone1\t0\t0\n2\tZone2\tten\t0\n";
        let rows: Vec<_> = read_rows::<NodeRow>(data).unwrap().collect();
        assert!(rows[0].is_ok());
        match &rows[1] {
            Err(ImportError::Malformed { line, column, value }) => {
                assert_eq!(*line, 3);
                assert_eq!(*column, "x");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pricing_optional_columns() {
        let data = b"link\tusertype\tvalue\n7\t\t2.5\n8\t3\t1\n";
        let rows: Vec<PricingRow> = read_rows(data).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].user_type, None);
        assert_eq!(rows[1].user_type, Some(3));
        assert_eq!(rows[1].start, None);
    }

    #[test]
    fn float_key_folds_negative_zero() {
        assert_eq!(FloatKey::from(-0.0), FloatKey::from(0.0));
        assert_ne!(FloatKey::from(1.0), FloatKey::from(1.0000001));
    }
}
