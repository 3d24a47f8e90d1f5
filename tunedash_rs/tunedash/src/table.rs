//! Column-major in-memory table of loosely typed cells.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Tokens that spreadsheet exports use for "no value".
const NA_TOKENS: &[&str] = &["", "nan", "NaN", "NA", "N/A", "n/a", "null", "None", "-"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Missing
    }
}

impl Cell {
    /// Infer a cell from raw text: NA tokens and non-finite floats become missing,
    /// finite floats become numbers, everything else stays text (untrimmed).
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if NA_TOKENS.contains(&trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            Ok(_) => Cell::Missing,
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Number(v) => !v.is_finite(),
            Cell::Text(_) => false,
        }
    }

    /// Display form used for headers, labels and CSV output.
    pub fn display(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Number(v) => format_number(*v),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Missing,
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::from(Some(value))
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

/// Integral floats print without a fractional part so that headers like `2024.0`
/// read back as `2024`.
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// Numeric when no cell holds free text.
    pub fn is_numeric(&self) -> bool {
        self.cells.iter().all(|c| !matches!(c, Cell::Text(_)))
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.cells.iter().map(Cell::as_f64).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    /// Build from row-major data. Short rows are padded with missing cells and long
    /// rows truncated to the header width.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let len = rows.len();
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(len)))
            .collect();
        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.cells.push(cells.next().unwrap_or_default());
            }
        }
        Self { columns, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Replace the named column in place, or append it when absent. Cells beyond the
    /// table length are dropped; missing ones are padded.
    pub fn set_column(&mut self, name: &str, mut cells: Vec<Cell>) {
        cells.resize(self.len, Cell::Missing);
        match self.column_mut(name) {
            Some(column) => column.cells = cells,
            None => self.columns.push(Column::new(name, cells)),
        }
    }

    /// Names of the columns whose cells are all numeric or missing, in table order.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.len {
            return None;
        }
        self.columns.iter().map(|c| c.cells.get(index)).collect()
    }

    /// Row indices ordered ascending by a numeric column; missing values go last and
    /// ties keep their input order.
    pub fn sorted_indices(&self, by: &str) -> Option<Vec<usize>> {
        let column = self.column(by)?;
        let mut order: Vec<usize> = (0..self.len).collect();
        let value = |idx: usize| column.cells.get(idx).and_then(Cell::as_f64);
        order.sort_by(|&a, &b| {
            match (value(a), value(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
        Some(order)
    }

    /// New table with the given rows (in the given order) and the named columns that
    /// exist. Unknown names are ignored.
    pub fn select(&self, rows: &[usize], columns: &[&str]) -> Table {
        let picked: Vec<Column> = columns
            .iter()
            .filter_map(|name| self.column(name))
            .map(|column| {
                Column::new(
                    column.name.clone(),
                    rows.iter()
                        .filter_map(|&r| column.cells.get(r).cloned())
                        .collect(),
                )
            })
            .collect();
        let len = rows.iter().filter(|&&r| r < self.len).count();
        Table {
            columns: picked,
            len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_inference() {
        assert_eq!(Cell::from_raw(" 0.95 "), Cell::Number(0.95));
        assert_eq!(Cell::from_raw("N/A"), Cell::Missing);
        assert_eq!(Cell::from_raw(""), Cell::Missing);
        assert_eq!(Cell::from_raw("1:30:00"), Cell::Text("1:30:00".into()));
        assert_eq!(Cell::from_raw("inf"), Cell::Missing);
        assert_eq!(Cell::from_raw("-1e999"), Cell::Missing);
        assert_eq!(Cell::Number(f64::INFINITY).as_f64(), None);
        assert!(Cell::Number(f64::NEG_INFINITY).is_missing());
    }

    #[test]
    fn test_row_and_sort_tolerate_short_columns() {
        let mut table = Table::from_rows(
            vec!["err".into(), "b".into()],
            vec![
                vec![Cell::Number(2.0), Cell::Number(1.0)],
                vec![Cell::Number(1.0), Cell::Number(2.0)],
            ],
        );
        if let Some(column) = table.column_mut("err") {
            column.cells.truncate(1);
        }
        assert_eq!(table.row(1), None);
        assert_eq!(table.sorted_indices("err"), Some(vec![0, 1]));
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Cell::Number(1.0)], vec![Cell::Number(2.0), Cell::from("x")]],
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("b").unwrap().cells[0], Cell::Missing);
        assert_eq!(table.numeric_columns(), vec!["a"]);
    }

    #[test]
    fn test_sorted_indices_puts_missing_last() {
        let table = Table::from_rows(
            vec!["err".into()],
            vec![
                vec![Cell::Missing],
                vec![Cell::Number(3.0)],
                vec![Cell::Number(1.0)],
            ],
        );
        assert_eq!(table.sorted_indices("err"), Some(vec![2, 1, 0]));
        assert_eq!(table.sorted_indices("nope"), None);
    }

    #[test]
    fn test_format_number_integral() {
        assert_eq!(format_number(2024.0), "2024");
        assert_eq!(format_number(0.5), "0.5");
    }
}
