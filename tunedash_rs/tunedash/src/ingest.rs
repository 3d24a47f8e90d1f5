//! Reading uploaded CSV and spreadsheet bytes into a raw [`Table`].

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::table::{format_number, Cell, Table};
use crate::DashError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    /// Detect from an extension or a file name.
    pub fn from_hint(hint: &str) -> Result<Self, DashError> {
        let lower = hint.to_ascii_lowercase();
        let ext = lower.rsplit('.').next().unwrap_or(lower.as_str());
        match ext {
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Ok(SourceFormat::Spreadsheet),
            _ => Err(DashError::UnsupportedFormat(hint.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// Zero-based row holding the column headers; earlier rows are discarded.
    pub header_row: usize,
    pub delimiter: u8,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            header_row: 0,
            delimiter: b',',
        }
    }
}

impl IngestOptions {
    pub fn with_delimiter(mut self, delimiter: char) -> Result<Self, DashError> {
        if !delimiter.is_ascii() {
            return Err(DashError::InvalidParameter(format!(
                "delimiter '{}' must be a single ASCII character",
                delimiter
            )));
        }
        self.delimiter = delimiter as u8;
        Ok(self)
    }
}

/// Header text and body cells, split at the header row.
struct Grid {
    header: Vec<String>,
    body: Vec<Vec<Cell>>,
}

/// Parse uploaded bytes using the provided format hint (extension or file name).
pub fn read_table(input: &[u8], hint: &str, opts: &IngestOptions) -> Result<Table, DashError> {
    let grid = match SourceFormat::from_hint(hint)? {
        SourceFormat::Csv => read_csv_grid(input, opts)?,
        SourceFormat::Spreadsheet => read_sheet_grid(input, opts.header_row)?,
    };
    Ok(build_table(grid))
}

fn read_csv_grid(input: &[u8], opts: &IngestOptions) -> Result<Grid, DashError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(opts.delimiter)
        .from_reader(input);
    let mut records = reader.records().skip(opts.header_row);

    // Header text is kept as written; trimming happens at preparation.
    let header = records
        .next()
        .ok_or(DashError::MissingHeader(opts.header_row))?
        .map_err(|e| DashError::Csv(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut body = Vec::new();
    for record in records {
        let record = record.map_err(|e| DashError::Csv(e.to_string()))?;
        body.push(record.iter().map(Cell::from_raw).collect());
    }
    Ok(Grid { header, body })
}

fn read_sheet_grid(input: &[u8], header_row: usize) -> Result<Grid, DashError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(input.to_vec()))
        .map_err(|e| DashError::Workbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(DashError::EmptyWorkbook)?
        .map_err(|e| DashError::Workbook(e.to_string()))?;
    let mut rows = range.rows().skip(header_row);
    let header = rows
        .next()
        .ok_or(DashError::MissingHeader(header_row))?
        .iter()
        .map(sheet_header)
        .collect();
    let body = rows.map(|row| row.iter().map(sheet_cell).collect()).collect();
    Ok(Grid { header, body })
}

/// Numeric header cells (a year, a step count) are stringified; text is kept.
fn sheet_header(data: &Data) -> String {
    match data {
        Data::Int(v) => format_number(*v as f64),
        Data::Float(v) => format_number(*v),
        Data::String(s) => s.clone(),
        other => sheet_cell(other).display(),
    }
}

fn sheet_cell(data: &Data) -> Cell {
    match data {
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::from(*v),
        Data::String(s) => Cell::from_raw(s),
        Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if dt.is_duration() || (0.0..1.0).contains(&serial) {
                Cell::Text(clock_text(serial * 86_400.0))
            } else {
                Cell::Number(serial)
            }
        }
        Data::DurationIso(s) => match iso_duration_seconds(s) {
            Some(seconds) => Cell::Text(clock_text(seconds)),
            None => Cell::Text(s.clone()),
        },
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        _ => Cell::Missing,
    }
}

/// Seconds as `H:MM:SS`, hours unbounded, the shape a typed-in training time takes
/// once the spreadsheet has converted it to a time value.
fn clock_text(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// Seconds in an ISO 8601 duration such as `PT25H30M` or `P1DT2H`. Year and month
/// designators are rejected since their length is not fixed.
fn iso_duration_seconds(text: &str) -> Option<f64> {
    let body = text.trim().strip_prefix('P')?;
    let mut seconds = 0.0;
    let mut number = String::new();
    let mut in_time = false;
    let mut seen = false;
    for ch in body.chars() {
        match ch {
            'T' if !in_time && number.is_empty() => in_time = true,
            '0'..='9' | '.' | ',' => number.push(if ch == ',' { '.' } else { ch }),
            _ => {
                let value: f64 = number.parse().ok()?;
                number.clear();
                let unit = match (ch, in_time) {
                    ('W', false) => 604_800.0,
                    ('D', false) => 86_400.0,
                    ('H', true) => 3_600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => return None,
                };
                seconds += value * unit;
                seen = true;
            }
        }
    }
    (seen && number.is_empty()).then_some(seconds)
}

fn build_table(grid: Grid) -> Table {
    let Grid { header, body } = grid;
    let body: Vec<Vec<Cell>> = body
        .into_iter()
        .filter(|row| !row.iter().all(Cell::is_missing))
        .collect();

    let width = body.iter().map(Vec::len).fold(header.len(), usize::max);
    let headers: Vec<String> = (0..width)
        .map(|idx| match header.get(idx) {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Unnamed: {}", idx),
        })
        .collect();
    Table::from_rows(headers, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    const SHEET: &str = "Trial,Downsampled to,Time taken in training,SSIM,MAE (%)\n\
                         1,1080px,1:30:00,0.90,5.1%\n\
                         2,2k,0:45:00,0.95,4.2%\n\
                         ,,,,\n\
                         3,720px,bad,0.88,\n";

    #[test]
    fn test_csv_header_first_row() {
        let table = read_table(SHEET.as_bytes(), "trials.csv", &IngestOptions::default()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.column_names(),
            vec![
                "Trial",
                "Downsampled to",
                "Time taken in training",
                "SSIM",
                "MAE (%)"
            ]
        );
        assert_eq!(table.column("SSIM").unwrap().values()[1], Some(0.95));
        assert_eq!(
            table.column("Downsampled to").unwrap().cells[0],
            Cell::Text("1080px".into())
        );
        assert_eq!(table.column("MAE (%)").unwrap().cells[2], Cell::Missing);
    }

    #[test]
    fn test_csv_header_second_row() {
        let input = format!("Tuning sweep, exported 2025-03-01\n{}", SHEET);
        let opts = IngestOptions {
            header_row: 1,
            ..Default::default()
        };
        let table = read_table(input.as_bytes(), "csv", &opts).unwrap();
        assert_eq!(table.column_names()[0], "Trial");
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_extra_cells_get_unnamed_columns() {
        let input = "a,b\n1,2,3\n";
        let table = read_table(input.as_bytes(), "csv", &IngestOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b", "Unnamed: 2"]);
    }

    #[test]
    fn test_numeric_headers_are_stringified() {
        let input = "Trial,2024\n1,0.5\n";
        let table = read_table(input.as_bytes(), "csv", &IngestOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["Trial", "2024"]);
    }

    #[test]
    fn test_unsupported_format() {
        let err = read_table(b"{}", "trials.json", &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, DashError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_header_row_past_end() {
        let opts = IngestOptions {
            header_row: 5,
            ..Default::default()
        };
        let err = read_table(b"a,b\n1,2\n", "csv", &opts).unwrap_err();
        assert!(matches!(err, DashError::MissingHeader(5)));
    }

    #[test]
    fn test_corrupt_workbook_is_an_error() {
        let err = read_table(b"not a zip", "trials.xlsx", &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, DashError::Workbook(_)));
    }

    #[test]
    fn test_semicolon_delimiter() {
        let opts = IngestOptions::default().with_delimiter(';').unwrap();
        let table = read_table(b"Trial;SSIM\n1;0.9\n", "csv", &opts).unwrap();
        assert_eq!(table.column("SSIM").unwrap().values(), vec![Some(0.9)]);
        assert!(IngestOptions::default().with_delimiter('\u{00A7}').is_err());
    }

    #[test]
    fn test_csv_headers_kept_as_written() {
        let input = "Trial,0.50,007,NA,1e3,-, \n1,2,3,4,5,6,7\n";
        let table = read_table(input.as_bytes(), "csv", &IngestOptions::default()).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["Trial", "0.50", "007", "NA", "1e3", "-", "Unnamed: 6"]
        );
        assert_eq!(table.column("0.50").unwrap().values(), vec![Some(2.0)]);
    }

    #[test]
    fn test_sheet_header_cells() {
        assert_eq!(sheet_header(&Data::Float(2024.0)), "2024");
        assert_eq!(sheet_header(&Data::Int(7)), "7");
        assert_eq!(sheet_header(&Data::String(" NA ".into())), " NA ");
        assert_eq!(sheet_header(&Data::Empty), "");
    }

    #[test]
    fn test_sheet_durations_past_a_day() {
        let short = Data::DateTime(ExcelDateTime::new(
            1.5 / 24.0,
            ExcelDateTimeType::DateTime,
            false,
        ));
        let long = Data::DateTime(ExcelDateTime::new(
            25.0 / 24.0,
            ExcelDateTimeType::TimeDelta,
            false,
        ));
        assert_eq!(sheet_cell(&short), Cell::Text("1:30:00".into()));
        assert_eq!(sheet_cell(&long), Cell::Text("25:00:00".into()));
        assert_eq!(
            sheet_cell(&Data::DurationIso("PT25H30M".into())),
            Cell::Text("25:30:00".into())
        );
        assert_eq!(
            sheet_cell(&Data::DurationIso("P1DT0H0M5S".into())),
            Cell::Text("24:00:05".into())
        );

        let dated = Data::DateTime(ExcelDateTime::new(45_000.5, ExcelDateTimeType::DateTime, false));
        assert_eq!(sheet_cell(&dated), Cell::Number(45_000.5));
    }

    #[test]
    fn test_iso_duration_rejects_calendar_units() {
        assert_eq!(iso_duration_seconds("P1M"), None);
        assert_eq!(iso_duration_seconds("P1Y"), None);
        assert_eq!(iso_duration_seconds("PT"), None);
        assert_eq!(iso_duration_seconds("PT1H30"), None);
        assert_eq!(iso_duration_seconds("PT1.5M"), Some(90.0));
    }

    #[test]
    fn test_clock_text() {
        assert_eq!(clock_text(5_400.0), "1:30:00");
        assert_eq!(clock_text(0.0), "0:00:00");
        assert_eq!(clock_text(90_000.0), "25:00:00");
    }
}
