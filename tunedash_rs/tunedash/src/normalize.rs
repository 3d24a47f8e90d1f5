//! Field normalizers: total conversions from a raw cell to a float.
//!
//! Every parser returns `None` for anything it cannot read, including non-text
//! input where text is required. None of them panic.

use serde::{Deserialize, Serialize};

use crate::table::Cell;

/// Field-type tag selecting a parser.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// `H:M:S` text to fractional minutes.
    Duration,
    /// `"12.5%"` to `12.5`.
    Percentage,
    /// `"1080px"` / `"2k"` to `1080` / `2000`.
    Magnitude,
    /// Plain float coercion.
    Numeric,
}

impl FieldKind {
    pub fn parser(self) -> fn(&Cell) -> Option<f64> {
        match self {
            FieldKind::Duration => duration_cell,
            FieldKind::Percentage => percentage_cell,
            FieldKind::Magnitude => magnitude_cell,
            FieldKind::Numeric => numeric_cell,
        }
    }

    pub fn parse(self, cell: &Cell) -> Option<f64> {
        (self.parser())(cell)
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Duration => "duration",
            FieldKind::Percentage => "percentage",
            FieldKind::Magnitude => "magnitude",
            FieldKind::Numeric => "numeric",
        }
    }
}

/// Minutes from an `H:M:S` string. Exactly three integer parts are required.
pub fn duration_minutes(text: &str) -> Option<f64> {
    if !text.contains(':') {
        return None;
    }
    let mut parts = [0i64; 3];
    let mut count = 0usize;
    for token in text.split(':') {
        if count == parts.len() {
            return None;
        }
        parts[count] = token.trim().parse::<i64>().ok()?;
        count += 1;
    }
    if count != 3 {
        return None;
    }
    Some(parts[0] as f64 * 60.0 + parts[1] as f64 + parts[2] as f64 / 60.0)
}

pub fn percentage(text: &str) -> Option<f64> {
    let stripped = text.trim().trim_end_matches('%').trim_end();
    finite_or_none(stripped.parse::<f64>().ok()?)
}

/// Lower-cased, `px` suffix removed, `k` suffix expanded to thousands.
pub fn magnitude(text: &str) -> Option<f64> {
    let lowered = text.trim().to_lowercase();
    let body = lowered.strip_suffix("px").unwrap_or(lowered.as_str()).trim_end();
    let (digits, scale) = match body.strip_suffix('k') {
        Some(rest) => (rest.trim_end(), 1000.0),
        None => (body, 1.0),
    };
    finite_or_none(digits.parse::<f64>().ok()? * scale)
}

fn numeric(text: &str) -> Option<f64> {
    finite_or_none(text.trim().parse::<f64>().ok()?)
}

fn finite_or_none(value: f64) -> Option<f64> {
    if !value.is_finite() {
        None
    } else {
        Some(value)
    }
}

fn duration_cell(cell: &Cell) -> Option<f64> {
    cell.as_text().and_then(duration_minutes)
}

fn percentage_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Text(s) => percentage(s),
        other => other.as_f64(),
    }
}

fn magnitude_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Text(s) => magnitude(s),
        other => other.as_f64(),
    }
}

fn numeric_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Text(s) => numeric(s),
        other => other.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.map_or(false, |v| (v - b).abs() < 1e-9)
    }

    #[test]
    fn test_duration_three_parts() {
        assert!(approx(duration_minutes("1:02:30"), 62.5));
        assert!(approx(duration_minutes("0:45:00"), 45.0));
        assert!(approx(duration_minutes("10:00:06"), 600.1));
        assert!(approx(duration_minutes(" 1 : 30 : 00 "), 90.0));
    }

    #[test]
    fn test_duration_rejects_malformed() {
        for text in ["5:30", "abc", "", "1:2:3:4", "1:xx:00", "1.5:00:00", ":::"] {
            assert_eq!(duration_minutes(text), None, "{text:?}");
        }
    }

    #[test]
    fn test_duration_requires_text() {
        assert_eq!(FieldKind::Duration.parse(&Cell::Number(90.0)), None);
        assert_eq!(FieldKind::Duration.parse(&Cell::Missing), None);
        assert!(approx(FieldKind::Duration.parse(&Cell::from("1:30:00")), 90.0));
    }

    #[test]
    fn test_percentage() {
        assert!(approx(percentage("12.5%"), 12.5));
        assert!(approx(percentage(" 3 % "), 3.0));
        assert!(approx(percentage("7"), 7.0));
        assert_eq!(percentage("n/a%"), None);
        assert_eq!(percentage("nan%"), None);
        assert!(approx(FieldKind::Percentage.parse(&Cell::Number(4.2)), 4.2));
        assert_eq!(FieldKind::Percentage.parse(&Cell::Missing), None);
    }

    #[test]
    fn test_magnitude_suffixes() {
        assert!(approx(magnitude("2k"), 2000.0));
        assert!(approx(magnitude("1080px"), 1080.0));
        assert!(approx(magnitude("1080PX"), 1080.0));
        assert!(approx(magnitude("1.5K"), 1500.0));
        assert!(approx(magnitude("4"), 4.0));
        assert_eq!(magnitude("k"), None);
        assert_eq!(magnitude("half"), None);
        assert!(approx(FieldKind::Magnitude.parse(&Cell::Number(8.0)), 8.0));
    }

    #[test]
    fn test_magnitude_combined_suffixes() {
        assert!(approx(magnitude("2kpx"), 2000.0));
        assert!(approx(magnitude(" 1.5K PX "), 1500.0));
        assert_eq!(magnitude("2pxk"), None);
    }

    #[test]
    fn test_non_finite_values_are_missing() {
        assert_eq!(percentage("inf%"), None);
        assert_eq!(magnitude("1e999"), None);
        assert_eq!(magnitude("1e308k"), None);
        assert_eq!(FieldKind::Numeric.parse(&Cell::from("-inf")), None);
        assert_eq!(FieldKind::Numeric.parse(&Cell::Number(f64::INFINITY)), None);
    }

    #[test]
    fn test_every_parser_is_total() {
        let cells = [
            Cell::Missing,
            Cell::Number(f64::NAN),
            Cell::Number(1.0),
            Cell::from(""),
            Cell::from("%%%"),
            Cell::from("pxk"),
            Cell::from("::"),
            Cell::from("\u{1F600}"),
        ];
        for kind in [
            FieldKind::Duration,
            FieldKind::Percentage,
            FieldKind::Magnitude,
            FieldKind::Numeric,
        ] {
            for cell in &cells {
                if let Some(v) = kind.parse(cell) {
                    assert!(v.is_finite());
                }
            }
        }
    }
}
