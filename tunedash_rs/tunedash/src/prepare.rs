//! Table preparation: header cleanup plus per-column normalization rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::normalize::FieldKind;
use crate::table::{Cell, Table};

pub const DERIVED_DURATION_COLUMN: &str = "Training Time (minutes)";

/// Column names for each role in a trial sheet. Any field may be overridden from JSON;
/// unspecified fields keep their defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnMap {
    pub trial: String,
    pub downsample: String,
    pub photos: String,
    pub steps: String,
    pub splats: String,
    pub duration: String,
    pub duration_minutes: String,
    pub ssim: String,
    pub error: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            trial: "Trial".to_string(),
            downsample: "Downsampled to".to_string(),
            photos: "Nos. of best photos".to_string(),
            steps: "Training Steps (k)".to_string(),
            splats: "Max Splats counts (in k)".to_string(),
            duration: "Time taken in training".to_string(),
            duration_minutes: DERIVED_DURATION_COLUMN.to_string(),
            ssim: "SSIM".to_string(),
            error: "MAE (%)".to_string(),
        }
    }
}

impl ColumnMap {
    pub fn rules(&self) -> Vec<FieldRule> {
        vec![
            FieldRule::derive(&self.duration, FieldKind::Duration, &self.duration_minutes),
            FieldRule::in_place(&self.error, FieldKind::Percentage),
            FieldRule::in_place(&self.downsample, FieldKind::Magnitude),
            FieldRule::in_place(&self.photos, FieldKind::Numeric),
            FieldRule::in_place(&self.steps, FieldKind::Numeric),
            FieldRule::in_place(&self.splats, FieldKind::Numeric),
            FieldRule::in_place(&self.ssim, FieldKind::Numeric),
        ]
    }

    /// Parameters and outcome used by the multi-dimensional views.
    pub fn default_dimensions(&self) -> Vec<&str> {
        vec![
            self.downsample.as_str(),
            self.photos.as_str(),
            self.steps.as_str(),
            self.splats.as_str(),
            self.duration_minutes.as_str(),
            self.ssim.as_str(),
        ]
    }

    /// Columns shown in the best-trials listing.
    pub fn summary_columns(&self) -> Vec<&str> {
        vec![
            self.trial.as_str(),
            self.downsample.as_str(),
            self.photos.as_str(),
            self.steps.as_str(),
            self.splats.as_str(),
            self.duration_minutes.as_str(),
            self.ssim.as_str(),
            self.error.as_str(),
        ]
    }
}

/// Apply `kind` to `source`, writing into `target` (or back into `source`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldRule {
    pub source: String,
    pub kind: FieldKind,
    pub target: Option<String>,
}

impl FieldRule {
    pub fn in_place(source: &str, kind: FieldKind) -> Self {
        Self {
            source: source.to_string(),
            kind,
            target: None,
        }
    }

    pub fn derive(source: &str, kind: FieldKind, target: &str) -> Self {
        Self {
            source: source.to_string(),
            kind,
            target: Some(target.to_string()),
        }
    }

    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum RuleOutcome {
    Applied { parsed: usize, unparsed: usize },
    SkippedMissingColumn,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PrepareReport {
    pub renamed_headers: Vec<(String, String)>,
    pub rules: Vec<(FieldRule, RuleOutcome)>,
}

impl PrepareReport {
    pub fn outcome(&self, source: &str) -> Option<&RuleOutcome> {
        self.rules
            .iter()
            .find(|(rule, _)| rule.source == source)
            .map(|(_, outcome)| outcome)
    }
}

/// A normalized table. Immutable once built apart from the derived columns added by
/// preparation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreparedTable {
    table: Table,
    columns: ColumnMap,
    report: PrepareReport,
}

impl PreparedTable {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn column_map(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn report(&self) -> &PrepareReport {
        &self.report
    }

    /// Candidate plotting dimensions.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.table.numeric_columns()
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.table.column(name).map_or(false, |c| c.is_numeric())
    }
}

/// Normalize headers and apply the column map's rules. Never fails: absent columns
/// only skip their rule.
pub fn prepare_table(raw: &Table, columns: &ColumnMap) -> PreparedTable {
    let mut table = raw.clone();
    let mut report = PrepareReport {
        renamed_headers: normalize_headers(&mut table),
        rules: Vec::new(),
    };

    for rule in columns.rules() {
        let outcome = apply_rule(&mut table, &rule);
        report.rules.push((rule, outcome));
    }

    PreparedTable {
        table,
        columns: columns.clone(),
        report,
    }
}

/// Apply a single rule. Returns what happened instead of failing.
pub fn apply_rule(table: &mut Table, rule: &FieldRule) -> RuleOutcome {
    let Some(column) = table.column(&rule.source) else {
        debug!(
            "Skipping {} rule: column '{}' not present",
            rule.kind.name(),
            rule.source
        );
        return RuleOutcome::SkippedMissingColumn;
    };

    let parse = rule.kind.parser();
    let mut parsed = 0usize;
    let mut unparsed = 0usize;
    let cells: Vec<Cell> = column
        .cells
        .iter()
        .map(|cell| {
            let value = parse(cell);
            match value {
                Some(_) => parsed += 1,
                None if !cell.is_missing() => unparsed += 1,
                None => {}
            }
            Cell::from(value)
        })
        .collect();

    if parsed == 0 && unparsed > 0 {
        warn!(
            "Column '{}' had no {} values ({} unreadable cells)",
            rule.source,
            rule.kind.name(),
            unparsed
        );
    } else {
        debug!(
            "Applied {} rule to '{}' -> '{}': {} parsed, {} unreadable",
            rule.kind.name(),
            rule.source,
            rule.target(),
            parsed,
            unparsed
        );
    }

    let target = rule.target().to_string();
    table.set_column(&target, cells);
    RuleOutcome::Applied { parsed, unparsed }
}

/// Trim header names, name empty headers `Unnamed: <index>` and suffix duplicates
/// with `.1`, `.2`, ... Returns the (old, new) pairs that changed.
fn normalize_headers(table: &mut Table) -> Vec<(String, String)> {
    let mut renamed = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (idx, column) in table.columns_mut().iter_mut().enumerate() {
        let trimmed = column.name.trim();
        let base = if trimmed.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            trimmed.to_string()
        };
        let name = match seen.get_mut(&base) {
            Some(count) => {
                *count += 1;
                format!("{}.{}", base, count)
            }
            None => base.clone(),
        };
        seen.entry(base).or_insert(0);
        if name != column.name {
            renamed.push((column.name.clone(), name.clone()));
            column.name = name;
        }
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(headers: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        Table::from_rows(headers.iter().map(|h| h.to_string()).collect(), rows)
    }

    #[test]
    fn test_duration_column_is_derived() {
        let raw = sheet(
            &["Trial", "Time taken in training", "SSIM"],
            vec![
                vec![Cell::Number(1.0), Cell::from("1:30:00"), Cell::Number(0.9)],
                vec![Cell::Number(2.0), Cell::from("0:45:00"), Cell::Number(0.95)],
            ],
        );
        let prepared = prepare_table(&raw, &ColumnMap::default());
        let minutes = prepared.table().column(DERIVED_DURATION_COLUMN).unwrap();
        assert_eq!(minutes.values(), vec![Some(90.0), Some(45.0)]);
        assert!(prepared.table().has_column("Time taken in training"));
        assert!(prepared.numeric_columns().contains(&DERIVED_DURATION_COLUMN));
        assert!(!prepared.numeric_columns().contains(&"Time taken in training"));
    }

    #[test]
    fn test_missing_duration_column_skips_step() {
        let raw = sheet(&["Trial", "SSIM"], vec![vec![Cell::Number(1.0), Cell::Number(0.8)]]);
        let prepared = prepare_table(&raw, &ColumnMap::default());
        assert!(!prepared.table().has_column(DERIVED_DURATION_COLUMN));
        assert_eq!(
            prepared.report().outcome("Time taken in training"),
            Some(&RuleOutcome::SkippedMissingColumn)
        );
        assert_eq!(prepared.table().len(), 1);
    }

    #[test]
    fn test_in_place_percentage_and_magnitude() {
        let raw = sheet(
            &["MAE (%)", "Downsampled to"],
            vec![
                vec![Cell::from("12.5%"), Cell::from("1080px")],
                vec![Cell::from("bad"), Cell::from("2k")],
                vec![Cell::Missing, Cell::Number(720.0)],
            ],
        );
        let prepared = prepare_table(&raw, &ColumnMap::default());
        let table = prepared.table();
        assert_eq!(
            table.column("MAE (%)").unwrap().values(),
            vec![Some(12.5), None, None]
        );
        assert_eq!(
            table.column("Downsampled to").unwrap().values(),
            vec![Some(1080.0), Some(2000.0), Some(720.0)]
        );
        assert_eq!(
            prepared.report().outcome("MAE (%)"),
            Some(&RuleOutcome::Applied {
                parsed: 1,
                unparsed: 1
            })
        );
        assert_eq!(table.column_names(), vec!["MAE (%)", "Downsampled to"]);
    }

    #[test]
    fn test_headers_trimmed_and_deduplicated() {
        let raw = sheet(&[" SSIM ", "", "SSIM", "2024"], vec![]);
        let prepared = prepare_table(&raw, &ColumnMap::default());
        assert_eq!(
            prepared.table().column_names(),
            vec!["SSIM", "Unnamed: 1", "SSIM.1", "2024"]
        );
        assert_eq!(prepared.report().renamed_headers.len(), 3);
    }

    #[test]
    fn test_column_map_partial_json_override() {
        let map: ColumnMap = serde_json::from_str(r#"{"error": "MAE"}"#).unwrap();
        assert_eq!(map.error, "MAE");
        assert_eq!(map.ssim, "SSIM");
    }
}
