//! View selection: user choices resolved against what the prepared table offers.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::prepare::PreparedTable;

/// Raw user choices. Every field is optional; unset fields fall back to defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViewRequest {
    pub x: Option<String>,
    pub y: Option<String>,
    /// `Some("")` explicitly disables color-by.
    pub color: Option<String>,
    pub dimensions: Vec<String>,
    pub heatmap_rows: Option<String>,
    pub heatmap_cols: Option<String>,
    pub heatmap_metric: Option<String>,
    pub error_column: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeatmapAxes {
    pub rows: String,
    pub cols: String,
    pub metric: String,
}

/// Resolved view for one rendering pass. Every named column exists in the prepared
/// table and is numeric.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewConfig {
    pub x: Option<String>,
    pub y: Option<String>,
    pub color: Option<String>,
    pub dimensions: Vec<String>,
    pub heatmap: Option<HeatmapAxes>,
    pub error_column: Option<String>,
}

impl ViewConfig {
    pub fn resolve(request: &ViewRequest, prepared: &PreparedTable) -> Self {
        let numeric = prepared.numeric_columns();
        let map = prepared.column_map();

        let x = pick(
            "x",
            request.x.as_deref(),
            &[map.duration_minutes.as_str()],
            &numeric,
        );
        let y = pick("y", request.y.as_deref(), &[map.ssim.as_str()], &numeric);

        let color = match request.color.as_deref() {
            Some(name) if name.trim().is_empty() => None,
            requested => choose("color", requested, &[map.ssim.as_str()], &numeric),
        };

        let mut dimensions: Vec<String> = request
            .dimensions
            .iter()
            .filter(|name| {
                let ok = numeric.contains(&name.as_str());
                if !ok {
                    warn!("Dropping dimension '{}': not a numeric column", name);
                }
                ok
            })
            .cloned()
            .collect();
        if dimensions.is_empty() {
            dimensions = map
                .default_dimensions()
                .into_iter()
                .filter(|name| numeric.contains(name))
                .map(str::to_string)
                .collect();
        }
        if dimensions.is_empty() {
            dimensions = numeric.iter().map(|s| s.to_string()).collect();
        }
        dedup_preserving_order(&mut dimensions);

        let heatmap = resolve_heatmap(request, prepared, &numeric);

        let error_column = choose(
            "error column",
            request.error_column.as_deref(),
            &[map.error.as_str()],
            &numeric,
        );

        Self {
            x,
            y,
            color,
            dimensions,
            heatmap,
            error_column,
        }
    }
}

fn resolve_heatmap(
    request: &ViewRequest,
    prepared: &PreparedTable,
    numeric: &[&str],
) -> Option<HeatmapAxes> {
    let map = prepared.column_map();
    let rows = pick(
        "heatmap rows",
        request.heatmap_rows.as_deref(),
        &[map.steps.as_str()],
        numeric,
    )?;
    let remaining: Vec<&str> = numeric.iter().copied().filter(|c| *c != rows).collect();
    let cols = pick(
        "heatmap columns",
        request.heatmap_cols.as_deref(),
        &[map.splats.as_str()],
        &remaining,
    )?;
    let remaining: Vec<&str> = remaining.into_iter().filter(|c| *c != cols).collect();
    let metric = choose(
        "heatmap metric",
        request.heatmap_metric.as_deref(),
        &[map.ssim.as_str()],
        &remaining,
    )?;
    Some(HeatmapAxes {
        rows,
        cols,
        metric,
    })
}

/// Requested column if available, else the first available preferred column, else
/// the first available column at all.
pub fn pick(
    role: &str,
    requested: Option<&str>,
    preferred: &[&str],
    available: &[&str],
) -> Option<String> {
    choose(role, requested, preferred, available)
        .or_else(|| available.first().map(|s| s.to_string()))
}

/// Like [`pick`] but without the "any column" fallback.
fn choose(
    role: &str,
    requested: Option<&str>,
    preferred: &[&str],
    available: &[&str],
) -> Option<String> {
    if let Some(name) = requested {
        if available.contains(&name) {
            return Some(name.to_string());
        }
        warn!("Requested {} '{}' is not available", role, name);
    }
    preferred
        .iter()
        .find(|name| available.contains(*name))
        .map(|s| s.to_string())
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::{prepare_table, ColumnMap};
    use crate::table::{Cell, Table};

    fn prepared(headers: &[&str], rows: Vec<Vec<Cell>>) -> PreparedTable {
        let raw = Table::from_rows(headers.iter().map(|h| h.to_string()).collect(), rows);
        prepare_table(&raw, &ColumnMap::default())
    }

    fn full() -> PreparedTable {
        prepared(
            &[
                "Trial",
                "Training Steps (k)",
                "Max Splats counts (in k)",
                "Time taken in training",
                "SSIM",
                "MAE (%)",
                "Notes",
            ],
            vec![vec![
                Cell::Number(1.0),
                Cell::Number(30.0),
                Cell::Number(500.0),
                Cell::from("0:20:00"),
                Cell::Number(0.91),
                Cell::from("4.5%"),
                Cell::from("blurry"),
            ]],
        )
    }

    #[test]
    fn test_defaults_resolve_to_conventional_columns() {
        let view = ViewConfig::resolve(&ViewRequest::default(), &full());
        assert_eq!(view.x.as_deref(), Some("Training Time (minutes)"));
        assert_eq!(view.y.as_deref(), Some("SSIM"));
        assert_eq!(view.color.as_deref(), Some("SSIM"));
        assert_eq!(view.error_column.as_deref(), Some("MAE (%)"));
        assert_eq!(
            view.dimensions,
            vec![
                "Training Steps (k)",
                "Max Splats counts (in k)",
                "Training Time (minutes)",
                "SSIM"
            ]
        );
        let heatmap = view.heatmap.unwrap();
        assert_eq!(heatmap.rows, "Training Steps (k)");
        assert_eq!(heatmap.cols, "Max Splats counts (in k)");
        assert_eq!(heatmap.metric, "SSIM");
    }

    #[test]
    fn test_text_columns_are_never_selected() {
        let request = ViewRequest {
            x: Some("Notes".into()),
            color: Some("Notes".into()),
            dimensions: vec!["Notes".into(), "SSIM".into()],
            ..Default::default()
        };
        let view = ViewConfig::resolve(&request, &full());
        assert_eq!(view.x.as_deref(), Some("Training Time (minutes)"));
        assert_eq!(view.color.as_deref(), Some("SSIM"));
        assert_eq!(view.dimensions, vec!["SSIM"]);
    }

    #[test]
    fn test_heatmap_falls_back_without_steps_column() {
        let table = prepared(
            &["Trial", "SSIM"],
            vec![vec![Cell::Number(1.0), Cell::Number(0.9)]],
        );
        let view = ViewConfig::resolve(&ViewRequest::default(), &table);
        assert_eq!(view.heatmap, None);
        assert_eq!(view.error_column, None);
        assert_eq!(view.x.as_deref(), Some("Trial"));
    }

    #[test]
    fn test_empty_color_disables_color() {
        let request = ViewRequest {
            color: Some(String::new()),
            ..Default::default()
        };
        let view = ViewConfig::resolve(&request, &full());
        assert_eq!(view.color, None);
    }
}
