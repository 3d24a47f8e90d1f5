//! Chart dispatch: turns a prepared table and a resolved view into render-ready data.

use std::collections::BTreeMap;

use ndarray::Array2;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prepare::PreparedTable;
use crate::table::{Cell, Table};
use crate::view::{HeatmapAxes, ViewConfig};

pub const DEFAULT_BEST_LIMIT: usize = 5;

/// One numeric column, values in input row order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Dimension {
    pub fn from_table(table: &Table, name: &str) -> Option<Self> {
        let column = table.column(name)?;
        if !column.is_numeric() {
            return None;
        }
        Some(Self {
            name: column.name.clone(),
            values: column.values(),
        })
    }

    /// Smallest and largest present value.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.values.iter().flatten().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Data for the scatter matrix and the parallel-coordinates plot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiDimData {
    pub dimensions: Vec<Dimension>,
    pub color: Option<Dimension>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeatmapGrid {
    pub axes: HeatmapAxes,
    pub row_keys: Vec<f64>,
    pub col_keys: Vec<f64>,
    /// `cells[[r, c]]` is the mean metric for `row_keys[r]` x `col_keys[c]`.
    pub cells: Array2<Option<f64>>,
}

impl HeatmapGrid {
    pub fn value_bounds(&self) -> Option<(f64, f64)> {
        self.cells.iter().flatten().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineData {
    pub x: Dimension,
    pub y: Dimension,
    /// Per-point trial label, empty when no trial column exists.
    pub labels: Vec<String>,
}

/// Everything one rendering pass needs. Views whose inputs are unavailable are `None`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dashboard {
    pub view: ViewConfig,
    pub scatter_matrix: Option<MultiDimData>,
    pub parallel_coordinates: Option<MultiDimData>,
    pub heatmap: Option<HeatmapGrid>,
    pub line: Option<LineData>,
    pub best_trials: Option<Table>,
}

pub fn dispatch(prepared: &PreparedTable, view: &ViewConfig, best_limit: usize) -> Dashboard {
    let table = prepared.table();

    let multi = multi_dim(table, view);
    let heatmap = view.heatmap.as_ref().and_then(|axes| pivot_mean(table, axes));
    let line = match (view.x.as_deref(), view.y.as_deref()) {
        (Some(x), Some(y)) => line_data(table, x, y, &prepared.column_map().trial),
        _ => None,
    };
    let best = view.error_column.as_deref().and_then(|error| {
        best_trials(
            table,
            error,
            &prepared.column_map().summary_columns(),
            best_limit,
        )
    });

    debug!(
        "Dispatch: {} dimensions, heatmap {}, line {}, best {}",
        multi.as_ref().map_or(0, |m| m.dimensions.len()),
        heatmap.is_some(),
        line.is_some(),
        best.as_ref().map_or(0, Table::len)
    );

    Dashboard {
        view: view.clone(),
        scatter_matrix: multi.clone(),
        parallel_coordinates: multi,
        heatmap,
        line,
        best_trials: best,
    }
}

fn multi_dim(table: &Table, view: &ViewConfig) -> Option<MultiDimData> {
    let dimensions: Vec<Dimension> = view
        .dimensions
        .iter()
        .filter_map(|name| Dimension::from_table(table, name))
        .collect();
    if dimensions.is_empty() {
        return None;
    }
    let color = view
        .color
        .as_deref()
        .and_then(|name| Dimension::from_table(table, name));
    Some(MultiDimData { dimensions, color })
}

/// Pivot `metric` by (`rows`, `cols`). Duplicate keys average; rows with a missing
/// key or metric are dropped; keys are sorted ascending.
pub fn pivot_mean(table: &Table, axes: &HeatmapAxes) -> Option<HeatmapGrid> {
    let rows = Dimension::from_table(table, &axes.rows)?;
    let cols = Dimension::from_table(table, &axes.cols)?;
    let metric = Dimension::from_table(table, &axes.metric)?;

    let mut sums: BTreeMap<(OrderedFloat<f64>, OrderedFloat<f64>), (f64, usize)> =
        BTreeMap::new();
    for ((r, c), m) in rows.values.iter().zip(&cols.values).zip(&metric.values) {
        if let (Some(r), Some(c), Some(m)) = (r, c, m) {
            let entry = sums
                .entry((OrderedFloat(*r), OrderedFloat(*c)))
                .or_insert((0.0, 0));
            entry.0 += m;
            entry.1 += 1;
        }
    }
    if sums.is_empty() {
        return None;
    }

    let mut row_keys: Vec<OrderedFloat<f64>> = sums.keys().map(|(r, _)| *r).collect();
    row_keys.dedup();
    let mut col_keys: Vec<OrderedFloat<f64>> = sums.keys().map(|(_, c)| *c).collect();
    col_keys.sort();
    col_keys.dedup();

    let mut cells = Array2::from_elem((row_keys.len(), col_keys.len()), None);
    for ((r, c), (sum, count)) in &sums {
        let (Ok(ri), Ok(ci)) = (row_keys.binary_search(r), col_keys.binary_search(c)) else {
            continue;
        };
        cells[[ri, ci]] = Some(sum / *count as f64);
    }

    Some(HeatmapGrid {
        axes: axes.clone(),
        row_keys: row_keys.into_iter().map(|k| k.into_inner()).collect(),
        col_keys: col_keys.into_iter().map(|k| k.into_inner()).collect(),
        cells,
    })
}

/// x/y pairs in input row order, never sorted.
pub fn line_data(table: &Table, x: &str, y: &str, trial_column: &str) -> Option<LineData> {
    let x = Dimension::from_table(table, x)?;
    let y = Dimension::from_table(table, y)?;
    let labels = match table.column(trial_column) {
        Some(column) => column.cells.iter().map(Cell::display).collect(),
        None => Vec::new(),
    };
    Some(LineData { x, y, labels })
}

/// The `limit` rows with the lowest `error_column`, projected onto `columns`.
/// `None` when the error column is absent or not numeric.
pub fn best_trials(
    table: &Table,
    error_column: &str,
    columns: &[&str],
    limit: usize,
) -> Option<Table> {
    if !table.column(error_column)?.is_numeric() {
        return None;
    }
    let mut order = table.sorted_indices(error_column)?;
    order.truncate(limit);
    Some(table.select(&order, columns))
}
