//! Core library for exploring 3DGS tuning-trial spreadsheets: field normalization,
//! table preparation, view resolution and chart dispatch.

use thiserror::Error;

pub mod dispatch;
pub mod ingest;
pub mod normalize;
pub mod prepare;
pub mod session;
pub mod table;
pub mod view;

pub use dispatch::{
    best_trials, dispatch, line_data, pivot_mean, Dashboard, Dimension, HeatmapGrid, LineData,
    MultiDimData, DEFAULT_BEST_LIMIT,
};
pub use ingest::{read_table, IngestOptions, SourceFormat};
pub use normalize::{duration_minutes, magnitude, percentage, FieldKind};
pub use prepare::{
    prepare_table, ColumnMap, FieldRule, PrepareReport, PreparedTable, RuleOutcome,
    DERIVED_DURATION_COLUMN,
};
pub use session::Session;
pub use table::{Cell, Column, Table};
pub use view::{HeatmapAxes, ViewConfig, ViewRequest};

#[derive(Error, Debug)]
pub enum DashError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse CSV: {0}")]
    Csv(String),
    #[error("failed to read workbook: {0}")]
    Workbook(String),
    #[error("workbook has no worksheets")]
    EmptyWorkbook,
    #[error("no header found at row {0}")]
    MissingHeader(usize),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
