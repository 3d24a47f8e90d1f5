use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tunedash::{
    ColumnMap, Dashboard, IngestOptions, RuleOutcome, Session, Table, ViewRequest,
    DEFAULT_BEST_LIMIT,
};

mod render;

use render::{
    render_chart_guard, ChartKind, HeatmapChart, LineChart, ParallelChart, ScatterMatrixChart,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tuning-trial dashboard for 3DGS parameter sweeps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the scatter matrix, parallel coordinates, heatmap and line plot for a sheet
    Render(RenderArgs),
    /// Report columns, numeric dimensions and normalization results for a sheet
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct SheetArgs {
    /// Trial sheet (.csv, .xlsx, .xls)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Zero-based row holding the column headers
    #[arg(long, default_value_t = 0)]
    header_row: usize,

    /// CSV field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Optional JSON file overriding the expected column names
    #[arg(long, value_hint = ValueHint::FilePath)]
    columns: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    sheet: SheetArgs,

    /// Directory receiving the chart images
    #[arg(short, long, default_value = "charts", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// Image format
    #[arg(long, value_enum, default_value_t = FormatOpt::Png)]
    format: FormatOpt,

    /// X axis of the line plot
    #[arg(long)]
    x: Option<String>,

    /// Y axis of the line plot
    #[arg(long)]
    y: Option<String>,

    /// Color-by column (empty string disables coloring)
    #[arg(long)]
    color: Option<String>,

    /// Dimensions for the scatter matrix and parallel coordinates (comma separated)
    #[arg(long, value_delimiter = ',')]
    dims: Vec<String>,

    /// Heatmap row column
    #[arg(long)]
    heatmap_rows: Option<String>,

    /// Heatmap column column
    #[arg(long)]
    heatmap_cols: Option<String>,

    /// Heatmap cell metric
    #[arg(long)]
    heatmap_metric: Option<String>,

    /// Error metric ranking the best trials (lower is better)
    #[arg(long)]
    error_column: Option<String>,

    /// Number of best trials to list
    #[arg(long, default_value_t = DEFAULT_BEST_LIMIT)]
    top: usize,

    /// Also print the full prepared table
    #[arg(long, action = ArgAction::SetTrue)]
    show_table: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    #[command(flatten)]
    sheet: SheetArgs,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "trial_report.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatOpt {
    Png,
    Svg,
}

impl From<FormatOpt> for ChartKind {
    fn from(value: FormatOpt) -> Self {
        match value {
            FormatOpt::Png => ChartKind::Png,
            FormatOpt::Svg => ChartKind::Svg,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Render(args) => args.sheet.verbose,
        Command::Inspect(args) => args.sheet.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Render(args) => handle_render(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn open_session(args: &SheetArgs) -> Result<Session> {
    let columns = match args.columns.as_ref() {
        Some(path) => load_column_map(path)?,
        None => ColumnMap::default(),
    };
    let ingest = IngestOptions {
        header_row: args.header_row,
        ..Default::default()
    }
    .with_delimiter(args.delimiter)?;

    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let name = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv");
    let session = Session::open(name, &data, &ingest, &columns)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    Ok(session)
}

fn load_column_map(path: &Path) -> Result<ColumnMap> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read column map {}", path.display()))?;
    let map: ColumnMap = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid column map", path.display()))?;
    Ok(map)
}

fn handle_render(args: RenderArgs) -> Result<()> {
    let t_load = Instant::now();
    let session = open_session(&args.sheet)?;
    if args.sheet.verbose {
        info!(
            "Load stage: {:.1} ms (fingerprint {})",
            t_load.elapsed().as_secs_f64() * 1000.0,
            &session.fingerprint()[..12]
        );
    }
    if args.top == 0 {
        return Err(anyhow!("--top must be at least 1"));
    }

    let request = ViewRequest {
        x: args.x.clone(),
        y: args.y.clone(),
        color: args.color.clone(),
        dimensions: args
            .dims
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect(),
        heatmap_rows: args.heatmap_rows.clone(),
        heatmap_cols: args.heatmap_cols.clone(),
        heatmap_metric: args.heatmap_metric.clone(),
        error_column: args.error_column.clone(),
    };
    let dashboard = session.dashboard(&request, args.top);

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    render_dashboard(&dashboard, &args.out_dir, args.format.into());

    if args.show_table {
        println!("# Prepared table ({})", session.source_name());
        write_table_stdout(session.prepared().table())?;
        println!();
    }

    match dashboard.best_trials.as_ref() {
        Some(best) => {
            let error = dashboard.view.error_column.as_deref().unwrap_or("error");
            println!("# Best {} trials by {}", best.len(), error);
            write_table_stdout(best)?;
        }
        None => warn!("No numeric error column; skipping best-trials listing"),
    }

    Ok(())
}

fn render_dashboard(dashboard: &Dashboard, out_dir: &Path, kind: ChartKind) {
    let t_plot = Instant::now();
    let ext = kind.extension();
    let mut written = 0usize;

    if let Some(data) = dashboard.scatter_matrix.as_ref() {
        let path = out_dir.join(format!("scatter_matrix.{}", ext));
        written += report_render(render_chart_guard(&ScatterMatrixChart(data), &path, kind), &path);
    } else {
        warn!("No numeric dimensions; skipping scatter matrix");
    }

    if let Some(data) = dashboard.parallel_coordinates.as_ref() {
        let path = out_dir.join(format!("parallel_coordinates.{}", ext));
        written += report_render(render_chart_guard(&ParallelChart(data), &path, kind), &path);
    } else {
        warn!("No numeric dimensions; skipping parallel coordinates");
    }

    if let Some(grid) = dashboard.heatmap.as_ref() {
        let path = out_dir.join(format!("heatmap.{}", ext));
        written += report_render(render_chart_guard(&HeatmapChart(grid), &path, kind), &path);
    } else {
        warn!("Heatmap columns unavailable; skipping heatmap");
    }

    if let Some(line) = dashboard.line.as_ref() {
        let path = out_dir.join(format!("line.{}", ext));
        written += report_render(render_chart_guard(&LineChart(line), &path, kind), &path);
    } else {
        warn!("Line plot axes unavailable; skipping line plot");
    }

    info!(
        "Plot stage: {} charts in {:.1} ms",
        written,
        t_plot.elapsed().as_secs_f64() * 1000.0
    );
}

fn report_render(result: Result<(), String>, path: &Path) -> usize {
    match result {
        Ok(()) => {
            info!("Wrote plot: {}", path.display());
            1
        }
        Err(err) => {
            warn!("Skipping render ({}): {}", path.display(), err);
            0
        }
    }
}

fn write_table_stdout(table: &Table) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_table_rows(table, &mut writer)
}

fn write_table_rows<W: Write>(table: &Table, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(table.column_names())?;
    for idx in 0..table.len() {
        if let Some(row) = table.row(idx) {
            writer.write_record(row.iter().map(|cell| cell.display()))?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let session = open_session(&args.sheet)?;
    let report = inspect_report(&session);

    if args.output.as_os_str() == "-" {
        io::stdout().write_all(report.as_bytes())?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Inspection report written: {}", args.output.display());
    }
    Ok(())
}

fn inspect_report(session: &Session) -> String {
    let prepared = session.prepared();
    let table = prepared.table();
    let mut report = String::new();

    report.push_str(&format!("FILE: {}\n", session.source_name()));
    report.push_str(&format!("  sha256: {}\n", session.fingerprint()));
    report.push_str(&format!("  loaded_at: {}\n", session.uploaded_at().to_rfc3339()));
    report.push_str(&format!("  rows: {}\n", table.len()));
    report.push_str(&format!(
        "  columns_uploaded: {} (prepared: {})\n",
        session.raw().columns().len(),
        table.columns().len()
    ));

    let renamed = &prepared.report().renamed_headers;
    if !renamed.is_empty() {
        report.push_str("  renamed_headers:\n");
        for (old, new) in renamed {
            report.push_str(&format!("    - {:?} -> {:?}\n", old, new));
        }
    }

    report.push_str("  rules:\n");
    for (rule, outcome) in &prepared.report().rules {
        let status = match outcome {
            RuleOutcome::Applied { parsed, unparsed } => {
                format!("parsed={}, unreadable={}", parsed, unparsed)
            }
            RuleOutcome::SkippedMissingColumn => "skipped (column absent)".to_string(),
        };
        report.push_str(&format!(
            "    - {} [{}] -> {}: {}\n",
            rule.source,
            rule.kind.name(),
            rule.target(),
            status
        ));
    }

    report.push_str("  columns:\n");
    for column in table.columns() {
        let values = column.values();
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let kind = if prepared.is_numeric(&column.name) {
            "numeric"
        } else {
            "text"
        };
        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        report.push_str(&format!(
            "    - {}: {}, present={}/{}, min={}, max={}\n",
            column.name,
            kind,
            column.cells.iter().filter(|c| !c.is_missing()).count(),
            table.len(),
            if present.is_empty() { "n/a".into() } else { format!("{:.3}", min) },
            if present.is_empty() { "n/a".into() } else { format!("{:.3}", max) },
        ));
    }

    report.push_str(&format!(
        "  dimensions: {}\n",
        prepared.numeric_columns().join(", ")
    ));
    report.push('\n');
    report
}
