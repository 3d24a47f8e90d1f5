//! Chart rendering on top of plotters, one PNG or SVG per view.

use std::ops::Range;
use std::panic;
use std::path::Path;

use anyhow::Result;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tunedash::{Dimension, HeatmapGrid, LineData, MultiDimData};

const DEFAULT_POINT: RGBColor = RGBColor(31, 119, 180);

#[derive(Clone, Copy, Debug)]
pub enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    pub fn extension(self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }
}

/// A view that can draw itself on any plotters backend.
pub trait ChartDraw {
    fn size(&self) -> (u32, u32) {
        (1280, 760)
    }

    fn draw<DB>(&self, root: DrawingArea<DB, plotters::coord::Shift>) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static;
}

/// Render `chart` to `path`, converting backend panics (missing fonts, mostly) into
/// errors so one broken chart does not abort the run.
pub fn render_chart_guard<C: ChartDraw>(
    chart: &C,
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_chart(chart, path, kind).map_err(|e| format!("plotting error: {}", e))
    };
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart<C: ChartDraw>(chart: &C, path: &Path, kind: ChartKind) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, chart.size()).into_drawing_area();
            chart.draw(root)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, chart.size()).into_drawing_area();
            chart.draw(root)
        }
    }
}

fn font(size: f64) -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, size, FontStyle::Normal)
}

/// Viridis approximation over `t` in [0, 1].
pub fn viridis(t: f64) -> RGBColor {
    const STOPS: [(f64, f64, f64); 5] = [
        (68.0, 1.0, 84.0),
        (59.0, 82.0, 139.0),
        (33.0, 145.0, 140.0),
        (94.0, 201.0, 98.0),
        (253.0, 231.0, 37.0),
    ];
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (STOPS.len() - 1) as f64;
    let idx = (scaled.floor() as usize).min(STOPS.len() - 2);
    let frac = scaled - idx as f64;
    let (a, b) = (STOPS[idx], STOPS[idx + 1]);
    let lerp = |x: f64, y: f64| (x + (y - x) * frac).round() as u8;
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

/// Linear map from a value range onto the viridis ramp.
struct ColorScale {
    lo: f64,
    span: f64,
}

impl ColorScale {
    fn new((lo, hi): (f64, f64)) -> Self {
        Self { lo, span: hi - lo }
    }

    fn color(&self, value: Option<f64>) -> RGBColor {
        match value {
            Some(v) if self.span > 0.0 => viridis((v - self.lo) / self.span),
            Some(_) => viridis(0.5),
            None => RGBColor(160, 160, 160),
        }
    }
}

fn color_scale(color: Option<&Dimension>) -> Option<ColorScale> {
    color.and_then(Dimension::bounds).map(ColorScale::new)
}

fn point_color(scale: Option<&ColorScale>, color: Option<&Dimension>, row: usize) -> RGBColor {
    match (scale, color) {
        (Some(scale), Some(dim)) => scale.color(dim.values.get(row).copied().flatten()),
        _ => DEFAULT_POINT,
    }
}

/// Value range with a small margin; degenerate ranges widen to +/-1.
pub fn padded_range(dim: &Dimension) -> Option<Range<f64>> {
    let (lo, hi) = dim.bounds()?;
    let span = hi - lo;
    if span.abs() < f64::EPSILON {
        return Some((lo - 1.0)..(hi + 1.0));
    }
    let pad = span * 0.05;
    Some((lo - pad)..(hi + pad))
}

pub struct ScatterMatrixChart<'a>(pub &'a MultiDimData);

impl ChartDraw for ScatterMatrixChart<'_> {
    fn size(&self) -> (u32, u32) {
        let n = self.0.dimensions.len().max(1) as u32;
        let side = (n * 240).clamp(480, 1680);
        (side, side + 40)
    }

    fn draw<DB>(&self, root: DrawingArea<DB, plotters::coord::Shift>) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        let data = self.0;
        let n = data.dimensions.len();
        root.fill(&WHITE)?;
        let area = root.titled(
            "Scatter Matrix of Tuning Parameters and Output",
            font(24.0),
        )?;
        let scale = color_scale(data.color.as_ref());
        let panels = area.split_evenly((n, n));

        for (idx, panel) in panels.iter().enumerate() {
            let (row, col) = (idx / n, idx % n);
            let y_dim = &data.dimensions[row];
            let x_dim = &data.dimensions[col];
            let (Some(x_range), Some(y_range)) = (padded_range(x_dim), padded_range(y_dim)) else {
                continue;
            };
            let bottom = row + 1 == n;
            let left = col == 0;

            let mut chart = ChartBuilder::on(panel)
                .margin(4)
                .x_label_area_size(if bottom { 36 } else { 0 })
                .y_label_area_size(if left { 52 } else { 0 })
                .build_cartesian_2d(x_range, y_range)?;

            let mut mesh = chart.configure_mesh();
            mesh.light_line_style(&TRANSPARENT)
                .x_labels(4)
                .y_labels(4)
                .label_style(font(11.0))
                .axis_desc_style(font(12.0));
            if bottom {
                mesh.x_desc(x_dim.name.as_str());
            }
            if left {
                mesh.y_desc(y_dim.name.as_str());
            }
            mesh.draw()?;

            let points: Vec<(f64, f64, RGBColor)> = (0..x_dim.values.len())
                .filter_map(|i| {
                    let x = x_dim.values[i]?;
                    let y = y_dim.values.get(i).copied().flatten()?;
                    Some((x, y, point_color(scale.as_ref(), data.color.as_ref(), i)))
                })
                .collect();
            chart.draw_series(
                points
                    .into_iter()
                    .map(|(x, y, color)| Circle::new((x, y), 3, color.filled())),
            )?;
        }

        area.present()?;
        Ok(())
    }
}

pub struct ParallelChart<'a>(pub &'a MultiDimData);

impl ChartDraw for ParallelChart<'_> {
    fn draw<DB>(&self, root: DrawingArea<DB, plotters::coord::Shift>) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        let data = self.0;
        let n = data.dimensions.len();
        let bounds: Vec<Option<(f64, f64)>> = data.dimensions.iter().map(Dimension::bounds).collect();
        let scale = color_scale(data.color.as_ref());

        root.fill(&WHITE)?;
        let x_max = (n.max(2) - 1) as f64;
        let mut chart = ChartBuilder::on(&root)
            .caption("Parallel Coordinates for Parameter Exploration", font(24.0))
            .margin(40)
            .build_cartesian_2d(-0.15..(x_max + 0.15), -0.12..1.1)?;

        let rows = data.dimensions.first().map_or(0, |d| d.values.len());
        for row in 0..rows {
            let color = point_color(scale.as_ref(), data.color.as_ref(), row).mix(0.6);
            let mut segment: Vec<(f64, f64)> = Vec::new();
            for (axis, dim) in data.dimensions.iter().enumerate() {
                let normalized = match (dim.values.get(row).copied().flatten(), bounds[axis]) {
                    (Some(v), Some((lo, hi))) if hi > lo => Some((v - lo) / (hi - lo)),
                    (Some(_), Some(_)) => Some(0.5),
                    _ => None,
                };
                match normalized {
                    Some(y) => segment.push((axis as f64, y)),
                    None => {
                        if segment.len() > 1 {
                            chart.draw_series(std::iter::once(PathElement::new(
                                segment.clone(),
                                color.stroke_width(2),
                            )))?;
                        }
                        segment.clear();
                    }
                }
            }
            if segment.len() > 1 {
                chart.draw_series(std::iter::once(PathElement::new(
                    segment,
                    color.stroke_width(2),
                )))?;
            }
        }

        let label = font(14.0).color(&BLACK);
        let centered = label.pos(Pos::new(HPos::Center, VPos::Center));
        for (axis, dim) in data.dimensions.iter().enumerate() {
            let x = axis as f64;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, 0.0), (x, 1.0)],
                BLACK.stroke_width(1),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                dim.name.clone(),
                (x, -0.07),
                centered.clone(),
            )))?;
            if let Some((lo, hi)) = bounds[axis] {
                chart.draw_series(std::iter::once(Text::new(
                    format!("{:.3}", hi),
                    (x, 1.04),
                    centered.clone(),
                )))?;
                chart.draw_series(std::iter::once(Text::new(
                    format!("{:.3}", lo),
                    (x, -0.02),
                    centered.clone(),
                )))?;
            }
        }

        root.present()?;
        Ok(())
    }
}

pub struct HeatmapChart<'a>(pub &'a HeatmapGrid);

impl ChartDraw for HeatmapChart<'_> {
    fn draw<DB>(&self, root: DrawingArea<DB, plotters::coord::Shift>) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        let grid = self.0;
        let (n_rows, n_cols) = grid.cells.dim();
        let scale = grid.value_bounds().map(ColorScale::new);

        root.fill(&WHITE)?;
        let caption = format!(
            "{} Heatmap by {} and {}",
            grid.axes.metric, grid.axes.rows, grid.axes.cols
        );
        let mut chart = ChartBuilder::on(&root)
            .caption(caption, font(24.0))
            .margin(25)
            .x_label_area_size(50)
            .y_label_area_size(80)
            .build_cartesian_2d((0..n_cols).into_segmented(), (0..n_rows).into_segmented())?;

        let col_label = |v: &SegmentValue<usize>| match v {
            SegmentValue::CenterOf(i) => grid
                .col_keys
                .get(*i)
                .map(|k| tunedash::table::format_number(*k))
                .unwrap_or_default(),
            _ => String::new(),
        };
        let row_label = |v: &SegmentValue<usize>| match v {
            SegmentValue::CenterOf(i) => grid
                .row_keys
                .get(*i)
                .map(|k| tunedash::table::format_number(*k))
                .unwrap_or_default(),
            _ => String::new(),
        };
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(n_cols + 1)
            .y_labels(n_rows + 1)
            .x_label_formatter(&col_label)
            .y_label_formatter(&row_label)
            .x_desc(grid.axes.cols.as_str())
            .y_desc(grid.axes.rows.as_str())
            .label_style(font(14.0))
            .draw()?;

        let mut cells = Vec::new();
        for ((r, c), value) in grid.cells.indexed_iter() {
            let fill = match (value, scale.as_ref()) {
                (Some(v), Some(scale)) => scale.color(Some(*v)),
                _ => RGBColor(235, 235, 235),
            };
            cells.push(Rectangle::new(
                [
                    (SegmentValue::Exact(c), SegmentValue::Exact(r)),
                    (SegmentValue::Exact(c + 1), SegmentValue::Exact(r + 1)),
                ],
                fill.filled(),
            ));
        }
        chart.draw_series(cells)?;

        let centered = font(16.0)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center));
        chart.draw_series(grid.cells.indexed_iter().filter_map(|((r, c), value)| {
            value.map(|v| {
                Text::new(
                    format!("{:.3}", v),
                    (SegmentValue::CenterOf(c), SegmentValue::CenterOf(r)),
                    centered.clone(),
                )
            })
        }))?;

        root.present()?;
        Ok(())
    }
}

pub struct LineChart<'a>(pub &'a LineData);

impl ChartDraw for LineChart<'_> {
    fn draw<DB>(&self, root: DrawingArea<DB, plotters::coord::Shift>) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        let line = self.0;
        root.fill(&WHITE)?;
        let (Some(x_range), Some(y_range)) = (padded_range(&line.x), padded_range(&line.y)) else {
            root.present()?;
            return Ok(());
        };

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("{} Progression Over {}", line.y.name, line.x.name),
                font(24.0),
            )
            .margin(25)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range, y_range)?;

        chart
            .configure_mesh()
            .x_desc(line.x.name.as_str())
            .y_desc(line.y.name.as_str())
            .label_style(font(16.0))
            .draw()?;

        // Row order is kept as uploaded; a missing value breaks the line.
        let mut segments: Vec<Vec<(f64, f64)>> = vec![Vec::new()];
        let mut labelled: Vec<(f64, f64, String)> = Vec::new();
        for (i, (x, y)) in line.x.values.iter().zip(&line.y.values).enumerate() {
            match (x, y) {
                (Some(x), Some(y)) => {
                    if let Some(current) = segments.last_mut() {
                        current.push((*x, *y));
                    }
                    let label = line.labels.get(i).cloned().unwrap_or_default();
                    labelled.push((*x, *y, label));
                }
                _ => {
                    if segments.last().map_or(false, |s| !s.is_empty()) {
                        segments.push(Vec::new());
                    }
                }
            }
        }

        for segment in segments.into_iter().filter(|s| !s.is_empty()) {
            chart.draw_series(LineSeries::new(segment, DEFAULT_POINT.stroke_width(2)))?;
        }
        chart.draw_series(
            labelled
                .iter()
                .map(|(x, y, _)| Circle::new((*x, *y), 4, DEFAULT_POINT.filled())),
        )?;
        let label_style = font(14.0).color(&BLACK).pos(Pos::new(HPos::Left, VPos::Bottom));
        chart.draw_series(
            labelled
                .into_iter()
                .filter(|(_, _, label)| !label.is_empty())
                .map(|(x, y, label)| Text::new(label, (x, y), label_style.clone())),
        )?;

        root.present()?;
        Ok(())
    }
}
