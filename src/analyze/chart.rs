//! Bar chart rendering for the aggregation result.
//!
//! Renders with the SVG backend so runs never depend on system fonts, and
//! publishes through a staged sibling so the artifact is complete-or-absent.

use plotters::prelude::*;
use snafu::prelude::*;
use std::path::{Path, PathBuf};

use super::AggregateRow;
use crate::error::{AnalyzeError, ChartRenderSnafu, ChartWriteSnafu};

const CHART_SIZE: (u32, u32) = (1000, 600);
const BAR_FILL: RGBColor = RGBColor(135, 206, 235);

/// Render `groups` as a vertical bar chart at `path`.
///
/// An empty aggregate still publishes a chart with empty axes, so a run
/// always leaves an artifact behind.
pub fn render_bar_chart(
    path: &Path,
    title: &str,
    x_label: &str,
    y_label: &str,
    groups: &[AggregateRow],
) -> Result<(), AnalyzeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context(ChartWriteSnafu { path })?;
    }
    let staged = staging_path(path);
    draw(&staged, title, x_label, y_label, groups)
        .map_err(|message| ChartRenderSnafu { message }.build())?;
    std::fs::rename(&staged, path).context(ChartWriteSnafu { path })
}

fn draw(
    path: &Path,
    title: &str,
    x_label: &str,
    y_label: &str,
    groups: &[AggregateRow],
) -> Result<(), String> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| e.to_string())?;

    let max_mean = groups.iter().map(|g| g.mean).fold(0.0_f64, f64::max);
    let y_max = if max_mean > 0.0 { max_mean * 1.1 } else { 1.0 };
    let segments = groups.len().max(1);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d((0..segments).into_segmented(), 0.0..y_max)
        .map_err(|e| e.to_string())?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .x_labels(segments)
        .x_label_formatter(&|segment| match segment {
            SegmentValue::Exact(idx) | SegmentValue::CenterOf(idx) => groups
                .get(*idx)
                .map(|g| g.group.clone())
                .unwrap_or_default(),
            SegmentValue::Last => String::new(),
        })
        .draw()
        .map_err(|e| e.to_string())?;

    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BAR_FILL.filled())
                .margin(8)
                .data(groups.iter().enumerate().map(|(idx, g)| (idx, g.mean))),
        )
        .map_err(|e| e.to_string())?;

    root.present().map_err(|e| e.to_string())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
