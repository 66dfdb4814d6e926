//! Overlaid ROC curves rendered as a standalone SVG document.

use crate::training::ModelResult;
use churn_core::ChurnError;
use std::fmt::Write as _;
use std::path::Path;

pub const FIGURE_WIDTH: f64 = 1200.0;
pub const FIGURE_HEIGHT: f64 = 800.0;

const MARGIN_LEFT: f64 = 100.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 70.0;
const MARGIN_BOTTOM: f64 = 90.0;
const Y_MAX: f64 = 1.05;
const PALETTE: [&str; 5] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd"];

struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn new() -> Self {
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: FIGURE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
            height: FIGURE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }

    fn x(&self, fpr: f64) -> f64 {
        self.left + fpr.clamp(0.0, 1.0) * self.width
    }

    fn y(&self, tpr: f64) -> f64 {
        self.top + (1.0 - tpr.clamp(0.0, Y_MAX) / Y_MAX) * self.height
    }

    fn right(&self) -> f64 {
        self.left + self.width
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Legend label for one curve.
pub fn curve_label(result: &ModelResult) -> Option<String> {
    result
        .roc_auc
        .map(|auc| format!("{} (AUC = {auc:.2})", result.name))
}

/// One curve per result that has ROC points, in result order, plus the
/// dashed chance diagonal and a lower-right legend.
pub fn render_roc_svg(results: &[ModelResult]) -> String {
    let frame = Frame::new();
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{FIGURE_WIDTH}" height="{FIGURE_HEIGHT}" viewBox="0 0 {FIGURE_WIDTH} {FIGURE_HEIGHT}" font-family="sans-serif">"#
    );
    let _ = writeln!(
        svg,
        r#"<rect width="{FIGURE_WIDTH}" height="{FIGURE_HEIGHT}" fill="white"/>"#
    );
    draw_axes(&mut svg, &frame);

    // Chance line.
    let _ = writeln!(
        svg,
        r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black" stroke-width="1.5" stroke-dasharray="8,6"/>"#,
        frame.x(0.0),
        frame.y(0.0),
        frame.x(1.0),
        frame.y(1.0)
    );

    let mut legend = Vec::new();
    for result in results {
        let (Some(curve), Some(label)) = (&result.roc_curve, curve_label(result)) else {
            continue;
        };
        let color = PALETTE[legend.len() % PALETTE.len()];
        let points: Vec<String> = curve
            .fpr
            .iter()
            .zip(&curve.tpr)
            .map(|(&f, &t)| format!("{:.1},{:.1}", frame.x(f), frame.y(t)))
            .collect();
        let _ = writeln!(
            svg,
            r#"<polyline class="roc" fill="none" stroke="{color}" stroke-width="2" points="{}"/>"#,
            points.join(" ")
        );
        legend.push((color, label));
    }

    draw_legend(&mut svg, &frame, &legend);
    svg.push_str("</svg>\n");
    svg
}

fn draw_axes(svg: &mut String, frame: &Frame) {
    let _ = writeln!(
        svg,
        r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="black"/>"#,
        frame.left, frame.top, frame.width, frame.height
    );
    for step in 0..=5 {
        let v = f64::from(step) * 0.2;
        let (x, y) = (frame.x(v), frame.y(v));
        let _ = writeln!(
            svg,
            r#"<line x1="{x:.1}" y1="{b:.1}" x2="{x:.1}" y2="{t:.1}" stroke="black"/><text x="{x:.1}" y="{l:.1}" font-size="14" text-anchor="middle">{v:.1}</text>"#,
            b = frame.bottom(),
            t = frame.bottom() + 6.0,
            l = frame.bottom() + 24.0
        );
        let _ = writeln!(
            svg,
            r#"<line x1="{a:.1}" y1="{y:.1}" x2="{l:.1}" y2="{y:.1}" stroke="black"/><text x="{t:.1}" y="{ty:.1}" font-size="14" text-anchor="end">{v:.1}</text>"#,
            a = frame.left - 6.0,
            l = frame.left,
            t = frame.left - 10.0,
            ty = y + 5.0
        );
    }
    let _ = writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" font-size="20" text-anchor="middle">ROC Curves</text>"#,
        frame.left + frame.width / 2.0,
        frame.top - 24.0
    );
    let _ = writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" font-size="16" text-anchor="middle">False Positive Rate</text>"#,
        frame.left + frame.width / 2.0,
        frame.bottom() + 60.0
    );
    let (lx, ly) = (frame.left - 60.0, frame.top + frame.height / 2.0);
    let _ = writeln!(
        svg,
        r#"<text x="{lx:.1}" y="{ly:.1}" font-size="16" text-anchor="middle" transform="rotate(-90 {lx:.1} {ly:.1})">True Positive Rate</text>"#
    );
}

fn draw_legend(svg: &mut String, frame: &Frame, entries: &[(&str, String)]) {
    if entries.is_empty() {
        return;
    }
    const ROW: f64 = 24.0;
    const PAD: f64 = 12.0;
    const SWATCH: f64 = 30.0;
    // Rough glyph width for a 14px sans-serif face.
    let longest = entries.iter().map(|(_, l)| l.len()).max().unwrap_or(0) as f64;
    let width = PAD * 3.0 + SWATCH + longest * 7.5;
    let height = PAD * 2.0 + ROW * entries.len() as f64;
    let x = frame.right() - width - 10.0;
    let y = frame.bottom() - height - 10.0;

    let _ = writeln!(
        svg,
        r##"<g class="legend"><rect x="{x:.1}" y="{y:.1}" width="{width:.1}" height="{height:.1}" fill="white" fill-opacity="0.8" stroke="#cccccc"/>"##
    );
    for (i, (color, label)) in entries.iter().enumerate() {
        let row_y = y + PAD + ROW * i as f64 + ROW / 2.0;
        let _ = writeln!(
            svg,
            r#"<line x1="{:.1}" y1="{row_y:.1}" x2="{:.1}" y2="{row_y:.1}" stroke="{color}" stroke-width="2"/><text x="{:.1}" y="{:.1}" font-size="14">{}</text>"#,
            x + PAD,
            x + PAD + SWATCH,
            x + PAD * 2.0 + SWATCH,
            row_y + 5.0,
            escape_xml(label)
        );
    }
    svg.push_str("</g>\n");
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render and write the figure, creating parent directories as needed.
pub async fn write_roc_svg(results: &[ModelResult], path: &Path) -> Result<(), ChurnError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let svg = render_roc_svg(results);
    tokio::fs::write(path, svg.as_bytes()).await?;
    tracing::info!(path = %path.display(), bytes = svg.len(), "ROC figure written");
    Ok(())
}
