//! Standalone SVG rendering of the prepared chart data.

use super::data::{self, BarChart, PieChart};
use super::{encode_data_uri, ChartError, ChartRenderer};
use crate::analysis::{Findings, RiskFactor};
use crate::data::Dataset;
use std::f64::consts::PI;
use std::fmt::Write;

const SVG_MIME: &str = "image/svg+xml";
const FONT: &str = "font-family=\"Helvetica, Arial, sans-serif\"";
const AXIS_COLOR: &str = "#444444";

/// Renders charts as base64 SVG data URIs.
#[derive(Debug, Clone)]
pub struct SvgChartRenderer {
    width: f64,
    height: f64,
    top_machines: usize,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 480.0,
            top_machines: 10,
        }
    }
}

impl SvgChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self, out: &mut String, title: &str) -> Result<(), ChartError> {
        write!(
            out,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
            w = self.width,
            h = self.height
        )?;
        write!(
            out,
            "<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\
             <text x=\"{}\" y=\"32\" text-anchor=\"middle\" font-size=\"18\" font-weight=\"bold\" {}>{}</text>",
            self.width / 2.0,
            FONT,
            escape(title)
        )?;
        Ok(())
    }

    /// Vertical bars with value labels and an optional dashed reference line.
    fn vertical_bars(&self, chart: &BarChart) -> Result<String, ChartError> {
        let (left, right, top, bottom) = (70.0, 30.0, 60.0, 70.0);
        let plot_w = self.width - left - right;
        let plot_h = self.height - top - bottom;
        let base_y = top + plot_h;

        let peak = chart
            .bars
            .iter()
            .map(|b| b.value)
            .chain(chart.reference.as_ref().map(|r| r.value))
            .fold(0.0_f64, f64::max);
        let max = if peak > 0.0 { peak * 1.15 } else { 1.0 };

        let mut out = String::new();
        self.open(&mut out, &chart.title)?;

        // Gridlines and y ticks.
        for i in 0..=4 {
            let value = max * i as f64 / 4.0;
            let y = base_y - plot_h * i as f64 / 4.0;
            write!(
                out,
                "<line x1=\"{left}\" y1=\"{y:.1}\" x2=\"{x2}\" y2=\"{y:.1}\" stroke=\"#e5e5e5\"/>\
                 <text x=\"{tx}\" y=\"{ty:.1}\" text-anchor=\"end\" font-size=\"11\" {FONT}>{value:.1}</text>",
                x2 = left + plot_w,
                tx = left - 6.0,
                ty = y + 4.0,
            )?;
        }

        let slot = plot_w / chart.bars.len().max(1) as f64;
        let bar_w = slot * 0.7;
        for (i, bar) in chart.bars.iter().enumerate() {
            let h = (bar.value.max(0.0) / max) * plot_h;
            let x = left + slot * i as f64 + (slot - bar_w) / 2.0;
            let cx = x + bar_w / 2.0;
            write!(
                out,
                "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{bar_w:.1}\" height=\"{h:.1}\" fill=\"{color}\" stroke=\"#000000\" stroke-width=\"0.5\"/>\
                 <text x=\"{cx:.1}\" y=\"{vy:.1}\" text-anchor=\"middle\" font-size=\"11\" font-weight=\"bold\" {FONT}>{value:.1}%</text>\
                 <text x=\"{cx:.1}\" y=\"{ly:.1}\" text-anchor=\"middle\" font-size=\"11\" {FONT}>{label}</text>",
                y = base_y - h,
                color = bar.color,
                vy = base_y - h - 5.0,
                value = bar.value,
                ly = base_y + 16.0,
                label = escape(&bar.label),
            )?;
        }

        if let Some(reference) = &chart.reference {
            let y = base_y - (reference.value / max) * plot_h;
            write!(
                out,
                "<line x1=\"{left}\" y1=\"{y:.1}\" x2=\"{x2}\" y2=\"{y:.1}\" stroke=\"#1f4e79\" stroke-width=\"2\" stroke-dasharray=\"6,4\"/>\
                 <text x=\"{x2}\" y=\"{ty:.1}\" text-anchor=\"end\" font-size=\"11\" fill=\"#1f4e79\" {FONT}>{label}</text>",
                x2 = left + plot_w,
                ty = y - 6.0,
                label = escape(&reference.label),
            )?;
        }

        self.axes(&mut out, left, top, plot_w, plot_h)?;
        self.axis_labels(&mut out, chart, left, top, plot_w, plot_h)?;
        out.push_str("</svg>");
        Ok(out)
    }

    /// Horizontal bars centred on zero, for signed values.
    fn horizontal_bars(&self, chart: &BarChart) -> Result<String, ChartError> {
        let (left, right, top, bottom) = (170.0, 40.0, 60.0, 60.0);
        let plot_w = self.width - left - right;
        let plot_h = self.height - top - bottom;
        let zero_x = left + plot_w / 2.0;

        let span = chart
            .bars
            .iter()
            .map(|b| b.value.abs())
            .fold(0.1_f64, f64::max)
            * 1.1;
        let half = plot_w / 2.0;

        let mut out = String::new();
        self.open(&mut out, &chart.title)?;

        let slot = plot_h / chart.bars.len().max(1) as f64;
        let bar_h = slot * 0.6;
        for (i, bar) in chart.bars.iter().enumerate() {
            let w = bar.value.abs() / span * half;
            let x = if bar.value >= 0.0 { zero_x } else { zero_x - w };
            let y = top + slot * i as f64 + (slot - bar_h) / 2.0;
            let cy = y + bar_h / 2.0 + 4.0;
            let (vx, anchor) = if bar.value >= 0.0 {
                (zero_x + w + 4.0, "start")
            } else {
                (zero_x - w - 4.0, "end")
            };
            write!(
                out,
                "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{w:.1}\" height=\"{bar_h:.1}\" fill=\"{color}\" stroke=\"#000000\" stroke-width=\"0.5\"/>\
                 <text x=\"{lx}\" y=\"{cy:.1}\" text-anchor=\"end\" font-size=\"11\" {FONT}>{label}</text>\
                 <text x=\"{vx:.1}\" y=\"{cy:.1}\" text-anchor=\"{anchor}\" font-size=\"10\" {FONT}>{value:.3}</text>",
                color = bar.color,
                lx = left - 8.0,
                label = escape(&bar.label),
                value = bar.value,
            )?;
        }

        write!(
            out,
            "<line x1=\"{zero_x:.1}\" y1=\"{top}\" x2=\"{zero_x:.1}\" y2=\"{y2}\" stroke=\"{AXIS_COLOR}\" stroke-width=\"1\"/>",
            y2 = top + plot_h
        )?;
        self.axis_labels(&mut out, chart, left, top, plot_w, plot_h)?;
        out.push_str("</svg>");
        Ok(out)
    }

    fn pie(&self, chart: &PieChart) -> Result<String, ChartError> {
        let total: usize = chart.slices.iter().map(|s| s.count).sum();
        let cx = self.width * 0.38;
        let cy = self.height / 2.0 + 16.0;
        let r = (self.height - 110.0) / 2.0;

        let mut out = String::new();
        self.open(&mut out, &chart.title)?;

        let mut angle = -PI / 2.0;
        for slice in &chart.slices {
            let fraction = slice.count as f64 / total.max(1) as f64;
            let sweep = fraction * 2.0 * PI;

            if chart.slices.len() == 1 {
                write!(
                    out,
                    "<circle cx=\"{cx:.1}\" cy=\"{cy:.1}\" r=\"{r:.1}\" fill=\"{}\" stroke=\"#ffffff\"/>",
                    slice.color
                )?;
            } else {
                let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
                let end = angle + sweep;
                let (x2, y2) = (cx + r * end.cos(), cy + r * end.sin());
                let large = if sweep > PI { 1 } else { 0 };
                write!(
                    out,
                    "<path d=\"M {cx:.1} {cy:.1} L {x1:.2} {y1:.2} A {r:.1} {r:.1} 0 {large} 1 {x2:.2} {y2:.2} Z\" fill=\"{}\" stroke=\"#ffffff\"/>",
                    slice.color
                )?;
            }

            let mid = angle + sweep / 2.0;
            write!(
                out,
                "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"11\" {FONT}>{:.1}%</text>",
                cx + r * 0.65 * mid.cos(),
                cy + r * 0.65 * mid.sin() + 4.0,
                fraction * 100.0
            )?;
            angle += sweep;
        }

        let legend_x = cx + r + 40.0;
        for (i, slice) in chart.slices.iter().enumerate() {
            let y = 80.0 + i as f64 * 22.0;
            write!(
                out,
                "<rect x=\"{legend_x:.1}\" y=\"{y:.1}\" width=\"14\" height=\"14\" fill=\"{}\"/>\
                 <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" {FONT}>{} ({})</text>",
                slice.color,
                legend_x + 20.0,
                y + 12.0,
                escape(&slice.label),
                slice.count
            )?;
        }

        out.push_str("</svg>");
        Ok(out)
    }

    fn axes(&self, out: &mut String, left: f64, top: f64, w: f64, h: f64) -> Result<(), ChartError> {
        write!(
            out,
            "<line x1=\"{left}\" y1=\"{top}\" x2=\"{left}\" y2=\"{b}\" stroke=\"{AXIS_COLOR}\"/>\
             <line x1=\"{left}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\" stroke=\"{AXIS_COLOR}\"/>",
            b = top + h,
            r = left + w
        )?;
        Ok(())
    }

    fn axis_labels(
        &self,
        out: &mut String,
        chart: &BarChart,
        left: f64,
        top: f64,
        w: f64,
        h: f64,
    ) -> Result<(), ChartError> {
        if !chart.x_label.is_empty() {
            write!(
                out,
                "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"13\" {FONT}>{}</text>",
                left + w / 2.0,
                self.height - 20.0,
                escape(&chart.x_label)
            )?;
        }
        if !chart.y_label.is_empty() {
            let (x, y) = (18.0, top + h / 2.0);
            write!(
                out,
                "<text x=\"{x}\" y=\"{y:.1}\" transform=\"rotate(-90 {x} {y:.1})\" text-anchor=\"middle\" font-size=\"13\" {FONT}>{}</text>",
                escape(&chart.y_label)
            )?;
        }
        Ok(())
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn failure_rate_by_type(&self, dataset: &Dataset) -> Result<Option<String>, ChartError> {
        data::failure_by_type(dataset)
            .map(|chart| self.vertical_bars(&chart).map(|svg| encode_svg(&svg)))
            .transpose()
    }

    fn risk_factors(
        &self,
        factors: &Findings<Vec<RiskFactor>>,
    ) -> Result<Option<String>, ChartError> {
        data::risk_factors(factors)
            .map(|chart| self.horizontal_bars(&chart).map(|svg| encode_svg(&svg)))
            .transpose()
    }

    fn failure_distribution(&self, dataset: &Dataset) -> Result<Option<String>, ChartError> {
        data::failure_distribution(dataset)
            .map(|chart| self.pie(&chart).map(|svg| encode_svg(&svg)))
            .transpose()
    }

    fn machine_comparison(&self, dataset: &Dataset) -> Result<Option<String>, ChartError> {
        data::machine_comparison(dataset, self.top_machines)
            .map(|chart| self.vertical_bars(&chart).map(|svg| encode_svg(&svg)))
            .transpose()
    }
}

fn encode_svg(svg: &str) -> String {
    encode_data_uri(SVG_MIME, svg.as_bytes())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::identify_risk_factors;
    use crate::charts::decode_data_uri;
    use crate::data::Column;

    fn sample() -> Dataset {
        Dataset::from_columns(vec![
            Column::text("Machine", ["A&B", "A&B", "C", "C"]),
            Column::text("Type", ["L", "L", "M", "M"]),
            Column::numeric("Torque", [20.0, 60.0, 25.0, 58.0]),
            Column::numeric("Target", [0.0, 1.0, 0.0, 1.0]),
            Column::text("Failure_Type", ["No Failure", "Power", "No Failure", "Power"]),
        ])
        .unwrap()
    }

    fn svg_text(uri: &str) -> String {
        let decoded = decode_data_uri(uri).unwrap();
        assert_eq!(decoded.mime, "image/svg+xml");
        String::from_utf8(decoded.bytes).unwrap()
    }

    #[test]
    fn test_renders_all_kinds() {
        let ds = sample();
        let renderer = SvgChartRenderer::new();
        let factors = identify_risk_factors(&ds).unwrap();

        let charts = [
            renderer.failure_rate_by_type(&ds).unwrap(),
            renderer.risk_factors(&factors).unwrap(),
            renderer.failure_distribution(&ds).unwrap(),
            renderer.machine_comparison(&ds).unwrap(),
        ];

        for chart in charts {
            let svg = svg_text(&chart.unwrap());
            assert!(svg.starts_with("<svg"));
            assert!(svg.ends_with("</svg>"));
        }
    }

    #[test]
    fn test_labels_are_escaped() {
        let svg = svg_text(&SvgChartRenderer::new().machine_comparison(&sample()).unwrap().unwrap());
        assert!(svg.contains("A&amp;B"));
        assert!(!svg.contains("A&B"));
        assert!(svg.contains("stroke-dasharray"));
    }

    #[test]
    fn test_single_slice_pie_is_a_circle() {
        let svg = svg_text(&SvgChartRenderer::new().failure_distribution(&sample()).unwrap().unwrap());
        assert!(svg.contains("<circle"));
        assert!(svg.contains("Power (2)"));
    }

    #[test]
    fn test_missing_columns_render_nothing() {
        let ds = Dataset::from_columns(vec![Column::numeric("col1", [1.0, 2.0])]).unwrap();
        let renderer = SvgChartRenderer::new();
        assert!(renderer.failure_rate_by_type(&ds).unwrap().is_none());
        assert!(renderer.failure_distribution(&ds).unwrap().is_none());
        assert!(renderer.machine_comparison(&ds).unwrap().is_none());
        assert!(renderer
            .risk_factors(&Findings::unavailable("No target column found"))
            .unwrap()
            .is_none());
    }
}
