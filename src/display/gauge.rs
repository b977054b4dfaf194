//! Gauge display
//!
//! Renders a scalar reading as a fixed-width text bar, one line per update.

use std::collections::HashMap;
use std::io::Write;

use tracing::warn;

/// Default element id of the moisture gauge
pub const DEFAULT_ELEMENT_ID: &str = "MoistureMeter";

/// Default full-scale value of the gauge
pub const DEFAULT_GAUGE_TOTAL: f64 = 100.0;

/// Default bar width in characters
pub const DEFAULT_GAUGE_WIDTH: usize = 30;

/// Receiver of gauge values keyed by element id
///
/// Updates cannot fail from the caller's side; a sink that does I/O logs its
/// own errors.
pub trait DisplaySink {
    /// Set the value shown by the gauge `element_id`
    fn update(&mut self, element_id: &str, used: f64);
}

/// Scale and width of a text gauge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gauge {
    /// Value that fills the gauge completely
    pub total: f64,
    /// Bar width in characters
    pub width: usize,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            total: DEFAULT_GAUGE_TOTAL,
            width: DEFAULT_GAUGE_WIDTH,
        }
    }
}

impl Gauge {
    /// Create a new gauge
    pub fn new(total: f64, width: usize) -> Self {
        Self { total, width }
    }

    /// Fill level in percent, clamped to 0..=100
    pub fn percent(&self, used: f64) -> f64 {
        if !used.is_finite() || self.total <= 0.0 {
            return 0.0;
        }
        (used / self.total * 100.0).clamp(0.0, 100.0)
    }

    /// Render one gauge line
    pub fn render(&self, element_id: &str, used: f64) -> String {
        let percent = self.percent(used);
        let filled = ((percent / 100.0) * self.width as f64).round() as usize;
        let filled = filled.min(self.width);

        format!(
            "{} [{}{}] {:5.1}% ({})",
            element_id,
            "#".repeat(filled),
            "-".repeat(self.width - filled),
            percent,
            used
        )
    }
}

/// Gauge sink that writes rendered lines to a writer
#[derive(Debug)]
pub struct TerminalGauge<W: Write> {
    gauge: Gauge,
    writer: W,
    last: HashMap<String, f64>,
}

impl<W: Write> TerminalGauge<W> {
    /// Create a terminal gauge writing to `writer`
    pub fn new(gauge: Gauge, writer: W) -> Self {
        Self {
            gauge,
            writer,
            last: HashMap::new(),
        }
    }

    /// Last value shown for an element
    pub fn last_value(&self, element_id: &str) -> Option<f64> {
        self.last.get(element_id).copied()
    }
}

impl<W: Write> DisplaySink for TerminalGauge<W> {
    fn update(&mut self, element_id: &str, used: f64) {
        self.last.insert(element_id.to_string(), used);

        let line = self.gauge.render(element_id, used);
        let result = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush());
        if let Err(e) = result {
            warn!("Failed to draw gauge {}: {}", element_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_scales_and_clamps() {
        let gauge = Gauge::new(200.0, 10);
        assert_eq!(gauge.percent(50.0), 25.0);
        assert_eq!(gauge.percent(-5.0), 0.0);
        assert_eq!(gauge.percent(500.0), 100.0);
        assert_eq!(gauge.percent(f64::NAN), 0.0);
    }

    #[test]
    fn test_percent_with_zero_total() {
        let gauge = Gauge::new(0.0, 10);
        assert_eq!(gauge.percent(42.0), 0.0);
    }

    #[test]
    fn test_render_half_full() {
        let gauge = Gauge::new(100.0, 20);
        assert_eq!(
            gauge.render("MoistureMeter", 50.0),
            "MoistureMeter [##########----------]  50.0% (50)"
        );
    }

    #[test]
    fn test_render_overflow_fills_bar() {
        let gauge = Gauge::new(100.0, 4);
        assert_eq!(gauge.render("m", 629.0), "m [####] 100.0% (629)");
    }

    #[test]
    fn test_terminal_gauge_writes_line_per_update() {
        let mut buffer = Vec::new();
        let mut sink = TerminalGauge::new(Gauge::new(100.0, 10), &mut buffer);
        sink.update(DEFAULT_ELEMENT_ID, 42.0);
        sink.update(DEFAULT_ELEMENT_ID, 12.5);

        assert_eq!(sink.last_value(DEFAULT_ELEMENT_ID), Some(12.5));
        assert_eq!(sink.last_value("Other"), None);
        drop(sink);

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("(42)"));
        assert!(lines[1].ends_with("(12.5)"));
    }
}
