use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use chrono::{DateTime, TimeZone};
use serde::Serialize;
use tracing::warn;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::present::{Presentation, Surface, Target};
use crate::progress::Report;

const BAR_ROWS: [(Target, Target); 4] = [
    (Target::WeekBar, Target::WeekLabel),
    (Target::MonthBar, Target::MonthLabel),
    (Target::YearBar, Target::YearLabel),
    (Target::TotalBar, Target::TotalLabel),
];

/// Text surface: one row per metric with a label and a fixed-width bar.
#[derive(Debug, Clone)]
pub struct TerminalSurface {
    bar_width: usize,
    hidden: BTreeSet<Target>,
    widths: BTreeMap<Target, f64>,
    texts: BTreeMap<Target, String>,
    weekend: bool,
}

impl TerminalSurface {
    pub fn new(cfg: &Config) -> Self {
        let mut hidden = BTreeSet::new();
        for name in &cfg.hide {
            let targets = Target::matching(name);
            if targets.is_empty() {
                warn!(name = %name, "unknown target in hide list; ignoring");
            }
            hidden.extend(targets);
        }

        Self {
            bar_width: cfg.bar_width,
            hidden,
            widths: BTreeMap::new(),
            texts: BTreeMap::new(),
            weekend: false,
        }
    }

    /// Writes the rows and the milestone line. `ansi` enables color.
    #[tracing::instrument(skip(self, writer))]
    pub fn write_to<W: Write>(&self, mut writer: W, ansi: bool) -> anyhow::Result<()> {
        let label_width = BAR_ROWS
            .iter()
            .filter_map(|(_, label)| self.texts.get(label))
            .map(|text| UnicodeWidthStr::width(text.as_str()))
            .max()
            .unwrap_or(0);

        for (bar_target, label_target) in BAR_ROWS {
            let bar = self.widths.get(&bar_target);
            let label = self.texts.get(&label_target);
            if bar.is_none() && label.is_none() {
                continue;
            }

            let label = label.map(String::as_str).unwrap_or("");
            write!(writer, "{label}")?;

            if let Some(pct) = bar {
                let padding = label_width.saturating_sub(UnicodeWidthStr::width(label));
                let weekend = bar_target == Target::WeekBar && self.weekend;
                write!(
                    writer,
                    "{}  {}",
                    " ".repeat(padding),
                    self.draw_bar(*pct, weekend, ansi)
                )?;
            }
            writeln!(writer)?;
        }

        if let Some(text) = self.texts.get(&Target::MilestoneLabel) {
            writeln!(writer)?;
            writeln!(writer, "{text}")?;
        }

        Ok(())
    }

    fn draw_bar(&self, pct: f64, weekend: bool, ansi: bool) -> String {
        let filled = ((pct / 100.0) * self.bar_width as f64).round() as usize;
        let filled = filled.min(self.bar_width);
        let fill = "█".repeat(filled);
        let rest = "░".repeat(self.bar_width - filled);
        let code = if weekend { "35" } else { "32" };
        format!("[{}{rest}]", paint(&fill, code, ansi))
    }
}

impl Surface for TerminalSurface {
    fn set_width(&mut self, target: Target, percent: f64) -> bool {
        if self.hidden.contains(&target) {
            return false;
        }
        self.widths.insert(target, percent);
        true
    }

    fn set_text(&mut self, target: Target, text: &str) -> bool {
        if self.hidden.contains(&target) {
            return false;
        }
        self.texts.insert(target, text.to_string());
        true
    }

    fn set_weekend(&mut self, target: Target, on: bool) -> bool {
        if target != Target::WeekBar || self.hidden.contains(&target) {
            return false;
        }
        self.weekend = on;
        true
    }
}

fn paint(text: &str, code: &str, ansi: bool) -> String {
    if !ansi || text.is_empty() {
        return text.to_string();
    }
    format!("\x1b[{code}m{text}\x1b[0m")
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    now: String,
    report: &'a Report,
    presentation: &'a Presentation,
}

/// Pretty JSON of the instant, the report and the presentation.
#[tracing::instrument(skip_all)]
pub fn write_json<W: Write, Z: TimeZone>(
    mut writer: W,
    now: &DateTime<Z>,
    report: &Report,
    presentation: &Presentation,
) -> anyhow::Result<()>
where
    Z::Offset: std::fmt::Display,
{
    let out = JsonOutput {
        now: now.to_rfc3339(),
        report,
        presentation,
    };
    serde_json::to_writer_pretty(&mut writer, &out)?;
    writeln!(writer)?;
    Ok(())
}
