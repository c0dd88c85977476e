use serde::Serialize;
use tracing::debug;

use crate::config::Labels;
use crate::progress::Report;

/// Display targets a surface may offer. Any of them may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Target {
    WeekBar,
    WeekLabel,
    MonthBar,
    MonthLabel,
    YearBar,
    YearLabel,
    TotalBar,
    TotalLabel,
    MilestoneLabel,
}

impl Target {
    pub const ALL: [Target; 9] = [
        Target::WeekBar,
        Target::WeekLabel,
        Target::MonthBar,
        Target::MonthLabel,
        Target::YearBar,
        Target::YearLabel,
        Target::TotalBar,
        Target::TotalLabel,
        Target::MilestoneLabel,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Target::WeekBar => "week-progress",
            Target::WeekLabel => "week-label",
            Target::MonthBar => "month-progress",
            Target::MonthLabel => "month-label",
            Target::YearBar => "year-progress",
            Target::YearLabel => "year-label",
            Target::TotalBar => "total-progress",
            Target::TotalLabel => "total-label",
            Target::MilestoneLabel => "milestone-label",
        }
    }

    /// Metric the target belongs to, e.g. `week` for both week targets.
    pub fn group(self) -> &'static str {
        let id = self.id();
        id.split_once('-').map(|(group, _)| group).unwrap_or(id)
    }

    /// Targets named by `name`: either an exact id or a whole group.
    pub fn matching(name: &str) -> Vec<Target> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .filter(|t| t.id() == name || t.group() == name)
            .collect()
    }
}

/// Receives presentation writes. Each setter returns `false` when the surface
/// has no such target; the write is then dropped.
pub trait Surface {
    fn set_width(&mut self, target: Target, percent: f64) -> bool;
    fn set_text(&mut self, target: Target, text: &str) -> bool;
    fn set_weekend(&mut self, target: Target, on: bool) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarView {
    pub width: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Presentation {
    pub week: BarView,
    pub weekend: bool,
    pub month: BarView,
    pub year: BarView,
    pub total: BarView,
    pub milestone: String,
}

pub fn clamp_percent(pct: f64) -> f64 {
    pct.max(0.0).min(100.0)
}

pub fn percent_label(prefix: &str, pct: f64) -> String {
    format!("{prefix}: {}%", one_decimal(pct))
}

// Enough fractional digits for the exact expansion of any finite f64.
const EXACT_DIGITS: usize = 1100;

/// Rounds to one decimal on the exact binary value, with exact halves going
/// away from zero. `{:.1}` sends halves to even instead.
pub fn one_decimal(value: f64) -> String {
    if !value.is_finite() || value.abs() >= 1e15 {
        return format!("{value:.1}");
    }

    let exact = format!("{:.*}", EXACT_DIGITS, value.abs());
    let (whole, frac) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let Ok(whole) = whole.parse::<u64>() else {
        return format!("{value:.1}");
    };
    let digit = |i: usize| frac.as_bytes().get(i).map_or(0, |d| u64::from(d - b'0'));

    let mut tenths = whole * 10 + digit(0);
    if digit(1) >= 5 {
        tenths += 1;
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{}.{}", tenths / 10, tenths % 10)
}

pub fn milestone_message(days: i64, labels: &Labels) -> String {
    let template = if days >= 0 {
        &labels.milestone_remaining
    } else {
        &labels.milestone_elapsed
    };
    template.replace("{days}", &days.unsigned_abs().to_string())
}

fn bar(prefix: &str, pct: f64) -> BarView {
    let width = clamp_percent(pct);
    BarView {
        width,
        label: percent_label(prefix, width),
    }
}

impl Presentation {
    pub fn from_report(report: &Report, labels: &Labels) -> Self {
        let weekend = report.week.is_weekend();
        let mut week = bar(&labels.week, report.week.percent());
        if weekend {
            week.label = labels.weekend.clone();
        }

        Self {
            week,
            weekend,
            month: bar(&labels.month, report.month),
            year: bar(&labels.year, report.school_year.percent),
            total: bar(&labels.total, report.total),
            milestone: milestone_message(report.milestone_days, labels),
        }
    }

    /// Writes every value into `surface`. Missing targets are skipped without
    /// affecting the others; the number of skipped writes is returned.
    #[tracing::instrument(skip_all)]
    pub fn apply(&self, surface: &mut dyn Surface) -> usize {
        let mut skipped = 0;
        let mut record = |target: Target, applied: bool| {
            if !applied {
                debug!(target = target.id(), "render target missing; skipping");
                skipped += 1;
            }
        };

        let bars = [
            (Target::WeekBar, Target::WeekLabel, &self.week),
            (Target::MonthBar, Target::MonthLabel, &self.month),
            (Target::YearBar, Target::YearLabel, &self.year),
            (Target::TotalBar, Target::TotalLabel, &self.total),
        ];
        for (bar_target, label_target, view) in bars {
            record(bar_target, surface.set_width(bar_target, view.width));
            record(label_target, surface.set_text(label_target, &view.label));
        }

        record(
            Target::WeekBar,
            surface.set_weekend(Target::WeekBar, self.weekend),
        );
        record(
            Target::MilestoneLabel,
            surface.set_text(Target::MilestoneLabel, &self.milestone),
        );

        skipped
    }
}
