use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  TimeZone,
  Weekday
};
use serde::Serialize;
use tracing::debug;

use crate::calendar::{
  clamp01,
  days_between,
  days_in_month,
  end_of_day,
  first_weekday_of_month,
  fraction_of_day_elapsed
};
use crate::ranges::{
  DateRange,
  RangeTable
};

const WORKDAYS_PER_WEEK: f64 = 5.0;

/// Position inside the Monday..Friday
/// cycle. Weekends are not a position,
/// they are their own state.
#[derive(
  Debug, Clone, Copy, PartialEq, Serialize,
)]
#[serde(
  tag = "state",
  rename_all = "lowercase"
)]
pub enum WeekProgress {
  Workday { index: u32, percent: f64 },
  Weekend
}

impl WeekProgress {
  #[must_use]
  pub fn percent(&self) -> f64 {
    match self {
      | Self::Workday {
        percent, ..
      } => *percent,
      | Self::Weekend => 100.0
    }
  }

  #[must_use]
  pub fn is_weekend(&self) -> bool {
    matches!(self, Self::Weekend)
  }
}

/// The countdown target: end of day on
/// the first given weekday of a month.
#[derive(Debug, Clone)]
pub struct Milestone<Z: TimeZone> {
  pub at: DateTime<Z>
}

impl<Z: TimeZone> Milestone<Z> {
  pub fn first_weekday_of(
    tz: &Z,
    year: i32,
    month: u32,
    weekday: Weekday
  ) -> anyhow::Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(anyhow!(
        "milestone month must be \
         1-12, got {month}"
      ));
    }
    let midnight =
      first_weekday_of_month(
        tz,
        year,
        month - 1,
        weekday
      )?;
    let at = end_of_day(
      tz,
      midnight.date_naive()
    )?;
    Ok(Self { at })
  }

  /// Whole days until the milestone,
  /// rounded up. Negative once it has
  /// passed.
  #[must_use]
  pub fn days_until(
    &self,
    now: &DateTime<Z>
  ) -> i64 {
    days_between(now, &self.at).ceil()
      as i64
  }
}

/// Everything a computation pass
/// needs besides the current instant.
#[derive(Debug, Clone)]
pub struct Schedule<Z: TimeZone> {
  pub school_years: RangeTable<Z>,
  pub program:      DateRange<Z>,
  pub milestone:    Milestone<Z>
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
pub struct RangeProgress {
  pub label:   String,
  pub percent: f64
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
pub struct Report {
  pub week:           WeekProgress,
  pub month:          f64,
  pub school_year:    RangeProgress,
  pub total:          f64,
  pub milestone_days: i64
}

#[must_use]
pub fn week_progress<Z: TimeZone>(
  now: &DateTime<Z>
) -> WeekProgress {
  let index = match now.weekday() {
    | Weekday::Mon => 0,
    | Weekday::Tue => 1,
    | Weekday::Wed => 2,
    | Weekday::Thu => 3,
    | Weekday::Fri => 4,
    | Weekday::Sat | Weekday::Sun => {
      return WeekProgress::Weekend;
    }
  };

  let fraction =
    fraction_of_day_elapsed(now);
  WeekProgress::Workday {
    index,
    percent: (f64::from(index)
      + fraction)
      / WORKDAYS_PER_WEEK
      * 100.0
  }
}

pub fn month_progress<Z: TimeZone>(
  now: &DateTime<Z>
) -> anyhow::Result<f64> {
  let days = days_in_month(
    now.year(),
    now.month()
  )
  .ok_or_else(|| {
    anyhow!(
      "cannot size month {}-{}",
      now.year(),
      now.month()
    )
  })?;

  let elapsed = f64::from(now.day() - 1)
    + fraction_of_day_elapsed(now);
  Ok(elapsed / f64::from(days) * 100.0)
}

/// Elapsed share of `range`, clamped so
/// instants before the start read 0 and
/// after the end read 100.
#[must_use]
pub fn range_progress<Z: TimeZone>(
  now: &DateTime<Z>,
  range: &DateRange<Z>
) -> f64 {
  let passed =
    days_between(&range.start, now);
  clamp01(passed / range.length_days())
    * 100.0
}

#[tracing::instrument(skip_all)]
pub fn compute<Z: TimeZone>(
  now: &DateTime<Z>,
  schedule: &Schedule<Z>
) -> anyhow::Result<Report> {
  let week = week_progress(now);
  let month = month_progress(now)?;

  let school =
    schedule.school_years.resolve(now);
  let school_year = RangeProgress {
    label:   school.label.clone(),
    percent: range_progress(
      now,
      &school.range
    )
  };

  let total =
    range_progress(now, &schedule.program);
  let milestone_days =
    schedule.milestone.days_until(now);

  debug!(
    week = week.percent(),
    weekend = week.is_weekend(),
    month,
    school_year = school_year.percent,
    school_label = %school_year.label,
    total,
    milestone_days,
    "computed progress"
  );

  Ok(Report {
    week,
    month,
    school_year,
    total,
    milestone_days
  })
}
