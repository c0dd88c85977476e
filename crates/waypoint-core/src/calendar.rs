use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Timelike,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

const MILLIS_PER_DAY: f64 =
  86_400_000.0;

#[must_use]
pub fn clamp01(x: f64) -> f64 {
  x.max(0.0).min(1.0)
}

/// Signed distance from `a` to `b` in
/// fractional days, from the exact
/// millisecond difference.
#[must_use]
pub fn days_between<Z: TimeZone>(
  a: &DateTime<Z>,
  b: &DateTime<Z>
) -> f64 {
  let millis = b.timestamp_millis()
    - a.timestamp_millis();
  millis as f64 / MILLIS_PER_DAY
}

/// Hours and minutes of the local
/// wall-clock time as a fraction of a
/// day. Seconds are ignored.
#[must_use]
pub fn fraction_of_day_elapsed<
  Z: TimeZone
>(
  instant: &DateTime<Z>
) -> f64 {
  f64::from(instant.hour()) / 24.0
    + f64::from(instant.minute())
      / 1440.0
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> Option<u32> {
  let (next_year, next_month) =
    if month == 12 {
      (year.checked_add(1)?, 1)
    } else {
      (year, month + 1)
    };
  NaiveDate::from_ymd_opt(
    next_year, next_month, 1
  )?
  .pred_opt()
  .map(|last| last.day())
}

pub fn start_of_day<Z: TimeZone>(
  tz: &Z,
  date: NaiveDate
) -> anyhow::Result<DateTime<Z>> {
  from_local(
    tz,
    date.and_time(NaiveTime::MIN),
    "start-of-day"
  )
}

pub fn end_of_day<Z: TimeZone>(
  tz: &Z,
  date: NaiveDate
) -> anyhow::Result<DateTime<Z>> {
  let last = NaiveTime::from_hms_milli_opt(
    23, 59, 59, 999
  )
  .ok_or_else(|| {
    anyhow!(
      "failed to construct end of \
       day time"
    )
  })?;
  from_local(
    tz,
    date.and_time(last),
    "end-of-day"
  )
}

/// Parses a `YYYY-MM-DD` literal into
/// local midnight, or into
/// 23:59:59.999 when `end_of_day` is
/// set.
pub fn parse_calendar_date<
  Z: TimeZone
>(
  tz: &Z,
  literal: &str,
  end_of_day: bool
) -> anyhow::Result<DateTime<Z>> {
  let date = NaiveDate::parse_from_str(
    literal.trim(),
    "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "invalid calendar date \
       {literal:?}, expected \
       YYYY-MM-DD"
    )
  })?;

  if end_of_day {
    self::end_of_day(tz, date)
  } else {
    start_of_day(tz, date)
  }
}

/// Local midnight of the first
/// `target` weekday on or after day 1
/// of the month. `month_index` is
/// zero-based.
pub fn first_weekday_of_month<
  Z: TimeZone
>(
  tz: &Z,
  year: i32,
  month_index: u32,
  target: Weekday
) -> anyhow::Result<DateTime<Z>> {
  let first = NaiveDate::from_ymd_opt(
    year,
    month_index + 1,
    1
  )
  .ok_or_else(|| {
    anyhow!(
      "invalid year/month: \
       {year}/{month_index}"
    )
  })?;

  let first_idx = i64::from(
    first
      .weekday()
      .num_days_from_monday()
  );
  let target_idx = i64::from(
    target.num_days_from_monday()
  );
  let offset =
    (target_idx - first_idx + 7) % 7;

  let date = first
    .checked_add_signed(Duration::days(
      offset
    ))
    .ok_or_else(|| {
      anyhow!(
        "date overflow locating \
         weekday"
      )
    })?;
  start_of_day(tz, date)
}

pub fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> anyhow::Result<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "timezone from {source} was \
       empty"
    ));
  }

  let tz =
    trimmed.parse::<Tz>().map_err(
      |err| {
        anyhow!(
          "invalid timezone id \
           {trimmed:?} from \
           {source}: {err}"
        )
      }
    )?;
  tracing::info!(
    source,
    timezone = %trimmed,
    "configured timezone"
  );
  Ok(tz)
}

// Longest wall-clock gap searched past a nonexistent local time.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Maps a local wall-clock time to an
/// instant. A folded time takes the
/// earlier instant; a time skipped by
/// a forward shift moves to the first
/// valid minute after the gap.
fn from_local<Z: TimeZone>(
  tz: &Z,
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Z>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      return Ok(local_dt);
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        local = %local_naive,
        "ambiguous local datetime; using earliest"
      );
      return Ok(earliest(first, second));
    }
    | LocalResult::None => {}
  }

  for minutes in 1..=MAX_GAP_MINUTES {
    let candidate = local_naive
      + Duration::minutes(minutes);
    let resolved = match tz
      .from_local_datetime(&candidate)
    {
      | LocalResult::Single(dt) => dt,
      | LocalResult::Ambiguous(
        first,
        second
      ) => earliest(first, second),
      | LocalResult::None => continue
    };
    tracing::warn!(
      context,
      local = %local_naive,
      shifted = %candidate,
      "local datetime skipped by a clock change; using first valid time after it"
    );
    return Ok(resolved);
  }

  Err(anyhow!(
    "local datetime {local_naive} \
     does not exist in the \
     configured timezone: \
     {context}"
  ))
}

fn earliest<Z: TimeZone>(
  first: DateTime<Z>,
  second: DateTime<Z>
) -> DateTime<Z> {
  if first <= second {
    first
  } else {
    second
  }
}

/// Resolves a `--now` expression
/// against the real current instant.
#[tracing::instrument(skip(tz, now), fields(input = input))]
pub fn parse_instant<Z: TimeZone>(
  tz: &Z,
  input: &str,
  now: DateTime<Z>
) -> anyhow::Result<DateTime<Z>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  let today = now.date_naive();
  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return start_of_day(tz, today);
    }
    | "tomorrow" => {
      let date =
        today.succ_opt().ok_or_else(
          || anyhow!("date overflow")
        )?;
      return start_of_day(tz, date);
    }
    | "yesterday" => {
      let date =
        today.pred_opt().ok_or_else(
          || anyhow!("date overflow")
        )?;
      return start_of_day(tz, date);
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let num: i64 = caps["num"]
      .parse()
      .context(
        "invalid relative number"
      )?;
    let duration = match &caps["unit"]
    {
      | "d" => Duration::days(num),
      | "h" => Duration::hours(num),
      | "m" => Duration::minutes(num),
      | unit => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    };

    return Ok(
      if &caps["sign"] == "-" {
        now - duration
      } else {
        now + duration
      }
    );
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(tz));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return start_of_day(tz, date);
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return from_local(tz, ndt, fmt);
    }
  }

  Err(anyhow!(
    "unrecognized instant \
     expression: {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     +Nd/-Nh/+Nm, RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM"
  })
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Timelike,
    Weekday
  };
  use chrono_tz::Europe::Prague;

  use super::{
    clamp01,
    days_between,
    days_in_month,
    first_weekday_of_month,
    fraction_of_day_elapsed,
    parse_calendar_date,
    parse_instant
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn clamps_to_unit_interval() {
    assert_eq!(clamp01(-0.5), 0.0);
    assert_eq!(clamp01(0.25), 0.25);
    assert_eq!(clamp01(1.7), 1.0);
  }

  #[test]
  fn parses_start_and_end_of_day() {
    let start = parse_calendar_date(
      &Prague,
      "2025-09-01",
      false
    )
    .expect("parse start");
    assert_eq!(start.date_naive(), ymd(2025, 9, 1));
    assert_eq!(
      start.time(),
      chrono::NaiveTime::MIN
    );

    let end = parse_calendar_date(
      &Prague,
      "2026-06-30",
      true
    )
    .expect("parse end");
    assert_eq!(end.date_naive(), ymd(2026, 6, 30));
    assert_eq!(
      (end.hour(), end.minute(), end.second()),
      (23, 59, 59)
    );
    assert_eq!(
      end.timestamp_subsec_millis(),
      999
    );
  }

  #[test]
  fn rejects_malformed_literal() {
    let err = parse_calendar_date(
      &Prague,
      "2025-13-01",
      false
    )
    .expect_err("month 13 is invalid");
    assert!(
      format!("{err:#}")
        .contains("2025-13-01")
    );
  }

  #[test]
  fn days_between_is_signed_and_fractional()
  {
    let a = Prague
      .with_ymd_and_hms(
        2025, 10, 1, 0, 0, 0
      )
      .single()
      .expect("valid a");
    let b = Prague
      .with_ymd_and_hms(
        2025, 10, 2, 12, 0, 0
      )
      .single()
      .expect("valid b");
    assert_eq!(days_between(&a, &b), 1.5);
    assert_eq!(
      days_between(&b, &a),
      -1.5
    );
  }

  #[test]
  fn days_between_follows_dst_shift() {
    let before = parse_calendar_date(
      &Prague,
      "2025-03-30",
      false
    )
    .expect("parse");
    let after = parse_calendar_date(
      &Prague,
      "2025-03-31",
      false
    )
    .expect("parse");
    let days =
      days_between(&before, &after);
    assert!(
      (days - 23.0 / 24.0).abs() < 1e-12
    );
  }

  #[test]
  fn midnight_in_dst_gap_moves_forward() {
    use chrono_tz::America::Santiago;

    // Santiago skips 2024-09-08 00:00..01:00.
    let range =
      crate::ranges::DateRange::from_literals(
        &Santiago,
        "2024-09-08",
        "2025-06-30"
      )
      .expect("gap midnight resolves");
    assert_eq!(
      range.start.date_naive(),
      ymd(2024, 9, 8)
    );
    assert_eq!(
      (range.start.hour(), range.start.minute()),
      (1, 0)
    );

    let day_before = parse_calendar_date(
      &Santiago,
      "2024-09-07",
      true
    )
    .expect("end of previous day");
    assert!(
      days_between(&day_before, &range.start)
        < 1e-6
    );
  }

  #[test]
  fn finds_first_monday() {
    let may = first_weekday_of_month(
      &Prague,
      2027,
      4,
      Weekday::Mon
    )
    .expect("first monday");
    assert_eq!(may.date_naive(), ymd(2027, 5, 3));
    assert_eq!(
      may.time(),
      chrono::NaiveTime::MIN
    );

    // September 2025 starts on a Monday.
    let sep = first_weekday_of_month(
      &Prague,
      2025,
      8,
      Weekday::Mon
    )
    .expect("first monday");
    assert_eq!(sep.date_naive(), ymd(2025, 9, 1));
  }

  #[test]
  fn counts_days_in_month() {
    assert_eq!(days_in_month(2024, 2), Some(29));
    assert_eq!(days_in_month(2025, 2), Some(28));
    assert_eq!(days_in_month(2025, 12), Some(31));
    assert_eq!(days_in_month(2025, 4), Some(30));
    assert_eq!(days_in_month(2025, 13), None);
  }

  #[test]
  fn fraction_ignores_seconds() {
    let t = Prague
      .with_ymd_and_hms(
        2025, 10, 1, 18, 30, 59
      )
      .single()
      .expect("valid");
    let expected =
      18.0 / 24.0 + 30.0 / 1440.0;
    assert!(
      (fraction_of_day_elapsed(&t)
        - expected)
        .abs()
        < 1e-12
    );
  }

  #[test]
  fn parses_instant_expressions() {
    let now = Prague
      .with_ymd_and_hms(
        2025, 10, 1, 15, 45, 0
      )
      .single()
      .expect("valid now");

    let today =
      parse_instant(&Prague, "today", now)
        .expect("today");
    assert_eq!(today.date_naive(), ymd(2025, 10, 1));
    assert_eq!(today.hour(), 0);

    let back =
      parse_instant(&Prague, "-2d", now)
        .expect("relative");
    assert_eq!(back.date_naive(), ymd(2025, 9, 29));
    assert_eq!(back.hour(), 15);

    let explicit = parse_instant(
      &Prague,
      "2026-01-05 08:15",
      now
    )
    .expect("explicit");
    assert_eq!(explicit.date_naive(), ymd(2026, 1, 5));
    assert_eq!(
      (explicit.hour(), explicit.minute()),
      (8, 15)
    );

    assert!(
      parse_instant(&Prague, "soon", now)
        .is_err()
    );
  }
}
