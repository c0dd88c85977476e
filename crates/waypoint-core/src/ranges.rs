use anyhow::anyhow;
use chrono::{DateTime, TimeZone};
use tracing::{debug, trace};

use crate::calendar::{days_between, parse_calendar_date};

/// Inclusive span from local midnight of the first day to the last millisecond of the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange<Z: TimeZone> {
    pub start: DateTime<Z>,
    pub end: DateTime<Z>,
}

impl<Z: TimeZone> DateRange<Z> {
    pub fn new(start: DateTime<Z>, end: DateTime<Z>) -> anyhow::Result<Self> {
        if start > end {
            return Err(anyhow!("range start {start:?} is after end {end:?}"));
        }
        Ok(Self { start, end })
    }

    pub fn from_literals(tz: &Z, start: &str, end: &str) -> anyhow::Result<Self> {
        let start = parse_calendar_date(tz, start, false)?;
        let end = parse_calendar_date(tz, end, true)?;
        Self::new(start, end)
    }

    pub fn contains(&self, instant: &DateTime<Z>) -> bool {
        self.start <= *instant && *instant <= self.end
    }

    pub fn length_days(&self) -> f64 {
        days_between(&self.start, &self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRange<Z: TimeZone> {
    pub label: String,
    pub range: DateRange<Z>,
}

/// Chronologically ordered, non-overlapping, non-empty.
#[derive(Debug, Clone)]
pub struct RangeTable<Z: TimeZone> {
    entries: Vec<NamedRange<Z>>,
}

impl<Z: TimeZone> RangeTable<Z> {
    pub fn new(entries: Vec<NamedRange<Z>>) -> anyhow::Result<Self> {
        if entries.is_empty() {
            return Err(anyhow!("range table must contain at least one range"));
        }

        for pair in entries.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.range.start <= prev.range.end {
                return Err(anyhow!(
                    "range {:?} must start after {:?} ends",
                    next.label,
                    prev.label
                ));
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[NamedRange<Z>] {
        &self.entries
    }

    /// Picks the entry containing `instant`. An instant in the gap between two
    /// entries belongs to the upcoming one; anything else falls back to the
    /// last entry.
    #[tracing::instrument(skip_all)]
    pub fn resolve(&self, instant: &DateTime<Z>) -> &NamedRange<Z> {
        if let Some(hit) = self.entries.iter().find(|e| e.range.contains(instant)) {
            trace!(label = %hit.label, "instant inside range");
            return hit;
        }

        for pair in self.entries.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.range.end < *instant && *instant < next.range.start {
                debug!(
                    after = %prev.label,
                    upcoming = %next.label,
                    "instant falls in gap; using upcoming range"
                );
                return next;
            }
        }

        let last = self.last();
        debug!(label = %last.label, "instant outside table; falling back to last range");
        last
    }

    fn last(&self) -> &NamedRange<Z> {
        // `new` rejects empty tables.
        &self.entries[self.entries.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::{Europe::Prague, Tz};

    use super::{DateRange, NamedRange, RangeTable};

    fn entry(label: &str, start: &str, end: &str) -> NamedRange<Tz> {
        NamedRange {
            label: label.to_string(),
            range: DateRange::from_literals(&Prague, start, end).expect("valid range"),
        }
    }

    fn table() -> RangeTable<Tz> {
        RangeTable::new(vec![
            entry("2023/24", "2023-09-04", "2024-06-30"),
            entry("2024/25", "2024-09-02", "2025-06-30"),
            entry("2025/26", "2025-09-01", "2026-06-30"),
        ])
        .expect("valid table")
    }

    #[test]
    fn resolves_containing_range() {
        let t = table();
        let now = Prague
            .with_ymd_and_hms(2024, 12, 10, 9, 0, 0)
            .single()
            .expect("valid");
        assert_eq!(t.resolve(&now).label, "2024/25");
    }

    #[test]
    fn boundaries_are_inclusive() {
        let t = table();
        let start = &t.entries()[1].range.start;
        let end = &t.entries()[1].range.end;
        assert_eq!(t.resolve(start).label, "2024/25");
        assert_eq!(t.resolve(end).label, "2024/25");
    }

    #[test]
    fn gap_resolves_to_upcoming_range() {
        let t = table();
        let summer = Prague
            .with_ymd_and_hms(2025, 7, 15, 12, 0, 0)
            .single()
            .expect("valid");
        assert_eq!(t.resolve(&summer).label, "2025/26");
    }

    #[test]
    fn outside_table_falls_back_to_last() {
        let t = table();
        let before = Prague
            .with_ymd_and_hms(2022, 1, 1, 0, 0, 0)
            .single()
            .expect("valid");
        let after = Prague
            .with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
            .single()
            .expect("valid");
        assert_eq!(t.resolve(&before).label, "2025/26");
        assert_eq!(t.resolve(&after).label, "2025/26");
    }

    #[test]
    fn rejects_overlap_and_empty() {
        assert!(RangeTable::<Tz>::new(vec![]).is_err());
        assert!(
            RangeTable::new(vec![
                entry("a", "2024-09-01", "2025-06-30"),
                entry("b", "2025-06-30", "2026-06-30"),
            ])
            .is_err()
        );
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(DateRange::from_literals(&Prague, "2026-06-30", "2025-09-01").is_err());
        // A single day is a valid range.
        assert!(DateRange::from_literals(&Prague, "2025-09-01", "2025-09-01").is_ok());
    }
}
