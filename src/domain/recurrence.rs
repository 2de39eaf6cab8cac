//! Recurrence rules and their expansion into concrete occurrences
//!
//! A rule is a deterministic wall-clock pattern evaluated in an IANA
//! timezone, an extent bounding how far it runs, and per-occurrence
//! overrides keyed by the nominal (unrecurred) instant. Expansion is
//! DST-aware: wall times that do not exist on a given day are skipped, and
//! ambiguous ones resolve to the earlier instant.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Wall-clock calendar pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    /// Every day at the given wall time
    Daily { at: NaiveTime },
    /// Every week on the given weekday at the given wall time
    Weekly { weekday: Weekday, at: NaiveTime },
    /// Every month on the given day-of-month at the given wall time
    ///
    /// Months without that day (e.g. the 31st in February) simply produce
    /// no occurrence.
    Monthly { day: u32, at: NaiveTime },
}

impl RecurrencePattern {
    fn matches(&self, date: chrono::NaiveDate) -> bool {
        match self {
            RecurrencePattern::Daily { .. } => true,
            RecurrencePattern::Weekly { weekday, .. } => date.weekday() == *weekday,
            RecurrencePattern::Monthly { day, .. } => date.day() == *day,
        }
    }

    fn wall_time(&self) -> NaiveTime {
        match self {
            RecurrencePattern::Daily { at }
            | RecurrencePattern::Weekly { at, .. }
            | RecurrencePattern::Monthly { at, .. } => *at,
        }
    }
}

/// How far a recurrence runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extent {
    #[default]
    Indefinite,
    /// Enumeration stops past this instant (inclusive)
    Until(DateTime<Utc>),
}

/// Per-occurrence exception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceOverride {
    /// Drop the occurrence
    Skip,
    /// Relocate the occurrence to the given instant
    Shift(DateTime<Utc>),
}

/// An override addressed by the nominal occurrence instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub occurrence: DateTime<Utc>,
    pub action: OccurrenceOverride,
}

/// A recurrence rule attached to a Step or inherited from a Goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,

    /// Timezone the pattern's wall times are read in; falls back to the
    /// configured default timezone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<Tz>,

    #[serde(default)]
    pub extent: Extent,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<OverrideEntry>,
}

impl RecurrenceRule {
    /// Creates a rule with no overrides running indefinitely
    pub fn new(pattern: RecurrencePattern) -> Self {
        Self {
            pattern,
            tz: None,
            extent: Extent::Indefinite,
            overrides: Vec::new(),
        }
    }

    fn override_for(&self, nominal: DateTime<Utc>) -> Option<OccurrenceOverride> {
        self.overrides
            .iter()
            .find(|e| e.occurrence == nominal)
            .map(|e| e.action)
    }

    /// Expands the rule into occurrences within `[start, end)`
    ///
    /// Occurrence keys derive from the nominal instants, so re-expanding
    /// the same rule over the same horizon yields identical keys and
    /// overrides stay addressable.
    pub fn expand_within(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        default_tz: Tz,
    ) -> Vec<Occurrence> {
        let tz = self.tz.unwrap_or(default_tz);
        let mut out = Vec::new();

        for nominal in enumerate_pattern(&self.pattern, tz, start, end) {
            if let Extent::Until(until) = self.extent {
                if nominal > until {
                    continue;
                }
            }
            match self.override_for(nominal) {
                Some(OccurrenceOverride::Skip) => continue,
                Some(OccurrenceOverride::Shift(target)) => {
                    if target < start || target >= end {
                        tracing::warn!(%nominal, %target, "shifted occurrence leaves the horizon, dropping");
                        continue;
                    }
                    out.push(Occurrence {
                        nominal,
                        instant: target,
                    });
                }
                None => out.push(Occurrence {
                    nominal,
                    instant: nominal,
                }),
            }
        }

        out.sort_by_key(|o| (o.instant, o.nominal));
        out
    }
}

/// One concrete expansion of a recurrence rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    /// The unrecurred instant the occurrence key derives from
    pub nominal: DateTime<Utc>,
    /// Where the occurrence actually lands after overrides
    pub instant: DateTime<Utc>,
}

/// Enumerates nominal instants of `pattern` with `from <= t < to`
pub(crate) fn enumerate_pattern(
    pattern: &RecurrencePattern,
    tz: Tz,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut date = from.with_timezone(&tz).date_naive();
    let last = to.with_timezone(&tz).date_naive();

    while date <= last {
        if pattern.matches(date) {
            let naive = date.and_time(pattern.wall_time());
            // Skipped-over wall times (spring-forward gap) have no instant.
            if let Some(instant) = tz.from_local_datetime(&naive).earliest() {
                let utc = instant.with_timezone(&Utc);
                if utc >= from && utc < to {
                    out.push(utc);
                }
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    out
}
