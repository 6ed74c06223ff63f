//! Schedule parsing: 5-field cron expressions plus the relative
//! (`+5m`, `+1h`) and absolute (`HH:MM`, ISO-8601) one-shot syntaxes.

use chrono::{Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

use wopr_core::Timestamp;

use crate::error::{CronError, CronResult};

/// How far into the future a recurring schedule's next fire time is
/// searched for before giving up. A job whose fields can never be
/// satisfied (e.g. day-of-month 31 in a month without one) would
/// otherwise search forever.
const MAX_LOOKAHEAD_MINUTES: i64 = 4 * 366 * 24 * 60;

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+(\d+)([smhd])$").expect("static pattern"))
}

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").expect("static pattern"))
}

/// One field of a 5-field cron expression: `*`, a comma list, a range, a
/// step, or any combination the grammar allows (`*/15`, `1-5`, `1,3,5`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Values(Vec<u32>),
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32) -> CronResult<Self> {
        if raw == "*" {
            return Ok(Field::Any);
        }
        let mut values = Vec::new();
        for part in raw.split(',') {
            values.extend(Self::parse_part(part, min, max)?);
        }
        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err(CronError::InvalidSchedule(format!("empty field: {raw}")));
        }
        Ok(Field::Values(values))
    }

    fn parse_part(part: &str, min: u32, max: u32) -> CronResult<Vec<u32>> {
        let (range_part, step) = match part.split_once('/') {
            Some((range, step)) => (
                range,
                step.parse::<u32>()
                    .map_err(|_| CronError::InvalidSchedule(format!("bad step: {part}")))?,
            ),
            None => (part, 1),
        };
        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let a: u32 = a.parse().map_err(|_| CronError::InvalidSchedule(format!("bad range: {part}")))?;
            let b: u32 = b.parse().map_err(|_| CronError::InvalidSchedule(format!("bad range: {part}")))?;
            (a, b)
        } else {
            let v: u32 = range_part.parse().map_err(|_| CronError::InvalidSchedule(format!("bad value: {part}")))?;
            (v, v)
        };
        if lo < min || hi > max || lo > hi || step == 0 {
            return Err(CronError::InvalidSchedule(format!("field out of range: {part}")));
        }
        Ok((lo..=hi).step_by(step as usize).collect())
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Values(values) => values.binary_search(&value).is_ok(),
        }
    }
}

/// A parsed schedule: either a recurring 5-field cron expression or a
/// one-shot fire time resolved at parse time.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// `minute hour day-of-month month day-of-week`, each 0-based per the
    /// usual cron convention (day-of-week 0 and 7 both mean Sunday).
    Cron { minute: Field, hour: Field, dom: Field, month: Field, dow: Field },
    /// A single fire time, resolved once from relative or absolute syntax.
    Once(Timestamp),
}

impl Schedule {
    /// Parse a schedule string. Relative (`+5m`) and `HH:MM` one-shot forms
    /// are resolved relative to `now`; a full ISO-8601 timestamp is taken
    /// literally.
    ///
    /// # Errors
    ///
    /// Returns [`CronError::InvalidSchedule`] if the string matches none of
    /// the supported grammars.
    pub fn parse(raw: &str, now: Timestamp) -> CronResult<Self> {
        let raw = raw.trim();

        if let Some(caps) = relative_re().captures(raw) {
            let amount: i64 = caps[1].parse().expect("regex guarantees digits");
            let duration = match &caps[2] {
                "s" => Duration::seconds(amount),
                "m" => Duration::minutes(amount),
                "h" => Duration::hours(amount),
                "d" => Duration::days(amount),
                _ => unreachable!("regex restricts the unit group"),
            };
            return Ok(Schedule::Once(now + duration));
        }

        if let Some(caps) = clock_re().captures(raw) {
            let hour: u32 = caps[1].parse().expect("regex guarantees digits");
            let minute: u32 = caps[2].parse().expect("regex guarantees digits");
            let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| CronError::InvalidSchedule(raw.to_string()))?;
            let today = now.date_naive().and_time(time);
            let candidate = Utc.from_utc_datetime(&today);
            let fire = if candidate > now { candidate } else { Utc.from_utc_datetime(&(today + Duration::days(1))) };
            return Ok(Schedule::Once(fire));
        }

        if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
            return Ok(Schedule::Once(parsed.with_timezone(&Utc)));
        }

        let fields: Vec<&str> = raw.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(CronError::InvalidSchedule(raw.to_string()));
        };
        Ok(Schedule::Cron {
            minute: Field::parse(minute, 0, 59)?,
            hour: Field::parse(hour, 0, 23)?,
            dom: Field::parse(dom, 1, 31)?,
            month: Field::parse(month, 1, 12)?,
            dow: Field::parse(dow, 0, 7)?,
        })
    }

    /// The next fire time strictly after `after`, or `None` if a recurring
    /// schedule's fields can never be satisfied within the lookahead window,
    /// or a one-shot schedule has already fired.
    #[must_use]
    pub fn next_fire_after(&self, after: Timestamp) -> Option<Timestamp> {
        match self {
            Schedule::Once(at) => (*at > after).then_some(*at),
            Schedule::Cron { minute, hour, dom, month, dow } => {
                let mut candidate = (after + Duration::minutes(1)).with_second(0).and_then(|t| t.with_nanosecond(0))?;
                for _ in 0..MAX_LOOKAHEAD_MINUTES {
                    let dow_value = candidate.weekday().num_days_from_sunday();
                    if month.matches(candidate.month())
                        && dom.matches(candidate.day())
                        && hour.matches(candidate.hour())
                        && minute.matches(candidate.minute())
                        && (dow.matches(dow_value) || dow.matches(7) && dow_value == 0)
                    {
                        return Some(candidate);
                    }
                    candidate += Duration::minutes(1);
                }
                None
            }
        }
    }

    /// Whether this schedule is a one-shot (as opposed to recurring).
    #[must_use]
    pub fn is_once(&self) -> bool {
        matches!(self, Schedule::Once(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Timestamp {
        chrono::DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn wildcard_fires_every_minute() {
        let schedule = Schedule::parse("* * * * *", t("2026-01-01T00:00:00Z")).unwrap();
        let next = schedule.next_fire_after(t("2026-01-01T00:00:00Z")).unwrap();
        assert_eq!(next, t("2026-01-01T00:01:00Z"));
    }

    #[test]
    fn nightly_job_fires_at_two_am() {
        let schedule = Schedule::parse("0 2 * * *", t("2026-01-01T00:00:00Z")).unwrap();
        let next = schedule.next_fire_after(t("2026-01-01T00:00:00Z")).unwrap();
        assert_eq!(next, t("2026-01-01T02:00:00Z"));
        let again = schedule.next_fire_after(next).unwrap();
        assert_eq!(again, t("2026-01-02T02:00:00Z"));
    }

    #[test]
    fn step_field_fires_every_fifteen_minutes() {
        let schedule = Schedule::parse("*/15 * * * *", t("2026-01-01T00:00:00Z")).unwrap();
        let next = schedule.next_fire_after(t("2026-01-01T00:01:00Z")).unwrap();
        assert_eq!(next, t("2026-01-01T00:15:00Z"));
    }

    #[test]
    fn relative_schedule_resolves_once() {
        let now = t("2026-01-01T00:00:00Z");
        let schedule = Schedule::parse("+5m", now).unwrap();
        assert!(schedule.is_once());
        assert_eq!(schedule.next_fire_after(now), Some(t("2026-01-01T00:05:00Z")));
        assert_eq!(schedule.next_fire_after(t("2026-01-01T00:05:00Z")), None);
    }

    #[test]
    fn clock_schedule_rolls_to_tomorrow_if_passed() {
        let now = t("2026-01-01T12:00:00Z");
        let schedule = Schedule::parse("06:30", now).unwrap();
        assert_eq!(schedule.next_fire_after(now), Some(t("2026-01-02T06:30:00Z")));
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        assert!(Schedule::parse("not a schedule", Utc::now()).is_err());
        assert!(Schedule::parse("* * * *", Utc::now()).is_err());
    }
}
