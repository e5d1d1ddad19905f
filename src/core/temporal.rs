// LogStitch - core/temporal.rs
//
// Timestamp assembly from the temporal fragments captured on one line.
//
// The accumulator starts at the Unix epoch seen from the target zone and
// each fragment overwrites the component it targets. Components are only
// combined into an instant in `finish`, so fragments may arrive in any order
// and an impossible date is reported once, with all components known.

use crate::core::capture::{split_offset, TemporalGroup, TemporalTarget, TimeUnit};
use crate::util::error::{ConfigError, TemporalError};
use chrono::{
    DateTime, Datelike, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, TimeDelta, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Target zone
// =============================================================================

/// The zone in which timestamps without an explicit offset are interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetZone {
    Utc,
    /// The system zone of the running process.
    Local,
    Fixed(FixedOffset),
    Named(Tz),
}

impl Default for TargetZone {
    fn default() -> Self {
        TargetZone::Utc
    }
}

impl TargetZone {
    /// Offset in force at the given UTC instant.
    pub fn offset_at_utc(&self, utc: &NaiveDateTime) -> FixedOffset {
        match self {
            TargetZone::Utc => Utc.fix(),
            TargetZone::Local => Local.offset_from_utc_datetime(utc).fix(),
            TargetZone::Fixed(offset) => *offset,
            TargetZone::Named(tz) => tz.offset_from_utc_datetime(utc).fix(),
        }
    }

    /// Interpret a wall-clock time in this zone.
    ///
    /// Ambiguous times (clocks set back) take the earliest instant. Times in
    /// a gap (clocks set forward) are moved forward by the length of the gap.
    pub fn resolve(&self, local: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            TargetZone::Utc => resolve_in(&Utc, local),
            TargetZone::Local => resolve_in(&Local, local),
            TargetZone::Fixed(offset) => resolve_in(offset, local),
            TargetZone::Named(tz) => resolve_in(tz, local),
        }
    }
}

fn resolve_in<Z: TimeZone>(zone: &Z, local: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    let offset = match zone.offset_from_local_datetime(local) {
        LocalResult::Single(offset) => offset.fix(),
        LocalResult::Ambiguous(earliest, _) => earliest.fix(),
        LocalResult::None => {
            // Use the offset from before the transition, then report the
            // instant with the offset in force afterwards.
            let day_before = local.checked_sub_signed(TimeDelta::days(1))?;
            let before = zone.offset_from_utc_datetime(&day_before).fix();
            let utc = local.checked_sub_signed(TimeDelta::seconds(i64::from(
                before.local_minus_utc(),
            )))?;
            let after = zone.offset_from_utc_datetime(&utc).fix();
            return Some(after.from_utc_datetime(&utc));
        }
    };
    offset.from_local_datetime(local).single()
}

impl fmt::Display for TargetZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetZone::Utc => f.write_str("UTC"),
            TargetZone::Local => f.write_str("local"),
            TargetZone::Fixed(offset) => write!(f, "{offset}"),
            TargetZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl FromStr for TargetZone {
    type Err = ConfigError;

    /// `UTC` / `Z`, `local`, a fixed offset (`+02:00`, `-0530`, `+01`) or an
    /// IANA name such as `Europe/Paris`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(TargetZone::Utc);
        }
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(TargetZone::Local);
        }
        if trimmed.starts_with(['+', '-']) {
            let invalid = || ConfigError::InvalidZone {
                zone: trimmed.to_string(),
                reason: "expected an offset like +02:00, -0530 or +01".to_string(),
            };
            let (sign, hours, minutes) = split_offset(trimmed).ok_or_else(invalid)?;
            if minutes >= 60 {
                return Err(invalid());
            }
            let seconds = sign * (hours * 3600 + minutes * 60);
            let offset = i32::try_from(seconds)
                .ok()
                .and_then(FixedOffset::east_opt)
                .ok_or_else(invalid)?;
            return Ok(TargetZone::Fixed(offset));
        }
        trimmed
            .parse::<Tz>()
            .map(TargetZone::Named)
            .map_err(|e| ConfigError::InvalidZone {
                zone: trimmed.to_string(),
                reason: e.to_string(),
            })
    }
}

// =============================================================================
// Accumulator
// =============================================================================

/// Mutable timestamp components for one line.
#[derive(Debug, Clone)]
pub struct TimestampAccumulator {
    zone: TargetZone,
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    nano: u32,
    leap_second: bool,
    offset: Option<FixedOffset>,
    saw_elapsed: bool,
    saw_time_of_day: bool,
}

impl TimestampAccumulator {
    /// Start at 1970-01-01T00:00:00Z as seen from `zone`.
    pub fn new(zone: TargetZone) -> Self {
        let mut acc = Self {
            zone,
            year: 1970,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            nano: 0,
            leap_second: false,
            offset: None,
            saw_elapsed: false,
            saw_time_of_day: false,
        };
        acc.set_instant(&DateTime::UNIX_EPOCH.naive_utc());
        acc
    }

    /// Convert `raw` with the group's transform and write it to the group's
    /// target. Blank text is ignored.
    pub fn apply(&mut self, group: TemporalGroup, raw: &str) -> Result<(), TemporalError> {
        if raw.trim().is_empty() {
            return Ok(());
        }

        if group.is_elapsed() {
            if self.saw_time_of_day {
                return Err(TemporalError::MixedElapsedAndCalendar);
            }
            self.saw_elapsed = true;
        } else if group.is_time_of_day() {
            if self.saw_elapsed {
                return Err(TemporalError::MixedElapsedAndCalendar);
            }
            self.saw_time_of_day = true;
        }

        let value = (group.transform())(raw)?;
        let name = group.name();

        match group.target() {
            TemporalTarget::Year => {
                let min = i64::from(NaiveDate::MIN.year());
                let max = i64::from(NaiveDate::MAX.year());
                self.year = in_range(name, value, min, max)? as i32;
            }
            TemporalTarget::Month => self.month = in_range(name, value, 1, 12)? as u32,
            TemporalTarget::Day => self.day = in_range(name, value, 1, 31)? as u32,
            TemporalTarget::Hour => self.hour = in_range(name, value, 0, 23)? as u32,
            TemporalTarget::Minute => self.minute = in_range(name, value, 0, 59)? as u32,
            TemporalTarget::Second => {
                let second = in_range(name, value, 0, 60)? as u32;
                // 60 is stored as 59 plus a leap nanosecond offset.
                self.leap_second = second == 60;
                self.second = second.min(59);
            }
            TemporalTarget::MilliOfSecond => {
                self.nano = in_range(name, value, 0, 999)? as u32 * 1_000_000;
            }
            TemporalTarget::NanoOfSecond => {
                self.nano = in_range(name, value, 0, 999_999_999)? as u32;
            }
            TemporalTarget::Offset => {
                let offset = i32::try_from(value)
                    .ok()
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| TemporalError::InvalidOffset {
                        raw: raw.trim().to_string(),
                    })?;
                self.offset = Some(offset);
            }
            TemporalTarget::Epoch(unit) => {
                let instant = match unit {
                    TimeUnit::Seconds => DateTime::from_timestamp(value, 0),
                    TimeUnit::Millis => DateTime::from_timestamp_millis(value),
                    TimeUnit::Micros => DateTime::from_timestamp_micros(value),
                    TimeUnit::Nanos => Some(DateTime::from_timestamp_nanos(value)),
                }
                .ok_or(TemporalError::Overflow { group: name, value })?;
                let nano = self.nano;
                self.set_instant(&instant.naive_utc());
                self.offset = None;
                // Whole seconds leave an earlier fraction in place.
                if unit == TimeUnit::Seconds {
                    self.nano = nano;
                }
            }
            TemporalTarget::Elapsed(unit) => {
                let elapsed = match unit {
                    TimeUnit::Seconds => TimeDelta::try_seconds(value),
                    TimeUnit::Millis => TimeDelta::try_milliseconds(value),
                    TimeUnit::Micros => Some(TimeDelta::microseconds(value)),
                    TimeUnit::Nanos => Some(TimeDelta::nanoseconds(value)),
                }
                .ok_or(TemporalError::Overflow { group: name, value })?;
                let midnight = self.date()?.and_time(NaiveTime::MIN);
                let moment = midnight
                    .checked_add_signed(elapsed)
                    .ok_or(TemporalError::Overflow { group: name, value })?;
                let nano = self.nano;
                self.set_local(&moment);
                if unit == TimeUnit::Seconds {
                    self.nano = nano;
                }
            }
        }
        Ok(())
    }

    /// Combine the components into an instant.
    pub fn finish(self) -> Result<DateTime<FixedOffset>, TemporalError> {
        let date = self.date()?;
        let nano = if self.leap_second {
            self.nano + 1_000_000_000
        } else {
            self.nano
        };
        let time = NaiveTime::from_hms_nano_opt(self.hour, self.minute, self.second, nano)
            .ok_or(TemporalError::OutOfRange {
                group: "SECOND",
                value: 60,
                min: 0,
                max: 59,
            })?;
        let local = date.and_time(time);

        let resolved = match self.offset {
            Some(offset) => offset.from_local_datetime(&local).single(),
            None => self.zone.resolve(&local),
        };
        resolved.ok_or(TemporalError::Overflow {
            group: "YEAR",
            value: i64::from(self.year),
        })
    }

    fn date(&self) -> Result<NaiveDate, TemporalError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or(
            TemporalError::InvalidDate {
                year: i64::from(self.year),
                month: self.month,
                day: self.day,
            },
        )
    }

    /// Reset every component to a UTC instant seen from the target zone.
    fn set_instant(&mut self, utc: &NaiveDateTime) {
        let offset = self.zone.offset_at_utc(utc);
        let local = offset.from_utc_datetime(utc).naive_local();
        self.set_local(&local);
    }

    fn set_local(&mut self, local: &NaiveDateTime) {
        self.year = local.year();
        self.month = local.month();
        self.day = local.day();
        self.hour = local.hour();
        self.minute = local.minute();
        self.second = local.second();
        let nano = local.nanosecond();
        self.leap_second = nano >= 1_000_000_000;
        self.nano = nano % 1_000_000_000;
    }
}

fn in_range(group: &'static str, value: i64, min: i64, max: i64) -> Result<i64, TemporalError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(TemporalError::OutOfRange {
            group,
            value,
            min,
            max,
        })
    }
}

/// Assemble a timestamp from `(group, text)` fragments in order.
pub fn assemble<'a, I>(zone: TargetZone, fragments: I) -> Result<DateTime<FixedOffset>, TemporalError>
where
    I: IntoIterator<Item = (TemporalGroup, &'a str)>,
{
    let mut acc = TimestampAccumulator::new(zone);
    for (group, raw) in fragments {
        acc.apply(group, raw)?;
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use TemporalGroup::*;

    fn at(zone: TargetZone, fragments: &[(TemporalGroup, &str)]) -> Result<String, TemporalError> {
        assemble(zone, fragments.iter().copied()).map(|ts| ts.to_rfc3339())
    }

    fn utc(fragments: &[(TemporalGroup, &str)]) -> String {
        at(TargetZone::Utc, fragments).unwrap()
    }

    #[test]
    fn test_no_fragments_is_epoch() {
        assert_eq!(utc(&[]), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_epoch_seen_from_fixed_zone() {
        let zone: TargetZone = "+02:00".parse().unwrap();
        let ts = assemble(zone, []).unwrap();
        assert_eq!(ts.timestamp(), 0);
        assert_eq!(ts.to_rfc3339(), "1970-01-01T02:00:00+02:00");
    }

    #[test]
    fn test_calendar_fields() {
        let ts = utc(&[
            (Year, "2023"),
            (Month, "02"),
            (Day, "22"),
            (Hour, "06"),
            (Minute, "46"),
            (Second, "55"),
            (Fraction, "093"),
        ]);
        assert_eq!(ts, "2023-02-22T06:46:55.093+00:00");
    }

    #[test]
    fn test_order_does_not_matter() {
        // Day 29 before month 2 would be invalid only if checked eagerly.
        let ts = utc(&[(Day, "29"), (Month, "2"), (Year, "2024")]);
        assert_eq!(ts, "2024-02-29T00:00:00+00:00");
    }

    #[test]
    fn test_invalid_date_is_reported() {
        let err = at(TargetZone::Utc, &[(Year, "2023"), (Month, "2"), (Day, "30")]).unwrap_err();
        assert_eq!(
            err,
            TemporalError::InvalidDate {
                year: 2023,
                month: 2,
                day: 30
            }
        );
    }

    #[test]
    fn test_out_of_range_component() {
        let err = at(TargetZone::Utc, &[(Month, "13")]).unwrap_err();
        assert!(matches!(
            err,
            TemporalError::OutOfRange {
                group: "MONTH",
                value: 13,
                ..
            }
        ));
        assert!(at(TargetZone::Utc, &[(Hour, "24")]).is_err());
    }

    #[test]
    fn test_blank_fragments_are_ignored() {
        assert_eq!(utc(&[(Year, "2020"), (Fraction, "")]), "2020-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_milli_and_nano() {
        assert_eq!(
            utc(&[(Milli, "250")]),
            "1970-01-01T00:00:00.250+00:00"
        );
        assert_eq!(
            utc(&[(Nano, "1")]),
            "1970-01-01T00:00:00.000000001+00:00"
        );
    }

    #[test]
    fn test_leap_second() {
        let ts = assemble(
            TargetZone::Utc,
            [(Year, "2016"), (Month, "12"), (Day, "31"), (Hour, "23"), (Minute, "59"), (Second, "60")],
        )
        .unwrap();
        assert_eq!(ts.second(), 59);
        assert_eq!(ts.nanosecond(), 1_000_000_000);
    }

    #[test]
    fn test_explicit_offset_overrides_zone() {
        let zone: TargetZone = "Europe/Paris".parse().unwrap();
        let ts = at(
            zone,
            &[
                (Year, "2023"),
                (Month, "02"),
                (Day, "22"),
                (Hour, "06"),
                (Minute, "46"),
                (Second, "55"),
                (Offset, "+0200"),
            ],
        )
        .unwrap();
        assert_eq!(ts, "2023-02-22T06:46:55+02:00");
    }

    #[test]
    fn test_named_zone_applies_dst() {
        let zone: TargetZone = "Europe/Paris".parse().unwrap();
        let winter = at(zone, &[(Year, "2023"), (Month, "01"), (Day, "15"), (Hour, "12")]).unwrap();
        let summer = at(zone, &[(Year, "2023"), (Month, "07"), (Day, "15"), (Hour, "12")]).unwrap();
        assert_eq!(winter, "2023-01-15T12:00:00+01:00");
        assert_eq!(summer, "2023-07-15T12:00:00+02:00");
    }

    #[test]
    fn test_ambiguous_local_time_takes_earliest() {
        // 2023-10-29 02:30 happens twice in Paris.
        let zone: TargetZone = "Europe/Paris".parse().unwrap();
        let ts = at(
            zone,
            &[(Year, "2023"), (Month, "10"), (Day, "29"), (Hour, "02"), (Minute, "30")],
        )
        .unwrap();
        assert_eq!(ts, "2023-10-29T02:30:00+02:00");
    }

    #[test]
    fn test_gap_local_time_moves_forward() {
        // 2023-03-26 02:30 does not exist in Paris.
        let zone: TargetZone = "Europe/Paris".parse().unwrap();
        let ts = at(
            zone,
            &[(Year, "2023"), (Month, "03"), (Day, "26"), (Hour, "02"), (Minute, "30")],
        )
        .unwrap();
        assert_eq!(ts, "2023-03-26T03:30:00+02:00");
    }

    #[test]
    fn test_epoch_units() {
        assert_eq!(utc(&[(EpochSeconds, "1677048415")]), "2023-02-22T06:46:55+00:00");
        assert_eq!(
            utc(&[(EpochMillis, "1677048415093")]),
            "2023-02-22T06:46:55.093+00:00"
        );
        assert_eq!(
            utc(&[(EpochMicros, "1677048415093001")]),
            "2023-02-22T06:46:55.093001+00:00"
        );
        assert_eq!(
            utc(&[(EpochNanos, "1677048415093001002")]),
            "2023-02-22T06:46:55.093001002+00:00"
        );
    }

    #[test]
    fn test_fraction_before_whole_seconds_survives() {
        assert_eq!(
            utc(&[(Fraction, "093"), (EpochSeconds, "1677048415")]),
            utc(&[(EpochSeconds, "1677048415"), (Fraction, "093")])
        );
        assert_eq!(
            utc(&[(Fraction, "093"), (EpochSeconds, "1677048415")]),
            "2023-02-22T06:46:55.093+00:00"
        );
        assert_eq!(
            utc(&[(Fraction, "144"), (ElapsedSeconds, "54")]),
            "1970-01-01T00:00:54.144+00:00"
        );
        assert_eq!(
            utc(&[(Milli, "250"), (ElapsedSeconds, "90000")]),
            "1970-01-02T01:00:00.250+00:00"
        );
    }

    #[test]
    fn test_sub_second_epoch_units_replace_fraction() {
        assert_eq!(
            utc(&[(Fraction, "5"), (EpochMillis, "1677048415093")]),
            "2023-02-22T06:46:55.093+00:00"
        );
        assert_eq!(
            utc(&[(Nano, "7"), (ElapsedMillis, "1500")]),
            "1970-01-01T00:00:01.500+00:00"
        );
    }

    #[test]
    fn test_epoch_resets_earlier_components_and_offset() {
        let ts = utc(&[(Year, "1999"), (Offset, "+05:00"), (EpochSeconds, "0")]);
        assert_eq!(ts, "1970-01-01T00:00:00+00:00");
        // later calendar fields still overwrite
        let ts = utc(&[(EpochSeconds, "0"), (Year, "2001")]);
        assert_eq!(ts, "2001-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_epoch_expressed_in_target_zone() {
        let zone: TargetZone = "-05:00".parse().unwrap();
        let ts = assemble(zone, [(EpochSeconds, "1677048415")]).unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-02-22T01:46:55-05:00");
    }

    #[test]
    fn test_epoch_overflow() {
        assert!(matches!(
            at(TargetZone::Utc, &[(EpochSeconds, "9223372036854775807")]),
            Err(TemporalError::Overflow { .. })
        ));
    }

    #[test]
    fn test_elapsed_is_relative_to_day_start() {
        assert_eq!(
            utc(&[(ElapsedSeconds, "54"), (Fraction, "144")]),
            "1970-01-01T00:00:54.144+00:00"
        );
        assert_eq!(
            utc(&[(Year, "2023"), (Month, "5"), (Day, "1"), (ElapsedMillis, "3600000")]),
            "2023-05-01T01:00:00+00:00"
        );
    }

    #[test]
    fn test_elapsed_rolls_date_forward() {
        assert_eq!(
            utc(&[(ElapsedSeconds, "90000")]),
            "1970-01-02T01:00:00+00:00"
        );
        assert_eq!(
            utc(&[(ElapsedMicros, "1500000")]),
            "1970-01-01T00:00:01.500+00:00"
        );
        assert_eq!(
            utc(&[(ElapsedNanos, "5")]),
            "1970-01-01T00:00:00.000000005+00:00"
        );
    }

    #[test]
    fn test_mixed_elapsed_and_time_of_day_fails() {
        assert_eq!(
            at(TargetZone::Utc, &[(Hour, "10"), (ElapsedSeconds, "5")]),
            Err(TemporalError::MixedElapsedAndCalendar)
        );
        assert_eq!(
            at(TargetZone::Utc, &[(ElapsedSeconds, "5"), (Second, "1")]),
            Err(TemporalError::MixedElapsedAndCalendar)
        );
        // Date fields combine with elapsed fields.
        assert!(at(TargetZone::Utc, &[(Day, "3"), (ElapsedSeconds, "5")]).is_ok());
    }

    #[test]
    fn test_month_name_feeds_accumulator() {
        assert_eq!(
            utc(&[(Year, "2000"), (Month, "Oct"), (Day, "10")]),
            "2000-10-10T00:00:00+00:00"
        );
    }

    #[test]
    fn test_zone_from_str() {
        assert_eq!("UTC".parse::<TargetZone>().unwrap(), TargetZone::Utc);
        assert_eq!("local".parse::<TargetZone>().unwrap(), TargetZone::Local);
        assert_eq!(
            "-0530".parse::<TargetZone>().unwrap(),
            TargetZone::Fixed(FixedOffset::west_opt(5 * 3600 + 1800).unwrap())
        );
        assert_eq!(
            "Asia/Tokyo".parse::<TargetZone>().unwrap(),
            TargetZone::Named(chrono_tz::Asia::Tokyo)
        );
        assert!(matches!(
            "Mars/Olympus".parse::<TargetZone>(),
            Err(ConfigError::InvalidZone { .. })
        ));
        assert!("+25:00".parse::<TargetZone>().is_err());
    }
}
