// LogStitch - core/capture.rs
//
// Named capture groups: the identifiers a line template refers to with
// `$NAME`. A group is either plain (its text is kept verbatim as an event
// field) or temporal (its text feeds the timestamp accumulator).
//
// Temporal groups are a closed set. Their target component and text-to-number
// conversion are selected by `match`, so adding a variant is a compile error
// until every rule covers it.

use crate::util::error::TemporalError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

// =============================================================================
// Temporal groups
// =============================================================================

/// Every capture group name with timestamp semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalGroup {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Milli,
    Nano,
    Fraction,
    ElapsedSeconds,
    Offset,
    ElapsedMillis,
    ElapsedMicros,
    ElapsedNanos,
    EpochSeconds,
    EpochMillis,
    EpochMicros,
    EpochNanos,
}

/// Resolution of an epoch or elapsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

/// The accumulator component a temporal group writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalTarget {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    MilliOfSecond,
    NanoOfSecond,
    Offset,
    /// Duration since the start of the accumulated day.
    Elapsed(TimeUnit),
    /// Absolute instant since 1970-01-01T00:00:00Z.
    Epoch(TimeUnit),
}

impl TemporalGroup {
    /// All temporal groups, in declaration order.
    pub const ALL: [TemporalGroup; 18] = [
        TemporalGroup::Year,
        TemporalGroup::Month,
        TemporalGroup::Day,
        TemporalGroup::Hour,
        TemporalGroup::Minute,
        TemporalGroup::Second,
        TemporalGroup::Milli,
        TemporalGroup::Nano,
        TemporalGroup::Fraction,
        TemporalGroup::ElapsedSeconds,
        TemporalGroup::Offset,
        TemporalGroup::ElapsedMillis,
        TemporalGroup::ElapsedMicros,
        TemporalGroup::ElapsedNanos,
        TemporalGroup::EpochSeconds,
        TemporalGroup::EpochMillis,
        TemporalGroup::EpochMicros,
        TemporalGroup::EpochNanos,
    ];

    /// The identifier used in line templates (`$YEAR`) and profile files.
    pub fn name(self) -> &'static str {
        match self {
            TemporalGroup::Year => "YEAR",
            TemporalGroup::Month => "MONTH",
            TemporalGroup::Day => "DAY",
            TemporalGroup::Hour => "HOUR",
            TemporalGroup::Minute => "MINUTE",
            TemporalGroup::Second => "SECOND",
            TemporalGroup::Milli => "MILLI",
            TemporalGroup::Nano => "NANO",
            TemporalGroup::Fraction => "FRACTION",
            TemporalGroup::ElapsedSeconds => "ELAPSEDSECONDS",
            TemporalGroup::Offset => "OFFSET",
            TemporalGroup::ElapsedMillis => "ELAPSEDMILLIS",
            TemporalGroup::ElapsedMicros => "ELAPSEDMICROS",
            TemporalGroup::ElapsedNanos => "ELAPSEDNANOS",
            TemporalGroup::EpochSeconds => "EPOCHSECONDS",
            TemporalGroup::EpochMillis => "EPOCHMILLIS",
            TemporalGroup::EpochMicros => "EPOCHMICROS",
            TemporalGroup::EpochNanos => "EPOCHNANOS",
        }
    }

    pub fn target(self) -> TemporalTarget {
        match self {
            TemporalGroup::Year => TemporalTarget::Year,
            TemporalGroup::Month => TemporalTarget::Month,
            TemporalGroup::Day => TemporalTarget::Day,
            TemporalGroup::Hour => TemporalTarget::Hour,
            TemporalGroup::Minute => TemporalTarget::Minute,
            TemporalGroup::Second => TemporalTarget::Second,
            TemporalGroup::Milli => TemporalTarget::MilliOfSecond,
            TemporalGroup::Nano | TemporalGroup::Fraction => TemporalTarget::NanoOfSecond,
            TemporalGroup::Offset => TemporalTarget::Offset,
            TemporalGroup::ElapsedSeconds => TemporalTarget::Elapsed(TimeUnit::Seconds),
            TemporalGroup::ElapsedMillis => TemporalTarget::Elapsed(TimeUnit::Millis),
            TemporalGroup::ElapsedMicros => TemporalTarget::Elapsed(TimeUnit::Micros),
            TemporalGroup::ElapsedNanos => TemporalTarget::Elapsed(TimeUnit::Nanos),
            TemporalGroup::EpochSeconds => TemporalTarget::Epoch(TimeUnit::Seconds),
            TemporalGroup::EpochMillis => TemporalTarget::Epoch(TimeUnit::Millis),
            TemporalGroup::EpochMicros => TemporalTarget::Epoch(TimeUnit::Micros),
            TemporalGroup::EpochNanos => TemporalTarget::Epoch(TimeUnit::Nanos),
        }
    }

    /// Convert captured text into the number written to `target()`.
    pub fn transform(self) -> fn(&str) -> Result<i64, TemporalError> {
        match self {
            TemporalGroup::Month => parse_month,
            TemporalGroup::Offset => parse_offset,
            TemporalGroup::Fraction => parse_fraction,
            TemporalGroup::Year => |raw| parse_integer("YEAR", raw),
            TemporalGroup::Day => |raw| parse_integer("DAY", raw),
            TemporalGroup::Hour => |raw| parse_integer("HOUR", raw),
            TemporalGroup::Minute => |raw| parse_integer("MINUTE", raw),
            TemporalGroup::Second => |raw| parse_integer("SECOND", raw),
            TemporalGroup::Milli => |raw| parse_integer("MILLI", raw),
            TemporalGroup::Nano => |raw| parse_integer("NANO", raw),
            TemporalGroup::ElapsedSeconds => |raw| parse_integer("ELAPSEDSECONDS", raw),
            TemporalGroup::ElapsedMillis => |raw| parse_integer("ELAPSEDMILLIS", raw),
            TemporalGroup::ElapsedMicros => |raw| parse_integer("ELAPSEDMICROS", raw),
            TemporalGroup::ElapsedNanos => |raw| parse_integer("ELAPSEDNANOS", raw),
            TemporalGroup::EpochSeconds => |raw| parse_integer("EPOCHSECONDS", raw),
            TemporalGroup::EpochMillis => |raw| parse_integer("EPOCHMILLIS", raw),
            TemporalGroup::EpochMicros => |raw| parse_integer("EPOCHMICROS", raw),
            TemporalGroup::EpochNanos => |raw| parse_integer("EPOCHNANOS", raw),
        }
    }

    /// HOUR, MINUTE and SECOND: fields that cannot share a line with an
    /// elapsed field.
    pub fn is_time_of_day(self) -> bool {
        matches!(
            self,
            TemporalGroup::Hour | TemporalGroup::Minute | TemporalGroup::Second
        )
    }

    pub fn is_elapsed(self) -> bool {
        matches!(self.target(), TemporalTarget::Elapsed(_))
    }
}

impl fmt::Display for TemporalGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TemporalGroup {
    type Err = ();

    /// Exact, case-sensitive lookup of a temporal identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemporalGroup::ALL
            .iter()
            .copied()
            .find(|g| g.name() == s)
            .ok_or(())
    }
}

// =============================================================================
// Transforms
// =============================================================================

fn parse_integer(group: &'static str, raw: &str) -> Result<i64, TemporalError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i64>()
        .map_err(|source| TemporalError::InvalidNumber {
            group,
            raw: trimmed.to_string(),
            source,
        })
}

/// Month number from `1`..`12` or from an English or French month name.
///
/// Text of three or more characters is matched on its leading letters,
/// case-insensitively, so `Jan`, `JANUARY` and `janv.` are all 1.
fn parse_month(raw: &str) -> Result<i64, TemporalError> {
    let trimmed = raw.trim();
    if trimmed.chars().count() >= 3 && trimmed.starts_with(char::is_alphabetic) {
        if let Some(month) = month_from_name(&trimmed.to_lowercase()) {
            return Ok(month);
        }
    }
    parse_integer("MONTH", trimmed)
}

fn month_from_name(lower: &str) -> Option<i64> {
    // "juin" and "juil" share their first three letters.
    if lower.starts_with("juin") {
        return Some(6);
    }
    if lower.starts_with("juil") {
        return Some(7);
    }
    let prefix: String = lower.chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" | "fév" | "fev" => 2,
        "mar" => 3,
        "apr" | "avr" => 4,
        "may" | "mai" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" | "aoû" | "aou" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" | "déc" => 12,
        _ => return None,
    };
    Some(month)
}

/// Offset in seconds east of UTC.
///
/// Accepted shapes, tried in order: `Z`, `+HH`, `+HHMM` / `+HH:MM`, then a
/// raw signed number of seconds.
fn parse_offset(raw: &str) -> Result<i64, TemporalError> {
    let trimmed = raw.trim();
    let seconds = if trimmed.eq_ignore_ascii_case("z") {
        0
    } else if let Some((sign, hours, minutes)) = split_offset(trimmed) {
        if minutes >= 60 {
            return Err(TemporalError::InvalidOffset {
                raw: trimmed.to_string(),
            });
        }
        sign * (hours * 3600 + minutes * 60)
    } else {
        parse_integer("OFFSET", trimmed)?
    };

    if seconds.abs() >= 86_400 {
        return Err(TemporalError::InvalidOffset {
            raw: trimmed.to_string(),
        });
    }
    Ok(seconds)
}

/// Split `+HH`, `+HHMM` or `+HH:MM` into (sign, hours, minutes).
pub(crate) fn split_offset(text: &str) -> Option<(i64, i64, i64)> {
    let sign = match text.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let rest = &text[1..];
    let digits: String = match rest.len() {
        2 | 4 => rest.to_string(),
        5 if rest.as_bytes()[2] == b':' => rest.replacen(':', "", 1),
        _ => return None,
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours = digits[..2].parse::<i64>().ok()?;
    let minutes = if digits.len() == 4 {
        digits[2..].parse::<i64>().ok()?
    } else {
        0
    };
    Some((sign, hours, minutes))
}

/// Nanoseconds from the digits that follow a decimal separator.
///
/// `5` is 500 000 000 ns and `123456789123` keeps its first nine digits.
fn parse_fraction(raw: &str) -> Result<i64, TemporalError> {
    let trimmed = raw.trim();
    let invalid = if trimmed.is_empty() {
        trimmed.parse::<u8>().err()
    } else {
        trimmed
            .chars()
            .find(|c| !c.is_ascii_digit())
            .and_then(|c| c.to_string().parse::<u8>().err())
    };
    if let Some(source) = invalid {
        return Err(TemporalError::InvalidNumber {
            group: "FRACTION",
            raw: trimmed.to_string(),
            source,
        });
    }

    let mut nanos: i64 = 0;
    for b in trimmed.bytes().take(9) {
        nanos = nanos * 10 + i64::from(b - b'0');
    }
    for _ in trimmed.len().min(9)..9 {
        nanos *= 10;
    }
    Ok(nanos)
}

// =============================================================================
// Named capture groups
// =============================================================================

/// A capture group name referenced from a line template.
///
/// Equality and hashing use the name only, so a plain group and a temporal
/// group with the same name collide as map keys.
#[derive(Debug, Clone)]
pub enum NamedCaptureGroup {
    Plain(String),
    Temporal(TemporalGroup),
}

/// Keep only ASCII letters and digits.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

impl NamedCaptureGroup {
    /// A plain group named after `raw` with invalid characters stripped.
    /// The name may be empty; profile validation rejects that.
    pub fn of(raw: &str) -> Self {
        NamedCaptureGroup::Plain(sanitize_name(raw))
    }

    /// Rebuild a group from its stored name: temporal identifiers win,
    /// anything else becomes a plain group.
    pub fn from_stored_name(name: &str) -> Self {
        let sanitized = sanitize_name(name);
        match sanitized.parse::<TemporalGroup>() {
            Ok(temporal) => NamedCaptureGroup::Temporal(temporal),
            Err(()) => NamedCaptureGroup::Plain(sanitized),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NamedCaptureGroup::Plain(name) => name,
            NamedCaptureGroup::Temporal(t) => t.name(),
        }
    }

    pub fn as_temporal(&self) -> Option<TemporalGroup> {
        match self {
            NamedCaptureGroup::Temporal(t) => Some(*t),
            NamedCaptureGroup::Plain(_) => None,
        }
    }

    pub fn is_temporal(&self) -> bool {
        self.as_temporal().is_some()
    }
}

impl From<TemporalGroup> for NamedCaptureGroup {
    fn from(group: TemporalGroup) -> Self {
        NamedCaptureGroup::Temporal(group)
    }
}

impl PartialEq for NamedCaptureGroup {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for NamedCaptureGroup {}

impl Hash for NamedCaptureGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Display for NamedCaptureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for NamedCaptureGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for NamedCaptureGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(NamedCaptureGroup::from_stored_name(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn convert(group: TemporalGroup, raw: &str) -> Result<i64, TemporalError> {
        (group.transform())(raw)
    }

    #[test]
    fn test_of_strips_invalid_characters() {
        let group = NamedCaptureGroup::of("thread-id_1 ");
        assert_eq!(group.name(), "threadid1");
        assert!(!group.is_temporal());
    }

    #[test]
    fn test_of_never_returns_temporal() {
        assert!(!NamedCaptureGroup::of("YEAR").is_temporal());
    }

    #[test]
    fn test_stored_name_prefers_temporal() {
        assert_eq!(
            NamedCaptureGroup::from_stored_name("EPOCHMILLIS").as_temporal(),
            Some(TemporalGroup::EpochMillis)
        );
        assert!(!NamedCaptureGroup::from_stored_name("SEVERITY").is_temporal());
        // lookup is exact
        assert!(!NamedCaptureGroup::from_stored_name("year").is_temporal());
    }

    #[test]
    fn test_equality_is_by_name() {
        let plain = NamedCaptureGroup::of("YEAR");
        let temporal = NamedCaptureGroup::from(TemporalGroup::Year);
        assert_eq!(plain, temporal);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(!set.insert(temporal));
    }

    #[test]
    fn test_sanitised_name_round_trips() {
        use std::collections::hash_map::DefaultHasher;

        fn hash_of(group: &NamedCaptureGroup) -> u64 {
            let mut hasher = DefaultHasher::new();
            group.hash(&mut hasher);
            hasher.finish()
        }

        let raw = NamedCaptureGroup::of("My-Name!");
        let clean = NamedCaptureGroup::of("MyName");
        assert_eq!(raw.name(), "MyName");
        assert_eq!(NamedCaptureGroup::of(raw.name()), raw);
        assert_eq!(clean, raw);
        assert_eq!(hash_of(&clean), hash_of(&raw));
    }

    #[test]
    fn test_serde_uses_the_name() {
        let group = NamedCaptureGroup::from(TemporalGroup::Offset);
        let json = serde_json::to_string(&group).unwrap();
        assert_eq!(json, "\"OFFSET\"");
        let back: NamedCaptureGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_temporal(), Some(TemporalGroup::Offset));
    }

    #[test]
    fn test_every_temporal_name_round_trips() {
        for group in TemporalGroup::ALL {
            assert_eq!(group.name().parse::<TemporalGroup>(), Ok(group));
        }
    }

    #[test]
    fn test_targets() {
        assert_eq!(TemporalGroup::Fraction.target(), TemporalTarget::NanoOfSecond);
        assert_eq!(TemporalGroup::Nano.target(), TemporalTarget::NanoOfSecond);
        assert_eq!(
            TemporalGroup::ElapsedSeconds.target(),
            TemporalTarget::Elapsed(TimeUnit::Seconds)
        );
        assert_eq!(
            TemporalGroup::EpochMicros.target(),
            TemporalTarget::Epoch(TimeUnit::Micros)
        );
        assert!(TemporalGroup::ElapsedNanos.is_elapsed());
        assert!(TemporalGroup::Minute.is_time_of_day());
        assert!(!TemporalGroup::Day.is_time_of_day());
    }

    #[test]
    fn test_integer_transform_trims() {
        assert_eq!(convert(TemporalGroup::Year, " 2023 "), Ok(2023));
        assert_eq!(convert(TemporalGroup::EpochSeconds, "-5"), Ok(-5));
        assert!(matches!(
            convert(TemporalGroup::Day, "1x"),
            Err(TemporalError::InvalidNumber { group: "DAY", .. })
        ));
    }

    #[test]
    fn test_month_names_english_and_french() {
        let cases = [
            ("Jan", 1),
            ("FEB", 2),
            ("février", 2),
            ("fev", 2),
            ("mars", 3),
            ("avril", 4),
            ("May", 5),
            ("mai", 5),
            ("June", 6),
            ("juin", 6),
            ("July", 7),
            ("juillet", 7),
            ("Aug", 8),
            ("août", 8),
            ("Sept", 9),
            ("oct.", 10),
            ("Nov", 11),
            ("décembre", 12),
            ("Dec", 12),
        ];
        for (text, month) in cases {
            assert_eq!(convert(TemporalGroup::Month, text), Ok(month), "{text}");
        }
    }

    #[test]
    fn test_month_numbers_and_garbage() {
        assert_eq!(convert(TemporalGroup::Month, "07"), Ok(7));
        assert_eq!(convert(TemporalGroup::Month, "12"), Ok(12));
        assert!(matches!(
            convert(TemporalGroup::Month, "Foo"),
            Err(TemporalError::InvalidNumber { group: "MONTH", .. })
        ));
    }

    #[test]
    fn test_offset_shapes() {
        assert_eq!(convert(TemporalGroup::Offset, "Z"), Ok(0));
        assert_eq!(convert(TemporalGroup::Offset, "+02"), Ok(7200));
        assert_eq!(convert(TemporalGroup::Offset, "-05"), Ok(-18_000));
        assert_eq!(convert(TemporalGroup::Offset, "+0200"), Ok(7200));
        assert_eq!(convert(TemporalGroup::Offset, "+05:30"), Ok(19_800));
        assert_eq!(convert(TemporalGroup::Offset, "-0130"), Ok(-5400));
        assert_eq!(convert(TemporalGroup::Offset, "3600"), Ok(3600));
    }

    #[test]
    fn test_offset_rejects_out_of_range() {
        assert!(matches!(
            convert(TemporalGroup::Offset, "+0275"),
            Err(TemporalError::InvalidOffset { .. })
        ));
        assert!(matches!(
            convert(TemporalGroup::Offset, "90000"),
            Err(TemporalError::InvalidOffset { .. })
        ));
        assert!(matches!(
            convert(TemporalGroup::Offset, "CET"),
            Err(TemporalError::InvalidNumber { group: "OFFSET", .. })
        ));
    }

    #[test]
    fn test_fraction_scales_to_nanos() {
        assert_eq!(convert(TemporalGroup::Fraction, "5"), Ok(500_000_000));
        assert_eq!(convert(TemporalGroup::Fraction, "093"), Ok(93_000_000));
        assert_eq!(convert(TemporalGroup::Fraction, "123456"), Ok(123_456_000));
        assert_eq!(convert(TemporalGroup::Fraction, "123456789"), Ok(123_456_789));
        assert_eq!(
            convert(TemporalGroup::Fraction, "123456789987"),
            Ok(123_456_789)
        );
        assert!(matches!(
            convert(TemporalGroup::Fraction, "+5"),
            Err(TemporalError::InvalidNumber {
                group: "FRACTION",
                ..
            })
        ));
    }

    #[test]
    fn test_split_offset() {
        assert_eq!(split_offset("+02:00"), Some((1, 2, 0)));
        assert_eq!(split_offset("-0930"), Some((-1, 9, 30)));
        assert_eq!(split_offset("0200"), None);
        assert_eq!(split_offset("+2:00"), None);
    }
}
