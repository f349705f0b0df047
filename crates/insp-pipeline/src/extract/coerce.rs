//! Primitive type coercion for extracted values
//!
//! Numeric coercion never fails: a value that does not parse comes back as
//! `Coerced::Float(NaN)` and the record builder files it under
//! `nonparsed_<key>`. Dates are stricter and return [`CoercionError`] when no
//! known layout matches.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::spec::{ParseAs, SubstitutionTable};
use crate::error::CoercionError;

/// Date-time layouts, interpreted in the configured source offset
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y%m%d%H%M%S",
    "%Y%m%dT%H%M%S",
];

/// Date-only layouts, normalized to UTC midnight
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%Y%m%d"];

/// Candidate date-time groups inside free text ("start 05.01.2023 10:00 end ...")
static DATE_TIME_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,4}[-./]\d{1,2}[-./]\d{1,4}[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?")
        .expect("date-time group pattern is valid")
});

/// A successfully typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Text(String),
    Integer(i64),
    /// May be NaN or infinite; check [`Coerced::is_finite`]
    Float(f64),
    Date(DateTime<Utc>),
}

impl Coerced {
    pub fn is_finite(&self) -> bool {
        match self {
            Coerced::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    /// JSON form for the metadata record; `None` for non-finite numbers
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Coerced::Text(s) => Some(Value::String(s.clone())),
            Coerced::Integer(i) => Some(Value::from(*i)),
            Coerced::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
            Coerced::Date(dt) => Some(Value::String(to_iso(dt))),
        }
    }
}

/// Result of pushing one raw field through substitution and coercion
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Parsed(Value),
    /// Coercion failed; carries the (substituted) raw string
    Nonparsed(String),
}

/// ISO-8601 UTC with millisecond precision, e.g. `2023-01-05T09:00:00.000Z`
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct Coercer {
    source_offset: FixedOffset,
    substitutions: SubstitutionTable,
}

impl Coercer {
    pub fn new(source_offset: FixedOffset, substitutions: SubstitutionTable) -> Self {
        Self {
            source_offset,
            substitutions,
        }
    }

    /// UTC source clocks, no substitutions
    pub fn utc() -> Self {
        Self::new(Utc.fix(), SubstitutionTable::default())
    }

    pub fn substitute<'a>(&'a self, key: &str, raw: &'a str) -> &'a str {
        self.substitutions.apply(key, raw)
    }

    /// Substitute, then coerce `raw` to `kind`
    pub fn coerce(&self, key: &str, raw: &str, kind: ParseAs) -> Result<Coerced, CoercionError> {
        let value = self.substitute(key, raw);
        match kind {
            ParseAs::None => Ok(Coerced::Text(value.to_string())),
            ParseAs::Integer => Ok(value
                .trim()
                .parse::<i64>()
                .map(Coerced::Integer)
                .unwrap_or(Coerced::Float(f64::NAN))),
            ParseAs::Float => Ok(Coerced::Float(value.trim().parse::<f64>().unwrap_or(f64::NAN))),
            ParseAs::Date => self.parse_date(value).map(Coerced::Date),
        }
    }

    /// Coerce and decide whether the value lands under `key` or `nonparsed_<key>`
    pub fn field(&self, key: &str, raw: &str, kind: ParseAs) -> FieldOutcome {
        match self.coerce(key, raw, kind) {
            Ok(coerced) => match coerced.to_json() {
                Some(value) => FieldOutcome::Parsed(value),
                None => FieldOutcome::Nonparsed(self.substitute(key, raw).to_string()),
            },
            Err(_) => FieldOutcome::Nonparsed(self.substitute(key, raw).to_string()),
        }
    }

    /// Parse a date in order: offset-carrying or local date-time layouts,
    /// date-only layouts, then the first valid date-time group in the text.
    pub fn parse_date(&self, raw: &str) -> Result<DateTime<Utc>, CoercionError> {
        let value = raw.trim();

        if let Some(dt) = self.parse_date_time(value) {
            return Ok(dt);
        }

        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                    return Ok(Utc.from_utc_datetime(&midnight));
                }
            }
        }

        DATE_TIME_GROUP
            .find_iter(value)
            .find_map(|group| self.parse_date_time(group.as_str()))
            .ok_or_else(|| CoercionError::UnparseableDate(raw.to_string()))
    }

    fn parse_date_time(&self, value: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }

        DATE_TIME_FORMATS.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(value, format)
                .ok()
                .and_then(|naive| self.source_offset.from_local_datetime(&naive).single())
                .map(|local| local.with_timezone(&Utc))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::spec::Substitution;

    fn cet() -> Coercer {
        Coercer::new(FixedOffset::east_opt(3600).unwrap(), SubstitutionTable::default())
    }

    #[test]
    fn test_integer() {
        let c = Coercer::utc();
        assert_eq!(c.coerce("k", "123", ParseAs::Integer).unwrap(), Coerced::Integer(123));
        assert_eq!(c.coerce("k", " -7 ", ParseAs::Integer).unwrap(), Coerced::Integer(-7));
    }

    #[test]
    fn test_invalid_integer_is_nan_not_error() {
        let c = Coercer::utc();
        let coerced = c.coerce("k", "invalid", ParseAs::Integer).unwrap();
        assert!(matches!(coerced, Coerced::Float(f) if f.is_nan()));
        assert!(!coerced.is_finite());
        assert_eq!(coerced.to_json(), None);
    }

    #[test]
    fn test_float() {
        let c = Coercer::utc();
        assert_eq!(c.coerce("k", "12.5", ParseAs::Float).unwrap(), Coerced::Float(12.5));
        assert!(!c.coerce("k", "inf", ParseAs::Float).unwrap().is_finite());
        assert!(!c.coerce("k", "1,5", ParseAs::Float).unwrap().is_finite());
    }

    #[test]
    fn test_text_passthrough() {
        let c = Coercer::utc();
        assert_eq!(
            c.coerce("k", "Line 4", ParseAs::None).unwrap(),
            Coerced::Text("Line 4".to_string())
        );
    }

    #[test]
    fn test_date_time_in_source_offset() {
        let dt = cet().parse_date("2023-01-05 10:00:00").unwrap();
        assert_eq!(to_iso(&dt), "2023-01-05T09:00:00.000Z");

        let dt = cet().parse_date("05.01.2023 10:30").unwrap();
        assert_eq!(to_iso(&dt), "2023-01-05T09:30:00.000Z");
    }

    #[test]
    fn test_date_only_is_utc_midnight() {
        let dt = cet().parse_date("05.01.2023").unwrap();
        assert_eq!(to_iso(&dt), "2023-01-05T00:00:00.000Z");
    }

    #[test]
    fn test_iso_output_is_idempotent() {
        let c = cet();
        let first = c.parse_date("2023-07-14 23:15:00").unwrap();
        let second = c.parse_date(&to_iso(&first)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_date_group_fallback_takes_first_valid() {
        let c = Coercer::utc();
        let dt = c
            .parse_date("2023-13-40 10:00:00 2023-02-01 08:15:00 2023-02-02 09:00:00")
            .unwrap();
        assert_eq!(to_iso(&dt), "2023-02-01T08:15:00.000Z");
    }

    #[test]
    fn test_unparseable_date() {
        assert_eq!(
            Coercer::utc().parse_date("yesterday"),
            Err(CoercionError::UnparseableDate("yesterday".to_string()))
        );
    }

    #[test]
    fn test_substitution_runs_before_coercion() {
        let table = SubstitutionTable::new(&[Substitution {
            key: "line".to_string(),
            old_value: "n/a".to_string(),
            new_value: "0".to_string(),
        }]);
        let c = Coercer::new(FixedOffset::east_opt(0).unwrap(), table);
        assert_eq!(c.coerce("line", "n/a", ParseAs::Integer).unwrap(), Coerced::Integer(0));
        assert!(!c.coerce("other", "n/a", ParseAs::Integer).unwrap().is_finite());
    }

    #[test]
    fn test_field_outcome() {
        let c = Coercer::utc();
        assert_eq!(c.field("n", "42", ParseAs::Integer), FieldOutcome::Parsed(Value::from(42)));
        assert_eq!(
            c.field("n", "forty", ParseAs::Integer),
            FieldOutcome::Nonparsed("forty".to_string())
        );
        assert_eq!(
            c.field("d", "someday", ParseAs::Date),
            FieldOutcome::Nonparsed("someday".to_string())
        );
    }
}
