//! Date parsing, timezone resolution and the local timestamp column.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Timelike,
    Utc,
};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::{ParseError, PipelineError, PipelineResult};
use crate::types::{ColumnKind, DataType, Field, Table, Value};

/// Name of the column added by [`add_local_timestamp`].
pub const DATETIME_COLUMN: &str = "datetime";

/// Civic zone names that are not IANA identifiers, mapped to the zone they observe.
const CIVIC_ZONES: &[(&str, Tz)] = &[
    ("America/Nanaimo", chrono_tz::America::Vancouver),
    ("America/Victoria", chrono_tz::America::Vancouver),
];

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

// chrono reads `%B`/`%b` as either the full or the abbreviated month name.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%d %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M %p",
    "%d-%b-%Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M",
    "%B %d, %Y %I:%M:%S %p",
    "%B %d, %Y %I:%M %p",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%d %B %Y %I:%M %p",
];

// Month-first wins for slashed dates; day-first is only reached when the month would be > 12.
const NAIVE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%b-%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
];

/// Formats without a day; the first of the month is assumed.
const YEAR_MONTH_FORMATS: &[&str] = &["%Y-%m", "%Y/%m", "%B %Y"];

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// A parsed date-time, with or without a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDateTime {
    Zoned(DateTime<FixedOffset>),
    /// Wall-clock time with no offset; dates alone are midnight.
    Naive(NaiveDateTime),
}

/// Best-effort parse of a date or date-time string in the formats open-data feeds use.
pub fn parse_datetime(raw: &str) -> Result<ParsedDateTime, ParseError> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(ParsedDateTime::Zoned(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(ParsedDateTime::Zoned(dt));
    }
    if let Some(dt) = ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Ok(ParsedDateTime::Zoned(dt));
    }

    // `...Z` with a space separator is not RFC 3339 but still UTC.
    if let Some(body) = s.strip_suffix(['Z', 'z']) {
        if let Some(naive) = parse_naive(body) {
            return Ok(ParsedDateTime::Zoned(Utc.from_utc_datetime(&naive).fixed_offset()));
        }
    }

    if let Some(naive) = parse_naive(s) {
        return Ok(ParsedDateTime::Naive(naive));
    }

    // A leading weekday name is dropped, not checked against the date.
    match strip_weekday(s) {
        Some(rest) => parse_datetime(rest).map_err(|_| ParseError::new(raw, "date")),
        None => Err(ParseError::new(raw, "date")),
    }
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .or_else(|| parse_year_month(s))
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_year_month(s: &str) -> Option<NaiveDate> {
    let with_day = format!("{s} 1");
    YEAR_MONTH_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_day, &format!("{fmt} %d")).ok())
}

/// The rest of `s` after a leading full or three-letter weekday name.
fn strip_weekday(s: &str) -> Option<&str> {
    let end = s.find(|c: char| !c.is_ascii_alphabetic())?;
    let word = s[..end].to_ascii_lowercase();
    let is_weekday = WEEKDAYS
        .iter()
        .any(|day| *day == word || (word.len() == 3 && day.starts_with(word.as_str())));
    is_weekday.then(|| s[end..].trim_start_matches([',', '.', ' ']))
}

/// Resolve a configured zone name to an IANA zone.
///
/// Accepts IANA identifiers and the civic aliases in [`CIVIC_ZONES`]. Anything else is a
/// configuration error; there is no fallback to the host's zone.
pub fn resolve_timezone(name: &str) -> PipelineResult<Tz> {
    let name = name.trim();
    if let Some((_, tz)) = CIVIC_ZONES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
    {
        return Ok(*tz);
    }
    name.parse::<Tz>()
        .map_err(|_| PipelineError::config(format!("unknown timezone '{name}'")))
}

/// Parse `raw` and render it in `tz` as ISO-8601 with offset.
///
/// Whole seconds render without a fraction; anything finer renders as six digits.
/// Values without an offset are taken as wall-clock time in `tz`. A wall-clock time that does
/// not exist in `tz` (spring-forward gap) is a parse error; an ambiguous one takes the earlier
/// instant.
pub fn date_to_local(raw: &str, tz: Tz) -> Result<String, ParseError> {
    let local = match parse_datetime(raw)? {
        ParsedDateTime::Zoned(dt) => dt.with_timezone(&tz),
        ParsedDateTime::Naive(naive) => tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| ParseError::new(raw, "local time"))?,
    };
    let seconds = if local.nanosecond() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    Ok(local.to_rfc3339_opts(seconds, false))
}

/// Add a [`DATETIME_COLUMN`] derived from the first date-like column that converts cleanly.
///
/// Candidates are tried in column order. A candidate is abandoned as soon as one of its values
/// (nulls included) fails to convert. If nothing converts, the table is returned unchanged.
pub fn add_local_timestamp(table: Table, tz: Tz) -> Table {
    let candidates: Vec<usize> = table
        .schema
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.kind == ColumnKind::DateLike)
        .map(|(idx, _)| idx)
        .collect();

    for idx in candidates {
        match convert_column(&table, idx, tz) {
            Ok(values) => {
                let field = Field::new(DATETIME_COLUMN, DataType::Utf8).with_kind(ColumnKind::DateLike);
                return table.with_column(field, values);
            }
            Err(e) => debug!(
                column = %table.schema.fields[idx].name,
                error = %e,
                "date column abandoned"
            ),
        }
    }
    table
}

fn convert_column(table: &Table, idx: usize, tz: Tz) -> Result<Vec<Value>, ParseError> {
    table
        .column(idx)
        .map(|v| match v {
            Value::Utf8(s) => date_to_local(s, tz).map(Value::Utf8),
            other => Err(ParseError::new(other.to_string(), "date")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Schema;

    fn pacific() -> Tz {
        resolve_timezone("America/Nanaimo").unwrap()
    }

    #[test]
    fn utc_instant_converts_to_pacific() {
        assert_eq!(
            date_to_local("2022-01-01T01:00:00Z", pacific()).unwrap(),
            "2021-12-31T17:00:00-08:00"
        );
    }

    #[test]
    fn summer_instants_use_daylight_offset() {
        assert_eq!(
            date_to_local("2022-07-01 12:30:00+00:00", pacific()).unwrap(),
            "2022-07-01T05:30:00-07:00"
        );
    }

    #[test]
    fn naive_values_are_local_wall_clock() {
        assert_eq!(date_to_local("2022-01-01", pacific()).unwrap(), "2022-01-01T00:00:00-08:00");
        assert_eq!(
            date_to_local("03/15/2022 09:05:00", pacific()).unwrap(),
            "2022-03-15T09:05:00-07:00"
        );
    }

    #[test]
    fn parses_common_feed_formats() {
        for raw in [
            "2022-01-01T01:00:00.123Z",
            "2022-01-01 01:00:00Z",
            "2022-01-01T01:00:00",
            "2022/01/01",
            "January 5, 2021",
            "Tue, 1 Jul 2003 10:52:37 +0200",
        ] {
            assert!(parse_datetime(raw).is_ok(), "{raw}");
        }
        for raw in ["not a date", "123 Main St", "B-1001", "Harbour Cafe", "Sun Valley Motors", ""] {
            assert!(parse_datetime(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn parses_each_date_family() {
        let cases = [
            ("2022-01-01T01:00:00.1234567Z", "2021-12-31T17:00:00.123456-08:00"),
            ("2019-08-14T10:15:00.000-0700", "2019-08-14T10:15:00-07:00"),
            ("2021-01-05 10:00 AM", "2021-01-05T10:00:00-08:00"),
            ("2021-01-05 10:00:30 PM", "2021-01-05T22:00:30-08:00"),
            ("Jan 5, 2021", "2021-01-05T00:00:00-08:00"),
            ("5 Jan 2021", "2021-01-05T00:00:00-08:00"),
            ("Aug 14, 2019 3:00 PM", "2019-08-14T15:00:00-07:00"),
            ("August 14, 2019 15:00", "2019-08-14T15:00:00-07:00"),
            ("14 August 2019 3:00 PM", "2019-08-14T15:00:00-07:00"),
            ("Thursday, August 14, 2019", "2019-08-14T00:00:00-07:00"),
            ("Wed, Aug 14, 2019 3:00 PM", "2019-08-14T15:00:00-07:00"),
            ("2022-01", "2022-01-01T00:00:00-08:00"),
            ("January 2022", "2022-01-01T00:00:00-08:00"),
            ("08/14/2019", "2019-08-14T00:00:00-07:00"),
            ("14/08/2019", "2019-08-14T00:00:00-07:00"),
            ("14/08/2019 15:30", "2019-08-14T15:30:00-07:00"),
            ("03/04/2019", "2019-03-04T00:00:00-08:00"),
        ];
        for (raw, expected) in cases {
            assert_eq!(date_to_local(raw, pacific()).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn fractional_seconds_render_as_microseconds() {
        assert_eq!(
            date_to_local("2022-01-01T01:00:00.5Z", pacific()).unwrap(),
            "2021-12-31T17:00:00.500000-08:00"
        );
        assert_eq!(
            date_to_local("2022-01-01T01:00:00.000Z", pacific()).unwrap(),
            "2021-12-31T17:00:00-08:00"
        );
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        assert_eq!(resolve_timezone("America/Vancouver").unwrap(), chrono_tz::America::Vancouver);
        let err = resolve_timezone("Mars/Olympus").unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    fn table(columns: Vec<(&str, Vec<Option<&str>>)>) -> Table {
        let fields = columns
            .iter()
            .map(|(name, _)| Field::new(*name, DataType::Utf8).with_kind(ColumnKind::DateLike))
            .collect();
        let n = columns[0].1.len();
        let rows = (0..n)
            .map(|i| {
                columns
                    .iter()
                    .map(|(_, vals)| vals[i].map(|s| Value::Utf8(s.to_string())).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Table::new(Schema::new(fields), rows)
    }

    #[test]
    fn first_fully_convertible_column_wins() {
        let t = table(vec![
            ("issued", vec![Some("2022-01-01"), Some("garbage")]),
            ("expires", vec![Some("2023-01-01T08:00:00Z"), Some("2023-06-01T08:00:00Z")]),
        ]);
        let out = add_local_timestamp(t, pacific());
        assert_eq!(out.column_count(), 3);
        assert_eq!(
            out.value(0, DATETIME_COLUMN),
            Some(&Value::Utf8("2023-01-01T00:00:00-08:00".into()))
        );
        assert_eq!(
            out.value(1, DATETIME_COLUMN),
            Some(&Value::Utf8("2023-06-01T01:00:00-07:00".into()))
        );
    }

    #[test]
    fn null_value_abandons_candidate() {
        let t = table(vec![("issued", vec![Some("2022-01-01"), None])]);
        let out = add_local_timestamp(t.clone(), pacific());
        assert_eq!(out, t);
    }

    #[test]
    fn text_columns_are_not_candidates() {
        let t = Table::new(
            Schema::new(vec![Field::new("issued", DataType::Utf8)]),
            vec![vec![Value::Utf8("2022-01-01".into())]],
        );
        assert_eq!(add_local_timestamp(t, pacific()).column_count(), 1);
    }
}
