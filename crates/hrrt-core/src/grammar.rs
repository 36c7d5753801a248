//! File-name grammars for scanner output.
//!
//! Two mutually exclusive patterns are tried in order:
//!
//! * standard: `LAST_FIRST_HISTORY_PET_YYMMDD_HHMMSS_TYPE.EXT`
//! * ACS:      `LAST-FIRST-HISTORY-YYYY.M.D.H.M.S_TYPE.EXT`

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use regex::{Captures, Regex};
use std::fmt;
use std::sync::OnceLock;

use crate::error::Error;

const STD_PATTERN: &str = r"^(?P<name_last>[A-Za-z0-9]+)_(?P<name_first>[A-Za-z0-9]*)_(?P<history>[A-Za-z0-9]*)_PET_(?P<scan_date>\d{6})_(?P<scan_time>\d{6})_(?P<scan_type>[A-Za-z]{2})\.(?P<extn>[A-Za-z0-9.]+)$";
const ACS_PATTERN: &str = r"^(?P<name_last>[^-]+)-(?P<name_first>[^-]*)-(?P<history>[^-]*)-(?P<yr>\d{4})\.(?P<mo>\d{1,2})\.(?P<dy>\d{1,2})\.(?P<hr>\d{1,2})\.(?P<mn>\d{1,2})\.(?P<sc>\d{1,2})_(?P<scan_type>[A-Za-z]{2})\.(?P<extn>[A-Za-z0-9.]+)$";

const INDEX_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn std_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(STD_PATTERN).expect("standard name pattern is valid"))
}

fn acs_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ACS_PATTERN).expect("ACS name pattern is valid"))
}

/// Which grammar a name was parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Standard,
    Acs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScanType {
    Em,
    Tx,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Em => "EM",
            ScanType::Tx => "TX",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "EM" => Some(ScanType::Em),
            "TX" => Some(ScanType::Tx),
            _ => None,
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scan acquisition time. Every display form (YYMMDD, 4-digit ACS form, index
/// column) is derived from this one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanDateTime(NaiveDateTime);

impl ScanDateTime {
    pub fn from_components(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .map(ScanDateTime)
    }

    pub fn from_epoch(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(|dt| ScanDateTime(dt.naive_utc()))
    }

    /// Parse the `YYMMDD` / `HHMMSS` pair of the standard grammar. Years are 20YY.
    pub fn from_codes(date: &str, time: &str) -> Option<Self> {
        let field = |s: &str, at: usize| s.get(at..at + 2)?.parse::<u32>().ok();
        if date.len() != 6 || time.len() != 6 {
            return None;
        }
        Self::from_components(
            2000 + field(date, 0)? as i32,
            field(date, 2)?,
            field(date, 4)?,
            field(time, 0)?,
            field(time, 2)?,
            field(time, 4)?,
        )
    }

    pub fn parse_index(value: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(value, INDEX_FORMAT)
            .ok()
            .map(ScanDateTime)
    }

    pub fn epoch(&self) -> i64 {
        self.0.and_utc().timestamp()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn second(&self) -> u32 {
        self.0.second()
    }

    /// `YYMMDD`
    pub fn date_code(&self) -> String {
        format!(
            "{:02}{:02}{:02}",
            self.year().rem_euclid(100),
            self.month(),
            self.day()
        )
    }

    /// `HHMMSS`
    pub fn time_code(&self) -> String {
        format!("{:02}{:02}{:02}", self.hour(), self.minute(), self.second())
    }

    /// `YYMMDD_HHMMSS`
    pub fn datetime_code(&self) -> String {
        format!("{}_{}", self.date_code(), self.time_code())
    }

    /// `YYYY.M.D.H.M.S`, unpadded, as written by the scanner console.
    pub fn acs_code(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}.{}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }

    pub fn index_value(&self) -> String {
        self.0.format(INDEX_FORMAT).to_string()
    }
}

impl fmt::Display for ScanDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.datetime_code())
    }
}

/// Identity fields recovered from a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub name_last: String,
    pub name_first: String,
    pub history: String,
    pub datetime: ScanDateTime,
    pub scan_type: ScanType,
    pub extension: String,
    pub grammar: Grammar,
}

impl ParsedName {
    pub fn scan_date(&self) -> String {
        self.datetime.date_code()
    }

    pub fn scan_time(&self) -> String {
        self.datetime.time_code()
    }

    /// `last|first|history`
    pub fn subject_key(&self) -> String {
        format!("{}|{}|{}", self.name_last, self.name_first, self.history)
    }

    /// `date|time`
    pub fn scan_key(&self) -> String {
        format!("{}|{}", self.scan_date(), self.scan_time())
    }
}

/// Parse a bare file name (any leading path is ignored).
pub fn parse_name(file_name: &str) -> Result<ParsedName, Error> {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);

    if let Some(caps) = std_regex().captures(base) {
        let datetime = ScanDateTime::from_codes(&caps["scan_date"], &caps["scan_time"])
            .ok_or_else(|| metadata_error(base, "standard date/time out of range"))?;
        return build(base, &caps, datetime, Grammar::Standard);
    }

    if let Some(caps) = acs_regex().captures(base) {
        let datetime = acs_datetime(base, &caps)?;
        return build(base, &caps, datetime, Grammar::Acs);
    }

    Err(Error::NameParse(base.to_string()))
}

fn acs_datetime(base: &str, caps: &Captures<'_>) -> Result<ScanDateTime, Error> {
    let number = |group: &str| -> Result<u32, Error> {
        caps.name(group)
            .ok_or_else(|| metadata_error(base, &format!("missing '{}' field", group)))?
            .as_str()
            .parse::<u32>()
            .map_err(|e| metadata_error(base, &format!("'{}': {}", group, e)))
    };
    ScanDateTime::from_components(
        number("yr")? as i32,
        number("mo")?,
        number("dy")?,
        number("hr")?,
        number("mn")?,
        number("sc")?,
    )
    .ok_or_else(|| metadata_error(base, "ACS date/time out of range"))
}

fn build(
    base: &str,
    caps: &Captures<'_>,
    datetime: ScanDateTime,
    grammar: Grammar,
) -> Result<ParsedName, Error> {
    let scan_type = ScanType::parse(&caps["scan_type"])
        .ok_or_else(|| Error::NameParse(base.to_string()))?;
    let field = |group: &str| caps[group].trim().to_uppercase();
    Ok(ParsedName {
        name_last: field("name_last"),
        name_first: field("name_first"),
        history: field("history"),
        datetime,
        scan_type,
        extension: caps["extn"].to_lowercase(),
        grammar,
    })
}

fn metadata_error(name: &str, reason: &str) -> Error {
    Error::Metadata {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
