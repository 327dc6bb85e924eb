//! Service calendar: maps wall-clock time onto a model time slot.
//!
//! A slot is a (day type, hour range) pair. Day types follow the operator's
//! timetable classes: `LA` (Monday to Friday), `SA` (Saturday) and `FE`
//! (Sunday or public holiday). Hour ranges are half-open `[start, end)`
//! buckets written as `"7-8"`. A time outside every bucket is outside
//! service hours and no slot applies.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Timetable day class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayType {
    #[serde(rename = "LA")]
    Weekday,
    #[serde(rename = "SA")]
    Saturday,
    #[serde(rename = "FE")]
    Holiday,
}

impl DayType {
    pub const ALL: [DayType; 3] = [DayType::Weekday, DayType::Saturday, DayType::Holiday];

    pub fn as_str(self) -> &'static str {
        match self {
            DayType::Weekday => "LA",
            DayType::Saturday => "SA",
            DayType::Holiday => "FE",
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LA" => Ok(DayType::Weekday),
            "SA" => Ok(DayType::Saturday),
            "FE" => Ok(DayType::Holiday),
            other => Err(format!("unknown day type '{other}' (expected LA, SA or FE)")),
        }
    }
}

/// Half-open hour bucket `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HourRange {
    pub start: u8,
    pub end: u8,
}

impl HourRange {
    pub fn new(start: u8, end: u8) -> Result<Self, String> {
        if start >= end || end > 24 {
            return Err(format!("hour range {start}-{end} must satisfy 0 <= start < end <= 24"));
        }
        Ok(HourRange { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        hour >= u32::from(self.start) && hour < u32::from(self.end)
    }
}

impl fmt::Display for HourRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for HourRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| format!("hour range '{s}' must look like '7-8'"))?;
        let start = a
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("hour range '{s}': {e}"))?;
        let end = b
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("hour range '{s}': {e}"))?;
        HourRange::new(start, end)
    }
}

impl TryFrom<String> for HourRange {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HourRange> for String {
    fn from(r: HourRange) -> String {
        r.to_string()
    }
}

/// Model selection key for "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlot {
    pub day_type: DayType,
    pub hour_range: HourRange,
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.day_type, self.hour_range)
    }
}

fn default_hour_ranges() -> Vec<HourRange> {
    (7u8..23).map(|h| HourRange { start: h, end: h + 1 }).collect()
}

/// Contents of `calendar.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCalendar {
    #[serde(default = "default_hour_ranges")]
    pub hour_ranges: Vec<HourRange>,

    /// Dates treated as `FE` regardless of weekday.
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for ServiceCalendar {
    fn default() -> Self {
        ServiceCalendar {
            hour_ranges: default_hour_ranges(),
            holidays: BTreeSet::new(),
        }
    }
}

impl ServiceCalendar {
    pub fn day_type(&self, date: NaiveDate) -> DayType {
        if self.holidays.contains(&date) {
            return DayType::Holiday;
        }
        match date.weekday() {
            Weekday::Sat => DayType::Saturday,
            Weekday::Sun => DayType::Holiday,
            _ => DayType::Weekday,
        }
    }

    /// First configured bucket containing `hour`.
    pub fn hour_range(&self, hour: u32) -> Option<HourRange> {
        self.hour_ranges.iter().copied().find(|r| r.contains(hour))
    }

    /// Slot for a local wall-clock time, or `None` outside service hours.
    pub fn slot_at(&self, local: NaiveDateTime) -> Option<TimeSlot> {
        let hour_range = self.hour_range(local.hour())?;
        Some(TimeSlot {
            day_type: self.day_type(local.date()),
            hour_range,
        })
    }
}
