use crate::error::{FeesError, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Years the calendar accepts; keeps every derived date representable
pub const MIN_ACADEMIC_YEAR: i32 = 1900;
pub const MAX_ACADEMIC_YEAR: i32 = 9998;

/// Student identifier (issued by the identity layer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(String);

impl RouteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal payment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaymentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A June-to-May academic year, written `YYYY-YYYY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcademicYear {
    start_year: i32,
}

impl AcademicYear {
    pub fn new(start_year: i32) -> Result<Self> {
        if !(MIN_ACADEMIC_YEAR..=MAX_ACADEMIC_YEAR).contains(&start_year) {
            return Err(FeesError::validation(format!(
                "academic year {} is outside the supported range",
                start_year
            )));
        }
        Ok(Self { start_year })
    }

    /// June onwards belongs to the year starting that calendar year
    pub fn for_date(date: NaiveDate) -> Result<Self> {
        if date.month() >= 6 {
            Self::new(date.year())
        } else {
            Self::new(date.year() - 1)
        }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + 1
    }

    pub fn previous(&self) -> Result<Self> {
        Self::new(self.start_year - 1)
    }

    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: ymd(self.start_year, 6, 1),
            end: ymd(self.end_year(), 5, 31),
        }
    }

    pub fn term_window(&self, term: Term) -> DateWindow {
        match term {
            Term::First => DateWindow {
                start: ymd(self.start_year, 6, 1),
                end: ymd(self.start_year, 9, 30),
            },
            Term::Second => DateWindow {
                start: ymd(self.start_year, 10, 1),
                end: ymd(self.end_year(), 1, 31),
            },
            Term::Third => DateWindow {
                start: ymd(self.end_year(), 2, 1),
                end: ymd(self.end_year(), 5, 31),
            },
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("calendar boundaries are valid for supported academic years")
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year())
    }
}

impl FromStr for AcademicYear {
    type Err = FeesError;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| FeesError::validation(format!("invalid academic year '{}'", s)))?;
        let start: i32 = start
            .trim()
            .parse()
            .map_err(|_| FeesError::validation(format!("invalid academic year '{}'", s)))?;
        let end: i32 = end
            .trim()
            .parse()
            .map_err(|_| FeesError::validation(format!("invalid academic year '{}'", s)))?;
        if end != start + 1 {
            return Err(FeesError::validation(format!(
                "academic year '{}' must span consecutive years",
                s
            )));
        }
        Self::new(start)
    }
}

impl TryFrom<String> for AcademicYear {
    type Error = FeesError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AcademicYear> for String {
    fn from(year: AcademicYear) -> Self {
        year.to_string()
    }
}

/// One of the three academic sub-periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub fn number(&self) -> u8 {
        match self {
            Term::First => 1,
            Term::Second => 2,
            Term::Third => 3,
        }
    }

    pub fn from_number(number: u8) -> Result<Self> {
        match number {
            1 => Ok(Term::First),
            2 => Ok(Term::Second),
            3 => Ok(Term::Third),
            other => Err(FeesError::validation(format!(
                "term must be 1, 2 or 3 (got {})",
                other
            ))),
        }
    }

    /// The term that starts a year, by month
    pub fn for_month(month: u32) -> Self {
        match month {
            6..=9 => Term::First,
            10..=12 | 1 => Term::Second,
            _ => Term::Third,
        }
    }

    pub fn receipt_color(&self) -> ReceiptColor {
        match self {
            Term::First => ReceiptColor::White,
            Term::Second => ReceiptColor::Blue,
            Term::Third => ReceiptColor::Yellow,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term {}", self.number())
    }
}

impl TryFrom<u8> for Term {
    type Error = FeesError;

    fn try_from(value: u8) -> Result<Self> {
        Term::from_number(value)
    }
}

impl From<Term> for u8 {
    fn from(term: Term) -> Self {
        term.number()
    }
}

/// Policy-assigned receipt color distinguishing term products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptColor {
    White,
    Blue,
    Yellow,
    Green,
}

impl fmt::Display for ReceiptColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptColor::White => write!(f, "white"),
            ReceiptColor::Blue => write!(f, "blue"),
            ReceiptColor::Yellow => write!(f, "yellow"),
            ReceiptColor::Green => write!(f, "green"),
        }
    }
}

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(FeesError::validation(format!(
                "window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn extended_by(&self, days: u32) -> Self {
        Self {
            start: self.start,
            end: self.end + Duration::days(i64::from(days)),
        }
    }
}
