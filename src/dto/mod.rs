//! # DTO: Request Validation and Response Shaping
//!
//! Request bodies arrive as loose JSON. Each input type reads its fields
//! through a [`FieldReader`], which collects every problem into a
//! [`FieldErrors`] map (`{"field": ["message", ...]}`) instead of stopping at
//! the first one, so a 400 response can report all invalid fields at once.
//!
//! Partial updates (PATCH) are handled by [`merge_patch`]: the stored row is
//! serialized, the request's keys are overlaid, and the merged object is
//! validated exactly like a create payload.

mod ads;
mod plants;
mod users;

pub use ads::*;
pub use plants::*;
pub use users::*;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::str::FromStr;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";

/// Range of a non-negative `BIGINT` count.
pub const COUNT: RangeInclusive<i64> = 0..=i64::MAX;
/// Range of a `BIGSERIAL` reference.
pub const ID: RangeInclusive<i64> = 1..=i64::MAX;

/// Precision and scale of a `NUMERIC(p, s)` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numeric {
    pub precision: u32,
    pub scale: u32,
}

/// `ad_impressions.estimated_revenue`.
pub const IMPRESSION_REVENUE: Numeric = Numeric::new(10, 6);
/// `ad_clicks.conversion_value`.
pub const CONVERSION_VALUE: Numeric = Numeric::new(10, 2);
/// Revenue, eCPM and the KPI money columns.
pub const MONEY: Numeric = Numeric::new(12, 6);

impl Numeric {
    pub const fn new(precision: u32, scale: u32) -> Self {
        Numeric { precision, scale }
    }

    pub fn integer_digits(self) -> u32 {
        self.precision - self.scale
    }

    /// Largest magnitude the column stores.
    pub fn max(self) -> Decimal {
        Decimal::new(10i64.pow(self.precision) - 1, self.scale)
    }

    /// `value` rounded the way Postgres rounds on insert, or `None` when it
    /// would overflow the column.
    pub fn fit(self, value: Decimal) -> Option<Decimal> {
        let rounded =
            value.round_dp_with_strategy(self.scale, RoundingStrategy::MidpointAwayFromZero);
        (rounded.abs() <= self.max()).then_some(rounded)
    }

    pub fn overflow_message(self) -> String {
        format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            self.integer_digits()
        )
    }
}

/// Field name to list of validation messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Overlay the keys of `patch` onto `base`. Both must be JSON objects;
/// a non-object patch leaves `base` untouched.
pub fn merge_patch(mut base: Value, patch: &Value) -> Value {
    if let (Some(target), Some(source)) = (base.as_object_mut(), patch.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
    base
}

/// Reads typed fields from a JSON object, accumulating errors.
pub struct FieldReader<'a> {
    obj: &'a Map<String, Value>,
    errors: FieldErrors,
}

static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();

impl<'a> FieldReader<'a> {
    /// Start reading `value`. A non-object body is reported under
    /// `non_field_errors` and every field reads as absent.
    pub fn new(value: &'a Value) -> Self {
        match value.as_object() {
            Some(obj) => FieldReader {
                obj,
                errors: FieldErrors::new(),
            },
            None => FieldReader {
                obj: EMPTY.get_or_init(Map::new),
                errors: FieldErrors::single("non_field_errors", "Expected a JSON object."),
            },
        }
    }

    /// First present, non-null key among `keys`.
    fn lookup(&self, keys: &[&'a str]) -> Option<(&'a str, &'a Value)> {
        keys.iter()
            .find_map(|k| self.obj.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn required_str(&mut self, key: &str, max_len: usize) -> Option<String> {
        match self.obj.get(key) {
            None | Some(Value::Null) => {
                self.errors.add(key, REQUIRED);
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.errors.add(key, BLANK);
                None
            }
            Some(v) => self.string_value(key, v, max_len),
        }
    }

    /// Absent, null, or blank strings read as `None`.
    pub fn optional_str(&mut self, key: &str, max_len: usize) -> Option<String> {
        match self.obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => self.string_value(key, v, max_len),
        }
    }

    fn string_value(&mut self, key: &str, v: &Value, max_len: usize) -> Option<String> {
        let s = match v {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                self.errors.add(key, "Not a valid string.");
                return None;
            }
        };
        if s.chars().count() > max_len {
            self.errors.add(
                key,
                format!("Ensure this field has no more than {} characters.", max_len),
            );
            return None;
        }
        Some(s)
    }

    pub fn optional_i64(&mut self, key: &'a str, range: RangeInclusive<i64>) -> Option<i64> {
        self.optional_i64_any(&[key], range)
    }

    /// Like [`optional_i64`](Self::optional_i64) but accepts several aliases
    /// for the same field; errors are reported under the first alias.
    pub fn optional_i64_any(
        &mut self,
        keys: &[&'a str],
        range: RangeInclusive<i64>,
    ) -> Option<i64> {
        let (key, v) = self.lookup(keys)?;
        let parsed = match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let field = keys.first().copied().unwrap_or(key);
        match parsed {
            Some(n) if n < *range.start() => {
                self.errors.add(
                    field,
                    format!("Ensure this value is greater than or equal to {}.", range.start()),
                );
                None
            }
            Some(n) if n > *range.end() => {
                self.errors.add(
                    field,
                    format!("Ensure this value is less than or equal to {}.", range.end()),
                );
                None
            }
            Some(n) => Some(n),
            None => {
                self.errors.add(field, "A valid integer is required.");
                None
            }
        }
    }

    pub fn required_i64_any(
        &mut self,
        keys: &[&'a str],
        range: RangeInclusive<i64>,
    ) -> Option<i64> {
        if self.lookup(keys).is_none() {
            self.errors.add(keys.first().copied().unwrap_or("id"), REQUIRED);
            return None;
        }
        self.optional_i64_any(keys, range)
    }

    pub fn optional_f64(&mut self, key: &str, range: RangeInclusive<f64>) -> Option<f64> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        let parsed = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(x) if x.is_finite() && range.contains(&x) => Some(x),
            Some(_) => {
                self.errors.add(
                    key,
                    format!(
                        "Ensure this value is between {} and {}.",
                        range.start(),
                        range.end()
                    ),
                );
                None
            }
            None => {
                self.errors.add(key, "A valid number is required.");
                None
            }
        }
    }

    pub fn optional_bool(&mut self, key: &str) -> Option<bool> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => {
                    self.errors.add(key, "Must be a valid boolean.");
                    None
                }
            },
            Value::Number(n) if n.as_i64() == Some(0) => Some(false),
            Value::Number(n) if n.as_i64() == Some(1) => Some(true),
            _ => {
                self.errors.add(key, "Must be a valid boolean.");
                None
            }
        }
    }

    /// Non-negative fixed-point decimal from a JSON number or numeric string,
    /// rounded to the column scale. Values with more integer digits than
    /// `column` holds are rejected.
    pub fn optional_decimal(&mut self, key: &str, column: Numeric) -> Option<Decimal> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        match parse_decimal(v) {
            Some(d) if d.is_sign_negative() && !d.is_zero() => {
                self.errors
                    .add(key, "Ensure this value is greater than or equal to 0.");
                None
            }
            Some(d) => match column.fit(d) {
                Some(d) => Some(d),
                None => {
                    self.errors.add(key, column.overflow_message());
                    None
                }
            },
            None => {
                self.errors.add(key, "A valid number is required.");
                None
            }
        }
    }

    pub fn optional_datetime(&mut self, key: &str) -> Option<DateTime<Utc>> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        match v.as_str().and_then(parse_datetime) {
            Some(dt) => Some(dt),
            None => {
                self.errors.add(
                    key,
                    "Datetime has wrong format. Use RFC 3339, e.g. 2025-05-01T08:30:00Z.",
                );
                None
            }
        }
    }

    pub fn optional_date(&mut self, key: &str) -> Option<NaiveDate> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        match v.as_str().and_then(parse_date) {
            Some(d) => Some(d),
            None => {
                self.errors
                    .add(key, "Date has wrong format. Use YYYY-MM-DD.");
                None
            }
        }
    }

    pub fn required_date(&mut self, key: &str) -> Option<NaiveDate> {
        if self.obj.get(key).filter(|v| !v.is_null()).is_none() {
            self.errors.add(key, REQUIRED);
            return None;
        }
        self.optional_date(key)
    }

    /// Parse a string field into one of a fixed set of choices.
    pub fn optional_choice<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        match v.as_str().and_then(|s| s.trim().parse::<T>().ok()) {
            Some(c) => Some(c),
            None => {
                let shown = v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string());
                self.errors
                    .add(key, format!("\"{}\" is not a valid choice.", shown));
                None
            }
        }
    }

    pub fn required_choice<T: FromStr>(&mut self, key: &str) -> Option<T> {
        if self.obj.get(key).filter(|v| !v.is_null()).is_none() {
            self.errors.add(key, REQUIRED);
            return None;
        }
        self.optional_choice(key)
    }

    /// A JSON object field (e.g. free-form metadata).
    pub fn optional_object(&mut self, key: &str) -> Option<Value> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        if v.is_object() {
            Some(v.clone())
        } else {
            self.errors.add(key, "Expected a JSON object.");
            None
        }
    }

    /// A list of strings; a single comma-separated string is also accepted.
    pub fn optional_str_list(&mut self, key: &str) -> Option<Vec<String>> {
        let v = self.obj.get(key).filter(|v| !v.is_null())?;
        match v {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                        Some(_) => {}
                        None => {
                            self.errors.add(key, "Expected a list of strings.");
                            return None;
                        }
                    }
                }
                Some(out)
            }
            Value::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            _ => {
                self.errors.add(key, "Expected a list of strings.");
                None
            }
        }
    }

    pub fn optional_url(&mut self, key: &str) -> Option<String> {
        let s = self.optional_str(key, 2048)?;
        match url::Url::parse(&s) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Some(s),
            _ => {
                self.errors.add(key, "Enter a valid URL.");
                None
            }
        }
    }

    pub fn optional_email(&mut self, key: &str) -> Option<String> {
        let s = self.optional_str(key, 254)?;
        if is_valid_email(&s) {
            Some(s.to_ascii_lowercase())
        } else {
            self.errors.add(key, "Enter a valid email address.");
            None
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains(field)
    }

    pub fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }
}

pub fn parse_decimal(v: &Value) -> Option<Decimal> {
    let s = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(s: &str) -> bool {
    let mut parts = s.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Mobile platform used to pick per-platform ad unit ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Android,
    Ios,
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            _ => Err(()),
        }
    }
}

impl Platform {
    /// Lenient parse for query strings: unknown or missing means Android.
    pub fn from_query(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

/// Query string for the time-windowed report endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

impl DaysQuery {
    pub const DEFAULT_DAYS: i64 = 30;

    pub fn days(&self) -> i64 {
        self.days.unwrap_or(Self::DEFAULT_DAYS).clamp(1, 365)
    }

    pub fn window(&self, now: DateTime<Utc>) -> ReportWindow {
        ReportWindow::ending_at(now, self.days())
    }
}

/// The `[now - days, now]` span of a report plus the calendar days it
/// touches, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportWindow {
    pub days: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn ending_at(end: DateTime<Utc>, days: i64) -> Self {
        ReportWindow {
            days,
            start: end - chrono::Duration::days(days),
            end,
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end_date();
        self.start_date().iter_days().take_while(move |d| *d <= end)
    }
}
