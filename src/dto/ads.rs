//! Ad unit, impression, click, revenue and KPI payloads.

use super::{
    parse_decimal, FieldErrors, FieldReader, Platform, CONVERSION_VALUE, COUNT, ID,
    IMPRESSION_REVENUE, MONEY,
};
use crate::db::{AdClickRow, AdImpressionRow, AdKpiRow, AdUnitRow};
use crate::kpi::KpiSettings;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

pub const DEFAULT_AD_NETWORK: &str = "AdMob";

/// Longest inclusive range accepted by the historical KPI recomputation.
pub const MAX_HISTORICAL_DAYS: i64 = 366;

/// Seconds between banner refreshes; stored as `INTEGER`.
const REFRESH_RATE: RangeInclusive<i64> = 0..=i32::MAX as i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdFormat {
    Banner,
    Interstitial,
    Rewarded,
    Native,
}

impl AdFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AdFormat::Banner => "banner",
            AdFormat::Interstitial => "interstitial",
            AdFormat::Rewarded => "rewarded",
            AdFormat::Native => "native",
        }
    }
}

impl FromStr for AdFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "banner" => Ok(AdFormat::Banner),
            "interstitial" => Ok(AdFormat::Interstitial),
            "rewarded" => Ok(AdFormat::Rewarded),
            "native" => Ok(AdFormat::Native),
            _ => Err(()),
        }
    }
}

/// Screen location an ad is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    #[default]
    HomeBanner,
    PlantDetail,
    CareTips,
    Settings,
}

impl Placement {
    pub const ALL: [Placement; 4] = [
        Placement::HomeBanner,
        Placement::PlantDetail,
        Placement::CareTips,
        Placement::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Placement::HomeBanner => "home_banner",
            Placement::PlantDetail => "plant_detail",
            Placement::CareTips => "care_tips",
            Placement::Settings => "settings",
        }
    }
}

impl FromStr for Placement {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Placement::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Ad units ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AdUnitInput {
    pub name: String,
    pub format: AdFormat,
    pub placement: Placement,
    pub unit_id_android: String,
    pub unit_id_ios: String,
    pub is_active: bool,
    pub is_test: bool,
    pub refresh_rate: i32,
    pub targeting_keywords: Vec<String>,
}

impl AdUnitInput {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let name = r.required_str("name", 100);
        let format = r.required_choice::<AdFormat>("format");
        let placement = r.required_choice::<Placement>("placement");
        let unit_id_android = r.optional_str("unit_id_android", 255).unwrap_or_default();
        let unit_id_ios = r.optional_str("unit_id_ios", 255).unwrap_or_default();
        let is_active = r.optional_bool("is_active").unwrap_or(true);
        let is_test = r.optional_bool("is_test").unwrap_or(true);
        let refresh_rate = match r.optional_i64("refresh_rate", REFRESH_RATE) {
            Some(n) => i32::try_from(n).ok(),
            None if r.has_error("refresh_rate") => None,
            None => Some(60),
        };
        let targeting_keywords = r.optional_str_list("targeting_keywords").unwrap_or_default();
        r.finish()?;
        match (name, format, placement, refresh_rate) {
            (Some(name), Some(format), Some(placement), Some(refresh_rate)) => Ok(AdUnitInput {
                name,
                format,
                placement,
                unit_id_android,
                unit_id_ios,
                is_active,
                is_test,
                refresh_rate,
                targeting_keywords,
            }),
            _ => Err(FieldErrors::single("non_field_errors", "Invalid ad unit.")),
        }
    }

    pub fn patch_base(unit: &AdUnitRow) -> Value {
        json!({
            "name": unit.name,
            "format": unit.format,
            "placement": unit.placement,
            "unit_id_android": unit.unit_id_android,
            "unit_id_ios": unit.unit_id_ios,
            "is_active": unit.is_active,
            "is_test": unit.is_test,
            "refresh_rate": unit.refresh_rate,
            "targeting_keywords": unit.targeting_keywords,
        })
    }
}

/// What the mobile client needs to request one ad: the unit id for its
/// platform plus display settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdUnitView {
    pub id: i64,
    pub name: String,
    pub format: String,
    pub placement: String,
    pub unit_id: String,
    pub is_test: bool,
    pub refresh_rate: i32,
    pub targeting_keywords: Vec<String>,
}

impl AdUnitView {
    pub fn new(unit: &AdUnitRow, platform: Platform) -> Self {
        let unit_id = match platform {
            Platform::Android => &unit.unit_id_android,
            Platform::Ios => &unit.unit_id_ios,
        };
        AdUnitView {
            id: unit.id,
            name: unit.name.clone(),
            format: unit.format.clone(),
            placement: unit.placement.clone(),
            unit_id: unit_id.clone(),
            is_test: unit.is_test,
            refresh_rate: unit.refresh_rate,
            targeting_keywords: unit.targeting_keywords.clone(),
        }
    }
}

/// Per-placement unit config: the first active unit for each placement wins.
/// `units` must already be ordered by preference.
pub fn placement_config(units: &[AdUnitRow], platform: Platform) -> BTreeMap<String, AdUnitView> {
    let mut out = BTreeMap::new();
    for unit in units.iter().filter(|u| u.is_active) {
        out.entry(unit.placement.clone())
            .or_insert_with(|| AdUnitView::new(unit, platform));
    }
    out
}

// ── Impressions and clicks ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ImpressionInput {
    pub ad_id: String,
    pub ad_network: String,
    pub ad_unit_id: Option<i64>,
    pub placement: Placement,
    pub device_id: Option<String>,
    pub device_platform: Option<String>,
    pub device_model: Option<String>,
    pub estimated_revenue: Decimal,
    pub is_test_ad: bool,
    pub metadata: Value,
}

impl ImpressionInput {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let ad_id = r.required_str("ad_id", 255);
        let ad_network = r
            .optional_str("ad_network", 100)
            .unwrap_or_else(|| DEFAULT_AD_NETWORK.to_string());
        let ad_unit_id = r.optional_i64_any(&["ad_unit_id", "ad_unit"], ID);
        let placement = r.required_choice::<Placement>("placement");
        let device_id = r.optional_str("device_id", 255);
        let device_platform = r.optional_str("device_platform", 50);
        let device_model = r.optional_str("device_model", 255);
        let estimated_revenue = r
            .optional_decimal("estimated_revenue", IMPRESSION_REVENUE)
            .unwrap_or_default();
        let is_test_ad = r.optional_bool("is_test_ad").unwrap_or(false);
        let metadata = r.optional_object("metadata").unwrap_or_else(|| json!({}));
        r.finish()?;
        match (ad_id, placement) {
            (Some(ad_id), Some(placement)) => Ok(ImpressionInput {
                ad_id,
                ad_network,
                ad_unit_id,
                placement,
                device_id,
                device_platform,
                device_model,
                estimated_revenue,
                is_test_ad,
                metadata,
            }),
            _ => Err(FieldErrors::single("non_field_errors", "Invalid impression.")),
        }
    }

    /// Best-effort extraction for tracking payloads that failed validation.
    /// Anything unusable falls back to a default; the validation errors are
    /// kept in `metadata.fallback_errors`.
    pub fn fallback(body: &Value, errors: &FieldErrors) -> Self {
        let text = |key: &str| {
            body.get(key).and_then(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };
        let int = |key: &str| {
            body.get(key).and_then(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
        };

        let mut metadata = match body.get("metadata") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => json!({}),
        };
        if let Some(map) = metadata.as_object_mut() {
            map.insert("fallback_errors".to_string(), json!(errors));
        }

        ImpressionInput {
            ad_id: text("ad_id").unwrap_or_else(|| format!("auto-{}", uuid::Uuid::new_v4())),
            ad_network: text("ad_network").unwrap_or_else(|| DEFAULT_AD_NETWORK.to_string()),
            ad_unit_id: int("ad_unit_id").or_else(|| int("ad_unit")).filter(|id| *id > 0),
            placement: text("placement")
                .and_then(|p| p.parse().ok())
                .unwrap_or_default(),
            device_id: text("device_id"),
            device_platform: text("device_platform").or_else(|| text("platform")),
            device_model: text("device_model"),
            estimated_revenue: body
                .get("estimated_revenue")
                .and_then(parse_decimal)
                .filter(|d| !d.is_sign_negative())
                .and_then(|d| IMPRESSION_REVENUE.fit(d))
                .unwrap_or_default(),
            is_test_ad: body
                .get("is_test_ad")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            metadata,
        }
    }

    /// Strict validation, then the fallback path. Never fails.
    pub fn from_tracking_payload(body: &Value) -> Self {
        match Self::from_json(body) {
            Ok(input) => input,
            Err(errors) => Self::fallback(body, &errors),
        }
    }
}

/// An impression with its clicks nested, as returned on read.
#[derive(Debug, Clone, Serialize)]
pub struct ImpressionView {
    #[serde(flatten)]
    pub impression: AdImpressionRow,
    pub clicks: Vec<AdClickRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickInput {
    pub impression_id: i64,
    pub conversion_type: Option<String>,
    pub conversion_value: Option<Decimal>,
}

impl ClickInput {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let impression_id = r.required_i64_any(&["impression_id", "impression"], ID);
        let conversion_type = r.optional_str("conversion_type", 100);
        let conversion_value = r.optional_decimal("conversion_value", CONVERSION_VALUE);
        r.finish()?;
        Ok(ClickInput {
            impression_id: impression_id.unwrap_or_default(),
            conversion_type,
            conversion_value,
        })
    }
}

/// Body of the test ad request used by the mobile client during integration.
#[derive(Debug, Clone, PartialEq)]
pub struct TestAdRequest {
    pub placement: Placement,
    pub device_id: Option<String>,
    pub platform: Platform,
}

impl TestAdRequest {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let placement = r.optional_choice::<Placement>("placement").unwrap_or_default();
        let device_id = r.optional_str("device_id", 255);
        let platform = r.optional_choice::<Platform>("platform").unwrap_or_default();
        r.finish()?;
        Ok(TestAdRequest {
            placement,
            device_id,
            platform,
        })
    }
}

// ── Revenue ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueInput {
    pub ad_unit_id: i64,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub revenue: Decimal,
    pub ecpm: Decimal,
    pub fill_rate: f64,
}

impl RevenueInput {
    /// `ecpm` is computed from revenue and impressions when not supplied.
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let ad_unit_id = r.required_i64_any(&["ad_unit_id", "ad_unit"], ID);
        let date = r.required_date("date");
        let impressions = r.optional_i64("impressions", COUNT).unwrap_or(0);
        let clicks = r.optional_i64("clicks", COUNT).unwrap_or(0);
        let revenue = r.optional_decimal("revenue", MONEY).unwrap_or_default();
        let ecpm = match r.optional_decimal("ecpm", MONEY) {
            Some(ecpm) => Some(ecpm),
            None if r.has_error("ecpm") => None,
            None => derived_ecpm(&mut r, revenue, impressions),
        };
        let fill_rate = r.optional_f64("fill_rate", 0.0..=100.0).unwrap_or(0.0);
        if clicks > impressions {
            r.error("clicks", "Clicks cannot exceed impressions.");
        }
        r.finish()?;
        match (ad_unit_id, date, ecpm) {
            (Some(ad_unit_id), Some(date), Some(ecpm)) => Ok(RevenueInput {
                ad_unit_id,
                date,
                impressions,
                clicks,
                revenue,
                ecpm,
                fill_rate,
            }),
            _ => Err(FieldErrors::single("non_field_errors", "Invalid revenue row.")),
        }
    }

    pub fn patch_base(row: &crate::db::AdRevenueRow) -> Value {
        json!({
            "ad_unit_id": row.ad_unit_id,
            "date": row.date,
            "impressions": row.impressions,
            "clicks": row.clicks,
            "revenue": row.revenue,
            "ecpm": row.ecpm,
            "fill_rate": row.fill_rate,
        })
    }
}

/// eCPM computed from a row's totals. Large revenue over few impressions can
/// exceed the money column; that is reported against `revenue`.
fn derived_ecpm(r: &mut FieldReader<'_>, revenue: Decimal, impressions: i64) -> Option<Decimal> {
    let ecpm = MONEY.fit(crate::kpi::ecpm(revenue, impressions));
    if ecpm.is_none() {
        r.error("revenue", "Revenue is too large for the reported impressions.");
    }
    ecpm
}

/// How a row of an AdMob report names its ad unit.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitRef {
    Id(i64),
    /// An AdMob unit id string, matched against either platform's id.
    AdmobId(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdmobReportRow {
    pub unit: UnitRef,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub revenue: Decimal,
    pub ecpm: Decimal,
    pub fill_rate: f64,
}

impl AdmobReportRow {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let id = r.optional_i64_any(&["ad_unit_id", "ad_unit"], ID);
        let admob_id = r.optional_str("unit_id", 255);
        let date = r.required_date("date");
        let impressions = r.optional_i64("impressions", COUNT).unwrap_or(0);
        let clicks = r.optional_i64("clicks", COUNT).unwrap_or(0);
        let revenue = r.optional_decimal("revenue", MONEY);
        let ecpm = match revenue {
            Some(revenue) => derived_ecpm(&mut r, revenue, impressions),
            None if r.has_error("revenue") => None,
            None => Some(Decimal::ZERO),
        };
        let fill_rate = r.optional_f64("fill_rate", 0.0..=100.0).unwrap_or(0.0);
        let unit = match (id, admob_id) {
            (Some(id), _) => Some(UnitRef::Id(id)),
            (None, Some(s)) => Some(UnitRef::AdmobId(s)),
            (None, None) => {
                if !r.has_errors() {
                    r.error("ad_unit_id", "Either ad_unit_id or unit_id is required.");
                }
                None
            }
        };
        r.finish()?;
        match (unit, date, ecpm) {
            (Some(unit), Some(date), Some(ecpm)) => Ok(AdmobReportRow {
                unit,
                date,
                impressions,
                clicks,
                revenue: revenue.unwrap_or_default(),
                ecpm,
                fill_rate,
            }),
            _ => Err(FieldErrors::single("non_field_errors", "Invalid report row.")),
        }
    }

    /// Read the `rows` array of a report body. Returns the parsed rows and
    /// the rejected rows' errors, each tagged with its index in the report.
    #[allow(clippy::type_complexity)]
    pub fn parse_report(
        body: &Value,
    ) -> Result<(Vec<(usize, Self)>, Vec<(usize, FieldErrors)>), FieldErrors> {
        let rows = match body.get("rows") {
            Some(Value::Array(rows)) => rows,
            Some(_) => return Err(FieldErrors::single("rows", "Expected a list of report rows.")),
            None => return Err(FieldErrors::single("rows", super::REQUIRED)),
        };
        let mut ok = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            match Self::from_json(row) {
                Ok(parsed) => ok.push((i, parsed)),
                Err(e) => rejected.push((i, e)),
            }
        }
        Ok((ok, rejected))
    }
}

// ── KPIs ───────────────────────────────────────────────────────

/// Raw counts for a KPI row. Derived columns are never accepted from input.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiInput {
    pub date: NaiveDate,
    pub active_users: i64,
    pub total_impressions: i64,
}

impl KpiInput {
    /// `total_impressions` is capped so the derived estimated revenue fits
    /// its money column at the configured per-impression rate.
    pub fn from_json(body: &Value, settings: &KpiSettings) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let date = r.required_date("date");
        let active_users = r.optional_i64("active_users", COUNT).unwrap_or(0);
        let total_impressions = r
            .optional_i64("total_impressions", 0..=settings.max_total_impressions())
            .unwrap_or(0);
        r.finish()?;
        match date {
            Some(date) => Ok(KpiInput {
                date,
                active_users,
                total_impressions,
            }),
            None => Err(FieldErrors::single("date", super::REQUIRED)),
        }
    }

    pub fn patch_base(row: &AdKpiRow) -> Value {
        json!({
            "date": row.date,
            "active_users": row.active_users,
            "total_impressions": row.total_impressions,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KpiView {
    #[serde(flatten)]
    pub kpi: AdKpiRow,
    pub target_percentage: f64,
}

impl KpiView {
    pub fn new(kpi: AdKpiRow, target: f64) -> Self {
        let target_percentage = crate::kpi::target_percentage(kpi.impressions_per_user, target);
        KpiView {
            kpi,
            target_percentage,
        }
    }
}

/// Body of `calculate_daily_kpi`: an optional date, today when absent.
pub fn daily_kpi_date(body: &Value, today: NaiveDate) -> Result<NaiveDate, FieldErrors> {
    if body.is_null() {
        return Ok(today);
    }
    let mut r = FieldReader::new(body);
    let date = r.optional_date("date");
    r.finish()?;
    Ok(date.unwrap_or(today))
}

/// Body of `calculate_historical_kpi`: an inclusive `start_date..=end_date`.
pub fn historical_range(body: &Value) -> Result<(NaiveDate, NaiveDate), FieldErrors> {
    let mut r = FieldReader::new(body);
    let start = r.required_date("start_date");
    let end = r.required_date("end_date");
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            r.error("end_date", "End date must not be before start date.");
        } else if (end - start).num_days() + 1 > MAX_HISTORICAL_DAYS {
            r.error(
                "end_date",
                format!("Range may span at most {} days.", MAX_HISTORICAL_DAYS),
            );
        }
    }
    r.finish()?;
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(FieldErrors::single("non_field_errors", "Invalid date range.")),
    }
}
