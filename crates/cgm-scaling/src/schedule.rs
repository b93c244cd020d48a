//! Scheduled exchanges the balancing run aims for.
//!
//! AC rows give an area's net position towards its neighbours, DC rows give
//! the setpoint of one registered DC link. Both are export-positive from the
//! perspective of `out_domain`; a row recorded against `in_domain` counts
//! with the opposite sign.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::{fs, path::Path};

use cgm_core::{AreaCode, Megawatts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ScalingError, ScalingResult};

/// Validity horizon of a published schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeHorizon {
    #[serde(rename = "1D")]
    DayAhead,
    #[serde(rename = "2D")]
    TwoDaysAhead,
    #[serde(rename = "ID")]
    Intraday,
    #[serde(rename = "WK")]
    Week,
    #[serde(rename = "MO")]
    Month,
    #[serde(rename = "YR")]
    Year,
}

impl TimeHorizon {
    pub fn code(&self) -> &'static str {
        match self {
            TimeHorizon::DayAhead => "1D",
            TimeHorizon::TwoDaysAhead => "2D",
            TimeHorizon::Intraday => "ID",
            TimeHorizon::Week => "WK",
            TimeHorizon::Month => "MO",
            TimeHorizon::Year => "YR",
        }
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TimeHorizon {
    type Err = ScalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1D" => Ok(TimeHorizon::DayAhead),
            "2D" => Ok(TimeHorizon::TwoDaysAhead),
            "ID" => Ok(TimeHorizon::Intraday),
            "WK" => Ok(TimeHorizon::Week),
            "MO" => Ok(TimeHorizon::Month),
            "YR" => Ok(TimeHorizon::Year),
            other => Err(ScalingError::Schedule(format!(
                "unknown time horizon '{other}' (expected 1D, 2D, ID, WK, MO or YR)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcScheduleRow {
    pub value: f64,
    #[serde(default)]
    pub in_domain: Option<AreaCode>,
    #[serde(default)]
    pub out_domain: Option<AreaCode>,
}

impl AcScheduleRow {
    pub fn export(area: impl Into<AreaCode>, value: f64) -> Self {
        Self {
            value,
            in_domain: None,
            out_domain: Some(area.into()),
        }
    }

    pub fn import(area: impl Into<AreaCode>, value: f64) -> Self {
        Self {
            value,
            in_domain: Some(area.into()),
            out_domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcScheduleRow {
    pub value: f64,
    pub registered_resource: String,
    #[serde(default)]
    pub in_domain: Option<AreaCode>,
    #[serde(default)]
    pub out_domain: Option<AreaCode>,
}

impl DcScheduleRow {
    pub fn new(
        resource: impl Into<String>,
        value: f64,
        in_domain: Option<AreaCode>,
        out_domain: Option<AreaCode>,
    ) -> Self {
        Self {
            value,
            registered_resource: resource.into(),
            in_domain,
            out_domain,
        }
    }

    /// Setpoint seen from `area`: `+value` when it is the out domain,
    /// `-value` when it is the in domain, `None` otherwise.
    pub fn value_for(&self, area: &AreaCode) -> Option<f64> {
        if self.out_domain.as_ref() == Some(area) {
            Some(self.value)
        } else if self.in_domain.as_ref() == Some(area) {
            Some(-self.value)
        } else {
            None
        }
    }
}

/// Net position target per area, summing every row the area appears in.
pub fn resolve_ac_targets(rows: &[AcScheduleRow]) -> BTreeMap<AreaCode, Megawatts> {
    let mut targets: BTreeMap<AreaCode, Megawatts> = BTreeMap::new();
    for row in rows {
        if let Some(area) = &row.out_domain {
            *targets.entry(area.clone()).or_default() += Megawatts(row.value);
        }
        if let Some(area) = &row.in_domain {
            *targets.entry(area.clone()).or_default() -= Megawatts(row.value);
        }
    }
    targets
}

/// Supplier of schedules for one horizon and instant.
///
/// An empty list means nothing is published; the engine turns that into
/// [`crate::BalanceStatus::ScheduleUnavailable`]. `Err` is reserved for a
/// source that could not be read.
pub trait ScheduleSource {
    fn ac_targets(
        &self,
        horizon: TimeHorizon,
        at: DateTime<Utc>,
    ) -> ScalingResult<Vec<AcScheduleRow>>;

    fn dc_targets(
        &self,
        horizon: TimeHorizon,
        at: DateTime<Utc>,
    ) -> ScalingResult<Vec<DcScheduleRow>>;
}

/// Where and when a row applies. Missing fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon: Option<TimeHorizon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl Validity {
    pub fn new(horizon: TimeHorizon, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            horizon: Some(horizon),
            start: Some(start),
            end: Some(end),
        }
    }

    /// `[start, end)` containment plus horizon match.
    pub fn covers(&self, horizon: TimeHorizon, at: DateTime<Utc>) -> bool {
        self.horizon.map_or(true, |h| h == horizon)
            && self.start.map_or(true, |s| s <= at)
            && self.end.map_or(true, |e| at < e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timed<R> {
    #[serde(flatten)]
    pub validity: Validity,
    #[serde(flatten)]
    pub row: R,
}

/// In-memory schedule store, optionally loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticSchedules {
    #[serde(default)]
    pub ac: Vec<Timed<AcScheduleRow>>,
    #[serde(default)]
    pub dc: Vec<Timed<DcScheduleRow>>,
}

impl StaticSchedules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows that apply to every horizon and instant.
    pub fn fixed(ac: Vec<AcScheduleRow>, dc: Vec<DcScheduleRow>) -> Self {
        Self {
            ac: ac
                .into_iter()
                .map(|row| Timed {
                    validity: Validity::default(),
                    row,
                })
                .collect(),
            dc: dc
                .into_iter()
                .map(|row| Timed {
                    validity: Validity::default(),
                    row,
                })
                .collect(),
        }
    }

    pub fn with_ac(mut self, validity: Validity, row: AcScheduleRow) -> Self {
        self.ac.push(Timed { validity, row });
        self
    }

    pub fn with_dc(mut self, validity: Validity, row: DcScheduleRow) -> Self {
        self.dc.push(Timed { validity, row });
        self
    }

    pub fn from_json_str(content: &str) -> ScalingResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| ScalingError::Schedule(format!("parsing schedules: {e}")))
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> ScalingResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
            .map_err(|e| ScalingError::Schedule(format!("{}: {e}", path.display())))
    }
}

fn select<R: Clone>(rows: &[Timed<R>], horizon: TimeHorizon, at: DateTime<Utc>) -> Vec<R> {
    rows.iter()
        .filter(|t| t.validity.covers(horizon, at))
        .map(|t| t.row.clone())
        .collect()
}

impl ScheduleSource for StaticSchedules {
    fn ac_targets(
        &self,
        horizon: TimeHorizon,
        at: DateTime<Utc>,
    ) -> ScalingResult<Vec<AcScheduleRow>> {
        Ok(select(&self.ac, horizon, at))
    }

    fn dc_targets(
        &self,
        horizon: TimeHorizon,
        at: DateTime<Utc>,
    ) -> ScalingResult<Vec<DcScheduleRow>> {
        Ok(select(&self.dc, horizon, at))
    }
}
