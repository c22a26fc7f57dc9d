// ⚙️ Display Settings - How results are filtered, labelled and printed
//
// One explicit value passed to whatever renders a document: units, hidden
// and anonymized EANs, the active grouping and an optional day window.
// Loaded from JSON the same way the optimizer configuration is.

use crate::error::{EdcError, Result};
use crate::grouping::Grouping;
use anyhow::Context;
use chrono::{Duration, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Read a JSON configuration file
pub fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file: {:?}", what, path))?;

    serde_json::from_str(&content).with_context(|| format!("Failed to parse {} JSON", what))
}

// ============================================================================
// UNITS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayUnit {
    #[default]
    #[serde(rename = "kWh")]
    KWh,
    #[serde(rename = "kW")]
    KW,
}

/// Per-call overrides for `format_kwh`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KwhFormat {
    /// Ignore the kW display unit
    pub always_kwh: bool,

    /// Join number and unit with `&nbsp;` for HTML output
    pub nbsp: bool,
}

// ============================================================================
// DISPLAY SETTINGS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub display_unit: DisplayUnit,
    pub anonymize_eans: bool,
    pub hidden_eans: BTreeSet<String>,
    pub grouping: Grouping,

    /// First day (0 = day of `date_from`) of the day window
    pub min_day_filter: Option<u32>,

    /// Last day of the day window, inclusive
    pub max_day_filter: Option<u32>,
}

impl DisplaySettings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        load_json(path.as_ref(), "display settings")
    }

    /// Fine groupings are the ones worth restricting to a day window
    pub fn use_filtering(&self) -> bool {
        matches!(self.grouping, Grouping::QuarterHour | Grouping::Hour)
    }

    /// Print an energy value with two decimals.
    ///
    /// In kW mode 15 minute values are multiplied by 4 and hourly values are
    /// printed as-is, so they read as average power.
    pub fn format_kwh(&self, value: f64, format: KwhFormat) -> Result<String> {
        if value.is_nan() {
            return Err(EdcError::InvalidValue(value));
        }

        let separator = if format.nbsp { "&nbsp;" } else { " " };

        let multiplier = match (self.display_unit, self.grouping) {
            _ if format.always_kwh => None,
            (DisplayUnit::KW, Grouping::QuarterHour) => Some(4.0),
            (DisplayUnit::KW, Grouping::Hour) => Some(1.0),
            _ => None,
        };

        Ok(match multiplier {
            Some(multiplier) => format!("{:.2}{}kW", value * multiplier, separator),
            None => format!("{:.2}{}kWh", value, separator),
        })
    }

    /// Name to show for an EAN (hash prefix when anonymizing)
    pub fn ean_label(&self, name: &str) -> String {
        if !self.anonymize_eans {
            return name.to_string();
        }

        let digest = Sha256::digest(name.as_bytes());
        let prefix: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
        format!("EAN-{}", prefix)
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden_eans.contains(name)
    }

    /// Inclusive [from, to] window for the day filter, None when no filter is set
    pub fn day_filter_range(&self, date_from: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        if self.min_day_filter.is_none() && self.max_day_filter.is_none() {
            return None;
        }

        // Offsets past the calendar saturate at NaiveDateTime::MAX
        let offset = |delta: Duration| {
            date_from
                .checked_add_signed(delta)
                .unwrap_or(NaiveDateTime::MAX)
        };

        let from = offset(Duration::days(i64::from(self.min_day_filter.unwrap_or(0))));
        let to = match self.max_day_filter {
            Some(max_day) => offset(Duration::days(i64::from(max_day) + 1) - Duration::minutes(1)),
            None => NaiveDateTime::MAX,
        };

        Some((from, to))
    }
}

// ============================================================================
// TESTS
// ============================================================================
