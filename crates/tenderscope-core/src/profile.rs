//! Personalisation preferences and the stored user profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_REGIONS: usize = 20;
pub const MAX_CPV: usize = 40;
pub const MAX_SECTORS: usize = 20;
pub const DEFAULT_PROFILE_DAYS_BACK: u32 = 7;
pub const MIN_PROFILE_DAYS_BACK: u32 = 1;
pub const MAX_PROFILE_DAYS_BACK: u32 = 30;

/// Cleaned preferences, as stored and as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub cpv: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub notify_daily: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn default_days_back() -> u32 {
    DEFAULT_PROFILE_DAYS_BACK
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            cpv: Vec::new(),
            sectors: Vec::new(),
            days_back: DEFAULT_PROFILE_DAYS_BACK,
            min_value: None,
            notify_daily: false,
            email: None,
        }
    }
}

/// Untrusted preferences as posted by a client. Every field is optional
/// and [`PreferencesInput::clamp`] decides what survives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesInput {
    pub regions: Option<Vec<String>>,
    pub cpv: Option<Vec<String>>,
    pub sectors: Option<Vec<String>>,
    pub days_back: Option<f64>,
    pub min_value: Option<f64>,
    pub notify_daily: Option<bool>,
    pub email: Option<String>,
}

impl PreferencesInput {
    /// Truncate lists, clamp `daysBack` into `[1, 30]` (default 7) and
    /// `minValue` to at least 0. Missing lists become empty.
    pub fn clamp(self) -> Preferences {
        let days_back = match self.days_back {
            Some(d) if d.is_finite() => d
                .round()
                .clamp(MIN_PROFILE_DAYS_BACK as f64, MAX_PROFILE_DAYS_BACK as f64)
                as u32,
            _ => DEFAULT_PROFILE_DAYS_BACK,
        };
        let min_value = self
            .min_value
            .filter(|v| v.is_finite())
            .map(|v| v.max(0.0));

        Preferences {
            regions: truncated(self.regions, MAX_REGIONS),
            cpv: truncated(self.cpv, MAX_CPV),
            sectors: truncated(self.sectors, MAX_SECTORS),
            days_back,
            min_value,
            notify_daily: self.notify_daily.unwrap_or(false),
            email: self
                .email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        }
    }
}

fn truncated(list: Option<Vec<String>>, max: usize) -> Vec<String> {
    let mut list = list.unwrap_or_default();
    list.truncate(max);
    list
}

/// A stored profile. Each write replaces every preference field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    #[serde(flatten)]
    pub preferences: Preferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// The profile a user has before their first write.
    pub fn defaults(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            preferences: Preferences::default(),
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(json: &str) -> PreferencesInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn days_back_clamped() {
        assert_eq!(input(r#"{"daysBack": 0}"#).clamp().days_back, 1);
        assert_eq!(input(r#"{"daysBack": 45}"#).clamp().days_back, 30);
        assert_eq!(input(r#"{"daysBack": 14}"#).clamp().days_back, 14);
        assert_eq!(input(r#"{}"#).clamp().days_back, 7);
    }

    #[test]
    fn min_value_non_negative() {
        assert_eq!(input(r#"{"minValue": -5}"#).clamp().min_value, Some(0.0));
        assert_eq!(input(r#"{"minValue": 1000}"#).clamp().min_value, Some(1000.0));
        assert_eq!(input(r#"{"minValue": null}"#).clamp().min_value, None);
    }

    #[test]
    fn lists_truncated() {
        let regions: Vec<String> = (0..25).map(|i| format!("r{i}")).collect();
        let cpv: Vec<String> = (0..50).map(|i| format!("{i}")).collect();
        let p = PreferencesInput {
            regions: Some(regions),
            cpv: Some(cpv),
            ..Default::default()
        }
        .clamp();
        assert_eq!(p.regions.len(), 20);
        assert_eq!(p.cpv.len(), 40);
        assert_eq!(p.regions[0], "r0");
        assert!(p.sectors.is_empty());
    }

    #[test]
    fn blank_email_dropped() {
        assert_eq!(input(r#"{"email": "  "}"#).clamp().email, None);
        assert_eq!(
            input(r#"{"email": " a@b.it "}"#).clamp().email.as_deref(),
            Some("a@b.it")
        );
    }

    #[test]
    fn defaults_shape() {
        let v = serde_json::to_value(UserProfile::defaults("anon")).unwrap();
        assert_eq!(v["uid"], "anon");
        assert_eq!(v["daysBack"], 7);
        assert_eq!(v["notifyDaily"], false);
        assert!(v["minValue"].is_null());
        assert_eq!(v["regions"], serde_json::json!([]));
    }

    #[test]
    fn profile_round_trips_through_json() {
        let mut p = UserProfile::defaults("u1");
        p.preferences.regions = vec!["Lazio".into()];
        p.updated_at = Some(Utc::now());
        let back: UserProfile = serde_json::from_value(serde_json::to_value(&p).unwrap()).unwrap();
        assert_eq!(back, p);
    }
}
