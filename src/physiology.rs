//! # Physiology Module
//!
//! Pure heart-rate and energy functions. Nothing here keeps state.
//!
//! ## Functions
//! - `max_heart_rate`: Age-predicted maximum (220 - age)
//! - `heart_rate_zone`: Training zone from heart rate as a percentage of max
//! - `zone_thresholds`: Lower bound in bpm of each zone above Rest
//! - `calories_per_minute`: Keytel et al. (2005) regression, floored at 0
//!
//! ## Zone Vocabulary
//! Rest / Light / Moderate / Hard / Maximum, split at 50/60/70/80 percent
//! of maximum heart rate.
//!
//! Bad inputs (non-positive or NaN heart rate, out-of-range profile) give
//! a zero contribution instead of an error. These run on every sample and
//! must never stop a session.

use crate::error::InvalidProfileError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const AGE_RANGE: (f64, f64) = (10.0, 100.0);
pub const WEIGHT_RANGE_KG: (f64, f64) = (20.0, 300.0);
pub const MAX_HEART_RATE_RANGE: (f64, f64) = (100.0, 230.0);

/// Upper bounds (exclusive) of the zones below Maximum, in percent of max HR
const ZONE_BOUNDS_PERCENT: [f64; 4] = [50.0, 60.0, 70.0, 80.0];

// Keytel et al. 2005 coefficients; kJ/min divided by 4.184 gives kcal/min
const KJ_PER_KCAL: f64 = 4.184;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub age: u32,
    pub weight_kg: f64,
    pub gender: Gender,
    /// Overrides the age-predicted maximum when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<u32>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            age: 30,
            weight_kg: 70.0,
            gender: Gender::Male,
            max_heart_rate: None,
        }
    }
}

fn check_range(field: &'static str, value: f64, allowed: (f64, f64)) -> Result<(), InvalidProfileError> {
    if value.is_finite() && value >= allowed.0 && value <= allowed.1 {
        Ok(())
    } else {
        Err(InvalidProfileError { field, value, allowed })
    }
}

impl UserProfile {
    pub fn validate(&self) -> Result<(), InvalidProfileError> {
        check_range("age", self.age as f64, AGE_RANGE)?;
        check_range("weight_kg", self.weight_kg, WEIGHT_RANGE_KG)?;
        if let Some(max_hr) = self.max_heart_rate {
            check_range("max_heart_rate", max_hr as f64, MAX_HEART_RATE_RANGE)?;
        }
        Ok(())
    }

    /// Maximum heart rate for zone calculations, `None` if the profile is invalid
    pub fn max_heart_rate(&self) -> Option<f64> {
        self.validate().ok()?;
        Some(
            self.max_heart_rate
                .map(f64::from)
                .unwrap_or_else(|| max_heart_rate(self.age)),
        )
    }
}

/// Age-predicted maximum heart rate
pub fn max_heart_rate(age: u32) -> f64 {
    (220.0 - age as f64).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeartRateZone {
    Rest,
    Light,
    Moderate,
    Hard,
    Maximum,
}

impl HeartRateZone {
    pub fn all() -> [HeartRateZone; 5] {
        [
            HeartRateZone::Rest,
            HeartRateZone::Light,
            HeartRateZone::Moderate,
            HeartRateZone::Hard,
            HeartRateZone::Maximum,
        ]
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn label(&self) -> &'static str {
        match self {
            HeartRateZone::Rest => "Rest",
            HeartRateZone::Light => "Light",
            HeartRateZone::Moderate => "Moderate",
            HeartRateZone::Hard => "Hard",
            HeartRateZone::Maximum => "Maximum",
        }
    }
}

impl fmt::Display for HeartRateZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Training zone for `heart_rate` given `max_heart_rate`
pub fn heart_rate_zone(heart_rate: f64, max_heart_rate: f64) -> HeartRateZone {
    if !heart_rate.is_finite() || heart_rate <= 0.0 || !max_heart_rate.is_finite() || max_heart_rate <= 0.0 {
        return HeartRateZone::Rest;
    }

    let percentage = heart_rate / max_heart_rate * 100.0;
    let zones = HeartRateZone::all();
    ZONE_BOUNDS_PERCENT
        .iter()
        .position(|bound| percentage < *bound)
        .map(|i| zones[i])
        .unwrap_or(HeartRateZone::Maximum)
}

/// Lower bound in bpm of Light, Moderate, Hard and Maximum
pub fn zone_thresholds(max_heart_rate: f64) -> [f64; 4] {
    ZONE_BOUNDS_PERCENT.map(|percent| (max_heart_rate * percent / 100.0).round())
}

/// Energy expenditure in kcal/min from heart rate (Keytel et al. 2005)
pub fn calories_per_minute(heart_rate: f64, weight_kg: f64, age: f64, gender: Gender) -> f64 {
    if !heart_rate.is_finite() || heart_rate <= 0.0 || !weight_kg.is_finite() || !age.is_finite() {
        return 0.0;
    }

    let kj_per_minute = match gender {
        Gender::Male => -55.0969 + 0.6309 * heart_rate + 0.1988 * weight_kg + 0.2017 * age,
        Gender::Female => -20.4022 + 0.4472 * heart_rate - 0.1263 * weight_kg + 0.074 * age,
    };

    (kj_per_minute / KJ_PER_KCAL).max(0.0)
}

/// `calories_per_minute` for a profile, zero if the profile is invalid
pub fn calories_for_profile(heart_rate: f64, profile: &UserProfile) -> f64 {
    if let Err(e) = profile.validate() {
        log::debug!("No calorie contribution: {}", e);
        return 0.0;
    }
    calories_per_minute(heart_rate, profile.weight_kg, profile.age as f64, profile.gender)
}
