//! Climate control — modes, settings and the averaging/hysteresis decision.
//!
//! Everything here is pure: the controller in `smartish-app` gathers the
//! readings, calls [`evaluate`], and turns the result into bus publishes and
//! control-service requests.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Operating mode of a zone's thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimateMode {
    #[default]
    Off,
    Heat,
}

impl ClimateMode {
    /// Every mode advertised in the discovery descriptor.
    pub const ALL: [Self; 2] = [Self::Off, Self::Heat];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
        }
    }
}

impl fmt::Display for ClimateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClimateMode {
    type Err = ValidationError;

    /// Accepts exactly `heat` or `off`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heat" => Ok(Self::Heat),
            "off" => Ok(Self::Off),
            other => Err(ValidationError::InvalidMode(other.to_string())),
        }
    }
}

/// Parse a setpoint command payload.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidSetpoint`] unless the payload is a
/// finite number.
pub fn parse_setpoint(payload: &str) -> Result<f64, ValidationError> {
    match payload.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ValidationError::InvalidSetpoint(payload.to_string())),
    }
}

/// What the virtual thermostat reports it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacAction {
    Heating,
    Off,
}

impl HvacAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heating => "heating",
            Self::Off => "off",
        }
    }
}

/// Tunables shared by every controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateSettings {
    /// Lowest setpoint; also the "closed" actuator output.
    pub min_temp: f64,
    /// Highest setpoint; also the "fully open" actuator output.
    pub max_temp: f64,
    /// Setpoint granularity advertised to the bus.
    pub temp_step: f64,
    /// Delay before the first recompute after a controller connects.
    pub initial_recompute_delay: Duration,
    /// How close an actuator must be to `max_temp` to count as heating.
    pub heating_tolerance: f64,
}

impl Default for ClimateSettings {
    fn default() -> Self {
        Self {
            min_temp: 10.0,
            max_temp: 28.0,
            temp_step: 0.1,
            initial_recompute_delay: Duration::from_secs(5),
            heating_tolerance: 0.01,
        }
    }
}

impl ClimateSettings {
    /// Check the bounds are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBounds`] when `min_temp >= max_temp`
    /// or either bound is not finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.min_temp.is_finite() && self.max_temp.is_finite())
            || self.min_temp >= self.max_temp
        {
            return Err(ValidationError::InvalidBounds {
                min: self.min_temp,
                max: self.max_temp,
            });
        }
        Ok(())
    }
}

/// The part of a controller's state that survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateSnapshot {
    pub mode: ClimateMode,
    pub target_temperature: f64,
}

/// Result of one control evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Readings are incomplete; report offline and leave actuators alone.
    Offline,
    /// Readings are complete.
    Online {
        /// Mean of the temperature-sensor readings.
        current_temperature: f64,
        /// Reported action.
        action: HvacAction,
        /// Output every actuator should be commanded to.
        desired_output: f64,
    },
}

/// Arithmetic mean, `None` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Decide what to report and command, given the usable sensor readings and
/// the usable actuator-reported temperatures of one zone.
#[must_use]
pub fn evaluate(
    mode: ClimateMode,
    target_temperature: f64,
    sensors: &[f64],
    actuators: &[f64],
    settings: &ClimateSettings,
) -> Decision {
    let Some(current_temperature) = mean(sensors) else {
        return Decision::Offline;
    };
    let Some(hottest_actuator) = actuators.iter().copied().reduce(f64::max) else {
        return Decision::Offline;
    };

    let action = if mode == ClimateMode::Heat
        && (hottest_actuator - settings.max_temp).abs() < settings.heating_tolerance
    {
        HvacAction::Heating
    } else {
        HvacAction::Off
    };

    let desired_output = match mode {
        ClimateMode::Heat if current_temperature < target_temperature => settings.max_temp,
        ClimateMode::Heat | ClimateMode::Off => settings.min_temp,
    };

    Decision::Online {
        current_temperature,
        action,
        desired_output,
    }
}

/// Format a temperature with one decimal, as published on the bus.
#[must_use]
pub fn format_temperature(value: f64) -> String {
    format!("{value:.1}")
}

/// Whether two commanded outputs are the same for de-duplication purposes.
#[must_use]
pub fn same_output(a: f64, b: f64) -> bool {
    (a - b).abs() < f64::EPSILON
}
