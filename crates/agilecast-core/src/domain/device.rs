use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Typical flexible household loads and their usual run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreset {
    Dishwasher,
    WashingMachine,
    TumbleDryer,
    EvCharging,
    ImmersionHeater,
    HeatPump,
}

impl DevicePreset {
    pub const ALL: [DevicePreset; 6] = [
        Self::Dishwasher,
        Self::WashingMachine,
        Self::TumbleDryer,
        Self::EvCharging,
        Self::ImmersionHeater,
        Self::HeatPump,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Dishwasher => "Dishwasher",
            Self::WashingMachine => "Washing Machine",
            Self::TumbleDryer => "Tumble Dryer",
            Self::EvCharging => "EV Charging",
            Self::ImmersionHeater => "Immersion Heater",
            Self::HeatPump => "Heat Pump",
        }
    }

    pub const fn duration(self) -> LoadDuration {
        let hours = match self {
            Self::Dishwasher | Self::ImmersionHeater => 2.0,
            Self::WashingMachine => 1.5,
            Self::TumbleDryer => 2.5,
            Self::EvCharging => 8.0,
            Self::HeatPump => 4.0,
        };
        LoadDuration(hours)
    }
}

impl Display for DevicePreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How long a flexible load runs, in hours.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct LoadDuration(f64);

impl LoadDuration {
    pub fn hours(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::InvalidDuration {
                value: value.to_string(),
            });
        }
        Ok(Self(value))
    }

    pub const fn as_hours(self) -> f64 {
        self.0
    }
}

impl Default for LoadDuration {
    fn default() -> Self {
        Self(1.0)
    }
}

impl TryFrom<f64> for LoadDuration {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::hours(value)
    }
}

impl From<LoadDuration> for f64 {
    fn from(value: LoadDuration) -> Self {
        value.0
    }
}
