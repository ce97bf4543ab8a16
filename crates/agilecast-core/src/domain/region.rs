use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Grid supply point region of the tariff, one uppercase letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Region {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    J,
    K,
    L,
    M,
    N,
    P,
}

impl Region {
    pub const ALL: [Region; 14] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
        Self::H,
        Self::J,
        Self::K,
        Self::L,
        Self::M,
        Self::N,
        Self::P,
    ];

    /// Parse a region code, ignoring surrounding whitespace and case.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|region| region.code() == normalized)
            .ok_or(ValidationError::InvalidRegion {
                value: input.to_owned(),
            })
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
            Self::G => "G",
            Self::H => "H",
            Self::J => "J",
            Self::K => "K",
            Self::L => "L",
            Self::M => "M",
            Self::N => "N",
            Self::P => "P",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "Eastern England",
            Self::B => "East Midlands",
            Self::C => "London",
            Self::D => "Merseyside and Northern Wales",
            Self::E => "West Midlands",
            Self::F => "North Eastern England",
            Self::G => "North Western England",
            Self::H => "Southern England",
            Self::J => "South Eastern England",
            Self::K => "South Western England",
            Self::L => "South Wales",
            Self::M => "Yorkshire",
            Self::N => "South Scotland",
            Self::P => "North Scotland",
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::C
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Region {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Region> for String {
    fn from(value: Region) -> Self {
        value.code().to_owned()
    }
}
