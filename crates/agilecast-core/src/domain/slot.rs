use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Number of half-hour slots in a fully published day.
pub const SLOTS_PER_DAY: usize = 48;

/// One half-hourly pricing period, price including VAT.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SlotPayload")]
pub struct PriceSlot {
    pub valid_from: UtcDateTime,
    pub valid_to: UtcDateTime,
    pub value_inc_vat: f64,
}

impl PriceSlot {
    pub fn new(
        valid_from: UtcDateTime,
        valid_to: UtcDateTime,
        value_inc_vat: f64,
    ) -> Result<Self, ValidationError> {
        validate_finite("value_inc_vat", value_inc_vat)?;
        if valid_from >= valid_to {
            return Err(ValidationError::InvalidSlotRange {
                valid_from: valid_from.format_rfc3339(),
                valid_to: valid_to.format_rfc3339(),
            });
        }

        Ok(Self {
            valid_from,
            valid_to,
            value_inc_vat,
        })
    }

    /// Whether `instant` falls in `[valid_from, valid_to)`.
    pub fn contains(&self, instant: UtcDateTime) -> bool {
        self.valid_from <= instant && instant < self.valid_to
    }

    /// `HH:MM-HH:MM` label of the slot in UTC.
    pub fn time_label(&self) -> String {
        format!(
            "{}-{}",
            self.valid_from.format_hm(),
            self.valid_to.format_hm()
        )
    }
}

#[derive(Deserialize)]
struct SlotPayload {
    valid_from: UtcDateTime,
    valid_to: UtcDateTime,
    value_inc_vat: f64,
}

impl TryFrom<SlotPayload> for PriceSlot {
    type Error = ValidationError;

    fn try_from(payload: SlotPayload) -> Result<Self, Self::Error> {
        Self::new(payload.valid_from, payload.valid_to, payload.value_inc_vat)
    }
}

/// Chronologically ordered slots of one region and calendar day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PriceSlot>", into = "Vec<PriceSlot>")]
pub struct DailyRateSet {
    slots: Vec<PriceSlot>,
}

impl DailyRateSet {
    /// Build a rate set from slots in any order; the upstream API lists newest first.
    pub fn new(mut slots: Vec<PriceSlot>) -> Self {
        slots.sort_by(|left, right| left.valid_from.cmp(&right.valid_from));
        Self { slots }
    }

    pub fn slots(&self) -> &[PriceSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether every half-hour of the day has been published.
    pub fn is_complete(&self) -> bool {
        self.slots.len() == SLOTS_PER_DAY
    }

    pub fn into_slots(self) -> Vec<PriceSlot> {
        self.slots
    }
}

impl From<Vec<PriceSlot>> for DailyRateSet {
    fn from(slots: Vec<PriceSlot>) -> Self {
        Self::new(slots)
    }
}

impl From<DailyRateSet> for Vec<PriceSlot> {
    fn from(value: DailyRateSet) -> Self {
        value.slots
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}
