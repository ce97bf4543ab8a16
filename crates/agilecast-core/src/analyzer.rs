//! Pure analysis of a day's unit rates.
//!
//! Categories are relative to the day being analyzed: the cheapest 30% of
//! the day's price range is `cheap`, the top 30% `expensive`. Every function
//! requires at least one slot and fails with [`AnalysisError::EmptyInput`]
//! otherwise. Rounding is applied to reported values only, never before a
//! comparison.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::{LoadDuration, PriceSlot, UtcDateTime};

/// Number of slots in each ranking list.
pub const RANKING_SIZE: usize = 5;

/// Absolute distance from the day's minimum within which a future slot
/// counts as "as cheap as it gets".
pub const NEAR_MINIMUM_MARGIN: f64 = 0.05;

const LOW_BAND: f64 = 0.3;
const HIGH_BAND: f64 = 0.7;

/// Day-relative price band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    Cheap,
    Medium,
    Expensive,
}

impl PriceCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Medium => "medium",
            Self::Expensive => "expensive",
        }
    }

    /// Short call to action shown next to the current price.
    pub const fn headline(self) -> &'static str {
        match self {
            Self::Cheap => "GREAT TIME",
            Self::Medium => "OK TIME",
            Self::Expensive => "AVOID NOW",
        }
    }
}

impl Display for PriceCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics over a day's slots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateStatistics {
    pub min_price: f64,
    pub max_price: f64,
    /// Mean price, rounded to 2 decimals.
    pub avg_price: f64,
    /// `max - min`, rounded to 2 decimals.
    pub price_range: f64,
}

/// A slot with its derived category and display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSlot {
    pub slot: PriceSlot,
    pub category: PriceCategory,
    pub time_label: String,
}

/// Everything the dashboard shows about a day; recomputed on every load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub cheapest_slots: Vec<AnnotatedSlot>,
    pub most_expensive_slots: Vec<AnnotatedSlot>,
    pub statistics: RateStatistics,
    pub all_slots: Vec<AnnotatedSlot>,
}

/// The slot covering "now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSlot {
    pub slot: PriceSlot,
    pub category: PriceCategory,
    /// Display hint for the category, e.g. `GREAT TIME`.
    pub headline: String,
    pub minutes_remaining: i64,
    pub time_label: String,
}

/// Outcome of the current-slot lookup; `Unknown` when no slot covers "now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CurrentSlotStatus {
    Known(CurrentSlot),
    Unknown,
}

impl CurrentSlotStatus {
    pub fn price(&self) -> Option<f64> {
        match self {
            Self::Known(current) => Some(current.slot.value_inc_vat),
            Self::Unknown => None,
        }
    }
}

/// Advice to postpone a flexible load to a cheaper slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayAdvice {
    pub slot: PriceSlot,
    pub time_label: String,
    /// Price of the slot covering "now", if any.
    pub current_price: Option<f64>,
    pub recommended_price: f64,
    /// Hours from "now" until the recommended slot starts, 1 decimal.
    pub delay_hours: f64,
    /// Estimated saving over the load duration, never negative, 1 decimal.
    pub savings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayRecommendation {
    Delay(DelayAdvice),
    /// No future slot is near the day's minimum; the caller decides how to frame it.
    NoCheaperSlot { current_price: Option<f64> },
}

/// Day-relative category of `price` given the day's extremes.
pub fn categorize(price: f64, min_price: f64, max_price: f64) -> PriceCategory {
    let range = max_price - min_price;
    if range == 0.0 {
        return PriceCategory::Medium;
    }

    let low_threshold = min_price + range * LOW_BAND;
    let high_threshold = min_price + range * HIGH_BAND;

    if price <= low_threshold {
        PriceCategory::Cheap
    } else if price >= high_threshold {
        PriceCategory::Expensive
    } else {
        PriceCategory::Medium
    }
}

pub fn statistics(slots: &[PriceSlot]) -> Result<RateStatistics, AnalysisError> {
    let (min_price, max_price) = extremes(slots)?;
    let total: f64 = slots.iter().map(|slot| slot.value_inc_vat).sum();
    let mean = total / slots.len() as f64;

    Ok(RateStatistics {
        min_price,
        max_price,
        avg_price: round_to(mean, 2),
        price_range: round_to(max_price - min_price, 2),
    })
}

/// The cheapest slots, lowest first; ties keep chronological order.
pub fn cheapest(slots: &[PriceSlot]) -> Result<Vec<PriceSlot>, AnalysisError> {
    ranked(slots, |left, right| left.total_cmp(&right))
}

/// The most expensive slots, highest first; ties keep chronological order.
pub fn most_expensive(slots: &[PriceSlot]) -> Result<Vec<PriceSlot>, AnalysisError> {
    ranked(slots, |left, right| right.total_cmp(&left))
}

pub fn analyze(slots: &[PriceSlot]) -> Result<AnalysisResult, AnalysisError> {
    let statistics = statistics(slots)?;
    let annotate = |slot: &PriceSlot| AnnotatedSlot {
        slot: *slot,
        category: categorize(
            slot.value_inc_vat,
            statistics.min_price,
            statistics.max_price,
        ),
        time_label: slot.time_label(),
    };

    Ok(AnalysisResult {
        cheapest_slots: cheapest(slots)?.iter().map(annotate).collect(),
        most_expensive_slots: most_expensive(slots)?.iter().map(annotate).collect(),
        statistics,
        all_slots: slots.iter().map(annotate).collect(),
    })
}

/// Find the slot with `valid_from <= now < valid_to`.
pub fn current_slot_status(
    slots: &[PriceSlot],
    now: UtcDateTime,
) -> Result<CurrentSlotStatus, AnalysisError> {
    let (min_price, max_price) = extremes(slots)?;

    let Some(slot) = slots.iter().find(|slot| slot.contains(now)) else {
        return Ok(CurrentSlotStatus::Unknown);
    };

    let category = categorize(slot.value_inc_vat, min_price, max_price);
    Ok(CurrentSlotStatus::Known(CurrentSlot {
        slot: *slot,
        category,
        headline: category.headline().to_owned(),
        minutes_remaining: now.duration_until(slot.valid_to).whole_minutes().max(0),
        time_label: slot.time_label(),
    }))
}

/// Earliest future slot priced within [`NEAR_MINIMUM_MARGIN`] of the day's minimum.
pub fn delay_recommendation(
    slots: &[PriceSlot],
    now: UtcDateTime,
    duration: LoadDuration,
) -> Result<DelayRecommendation, AnalysisError> {
    let (min_price, _) = extremes(slots)?;
    let current_price = current_slot_status(slots, now)?.price();

    let target = slots
        .iter()
        .filter(|slot| slot.valid_from > now)
        .filter(|slot| slot.value_inc_vat <= min_price + NEAR_MINIMUM_MARGIN)
        .min_by_key(|slot| slot.valid_from);

    let Some(target) = target else {
        return Ok(DelayRecommendation::NoCheaperSlot { current_price });
    };

    let delay_hours = now.duration_until(target.valid_from).as_seconds_f64() / 3600.0;
    let savings = current_price
        .map(|current| (current - target.value_inc_vat) * duration.as_hours())
        .unwrap_or(0.0)
        .max(0.0);

    Ok(DelayRecommendation::Delay(DelayAdvice {
        slot: *target,
        time_label: target.time_label(),
        current_price,
        recommended_price: target.value_inc_vat,
        delay_hours: round_to(delay_hours, 1),
        savings: round_to(savings, 1),
    }))
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

fn extremes(slots: &[PriceSlot]) -> Result<(f64, f64), AnalysisError> {
    let first = slots.first().ok_or(AnalysisError::EmptyInput)?;
    Ok(slots.iter().fold(
        (first.value_inc_vat, first.value_inc_vat),
        |(min, max), slot| (min.min(slot.value_inc_vat), max.max(slot.value_inc_vat)),
    ))
}

fn ranked(
    slots: &[PriceSlot],
    order: impl Fn(f64, f64) -> Ordering,
) -> Result<Vec<PriceSlot>, AnalysisError> {
    if slots.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let mut sorted = slots.to_vec();
    sorted.sort_by(|left, right| {
        order(left.value_inc_vat, right.value_inc_vat)
            .then_with(|| left.valid_from.cmp(&right.valid_from))
    });
    sorted.truncate(RANKING_SIZE);
    Ok(sorted)
}
