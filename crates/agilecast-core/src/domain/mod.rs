//! # Domain Models
//!
//! Canonical domain types for half-hourly tariff data.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PriceSlot`] | One half-hour period with its unit price |
//! | [`DailyRateSet`] | Chronological slots of one region and day |
//! | [`Region`] | Closed set of 14 tariff regions |
//! | [`DevicePreset`] | Typical flexible loads with run durations |
//! | [`LoadDuration`] | Validated run time in hours |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! All types validate their invariants at construction time, including when
//! deserialized.

mod device;
mod region;
mod slot;
mod timestamp;

pub use device::{DevicePreset, LoadDuration};
pub use region::Region;
pub use slot::{DailyRateSet, PriceSlot, SLOTS_PER_DAY};
pub use timestamp::UtcDateTime;
