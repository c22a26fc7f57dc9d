// Entity Models
// The in-memory data model of one import run:
// - Ean: identity of a metering point and its column in the export
// - Measurement: before/after/missed energy of one point in one slot
// - Interval: one time slot with all measurements and its warnings

pub mod ean;
pub mod measurement;
pub mod interval;

pub use ean::{Ean, EanSide};
pub use measurement::Measurement;
pub use interval::Interval;
