pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// One printer-reported status observation relevant to slot tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskFrame {
    /// Printer serial the mask belongs to.
    pub serial: String,
    /// Bitmask of slots currently being read by the printer's own tag reader.
    pub reading_mask: u32,
}

/// Proximity-tag reader. `Ok(Some(uid))` while a tag is in range, `Ok(None)`
/// when the field is empty. Implementations report raw presence; debouncing
/// and edge extraction happen downstream.
pub trait PresenceSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<String>, SourceError>;
}

/// Load-cell front end returning raw ADC counts. Conversion to grams is the
/// caller's job (calibration lives in configuration, not in the driver).
pub trait WeightSource {
    fn read(&mut self, timeout: Duration) -> Result<i32, SourceError>;
}

/// Printer-link front end yielding reading-bitmask frames. `Ok(None)` means
/// no new frame arrived within the timeout.
pub trait BitmaskSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<MaskFrame>, SourceError>;
}
