#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Device adapters for the spool sync stack.
//!
//! Real hardware (HX711 load cell, I2C tag-reader bridge) lives behind the
//! `hardware` feature and only builds on Linux (rppal). The simulated
//! sources below run anywhere and back the CLI's simulate mode and tests.

pub mod error;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod tagbridge;

use std::time::Duration;

use spoolsync_traits::{BitmaskSource, MaskFrame, PresenceSource, SourceError, WeightSource};

/// Scale that replays a programmed sequence of raw counts, holding the last
/// value once exhausted (a real pan settles; so does this one).
pub struct SimulatedScale {
    seq: Vec<i32>,
    idx: usize,
}

impl SimulatedScale {
    pub fn new(seq: impl Into<Vec<i32>>) -> Self {
        Self {
            seq: seq.into(),
            idx: 0,
        }
    }

    /// A scale that sits at a constant raw count.
    pub fn steady(raw: i32) -> Self {
        Self::new([raw])
    }
}

impl WeightSource for SimulatedScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, SourceError> {
        let v = if self.idx < self.seq.len() {
            let x = self.seq[self.idx];
            self.idx += 1;
            x
        } else {
            self.seq.last().copied().unwrap_or(0)
        };
        Ok(v)
    }
}

/// Tag reader that replays a programmed presence sequence, holding the last
/// state once exhausted.
pub struct SimulatedTagReader {
    seq: Vec<Option<String>>,
    idx: usize,
}

impl SimulatedTagReader {
    pub fn new(seq: impl Into<Vec<Option<String>>>) -> Self {
        Self {
            seq: seq.into(),
            idx: 0,
        }
    }

    /// A reader with no tag in the field, ever.
    pub fn empty() -> Self {
        Self::new([None])
    }
}

impl PresenceSource for SimulatedTagReader {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<String>, SourceError> {
        let v = if self.idx < self.seq.len() {
            let x = self.seq[self.idx].clone();
            self.idx += 1;
            x
        } else {
            self.seq.last().cloned().flatten()
        };
        Ok(v)
    }
}

/// Printer link that replays programmed mask frames, then reports quiet.
pub struct SimulatedPrinterLink {
    seq: Vec<MaskFrame>,
    idx: usize,
}

impl SimulatedPrinterLink {
    pub fn new(seq: impl Into<Vec<MaskFrame>>) -> Self {
        Self {
            seq: seq.into(),
            idx: 0,
        }
    }
}

impl BitmaskSource for SimulatedPrinterLink {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<MaskFrame>, SourceError> {
        if self.idx < self.seq.len() {
            let f = self.seq[self.idx].clone();
            self.idx += 1;
            Ok(Some(f))
        } else {
            Ok(None)
        }
    }
}
