//! Test and helper mocks for spoolsync_core

use std::time::Duration;

use spoolsync_traits::{BitmaskSource, MaskFrame, PresenceSource, SourceError, WeightSource};

/// A tag reader with a permanently empty field; useful when presence is
/// driven through bus events instead of a source.
pub struct IdleReader;

impl PresenceSource for IdleReader {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<String>, SourceError> {
        Ok(None)
    }
}

/// A scale that always errors on read; useful when weight arrives via
/// `weight_sample` bus events.
pub struct NoopScale;

impl WeightSource for NoopScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, SourceError> {
        Err(Box::new(std::io::Error::other("noop scale")))
    }
}

/// A printer link that never reports frames.
pub struct SilentLink;

impl BitmaskSource for SilentLink {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<MaskFrame>, SourceError> {
        Ok(None)
    }
}
