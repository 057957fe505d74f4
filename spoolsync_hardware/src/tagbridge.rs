//! I2C bridge to the tag-reader coprocessor.
//!
//! The coprocessor owns the RF front end and exposes a register-style I2C
//! interface; this driver only asks "is a tag in the field, and what UID".
//! Payload decoding stays out of scope here.
//!
//! Protocol:
//! - Address: 0x55
//! - 0x01: version (status, major, minor)
//! - 0x10: scan (status, uid_len, uid[0..uid_len])

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{HwError, Result};
use spoolsync_traits::{PresenceSource, SourceError};

pub const BRIDGE_ADDR: u16 = 0x55;

const CMD_GET_VERSION: u8 = 0x01;
const CMD_SCAN_TAG: u8 = 0x10;

const STATUS_OK: u8 = 0x00;
const MAX_UID_LEN: usize = 10;

pub struct TagBridge {
    i2c: rppal::i2c::I2c,
}

impl TagBridge {
    /// Open the default I2C bus and probe the bridge for its version.
    pub fn open() -> Result<Self> {
        let mut i2c = rppal::i2c::I2c::new().map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(BRIDGE_ADDR)
            .map_err(|e| HwError::I2c(e.to_string()))?;

        let mut bridge = Self { i2c };
        match bridge.version() {
            Ok((major, minor)) => {
                debug!(major, minor, "tag bridge detected");
                Ok(bridge)
            }
            Err(e) => {
                warn!(error = %e, "tag bridge probe failed");
                Err(HwError::BridgeUnresponsive)
            }
        }
    }

    fn command(&mut self, cmd: u8, reply: &mut [u8]) -> Result<()> {
        self.i2c
            .write(&[cmd])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.i2c
            .read(reply)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(())
    }

    pub fn version(&mut self) -> Result<(u8, u8)> {
        let mut buf = [0u8; 3];
        self.command(CMD_GET_VERSION, &mut buf)?;
        if buf[0] != STATUS_OK {
            return Err(HwError::BridgeUnresponsive);
        }
        Ok((buf[1], buf[2]))
    }

    /// One scan cycle: `Ok(Some(uid))` while a tag is in the field.
    pub fn scan(&mut self) -> Result<Option<String>> {
        let mut buf = [0u8; 2 + MAX_UID_LEN];
        self.command(CMD_SCAN_TAG, &mut buf)?;
        if buf[0] != STATUS_OK {
            return Err(HwError::BridgeUnresponsive);
        }
        let uid_len = (buf[1] as usize).min(MAX_UID_LEN);
        if uid_len == 0 {
            return Ok(None);
        }
        Ok(Some(format_uid(&buf[2..2 + uid_len])))
    }
}

impl PresenceSource for TagBridge {
    fn poll(&mut self, _timeout: Duration) -> std::result::Result<Option<String>, SourceError> {
        self.scan().map_err(|e| Box::new(e) as SourceError)
    }
}

/// Render a UID as colon-separated uppercase hex ("87:0D:51:00").
fn format_uid(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
