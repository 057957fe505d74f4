//! HX711 load-cell ADC over bit-banged GPIO.

use std::time::Duration;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::wait_until_low_with_timeout;
use spoolsync_traits::{SourceError, WeightSource};

/// Polling interval while waiting for the DT line to signal data-ready.
const DRDY_POLL: Duration = Duration::from_micros(200);

pub struct Hx711 {
    dt: rppal::gpio::InputPin,
    sck: rppal::gpio::OutputPin,
    gain_pulses: u8, // 25, 26, 27 based on gain/channel
}

impl Hx711 {
    pub fn new(
        dt_pin: rppal::gpio::InputPin,
        mut sck_pin: rppal::gpio::OutputPin,
        gain_pulses: u8,
    ) -> Result<Self> {
        sck_pin.set_low(); // clock idle low
        Ok(Self {
            dt: dt_pin,
            sck: sck_pin,
            gain_pulses,
        })
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        // Data ready when DT goes low.
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), timeout, DRDY_POLL)?;

        // Clock out 24 bits, MSB first.
        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            spin_delay_100ns();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Extra pulses select gain/channel for the next conversion.
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            spin_delay_100ns();
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Sign extend 24-bit
        if (value & 0x80_0000) != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }
}

impl WeightSource for Hx711 {
    fn read(&mut self, timeout: Duration) -> std::result::Result<i32, SourceError> {
        self.read_with_timeout(timeout)
            .map_err(|e| Box::new(e) as SourceError)
    }
}

/// Open the HX711 on the given BCM pins with channel-A gain 128.
pub fn open(dt_pin: u8, sck_pin: u8) -> Result<Hx711> {
    let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
    let dt = gpio
        .get(dt_pin)
        .map_err(|e| HwError::Gpio(e.to_string()))?
        .into_input();
    let sck = gpio
        .get(sck_pin)
        .map_err(|e| HwError::Gpio(e.to_string()))?
        .into_output();
    Hx711::new(dt, sck, 25)
}

#[inline(always)]
fn spin_delay_100ns() {
    // A few CPU cycles; tweak if the clock edges come out too tight.
    std::hint::spin_loop();
}
