//! Quick Start Example
//!
//! Demonstrates wiring the sync engine to simulated sources and printing
//! every event it emits. Copy this into a binary crate that depends on
//! `spoolsync_core`, `spoolsync_config` and `spoolsync_hardware` to run it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use spoolsync_config::Config;
use spoolsync_core::pump::SourcePump;
use spoolsync_core::runner::{self, RunParams};
use spoolsync_core::SyncEngine;
use spoolsync_hardware::{SimulatedScale, SimulatedTagReader};
use spoolsync_traits::MonotonicClock;

fn main() -> Result<(), eyre::Report> {
    // A tag appears after two empty polls and then stays in the field.
    let reader = SimulatedTagReader::new(vec![
        None,
        None,
        Some("87:0D:51:00".to_string()),
    ]);
    // The pan ramps up and settles around 1240 raw counts.
    let scale = SimulatedScale::new([0, 600, 1200, 1238, 1240, 1240]);

    let mut pump = SourcePump::new(16);
    let timeout = Duration::from_millis(50);
    pump.attach_presence(reader, 10, timeout, MonotonicClock::new());
    pump.attach_weight(scale, 10, timeout, MonotonicClock::new());

    let engine = SyncEngine::builder()
        .with_config(Config::default())
        .build()?;

    // Stop after three seconds of simulated activity.
    let shutdown = Arc::new(AtomicBool::new(false));
    let stopper = shutdown.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(3));
        stopper.store(true, Ordering::Relaxed);
    });

    let rx = pump.receiver();
    runner::run(
        engine,
        &rx,
        None,
        None,
        RunParams::default(),
        &shutdown,
        |ev| println!("event: {ev:?}"),
    )?;
    Ok(())
}
