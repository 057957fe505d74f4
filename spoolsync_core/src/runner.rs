//! Single-threaded engine loop over pumped source samples.
//!
//! Drains the pump channel one sample at a time, applies it to the engine,
//! advances timers at a fixed cadence and hands every outbound event to the
//! sink. The only blocking point is the channel wait; engine logic itself
//! never blocks, so event ordering per key is exactly arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;

use crate::engine::SyncEngine;
use crate::error::Result;
use crate::event::{Command, InboundEvent, OutboundEvent};
use crate::pump::SourceSample;

/// Loop pacing knobs.
#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    /// Timer cadence: staging TTL, assignment deadlines and the settle
    /// window are checked at least this often.
    pub tick_ms: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

/// Run the engine until `shutdown` is raised or every source hangs up.
///
/// `commands` and `bus` are drained opportunistically between samples:
/// commands come from UI clients, bus events from collaborators that speak
/// full inbound shapes (tray snapshots, explicit completions). Conflicts
/// from `begin_assignment` are logged and do not stop the loop.
pub fn run(
    mut engine: SyncEngine,
    samples: &xch::Receiver<SourceSample>,
    commands: Option<&xch::Receiver<Command>>,
    bus: Option<&xch::Receiver<InboundEvent>>,
    params: RunParams,
    shutdown: &Arc<AtomicBool>,
    mut sink: impl FnMut(&OutboundEvent),
) -> Result<SyncEngine> {
    let tick = Duration::from_millis(params.tick_ms.max(1));
    tracing::info!(tick_ms = params.tick_ms, "engine loop started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("engine loop shutting down");
            break;
        }

        if let Some(commands) = commands {
            while let Ok(cmd) = commands.try_recv() {
                match engine.command(cmd) {
                    Ok(events) => deliver(&events, &mut sink),
                    Err(e) => tracing::warn!(error = %e, "command rejected"),
                }
            }
        }

        if let Some(bus) = bus {
            while let Ok(ev) = bus.try_recv() {
                deliver(&engine.handle(ev), &mut sink);
            }
        }

        match samples.recv_timeout(tick) {
            Ok(SourceSample::Presence(tag)) => {
                deliver(&engine.observe_presence_sample(tag.as_deref()), &mut sink);
            }
            Ok(SourceSample::RawWeight(raw)) => {
                deliver(&engine.observe_raw_weight(raw), &mut sink);
            }
            Ok(SourceSample::Mask(frame)) => {
                deliver(&engine.observe_mask_frame(frame), &mut sink);
            }
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => {
                tracing::info!("all sources hung up; engine loop ending");
                break;
            }
        }

        deliver(&engine.tick(), &mut sink);
    }

    // Final timer pass so anything already due resolves before we return.
    deliver(&engine.tick(), &mut sink);
    Ok(engine)
}

fn deliver(events: &[OutboundEvent], sink: &mut impl FnMut(&OutboundEvent)) {
    for ev in events {
        sink(ev);
    }
}
