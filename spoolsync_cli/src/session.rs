//! Session drivers: live engine runs and the deterministic simulate mode.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use spoolsync_config::{Calibration, Config};
use spoolsync_core::pump::SourcePump;
use spoolsync_core::runner::{self, RunParams};
use spoolsync_core::{Command, InboundEvent, OutboundEvent, SyncEngine};
use spoolsync_traits::clock::{Clock, MonotonicClock};
use spoolsync_ui::DisplayModel;

/// Manually advanced clock driving the scripted session; simulate runs are
/// instant and bit-for-bit reproducible.
#[derive(Clone)]
struct SimClock {
    origin: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl SimClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    fn advance_ms(&self, ms: u64) {
        self.offset_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::Relaxed))
    }

    fn sleep(&self, d: Duration) {
        self.advance_ms(d.as_millis() as u64);
    }
}

fn human_line(ev: &OutboundEvent) -> String {
    match ev {
        OutboundEvent::StagingStarted { tag_id } => format!("staging started: tag {tag_id}"),
        OutboundEvent::StagingCleared => "staging cleared".to_string(),
        OutboundEvent::ReadingStarted {
            serial,
            unit_id,
            slot_index,
        } => format!("printer {serial} reading unit {unit_id} slot {slot_index}"),
        OutboundEvent::AssignmentResolved {
            serial,
            unit_id,
            slot_index,
            outcome,
            detail,
        } => {
            let material = detail
                .as_ref()
                .and_then(|d| d.material_type.as_deref())
                .unwrap_or("-");
            format!(
                "assignment {serial}/{unit_id}/{slot_index}: {outcome:?} (material {material})"
            )
        }
        OutboundEvent::DeviceState { grams, stable } => {
            format!(
                "scale: {grams:.1} g ({})",
                if *stable { "stable" } else { "settling" }
            )
        }
        OutboundEvent::DeviceCommand { command } => format!("device command: {command:?}"),
    }
}

fn publish(events: &[OutboundEvent], display: &mut DisplayModel, now_ms: u64, json: bool) {
    for ev in events {
        display.apply(ev, now_ms);
        if json {
            match serde_json::to_string(ev) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "event serialization failed"),
            }
        } else {
            println!("{}", human_line(ev));
        }
    }
}

/// Replay a fixed end-to-end session: stage a spool, settle its weight,
/// assign it to printer P1 unit 0 slot 2, confirm via read edges and a
/// content diff, then clear staging and let the display hold run out.
pub fn simulate(cfg: &Config, json: bool) -> eyre::Result<()> {
    let clock = SimClock::new();
    let calibration = cfg
        .calibration
        .map(Calibration::from)
        .unwrap_or(Calibration {
            zero_counts: 0,
            gain_g_per_count: 0.01,
        });
    let mut engine = SyncEngine::builder()
        .with_config(cfg.clone())
        .with_calibration(calibration)
        .with_clock(Box::new(clock.clone()))
        .build()
        .wrap_err("build engine")?;
    let mut display = DisplayModel::new(cfg.presentation.hold_ms, cfg.presentation.debounce_ms);

    // Spool lands on the scale, tag read by the local reader.
    let out = engine.handle(InboundEvent::PresenceEdge {
        tag_id: Some("A7:B2:65:00".into()),
    });
    publish(&out, &mut display, engine.now_ms(), json);

    // Weight settles over the configured window.
    let out = engine.observe_raw_weight(124_000);
    publish(&out, &mut display, engine.now_ms(), json);
    clock.advance_ms(cfg.filter.window_ms);
    let out = engine.observe_raw_weight(124_010);
    publish(&out, &mut display, engine.now_ms(), json);

    // User commits the assignment to P1 / unit 0 / slot 2.
    let out = engine
        .command(Command::BeginAssignment {
            serial: "P1".into(),
            unit_id: 0,
            slot_index: 2,
            subject_id: "spool-42".into(),
        })
        .wrap_err("begin assignment")?;
    publish(&out, &mut display, engine.now_ms(), json);

    // Printer scans the slot: rising then falling edge on bit 2.
    clock.advance_ms(1_500);
    let out = engine.handle(InboundEvent::BitmaskUpdate {
        serial: "P1".into(),
        old_mask: Some(0b0000),
        new_mask: 0b0100,
    });
    publish(&out, &mut display, engine.now_ms(), json);
    clock.advance_ms(2_000);
    let out = engine.handle(InboundEvent::BitmaskUpdate {
        serial: "P1".into(),
        old_mask: Some(0b0100),
        new_mask: 0b0000,
    });
    publish(&out, &mut display, engine.now_ms(), json);

    // Slot contents change: the insert is confirmed.
    let out = engine.handle(InboundEvent::TraySnapshot {
        serial: "P1".into(),
        unit_id: 0,
        slot_index: 2,
        material_type: Some("PLA".into()),
        color: Some("FF0000".into()),
    });
    publish(&out, &mut display, engine.now_ms(), json);

    // User dismisses the staged spool; the display holds it briefly.
    let out = engine.command(Command::ClearStaging).wrap_err("clear staging")?;
    publish(&out, &mut display, engine.now_ms(), json);
    clock.advance_ms(cfg.presentation.hold_ms);
    display.tick(engine.now_ms());

    let state = display.state();
    if json {
        let mut value = serde_json::to_value(&state).wrap_err("serialize display state")?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("type".into(), serde_json::Value::String("display_state".into()));
        }
        println!("{value}");
    } else {
        println!(
            "final display: spool={:?} grams={:?} last_result={:?}",
            state.spool, state.grams,
            state.last_result.map(|r| r.outcome)
        );
    }
    Ok(())
}

/// Run the engine loop against attached sources until Ctrl-C or the
/// optional duration elapses.
pub fn run_engine(
    cfg: &Config,
    calibration: Option<Calibration>,
    duration_secs: Option<u64>,
    json: bool,
) -> eyre::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let s = shutdown.clone();
        ctrlc::set_handler(move || s.store(true, Ordering::Relaxed))
            .wrap_err("install signal handler")?;
    }
    if let Some(secs) = duration_secs {
        let s = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            s.store(true, Ordering::Relaxed);
        });
    }

    let timeout = Duration::from_millis(cfg.timeouts.sample_ms);
    let hz = cfg.filter.sample_rate_hz;
    let mut pump = SourcePump::new(16);
    attach_sources(&mut pump, cfg, hz, timeout)?;

    let mut builder = SyncEngine::builder().with_config(cfg.clone());
    if let Some(cal) = calibration {
        builder = builder.with_calibration(cal);
    }
    let engine = builder.build().wrap_err("build engine")?;

    let mut display = DisplayModel::new(cfg.presentation.hold_ms, cfg.presentation.debounce_ms);
    let rx = pump.receiver();
    let params = RunParams::default();
    let start = Instant::now();
    runner::run(engine, &rx, None, None, params, &shutdown, |ev| {
        let now_ms = start.elapsed().as_millis() as u64;
        publish(std::slice::from_ref(ev), &mut display, now_ms, json);
    })?;
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn attach_sources(
    pump: &mut SourcePump,
    cfg: &Config,
    hz: u32,
    timeout: Duration,
) -> eyre::Result<()> {
    use spoolsync_hardware::{hx711, tagbridge};

    let pins = cfg
        .pins
        .ok_or_else(|| eyre::eyre!("[pins] section required for hardware builds"))?;
    let scale = hx711::open(pins.hx711_dt, pins.hx711_sck).wrap_err("open hx711")?;
    pump.attach_weight(scale, hz, timeout, MonotonicClock::new());

    match tagbridge::TagBridge::open() {
        Ok(bridge) => pump.attach_presence(bridge, hz, timeout, MonotonicClock::new()),
        Err(e) => tracing::warn!(error = %e, "tag bridge unavailable; presence disabled"),
    }
    // The printer link is fed by the embedding service over the bus; no
    // local bitmask source on the device itself.
    Ok(())
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn attach_sources(
    pump: &mut SourcePump,
    cfg: &Config,
    hz: u32,
    timeout: Duration,
) -> eyre::Result<()> {
    use spoolsync_hardware::{SimulatedPrinterLink, SimulatedScale, SimulatedTagReader};

    let _ = cfg;
    tracing::info!("no hardware support compiled in; attaching simulated sources");
    pump.attach_weight(
        SimulatedScale::steady(0),
        hz,
        timeout,
        MonotonicClock::new(),
    );
    pump.attach_presence(SimulatedTagReader::empty(), hz, timeout, MonotonicClock::new());
    pump.attach_bitmask(
        SimulatedPrinterLink::new(Vec::new()),
        hz,
        timeout,
        MonotonicClock::new(),
    );
    Ok(())
}

/// Verify that every source answers one poll.
pub fn self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    use spoolsync_traits::{PresenceSource, WeightSource};

    let timeout = Duration::from_millis(cfg.timeouts.sample_ms);

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        use spoolsync_hardware::{hx711, tagbridge};
        let pins = cfg
            .pins
            .ok_or_else(|| eyre::eyre!("[pins] section required for hardware builds"))?;
        let mut scale = hx711::open(pins.hx711_dt, pins.hx711_sck).wrap_err("open hx711")?;
        scale
            .read(timeout)
            .map_err(|e| eyre::eyre!("hx711 read failed: {e}"))?;
        let mut bridge = tagbridge::TagBridge::open().wrap_err("open tag bridge")?;
        bridge
            .poll(timeout)
            .map_err(|e| eyre::eyre!("tag bridge poll failed: {e}"))?;
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        use spoolsync_hardware::{SimulatedScale, SimulatedTagReader};
        let mut scale = SimulatedScale::steady(0);
        scale
            .read(timeout)
            .map_err(|e| eyre::eyre!("simulated scale failed: {e}"))?;
        let mut reader = SimulatedTagReader::empty();
        reader
            .poll(timeout)
            .map_err(|e| eyre::eyre!("simulated reader failed: {e}"))?;
    }

    if json {
        println!("{}", serde_json::json!({ "ok": true }));
    } else {
        println!("self-check ok");
    }
    Ok(())
}
