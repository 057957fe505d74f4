use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use spoolsync_config::{Calibration, Config};
use spoolsync_core::{
    AssignmentOutcome, Command, DeviceCommand, InboundEvent, OutboundEvent, SyncEngine,
};
use spoolsync_traits::MaskFrame;
use spoolsync_traits::clock::Clock;

/// Deterministic test clock advanced manually in milliseconds.
#[derive(Clone)]
struct TestClock {
    origin: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl TestClock {
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

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::Relaxed))
    }

    fn sleep(&self, d: Duration) {
        self.advance_ms(d.as_millis() as u64);
    }
}

fn engine_with_clock() -> (SyncEngine, TestClock) {
    let clock = TestClock::new();
    let engine = SyncEngine::builder()
        .with_config(Config::default())
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build engine");
    (engine, clock)
}

fn begin(serial: &str, unit: u8, slot: u8, subject: &str) -> Command {
    Command::BeginAssignment {
        serial: serial.into(),
        unit_id: unit,
        slot_index: slot,
        subject_id: subject.into(),
    }
}

#[test]
fn insert_flow_resolves_exactly_one_success() {
    let (mut engine, _clock) = engine_with_clock();

    assert!(engine.command(begin("P1", 0, 2, "spool-42")).unwrap().is_empty());

    let out = engine.handle(InboundEvent::BitmaskUpdate {
        serial: "P1".into(),
        old_mask: Some(0b0000),
        new_mask: 0b0100,
    });
    assert_eq!(
        out,
        vec![OutboundEvent::ReadingStarted {
            serial: "P1".into(),
            unit_id: 0,
            slot_index: 2,
        }]
    );

    let out = engine.handle(InboundEvent::BitmaskUpdate {
        serial: "P1".into(),
        old_mask: Some(0b0100),
        new_mask: 0b0000,
    });
    assert!(out.is_empty());

    let out = engine.handle(InboundEvent::TraySnapshot {
        serial: "P1".into(),
        unit_id: 0,
        slot_index: 2,
        material_type: Some("PLA".into()),
        color: Some("FF0000".into()),
    });
    let successes: Vec<_> = out
        .iter()
        .filter(|e| {
            matches!(
                e,
                OutboundEvent::AssignmentResolved {
                    outcome: AssignmentOutcome::Success,
                    ..
                }
            )
        })
        .collect();
    assert_eq!(successes.len(), 1, "exactly one success event: {out:?}");
}

#[test]
fn assignment_times_out_via_injected_clock() {
    let (mut engine, clock) = engine_with_clock();
    engine.command(begin("P1", 0, 0, "s1")).unwrap();

    clock.advance_ms(29_999);
    assert!(engine.tick().is_empty());

    clock.advance_ms(1);
    let out = engine.tick();
    assert!(matches!(
        out.as_slice(),
        [OutboundEvent::AssignmentResolved {
            outcome: AssignmentOutcome::Timeout,
            ..
        }]
    ));
    // Nothing left to fire.
    clock.advance_ms(60_000);
    assert!(engine.tick().is_empty());
}

#[test]
fn begin_uses_last_snapshot_as_baseline() {
    let (mut engine, _clock) = engine_with_clock();

    // Slot already holds PLA before the user commits.
    engine.handle(InboundEvent::TraySnapshot {
        serial: "P1".into(),
        unit_id: 0,
        slot_index: 1,
        material_type: Some("PLA".into()),
        color: Some("FFFFFF".into()),
    });
    engine.command(begin("P1", 0, 1, "s1")).unwrap();

    // Identical snapshot, no read cycle: not confirmed.
    let out = engine.handle(InboundEvent::TraySnapshot {
        serial: "P1".into(),
        unit_id: 0,
        slot_index: 1,
        material_type: Some("PLA".into()),
        color: Some("FFFFFF".into()),
    });
    assert!(out.is_empty());

    // Different color: confirmed by diff.
    let out = engine.handle(InboundEvent::TraySnapshot {
        serial: "P1".into(),
        unit_id: 0,
        slot_index: 1,
        material_type: Some("PLA".into()),
        color: Some("000000".into()),
    });
    assert_eq!(out.len(), 1);
}

#[test]
fn conflicting_begin_surfaces_as_error() {
    let (mut engine, _clock) = engine_with_clock();
    engine.command(begin("P1", 0, 0, "s1")).unwrap();
    let err = engine
        .command(begin("P1", 0, 0, "s2"))
        .expect_err("conflict");
    assert!(format!("{err}").contains("already active"));
}

#[test]
fn cancel_then_snapshot_has_no_effect() {
    let (mut engine, _clock) = engine_with_clock();
    engine.command(begin("P1", 0, 0, "s1")).unwrap();
    engine
        .command(Command::CancelAssignment {
            serial: "P1".into(),
            unit_id: 0,
            slot_index: 0,
        })
        .unwrap();

    let out = engine.handle(InboundEvent::TraySnapshot {
        serial: "P1".into(),
        unit_id: 0,
        slot_index: 0,
        material_type: Some("PLA".into()),
        color: None,
    });
    assert!(out.is_empty());
}

#[test]
fn mask_frames_use_cached_old_mask() {
    let (mut engine, _clock) = engine_with_clock();
    engine.command(begin("P1", 0, 2, "s1")).unwrap();

    // First frame: no prior observation, no edge.
    let out = engine.observe_mask_frame(MaskFrame {
        serial: "P1".into(),
        reading_mask: 0b0100,
    });
    assert!(out.is_empty(), "first observation must not claim an edge");

    // Frame unchanged: still no edge.
    let out = engine.observe_mask_frame(MaskFrame {
        serial: "P1".into(),
        reading_mask: 0b0100,
    });
    assert!(out.is_empty());

    // Bit drops, then rises again: rising edge against the cached mask.
    engine.observe_mask_frame(MaskFrame {
        serial: "P1".into(),
        reading_mask: 0b0000,
    });
    let out = engine.observe_mask_frame(MaskFrame {
        serial: "P1".into(),
        reading_mask: 0b0100,
    });
    assert!(matches!(
        out.as_slice(),
        [OutboundEvent::ReadingStarted { .. }]
    ));
}

#[test]
fn staging_lifecycle_through_the_engine() {
    let (mut engine, clock) = engine_with_clock();

    let out = engine.handle(InboundEvent::PresenceEdge {
        tag_id: Some("A7:B2:65:00".into()),
    });
    assert_eq!(
        out,
        vec![OutboundEvent::StagingStarted {
            tag_id: "A7:B2:65:00".into()
        }]
    );
    assert_eq!(engine.staged().unwrap().tag_id, "A7:B2:65:00");

    // Flicker: absence then the same tag again, well inside the TTL.
    engine.handle(InboundEvent::PresenceEdge { tag_id: None });
    clock.advance_ms(2_000);
    assert!(engine.tick().is_empty());
    assert!(
        engine
            .handle(InboundEvent::PresenceEdge {
                tag_id: Some("A7:B2:65:00".into()),
            })
            .is_empty()
    );

    // Continuous absence expires staging exactly once (TTL 300 s default).
    engine.handle(InboundEvent::PresenceEdge { tag_id: None });
    clock.advance_ms(300_000);
    let out = engine.tick();
    assert_eq!(out, vec![OutboundEvent::StagingCleared]);
    assert!(engine.staged().is_none());
    assert!(engine.tick().is_empty());
}

#[test]
fn raw_weight_path_applies_calibration_and_settles() {
    let clock = TestClock::new();
    let engine = SyncEngine::builder()
        .with_config(Config::default())
        .with_calibration(Calibration {
            zero_counts: 1_000,
            gain_g_per_count: 0.5,
        })
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build engine");
    let mut engine = engine;

    // 3000 counts -> 1000 g; first observation broadcasts unstable state.
    let out = engine.observe_raw_weight(3_000);
    assert_eq!(
        out,
        vec![OutboundEvent::DeviceState {
            grams: 1_000.0,
            stable: false,
        }]
    );

    // Identical reading after the settle window flips stable.
    clock.advance_ms(800);
    let out = engine.observe_raw_weight(3_000);
    assert_eq!(
        out,
        vec![OutboundEvent::DeviceState {
            grams: 1_000.0,
            stable: true,
        }]
    );

    // Unchanged state is not rebroadcast.
    clock.advance_ms(100);
    assert!(engine.observe_raw_weight(3_000).is_empty());
}

#[test]
fn tare_and_calibrate_are_routed_not_executed() {
    let (mut engine, _clock) = engine_with_clock();
    let out = engine.command(Command::Tare).unwrap();
    assert_eq!(
        out,
        vec![OutboundEvent::DeviceCommand {
            command: DeviceCommand::Tare
        }]
    );
    let out = engine.command(Command::Calibrate { grams: 100.0 }).unwrap();
    assert!(matches!(
        out.as_slice(),
        [OutboundEvent::DeviceCommand {
            command: DeviceCommand::Calibrate { .. }
        }]
    ));
}

#[test]
fn two_printers_resolve_independently_through_the_engine() {
    let (mut engine, clock) = engine_with_clock();
    engine.command(begin("P1", 0, 0, "sa")).unwrap();
    clock.advance_ms(5_000);
    engine.command(begin("P2", 1, 2, "sb")).unwrap();

    // P1 confirms via diff; P2 is untouched.
    let out = engine.handle(InboundEvent::TraySnapshot {
        serial: "P1".into(),
        unit_id: 0,
        slot_index: 0,
        material_type: Some("ASA".into()),
        color: Some("336699".into()),
    });
    assert_eq!(out.len(), 1);

    // P2 times out on its own deadline, 30 s after its own begin.
    clock.advance_ms(30_000 - 1);
    assert!(engine.tick().is_empty());
    clock.advance_ms(1);
    let out = engine.tick();
    match out.as_slice() {
        [OutboundEvent::AssignmentResolved { serial, outcome, .. }] => {
            assert_eq!(serial, "P2");
            assert_eq!(*outcome, AssignmentOutcome::Timeout);
        }
        other => panic!("expected P2 timeout, got {other:?}"),
    }
}
