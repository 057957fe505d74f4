use rstest::rstest;
use spoolsync_core::coordinator::AssignmentCoordinator;
use spoolsync_core::{AssignmentOutcome, EngineError, OutboundEvent, SlotKey, TrayContents};

const TIMEOUT_MS: u64 = 30_000;

fn coordinator() -> AssignmentCoordinator {
    AssignmentCoordinator::new(TIMEOUT_MS)
}

fn key(serial: &str, unit: u8, slot: u8) -> SlotKey {
    SlotKey::new(serial, unit, slot)
}

fn empty_slot() -> TrayContents {
    TrayContents::default()
}

fn resolved(events: &[OutboundEvent]) -> Vec<&OutboundEvent> {
    events
        .iter()
        .filter(|e| matches!(e, OutboundEvent::AssignmentResolved { .. }))
        .collect()
}

#[test]
fn edge_then_diff_resolves_exactly_one_success() {
    let mut c = coordinator();
    // Canonical insert flow: empty slot, read cycle, content change.
    let out = c
        .begin(key("P1", 0, 2), "spool-42", empty_slot(), 0)
        .expect("begin");
    assert!(out.is_empty());

    // Rising edge on bit 2.
    let out = c.on_bitmask_update("P1", Some(0b0000), 0b0100);
    assert_eq!(
        out,
        vec![OutboundEvent::ReadingStarted {
            serial: "P1".into(),
            unit_id: 0,
            slot_index: 2,
        }]
    );

    // Falling edge alone must not resolve anything.
    let out = c.on_bitmask_update("P1", Some(0b0100), 0b0000);
    assert!(out.is_empty());

    // Snapshot with changed, non-empty material resolves success.
    let new = TrayContents::new(Some("PLA"), Some("FF0000"));
    let out = c.on_snapshot_update(&key("P1", 0, 2), &new);
    match out.as_slice() {
        [OutboundEvent::AssignmentResolved {
            serial,
            unit_id,
            slot_index,
            outcome,
            detail,
        }] => {
            assert_eq!(serial, "P1");
            assert_eq!((*unit_id, *slot_index), (0, 2));
            assert_eq!(*outcome, AssignmentOutcome::Success);
            assert_eq!(detail.as_ref(), Some(&new));
        }
        other => panic!("expected exactly one success, got {other:?}"),
    }

    // Request is gone: replaying the snapshot emits nothing further.
    assert!(c.on_snapshot_update(&key("P1", 0, 2), &new).is_empty());
    assert_eq!(c.active_len(), 0);
}

#[test]
fn no_events_resolves_exactly_one_timeout() {
    let mut c = coordinator();
    c.begin(key("P1", 0, 0), "s1", empty_slot(), 0).unwrap();

    assert!(c.tick(TIMEOUT_MS - 1).is_empty());
    let out = c.tick(TIMEOUT_MS);
    assert_eq!(resolved(&out).len(), 1);
    assert!(matches!(
        out[0],
        OutboundEvent::AssignmentResolved {
            outcome: AssignmentOutcome::Timeout,
            ..
        }
    ));
    // No second timeout.
    assert!(c.tick(TIMEOUT_MS * 2).is_empty());
}

#[test]
fn begin_on_active_key_is_a_conflict() {
    let mut c = coordinator();
    c.begin(key("P1", 1, 3), "s1", empty_slot(), 0).unwrap();
    let err = c
        .begin(key("P1", 1, 3), "s2", empty_slot(), 1_000)
        .expect_err("second begin must conflict");
    assert_eq!(
        err,
        EngineError::ConflictingAssignment {
            serial: "P1".into(),
            unit_id: 1,
            slot_index: 3,
        }
    );
    // The original request is untouched.
    assert_eq!(c.request(&key("P1", 1, 3)).unwrap().subject_id, "s1");
}

#[test]
fn begin_takes_over_an_expired_request_cleanly() {
    let mut c = coordinator();
    c.begin(key("P1", 0, 1), "old", empty_slot(), 0).unwrap();

    // Deadline passed but no tick delivered the timeout yet; the new begin
    // flushes it and takes the key.
    let out = c
        .begin(
            key("P1", 0, 1),
            "new",
            TrayContents::new(Some("PETG"), None),
            TIMEOUT_MS + 5,
        )
        .expect("takeover");
    assert_eq!(resolved(&out).len(), 1);
    assert!(matches!(
        out[0],
        OutboundEvent::AssignmentResolved {
            outcome: AssignmentOutcome::Timeout,
            ..
        }
    ));
    let req = c.request(&key("P1", 0, 1)).unwrap();
    assert_eq!(req.subject_id, "new");
    assert_eq!(req.started_at_ms, TIMEOUT_MS + 5);
    // Old deadline does not leak onto the new request.
    assert!(c.tick(TIMEOUT_MS + 6).is_empty());
}

#[test]
fn independent_keys_do_not_interfere() {
    let mut c = coordinator();
    let a = key("P1", 0, 0);
    let b = key("P2", 2, 1);
    c.begin(a.clone(), "sa", TrayContents::new(Some("PLA"), Some("111111")), 0)
        .unwrap();
    c.begin(b.clone(), "sb", empty_slot(), 10_000).unwrap();

    // Resolving A leaves B's baseline and deadline alone.
    let out = c.on_snapshot_update(&a, &TrayContents::new(Some("ABS"), Some("222222")));
    assert_eq!(resolved(&out).len(), 1);

    let req_b = c.request(&b).unwrap();
    assert_eq!(req_b.original, empty_slot());
    assert_eq!(req_b.started_at_ms, 10_000);

    // B still times out on its own clock.
    assert!(c.tick(10_000 + TIMEOUT_MS - 1).is_empty());
    assert_eq!(c.tick(10_000 + TIMEOUT_MS).len(), 1);
}

#[test]
fn duplicate_bitmask_update_is_idempotent() {
    let mut c = coordinator();
    c.begin(key("P1", 0, 2), "s1", empty_slot(), 0).unwrap();

    let first = c.on_bitmask_update("P1", Some(0b0000), 0b0100);
    assert_eq!(first.len(), 1); // reading_started
    let second = c.on_bitmask_update("P1", Some(0b0000), 0b0100);
    assert!(second.is_empty(), "replay must not re-announce");

    // State equals single delivery: still mid-read, so a changed snapshot
    // does not resolve yet.
    let out = c.on_snapshot_update(
        &key("P1", 0, 2),
        &TrayContents::new(Some("PLA"), Some("00FF00")),
    );
    assert!(out.is_empty());

    // Falling edge, then the snapshot resolves.
    c.on_bitmask_update("P1", Some(0b0100), 0b0000);
    let out = c.on_snapshot_update(
        &key("P1", 0, 2),
        &TrayContents::new(Some("PLA"), Some("00FF00")),
    );
    assert_eq!(resolved(&out).len(), 1);
}

#[test]
fn cancel_removes_request_without_resolution() {
    let mut c = coordinator();
    c.begin(key("P1", 0, 3), "s1", empty_slot(), 0).unwrap();
    assert!(c.cancel(&key("P1", 0, 3)));

    // Round-trip: a later snapshot for the key has no observable effect.
    let out = c.on_snapshot_update(
        &key("P1", 0, 3),
        &TrayContents::new(Some("PLA"), Some("FF0000")),
    );
    assert!(out.is_empty());
    assert!(c.tick(TIMEOUT_MS).is_empty());
    assert!(!c.cancel(&key("P1", 0, 3)));
}

#[test]
fn explicit_complete_bypasses_diff_logic() {
    let mut c = coordinator();
    // Baseline identical to what the slot will keep reporting.
    let baseline = TrayContents::new(Some("PLA"), Some("FFFFFF"));
    c.begin(key("P1", 0, 0), "s1", baseline.clone(), 0).unwrap();

    // No diff, no edge — but the target confirms out-of-band.
    let out = c.on_explicit_complete(&key("P1", 0, 0), true);
    assert!(matches!(
        out.as_slice(),
        [OutboundEvent::AssignmentResolved {
            outcome: AssignmentOutcome::Success,
            detail: None,
            ..
        }]
    ));
}

#[test]
fn explicit_failure_resolves_failure() {
    let mut c = coordinator();
    c.begin(key("P1", 0, 0), "s1", empty_slot(), 0).unwrap();
    let out = c.on_explicit_complete(&key("P1", 0, 0), false);
    assert!(matches!(
        out.as_slice(),
        [OutboundEvent::AssignmentResolved {
            outcome: AssignmentOutcome::Failure,
            ..
        }]
    ));
}

#[test]
fn stale_completion_is_dropped_and_counted() {
    let mut c = coordinator();
    c.begin(key("P1", 0, 0), "s1", empty_slot(), 0).unwrap();
    c.cancel(&key("P1", 0, 0));

    assert_eq!(c.stale_dropped(), 0);
    let out = c.on_explicit_complete(&key("P1", 0, 0), true);
    assert!(out.is_empty());
    assert_eq!(c.stale_dropped(), 1);
}

#[rstest]
#[case(128)]
#[case(254)]
#[case(255)]
fn unmapped_unit_types_resolve_on_content_diff_alone(#[case] unit_id: u8) {
    // Known gap: single-slot unit types never produce a bitmask signal, so
    // reading_started is never emitted and content change alone confirms.
    let mut c = coordinator();
    let k = key("P1", unit_id, 0);
    c.begin(k.clone(), "s1", empty_slot(), 0).unwrap();

    // Mask traffic exists but cannot address this slot.
    let out = c.on_bitmask_update("P1", Some(0), 0xFFFF);
    assert!(out.is_empty(), "no reading_started for unmapped units");

    let out = c.on_snapshot_update(&k, &TrayContents::new(Some("TPU"), Some("000000")));
    assert_eq!(resolved(&out).len(), 1);
}

#[test]
fn empty_material_never_confirms() {
    let mut c = coordinator();
    c.begin(
        key("P1", 0, 0),
        "s1",
        TrayContents::new(Some("PLA"), Some("FF0000")),
        0,
    )
    .unwrap();

    // Slot emptied: differs from baseline but has no material.
    let out = c.on_snapshot_update(&key("P1", 0, 0), &TrayContents::default());
    assert!(out.is_empty());
    let out = c.on_snapshot_update(&key("P1", 0, 0), &TrayContents::new(Some(""), None));
    assert!(out.is_empty());
}

#[test]
fn post_read_non_empty_confirms_without_diff() {
    // Same contents as the baseline, but a full read cycle happened: the
    // printer re-read the inserted spool and reports identical material.
    let mut c = coordinator();
    let baseline = TrayContents::new(Some("PLA"), Some("FF0000"));
    c.begin(key("P1", 0, 1), "s1", baseline.clone(), 0).unwrap();

    c.on_bitmask_update("P1", Some(0b0000), 0b0010);
    c.on_bitmask_update("P1", Some(0b0010), 0b0000);
    let out = c.on_snapshot_update(&key("P1", 0, 1), &baseline);
    assert_eq!(resolved(&out).len(), 1);
}

#[test]
fn snapshot_mid_read_waits_for_falling_edge() {
    let mut c = coordinator();
    c.begin(key("P1", 0, 0), "s1", empty_slot(), 0).unwrap();

    c.on_bitmask_update("P1", Some(0b0000), 0b0001);
    // Reader still on the slot; transient contents must not confirm.
    let out = c.on_snapshot_update(&key("P1", 0, 0), &TrayContents::new(Some("PLA"), None));
    assert!(out.is_empty());

    c.on_bitmask_update("P1", Some(0b0001), 0b0000);
    let out = c.on_snapshot_update(&key("P1", 0, 0), &TrayContents::new(Some("PLA"), None));
    assert_eq!(resolved(&out).len(), 1);
}
