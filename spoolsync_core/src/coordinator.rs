//! Assignment coordinator: confirms that a physical subject landed in a
//! specific slot.
//!
//! Success is never acknowledged directly by the printer. The coordinator
//! infers it from two independent signals: a rising/falling edge of the
//! slot's bit in the printer's reading bitmask, and a before/after diff of
//! the slot's contents. Slot types without a defined bit mapping (see the
//! `bitmask` module) degrade to content-diff-only detection.
//!
//! Requests are keyed by `(serial, unit_id, slot_index)` in a map, so any
//! number of slots can be pending at once and resolving one never touches
//! another. Every request resolves exactly once: the request is removed
//! from the active set before its terminal event is handed out, which makes
//! a second terminal event structurally impossible.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::bitmask::{self, MaskEdge};
use crate::error::EngineError;
use crate::event::{AssignmentOutcome, OutboundEvent, SlotKey, TrayContents};

/// One in-flight "insert spool into slot" request.
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub subject_id: String,
    /// Slot contents captured at `begin`; the diff baseline.
    pub original: TrayContents,
    /// Latched once a rising edge of the slot's bit is seen. Never unlatched.
    pub reading_seen: bool,
    /// Rising edge seen without a following falling edge.
    read_in_progress: bool,
    pub started_at_ms: u64,
}

#[derive(Debug)]
pub struct AssignmentCoordinator {
    timeout_ms: u64,
    active: HashMap<SlotKey, AssignmentRequest>,
    /// Stale completions referencing no live request, kept for diagnostics.
    stale_dropped: u64,
    /// (serial, unit_id) pairs already warned about missing bit mappings.
    unmapped_warned: HashSet<(String, u8)>,
}

impl AssignmentCoordinator {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            active: HashMap::new(),
            stale_dropped: 0,
            unmapped_warned: HashSet::new(),
        }
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn request(&self, key: &SlotKey) -> Option<&AssignmentRequest> {
        self.active.get(key)
    }

    /// Count of events that referenced a superseded request and were dropped.
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    fn expired(&self, req: &AssignmentRequest, now_ms: u64) -> bool {
        now_ms.saturating_sub(req.started_at_ms) >= self.timeout_ms
    }

    fn resolve(
        &mut self,
        key: &SlotKey,
        outcome: AssignmentOutcome,
        detail: Option<TrayContents>,
        out: &mut Vec<OutboundEvent>,
    ) {
        // Removal before emission: once the request is gone, nothing can
        // resolve it again.
        if self.active.remove(key).is_some() {
            info!(key = %key, ?outcome, "assignment resolved");
            out.push(OutboundEvent::AssignmentResolved {
                serial: key.serial.clone(),
                unit_id: key.unit_id,
                slot_index: key.slot_index,
                outcome,
                detail,
            });
        }
    }

    /// Start tracking an assignment. Fails with `ConflictingAssignment`
    /// while a live request holds the key; a request that already ran past
    /// its deadline is timed out on the spot and the new one takes over.
    pub fn begin(
        &mut self,
        key: SlotKey,
        subject_id: impl Into<String>,
        current_snapshot: TrayContents,
        now_ms: u64,
    ) -> Result<Vec<OutboundEvent>, EngineError> {
        let mut out = Vec::new();
        if let Some(existing) = self.active.get(&key) {
            if !self.expired(existing, now_ms) {
                return Err(EngineError::ConflictingAssignment {
                    serial: key.serial,
                    unit_id: key.unit_id,
                    slot_index: key.slot_index,
                });
            }
            // The previous request's deadline passed but its timeout has not
            // been delivered yet; deliver it now so the key is handed over
            // cleanly.
            self.resolve(&key, AssignmentOutcome::Timeout, None, &mut out);
        }
        let subject_id = subject_id.into();
        info!(key = %key, %subject_id, "assignment started");
        self.active.insert(
            key,
            AssignmentRequest {
                subject_id,
                original: current_snapshot,
                reading_seen: false,
                read_in_progress: false,
                started_at_ms: now_ms,
            },
        );
        Ok(out)
    }

    /// Apply one bitmask transition for a serial to every request on it.
    pub fn on_bitmask_update(
        &mut self,
        serial: &str,
        old_mask: Option<u32>,
        new_mask: u32,
    ) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        let mut warn_units: Vec<u8> = Vec::new();
        for (key, req) in self.active.iter_mut() {
            if key.serial != serial {
                continue;
            }
            let Some(bit) = bitmask::bit_for(key.unit_id, key.slot_index) else {
                warn_units.push(key.unit_id);
                continue;
            };
            match bitmask::edge(old_mask, new_mask, bit) {
                MaskEdge::Rising => {
                    req.read_in_progress = true;
                    // Latch once; replays of the same transition stay silent.
                    if !req.reading_seen {
                        req.reading_seen = true;
                        out.push(OutboundEvent::ReadingStarted {
                            serial: key.serial.clone(),
                            unit_id: key.unit_id,
                            slot_index: key.slot_index,
                        });
                    }
                }
                MaskEdge::Falling => {
                    // Input for diff evaluation, not a resolution by itself.
                    req.read_in_progress = false;
                }
                MaskEdge::None => {}
            }
        }
        for unit_id in warn_units {
            if self.unmapped_warned.insert((serial.to_string(), unit_id)) {
                warn!(
                    serial,
                    unit_id, "no bit mapping for unit type; falling back to content diff"
                );
            }
        }
        out
    }

    /// Evaluate a fresh slot snapshot against the matching request, if any.
    pub fn on_snapshot_update(&mut self, key: &SlotKey, new: &TrayContents) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        let Some(req) = self.active.get(key) else {
            return out;
        };
        let differs = *new != req.original;
        // Diff-based OR post-read-non-empty: slot types without a bitmask
        // signal must succeed on content change alone, while mapped slots
        // may report unchanged contents plus a completed read.
        let confirmed = differs || req.reading_seen;
        if confirmed && new.has_material() && !req.read_in_progress {
            self.resolve(key, AssignmentOutcome::Success, Some(new.clone()), &mut out);
        } else {
            debug!(
                key = %key,
                differs,
                reading_seen = req.reading_seen,
                mid_read = req.read_in_progress,
                has_material = new.has_material(),
                "snapshot did not confirm assignment"
            );
        }
        out
    }

    /// Out-of-band completion from the assignment target; takes priority
    /// over diff logic whenever it arrives.
    pub fn on_explicit_complete(&mut self, key: &SlotKey, success: bool) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        if self.active.contains_key(key) {
            let outcome = if success {
                AssignmentOutcome::Success
            } else {
                AssignmentOutcome::Failure
            };
            self.resolve(key, outcome, None, &mut out);
        } else {
            self.stale_dropped += 1;
            debug!(key = %key, "completion for superseded request dropped");
        }
        out
    }

    /// Time out every request whose deadline has passed.
    pub fn tick(&mut self, now_ms: u64) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        let expired: Vec<SlotKey> = self
            .active
            .iter()
            .filter(|(_, req)| self.expired(req, now_ms))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.resolve(&key, AssignmentOutcome::Timeout, None, &mut out);
        }
        out
    }

    /// Drop a request without resolution (user closed the flow). Later
    /// events bearing this key are ignored, not misapplied.
    pub fn cancel(&mut self, key: &SlotKey) -> bool {
        let removed = self.active.remove(key).is_some();
        if removed {
            info!(key = %key, "assignment cancelled");
        }
        removed
    }
}
