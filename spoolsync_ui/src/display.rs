//! Serializable display model for UI clients.
//!
//! Folds the outbound event stream into "what the screen shows": the
//! visible spool (via the presentation timer), live weight state, an
//! in-progress reading indicator and the last assignment outcome.

use serde::Serialize;

use spoolsync_core::{AssignmentOutcome, OutboundEvent};

use crate::presentation::{DisplayChange, PresentationTimer};

/// Snapshot handed to a renderer or pushed to a websocket client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayState {
    /// Tag id of the spool currently shown (held through staging grace).
    pub spool: Option<String>,
    pub grams: Option<f32>,
    pub stable: bool,
    /// Slot currently being read by the printer, when known.
    pub reading_slot: Option<ReadingSlot>,
    pub last_result: Option<AssignmentResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadingSlot {
    pub serial: String,
    pub unit_id: u8,
    pub slot_index: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentResult {
    pub serial: String,
    pub unit_id: u8,
    pub slot_index: u8,
    pub outcome: AssignmentOutcome,
    pub material_type: Option<String>,
}

#[derive(Debug)]
pub struct DisplayModel {
    timer: PresentationTimer,
    grams: Option<f32>,
    stable: bool,
    reading_slot: Option<ReadingSlot>,
    last_result: Option<AssignmentResult>,
}

impl DisplayModel {
    pub fn new(hold_ms: u64, debounce_ms: u64) -> Self {
        Self {
            timer: PresentationTimer::new(hold_ms, debounce_ms),
            grams: None,
            stable: false,
            reading_slot: None,
            last_result: None,
        }
    }

    /// Fold one engine event into the model. Returns true when the visible
    /// state changed and a redraw is worthwhile.
    pub fn apply(&mut self, ev: &OutboundEvent, now_ms: u64) -> bool {
        let spool_changed = self.timer.on_event(ev, now_ms).is_some();
        match ev {
            OutboundEvent::DeviceState { grams, stable } => {
                self.grams = Some(*grams);
                self.stable = *stable;
                true
            }
            OutboundEvent::ReadingStarted {
                serial,
                unit_id,
                slot_index,
            } => {
                self.reading_slot = Some(ReadingSlot {
                    serial: serial.clone(),
                    unit_id: *unit_id,
                    slot_index: *slot_index,
                });
                true
            }
            OutboundEvent::AssignmentResolved {
                serial,
                unit_id,
                slot_index,
                outcome,
                detail,
            } => {
                // The reading indicator is only meaningful while its request
                // is alive.
                if self.reading_slot.as_ref().is_some_and(|r| {
                    r.serial == *serial && r.unit_id == *unit_id && r.slot_index == *slot_index
                }) {
                    self.reading_slot = None;
                }
                self.last_result = Some(AssignmentResult {
                    serial: serial.clone(),
                    unit_id: *unit_id,
                    slot_index: *slot_index,
                    outcome: *outcome,
                    material_type: detail.as_ref().and_then(|d| d.material_type.clone()),
                });
                true
            }
            _ => spool_changed,
        }
    }

    /// Advance the hold countdown; returns true when the spool area blanked.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        matches!(self.timer.tick(now_ms), Some(DisplayChange::Clear))
    }

    pub fn state(&self) -> DisplayState {
        DisplayState {
            spool: self.timer.visible().map(str::to_string),
            grams: self.grams,
            stable: self.stable,
            reading_slot: self.reading_slot.clone(),
            last_result: self.last_result.clone(),
        }
    }
}
