//! Event and command shapes exchanged with collaborators over the bus.
//!
//! Field names and tags match the wire protocol the UI and device sides
//! speak; everything serializes to snake_case-tagged JSON objects.

use serde::{Deserialize, Serialize};

/// Identity of one material slot: `(serial, unit_id, slot_index)`.
///
/// Requests, snapshots and resolutions are all addressed by this key;
/// concurrent assignments for different keys are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub serial: String,
    pub unit_id: u8,
    pub slot_index: u8,
}

impl SlotKey {
    pub fn new(serial: impl Into<String>, unit_id: u8, slot_index: u8) -> Self {
        Self {
            serial: serial.into(),
            unit_id,
            slot_index,
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.serial, self.unit_id, self.slot_index)
    }
}

/// Point-in-time copy of a slot's contents, compared on `material_type`
/// and `color` only. Never mutated in place once captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrayContents {
    pub material_type: Option<String>,
    pub color: Option<String>,
}

impl TrayContents {
    pub fn new(material_type: Option<&str>, color: Option<&str>) -> Self {
        Self {
            material_type: material_type.map(str::to_string),
            color: color.map(str::to_string),
        }
    }

    /// True when the slot holds a non-empty material description.
    pub fn has_material(&self) -> bool {
        self.material_type.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// Events arriving from collaborators (device, printer link, assignment
/// target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Tag presence edge; `tag_id: None` means the field went empty.
    PresenceEdge { tag_id: Option<String> },
    /// Filtered weight state from the sensing device.
    WeightSample { grams: f32, stable: bool },
    /// Printer-reported reading bitmask transition. `old_mask: None` when
    /// the sender has no prior observation.
    BitmaskUpdate {
        serial: String,
        old_mask: Option<u32>,
        new_mask: u32,
    },
    /// Fresh copy of one slot's contents.
    TraySnapshot {
        serial: String,
        unit_id: u8,
        slot_index: u8,
        material_type: Option<String>,
        color: Option<String>,
    },
    /// Out-of-band confirmation from the assignment target itself.
    AssignmentComplete {
        serial: String,
        unit_id: u8,
        slot_index: u8,
        success: bool,
    },
}

/// Terminal outcome of an assignment request. Exactly one of these is
/// emitted per request, ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Success,
    Failure,
    Timeout,
}

/// Commands the weight subsystem executes on the core's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeviceCommand {
    Tare,
    Calibrate { grams: f32 },
}

/// Events published to UI clients and collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    StagingStarted {
        tag_id: String,
    },
    StagingCleared,
    /// Best-effort: only emitted for slots with a defined bit mapping.
    ReadingStarted {
        serial: String,
        unit_id: u8,
        slot_index: u8,
    },
    AssignmentResolved {
        serial: String,
        unit_id: u8,
        slot_index: u8,
        outcome: AssignmentOutcome,
        /// New material description, present on success via content diff.
        detail: Option<TrayContents>,
    },
    /// Republished weight state, emitted only when it changes.
    DeviceState {
        grams: f32,
        stable: bool,
    },
    /// Tare/calibrate routed through to the weight subsystem.
    DeviceCommand {
        command: DeviceCommand,
    },
}

/// Commands accepted from UI clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    BeginAssignment {
        serial: String,
        unit_id: u8,
        slot_index: u8,
        subject_id: String,
    },
    CancelAssignment {
        serial: String,
        unit_id: u8,
        slot_index: u8,
    },
    ClearStaging,
    Tare,
    Calibrate {
        grams: f32,
    },
}
