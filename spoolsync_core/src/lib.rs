#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Spool-staging and slot-assignment synchronization engine
//! (hardware-agnostic).
//!
//! Links a physically scanned filament spool — identified by a proximity
//! tag and a load-cell reading — to a specific slot in a printer's material
//! unit, across an unreliable link. Sensor input arrives noisy and out of
//! order; slot confirmation is inferred from the printer's own status
//! stream rather than a direct acknowledgement.
//!
//! ## Architecture
//!
//! - **Filtering**: weight settle detection, presence edge extraction
//!   (`filter` module)
//! - **Staging**: "a spool is present" with TTL grace and clear-block
//!   (`staging` module)
//! - **Bitmask**: slot-to-bit mapping and edge detection (`bitmask` module)
//! - **Coordination**: keyed insert-into-slot protocol with edge + diff
//!   confirmation (`coordinator` module)
//! - **Facade**: single event-loop entry point with an injected clock
//!   (`engine` module)
//! - **Pumping**: source threads feeding one bounded channel (`pump`,
//!   `runner` modules)
//!
//! All hardware interactions go through `spoolsync_traits` sources, so the
//! whole engine is testable against synthetic event sequences.

// Module declarations
pub mod bitmask;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod mocks;
pub mod pump;
pub mod runner;
pub mod staging;
pub mod util;

pub use coordinator::{AssignmentCoordinator, AssignmentRequest};
pub use engine::{EngineBuilder, SyncEngine};
pub use error::{BuildError, EngineError};
pub use event::{
    AssignmentOutcome, Command, DeviceCommand, InboundEvent, OutboundEvent, SlotKey, TrayContents,
};
pub use filter::{PresenceEvent, PresenceFilter, StabilityEvent, WeightFilter};
pub use staging::{StagedTag, StagingEvent, StagingTracker};
