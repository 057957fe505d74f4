//! Engine facade: one place where every inbound event, command and timer
//! tick is applied, strictly one at a time.
//!
//! All state transitions for the staging tracker and the assignment
//! coordinator happen inside `handle` / `command` / `tick`, so events for a
//! given key are processed in arrival order and no two transitions for the
//! same entity ever race. Suspension only exists at the boundary: callers
//! block waiting for the next inbound event, never inside the engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use spoolsync_config::{Calibration, Config};
use spoolsync_traits::clock::{Clock, MonotonicClock};
use spoolsync_traits::MaskFrame;

use crate::coordinator::AssignmentCoordinator;
use crate::error::{BuildError, Result};
use crate::event::{Command, DeviceCommand, InboundEvent, OutboundEvent, SlotKey, TrayContents};
use crate::filter::{PresenceFilter, StabilityEvent, WeightFilter};
use crate::staging::{StagedTag, StagingEvent, StagingTracker};

pub struct SyncEngine {
    staging: StagingTracker,
    coordinator: AssignmentCoordinator,
    weight: WeightFilter,
    presence: PresenceFilter,
    calibration: Option<Calibration>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    /// Last reading mask seen per serial; supplies `old_mask` when a source
    /// delivers bare frames.
    last_masks: HashMap<String, u32>,
    /// Last known contents per slot; the diff baseline handed to `begin`.
    tray_cache: HashMap<SlotKey, TrayContents>,
    /// Last broadcast weight state, for change detection.
    last_device_state: Option<(f32, bool)>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("active_assignments", &self.coordinator.active_len())
            .field("staged", &self.staging.staged(self.now_ms()))
            .finish()
    }
}

impl SyncEngine {
    /// Start building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Milliseconds since the engine was built, per the injected clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Currently staged tag, if any.
    pub fn staged(&self) -> Option<StagedTag> {
        self.staging.staged(self.now_ms())
    }

    /// Count of events dropped because they referenced superseded requests.
    pub fn stale_dropped(&self) -> u64 {
        self.coordinator.stale_dropped()
    }

    /// Apply one inbound bus event.
    pub fn handle(&mut self, ev: InboundEvent) -> Vec<OutboundEvent> {
        let now = self.now_ms();
        match ev {
            InboundEvent::PresenceEdge { tag_id } => {
                let event = self.staging.on_presence(tag_id.as_deref(), now);
                event.into_iter().map(staging_to_outbound).collect()
            }
            InboundEvent::WeightSample { grams, stable } => self.device_state_changed(grams, stable),
            InboundEvent::BitmaskUpdate {
                serial,
                old_mask,
                new_mask,
            } => {
                let old = old_mask.or_else(|| self.last_masks.get(&serial).copied());
                let out = self.coordinator.on_bitmask_update(&serial, old, new_mask);
                self.last_masks.insert(serial, new_mask);
                out
            }
            InboundEvent::TraySnapshot {
                serial,
                unit_id,
                slot_index,
                material_type,
                color,
            } => {
                let key = SlotKey::new(serial, unit_id, slot_index);
                let contents = TrayContents {
                    material_type,
                    color,
                };
                let out = self.coordinator.on_snapshot_update(&key, &contents);
                self.tray_cache.insert(key, contents);
                out
            }
            InboundEvent::AssignmentComplete {
                serial,
                unit_id,
                slot_index,
                success,
            } => {
                let key = SlotKey::new(serial, unit_id, slot_index);
                self.coordinator.on_explicit_complete(&key, success)
            }
        }
    }

    /// Execute one UI command.
    pub fn command(&mut self, cmd: Command) -> Result<Vec<OutboundEvent>> {
        let now = self.now_ms();
        match cmd {
            Command::BeginAssignment {
                serial,
                unit_id,
                slot_index,
                subject_id,
            } => {
                let key = SlotKey::new(serial, unit_id, slot_index);
                let snapshot = self.tray_cache.get(&key).cloned().unwrap_or_default();
                self.coordinator
                    .begin(key, subject_id, snapshot, now)
                    .map_err(eyre::Report::new)
            }
            Command::CancelAssignment {
                serial,
                unit_id,
                slot_index,
            } => {
                let key = SlotKey::new(serial, unit_id, slot_index);
                self.coordinator.cancel(&key);
                Ok(Vec::new())
            }
            Command::ClearStaging => {
                let event = self.staging.clear(now);
                Ok(event.into_iter().map(staging_to_outbound).collect())
            }
            // Routed to the weight subsystem, not executed here.
            Command::Tare => Ok(vec![OutboundEvent::DeviceCommand {
                command: DeviceCommand::Tare,
            }]),
            Command::Calibrate { grams } => Ok(vec![OutboundEvent::DeviceCommand {
                command: DeviceCommand::Calibrate { grams },
            }]),
        }
    }

    /// Advance every timer: staging TTL, assignment deadlines, the settle
    /// window. Call at the event-loop cadence.
    pub fn tick(&mut self) -> Vec<OutboundEvent> {
        let now = self.now_ms();
        let mut out: Vec<OutboundEvent> = self
            .staging
            .tick(now)
            .into_iter()
            .map(staging_to_outbound)
            .collect();
        out.extend(self.coordinator.tick(now));
        if let Some(StabilityEvent::Settled { grams }) = self.weight.poll(now) {
            out.extend(self.device_state_changed(grams, true));
        }
        out
    }

    /// Raw presence poll from a source pump; duplicates collapse to edges.
    pub fn observe_presence_sample(&mut self, sample: Option<&str>) -> Vec<OutboundEvent> {
        match self.presence.observe(sample) {
            Some(crate::filter::PresenceEvent::Appeared(tag)) => {
                self.handle(InboundEvent::PresenceEdge { tag_id: Some(tag) })
            }
            Some(crate::filter::PresenceEvent::Disappeared) => {
                self.handle(InboundEvent::PresenceEdge { tag_id: None })
            }
            None => Vec::new(),
        }
    }

    /// Raw load-cell counts from a source pump; calibration and the settle
    /// filter turn them into weight state.
    pub fn observe_raw_weight(&mut self, raw: i32) -> Vec<OutboundEvent> {
        let grams = match &self.calibration {
            Some(cal) => cal.to_grams(raw),
            None => raw as f32,
        };
        let now = self.now_ms();
        match self.weight.observe(now, grams) {
            Some(StabilityEvent::Settled { grams }) => self.device_state_changed(grams, true),
            Some(StabilityEvent::Unsettled) => self.device_state_changed(grams, false),
            None => self.device_state_changed(grams, self.weight.is_stable()),
        }
    }

    /// A bare mask frame from a printer link; the previous frame for the
    /// serial supplies the old mask.
    pub fn observe_mask_frame(&mut self, frame: MaskFrame) -> Vec<OutboundEvent> {
        self.handle(InboundEvent::BitmaskUpdate {
            serial: frame.serial,
            old_mask: None,
            new_mask: frame.reading_mask,
        })
    }

    fn device_state_changed(&mut self, grams: f32, stable: bool) -> Vec<OutboundEvent> {
        let rounded = (grams * 10.0).round() / 10.0;
        if self.last_device_state == Some((rounded, stable)) {
            return Vec::new();
        }
        self.last_device_state = Some((rounded, stable));
        vec![OutboundEvent::DeviceState {
            grams: rounded,
            stable,
        }]
    }
}

fn staging_to_outbound(ev: StagingEvent) -> OutboundEvent {
    match ev {
        StagingEvent::Started { tag_id } => OutboundEvent::StagingStarted { tag_id },
        StagingEvent::Cleared => OutboundEvent::StagingCleared,
    }
}

/// Builder for `SyncEngine`. Everything is optional; defaults come from
/// `spoolsync_config::Config::default()`.
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<Config>,
    calibration: Option<Calibration>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
}

impl EngineBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Provide a custom clock; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<SyncEngine> {
        let config = self.config.unwrap_or_default();

        // Validate the knobs the engine actually consumes; full schema
        // validation belongs to the config loader.
        if config.staging.ttl_secs == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "staging.ttl_secs must be >= 1",
            )));
        }
        if config.assignment.timeout_secs == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "assignment.timeout_secs must be >= 1",
            )));
        }
        if !config.filter.tolerance_g.is_finite() || config.filter.tolerance_g <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "filter.tolerance_g must be finite and > 0",
            )));
        }
        if config.filter.window_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "filter.window_ms must be >= 1",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();

        Ok(SyncEngine {
            staging: StagingTracker::new(
                config.staging.ttl_secs.saturating_mul(1000),
                config.staging.block_secs.saturating_mul(1000),
            ),
            coordinator: AssignmentCoordinator::new(
                config.assignment.timeout_secs.saturating_mul(1000),
            ),
            weight: WeightFilter::new(config.filter.tolerance_g, config.filter.window_ms),
            presence: PresenceFilter::new(),
            calibration: self.calibration,
            clock,
            epoch,
            last_masks: HashMap::new(),
            tray_cache: HashMap::new(),
            last_device_state: None,
        })
    }
}
