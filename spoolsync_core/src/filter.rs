//! Sample filter: raw device readings in, clean signals out.
//!
//! Two independent halves: weight stability (consecutive samples within an
//! absolute tolerance for a minimum window) and presence edge extraction
//! (raw tag polls to appeared/disappeared transitions). Both are pure state
//! over a small amount of history; no I/O, no timers of their own.

/// Emitted when the stability verdict flips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StabilityEvent {
    /// Weight held within tolerance for the full window.
    Settled { grams: f32 },
    /// Weight moved outside tolerance; readings are untrustworthy again.
    Unsettled,
}

/// Declares weight stable once readings stay within `tolerance_g` of an
/// anchor sample for at least `window_ms`. Until then samples are unstable
/// and must not be used to commit persisted state.
#[derive(Debug)]
pub struct WeightFilter {
    tolerance_g: f32,
    window_ms: u64,
    /// Anchor sample the current run of in-tolerance readings started from.
    anchor_g: Option<f32>,
    run_started_ms: u64,
    stable: bool,
    last_g: Option<f32>,
}

impl WeightFilter {
    pub fn new(tolerance_g: f32, window_ms: u64) -> Self {
        Self {
            tolerance_g,
            window_ms,
            anchor_g: None,
            run_started_ms: 0,
            stable: false,
            last_g: None,
        }
    }

    /// Feed one sample; returns an event when the stability verdict changes.
    pub fn observe(&mut self, now_ms: u64, grams: f32) -> Option<StabilityEvent> {
        self.last_g = Some(grams);

        let in_tolerance = match self.anchor_g {
            Some(anchor) => (grams - anchor).abs() <= self.tolerance_g,
            None => false,
        };
        if !in_tolerance {
            // New run starts at this sample.
            self.anchor_g = Some(grams);
            self.run_started_ms = now_ms;
            if self.stable {
                self.stable = false;
                return Some(StabilityEvent::Unsettled);
            }
            return None;
        }

        self.poll(now_ms)
    }

    /// Re-evaluate the settle window without a fresh sample (time alone can
    /// complete the window).
    pub fn poll(&mut self, now_ms: u64) -> Option<StabilityEvent> {
        if self.stable || self.anchor_g.is_none() {
            return None;
        }
        if now_ms.saturating_sub(self.run_started_ms) >= self.window_ms {
            self.stable = true;
            return Some(StabilityEvent::Settled {
                grams: self.last_g.unwrap_or(0.0),
            });
        }
        None
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn last_grams(&self) -> Option<f32> {
        self.last_g
    }
}

/// Emitted when the raw presence state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A tag entered the field (or a different tag replaced the current one).
    Appeared(String),
    Disappeared,
}

/// Collapses repeated identical presence polls into edges.
#[derive(Debug, Default)]
pub struct PresenceFilter {
    current: Option<String>,
}

impl PresenceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw poll result; returns an edge when the state changed.
    pub fn observe(&mut self, sample: Option<&str>) -> Option<PresenceEvent> {
        match (self.current.as_deref(), sample) {
            (None, Some(tag)) => {
                self.current = Some(tag.to_string());
                Some(PresenceEvent::Appeared(tag.to_string()))
            }
            (Some(cur), Some(tag)) if cur != tag => {
                self.current = Some(tag.to_string());
                Some(PresenceEvent::Appeared(tag.to_string()))
            }
            (Some(_), None) => {
                self.current = None;
                Some(PresenceEvent::Disappeared)
            }
            _ => None,
        }
    }

    pub fn present(&self) -> Option<&str> {
        self.current.as_deref()
    }
}
