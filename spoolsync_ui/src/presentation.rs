//! Presentation timer: hold the last spool on screen through staging churn.
//!
//! `staging_cleared` does not blank the display; it starts a hold
//! countdown. A `staging_started` for the same tag within the debounce
//! window is treated as flicker and resumes silently. Only an undisturbed
//! hold period produces a display clear, exactly once.

use spoolsync_core::OutboundEvent;

/// What the display should do in response to an event or a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayChange {
    /// Show this spool (fresh appearance, worth an animation).
    Show(String),
    /// Blank the spool area.
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Empty,
    Showing {
        tag: String,
    },
    /// Staging cleared; spool still visible until `clear_at_ms`.
    Holding {
        tag: String,
        cleared_at_ms: u64,
        clear_at_ms: u64,
    },
}

#[derive(Debug)]
pub struct PresentationTimer {
    hold_ms: u64,
    debounce_ms: u64,
    state: State,
}

impl PresentationTimer {
    pub fn new(hold_ms: u64, debounce_ms: u64) -> Self {
        Self {
            hold_ms,
            debounce_ms,
            state: State::Empty,
        }
    }

    /// Tag currently visible on screen, if any.
    pub fn visible(&self) -> Option<&str> {
        match &self.state {
            State::Empty => None,
            State::Showing { tag } | State::Holding { tag, .. } => Some(tag),
        }
    }

    /// Feed one engine event; returns the display change it implies.
    pub fn on_event(&mut self, ev: &OutboundEvent, now_ms: u64) -> Option<DisplayChange> {
        match ev {
            OutboundEvent::StagingStarted { tag_id } => self.on_started(tag_id, now_ms),
            OutboundEvent::StagingCleared => self.on_cleared(now_ms),
            _ => None,
        }
    }

    /// Advance the hold countdown.
    pub fn tick(&mut self, now_ms: u64) -> Option<DisplayChange> {
        if let State::Holding { clear_at_ms, .. } = &self.state
            && now_ms >= *clear_at_ms
        {
            self.state = State::Empty;
            return Some(DisplayChange::Clear);
        }
        None
    }

    fn on_started(&mut self, tag_id: &str, now_ms: u64) -> Option<DisplayChange> {
        match std::mem::replace(&mut self.state, State::Empty) {
            // Flicker: same tag back within the debounce window; resume
            // without any visible change.
            State::Holding {
                tag, cleared_at_ms, ..
            } if tag == tag_id && now_ms.saturating_sub(cleared_at_ms) <= self.debounce_ms => {
                self.state = State::Showing { tag };
                None
            }
            // Already showing the same tag: idempotent.
            State::Showing { tag } if tag == tag_id => {
                self.state = State::Showing { tag };
                None
            }
            // Anything else is a fresh appearance.
            _ => {
                self.state = State::Showing {
                    tag: tag_id.to_string(),
                };
                Some(DisplayChange::Show(tag_id.to_string()))
            }
        }
    }

    fn on_cleared(&mut self, now_ms: u64) -> Option<DisplayChange> {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Showing { tag } => {
                self.state = State::Holding {
                    tag,
                    cleared_at_ms: now_ms,
                    clear_at_ms: now_ms + self.hold_ms,
                };
            }
            // Duplicate clear: the countdown is already running (or there is
            // nothing to hold); do not extend it.
            other => self.state = other,
        }
        // The spool stays visible through the hold; nothing changes yet.
        None
    }
}
