//! Staging tracker: owns the "a spool is currently present" fact.
//!
//! Tag presence flickers; the tracker absorbs that with a long TTL grace
//! period. A staged tag survives absence until the TTL runs out, and any
//! re-appearance of the same tag cancels the countdown. A manual clear
//! additionally blocks the cleared tag for a short window so the reader's
//! continuous detection cannot immediately re-stage it.
//!
//! Pure state machine: no I/O, driven entirely by presence edges, explicit
//! commands and timer ticks with caller-supplied timestamps. Duplicate
//! edges are idempotent, never errors.

use tracing::{debug, info};

/// State change announcements; the engine maps these onto the outbound bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingEvent {
    Started { tag_id: String },
    Cleared,
}

/// Read-only view of the currently staged tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTag {
    pub tag_id: String,
    pub staged_at_ms: u64,
    /// Milliseconds of absence the staged state would still survive.
    /// Full TTL while the tag is present; counts down during absence.
    pub ttl_remaining_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    /// Tag on the sensor.
    Staged { tag: String, staged_at_ms: u64 },
    /// Tag off the sensor; staged state survives until the deadline.
    Expiring {
        tag: String,
        staged_at_ms: u64,
        deadline_ms: u64,
    },
}

#[derive(Debug)]
pub struct StagingTracker {
    state: State,
    ttl_ms: u64,
    block_ms: u64,
    /// Tag blocked from re-staging after a manual clear, with expiry.
    block: Option<(String, u64)>,
}

impl StagingTracker {
    pub fn new(ttl_ms: u64, block_ms: u64) -> Self {
        Self {
            state: State::Idle,
            ttl_ms,
            block_ms,
            block: None,
        }
    }

    /// Currently staged tag, if any (present or within its absence grace).
    pub fn staged(&self, now_ms: u64) -> Option<StagedTag> {
        match &self.state {
            State::Idle => None,
            State::Staged { tag, staged_at_ms } => Some(StagedTag {
                tag_id: tag.clone(),
                staged_at_ms: *staged_at_ms,
                ttl_remaining_ms: self.ttl_ms,
            }),
            State::Expiring {
                tag,
                staged_at_ms,
                deadline_ms,
            } => Some(StagedTag {
                tag_id: tag.clone(),
                staged_at_ms: *staged_at_ms,
                ttl_remaining_ms: deadline_ms.saturating_sub(now_ms),
            }),
        }
    }

    fn blocked(&mut self, tag: &str, now_ms: u64) -> bool {
        match &self.block {
            Some((blocked, until)) if now_ms < *until => blocked == tag,
            Some((blocked, _)) => {
                debug!(tag = %blocked, "re-staging block expired");
                self.block = None;
                false
            }
            None => false,
        }
    }

    /// Apply a presence edge. `Some(tag)` = a tag is in the field (appear or
    /// refresh), `None` = the field went empty.
    pub fn on_presence(&mut self, tag: Option<&str>, now_ms: u64) -> Option<StagingEvent> {
        match tag {
            Some(tag) => {
                if self.blocked(tag, now_ms) {
                    return None;
                }
                match std::mem::replace(&mut self.state, State::Idle) {
                    // Refresh: same tag, nothing to announce. Any pending
                    // absence countdown is cancelled.
                    State::Staged {
                        tag: cur,
                        staged_at_ms,
                    }
                    | State::Expiring {
                        tag: cur,
                        staged_at_ms,
                        ..
                    } if cur == tag => {
                        self.state = State::Staged {
                            tag: cur,
                            staged_at_ms,
                        };
                        None
                    }
                    // Different tag wins immediately, no grace for the old one.
                    State::Staged { .. } | State::Expiring { .. } | State::Idle => {
                        info!(tag_id = %tag, "tag staged");
                        self.state = State::Staged {
                            tag: tag.to_string(),
                            staged_at_ms: now_ms,
                        };
                        Some(StagingEvent::Started {
                            tag_id: tag.to_string(),
                        })
                    }
                }
            }
            None => {
                match std::mem::replace(&mut self.state, State::Idle) {
                    State::Staged { tag, staged_at_ms } => {
                        self.state = State::Expiring {
                            tag,
                            staged_at_ms,
                            deadline_ms: now_ms + self.ttl_ms,
                        };
                    }
                    // Duplicate absence: countdown already running.
                    other => self.state = other,
                }
                None
            }
        }
    }

    /// Advance timers; emits `Cleared` when the absence grace runs out.
    pub fn tick(&mut self, now_ms: u64) -> Option<StagingEvent> {
        if let State::Expiring {
            tag, deadline_ms, ..
        } = &self.state
            && now_ms >= *deadline_ms
        {
            info!(tag_id = %tag, "staging expired");
            self.state = State::Idle;
            return Some(StagingEvent::Cleared);
        }
        None
    }

    /// Explicit clear from the UI. Blocks the cleared tag briefly so it
    /// cannot re-stage while still sitting on the sensor.
    pub fn clear(&mut self, now_ms: u64) -> Option<StagingEvent> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::Staged { tag, .. } | State::Expiring { tag, .. } => {
                info!(tag_id = %tag, block_ms = self.block_ms, "staging cleared manually");
                if self.block_ms > 0 {
                    self.block = Some((tag, now_ms + self.block_ms));
                }
                Some(StagingEvent::Cleared)
            }
        }
    }
}
