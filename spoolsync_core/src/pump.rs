//! Background source pumping.
//!
//! Each attached source gets its own thread that owns the source, polls it
//! at the requested rate and pushes samples into one shared bounded
//! channel. The engine side drains that channel from a single loop, which
//! keeps every state transition totally ordered.
//!
//! Safety: threads shut down via an atomic flag and are joined when the
//! `SourcePump` is dropped, preventing thread leaks.

use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use spoolsync_traits::clock::Clock;
use spoolsync_traits::{BitmaskSource, MaskFrame, PresenceSource, WeightSource};

/// One observation from any attached source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSample {
    Presence(Option<String>),
    RawWeight(i32),
    Mask(MaskFrame),
}

/// Longest a pump thread blocks on a full channel before dropping a sample.
const SEND_WAIT: Duration = Duration::from_millis(100);

pub struct SourcePump {
    tx: xch::Sender<SourceSample>,
    rx: xch::Receiver<SourceSample>,
    shutdown: Arc<AtomicBool>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl SourcePump {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = xch::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            last_ok: Arc::new(AtomicU64::new(0)),
            epoch: Instant::now(),
            handles: Vec::new(),
        }
    }

    /// Channel end the engine loop drains.
    pub fn receiver(&self) -> xch::Receiver<SourceSample> {
        self.rx.clone()
    }

    /// Milliseconds since any source last produced a good sample.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    pub fn attach_presence<S, C>(&mut self, source: S, hz: u32, timeout: Duration, clock: C)
    where
        S: PresenceSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        self.spawn(clock, hz, move |src: &mut S, t| {
            src.poll(t).map(SourceSample::Presence).map_err(|_| ())
        }, source, timeout, "presence");
    }

    pub fn attach_weight<S, C>(&mut self, source: S, hz: u32, timeout: Duration, clock: C)
    where
        S: WeightSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        self.spawn(clock, hz, move |src: &mut S, t| {
            src.read(t).map(SourceSample::RawWeight).map_err(|_| ())
        }, source, timeout, "weight");
    }

    pub fn attach_bitmask<S, C>(&mut self, source: S, hz: u32, timeout: Duration, clock: C)
    where
        S: BitmaskSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        self.spawn(clock, hz, move |src: &mut S, t| {
            match src.poll(t) {
                // Quiet poll: nothing to forward, but not an error either.
                Ok(None) => Err(()),
                Ok(Some(frame)) => Ok(SourceSample::Mask(frame)),
                Err(_) => Err(()),
            }
        }, source, timeout, "bitmask");
    }

    fn spawn<S, C, F>(&mut self, clock: C, hz: u32, mut poll: F, mut source: S, timeout: Duration, label: &'static str)
    where
        S: Send + 'static,
        C: Clock + Send + Sync + 'static,
        F: FnMut(&mut S, Duration) -> Result<SourceSample, ()> + Send + 'static,
    {
        let tx = self.tx.clone();
        let shutdown = self.shutdown.clone();
        let last_ok = self.last_ok.clone();
        let epoch = self.epoch;
        let period = Duration::from_micros(crate::util::period_us(hz));

        let handle = std::thread::spawn(move || {
            loop {
                if shutdown.load(Ordering::Relaxed) {
                    tracing::debug!(label, "source pump thread received shutdown signal");
                    break;
                }

                if let Ok(sample) = poll(&mut source, timeout) {
                    // Bounded wait: a slow consumer costs us the sample, not
                    // the thread; a gone consumer ends the thread.
                    match tx.send_timeout(sample, SEND_WAIT) {
                        Ok(()) => {
                            let now =
                                Instant::now().saturating_duration_since(epoch).as_millis() as u64;
                            last_ok.store(now, Ordering::Relaxed);
                        }
                        Err(xch::SendTimeoutError::Timeout(_)) => {
                            tracing::trace!(label, "consumer slow, sample dropped");
                        }
                        Err(xch::SendTimeoutError::Disconnected(_)) => {
                            tracing::debug!(label, "source pump consumer disconnected");
                            break;
                        }
                    }
                }
                // On timeout or transient error, just continue; the engine
                // loop has its own stall accounting.

                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!(label, "source pump thread exiting cleanly");
        });
        self.handles.push(handle);
    }
}

impl Drop for SourcePump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            match handle.join() {
                Ok(()) => tracing::trace!("source pump thread joined"),
                Err(e) => tracing::warn!(?e, "source pump thread panicked during shutdown"),
            }
        }
    }
}
