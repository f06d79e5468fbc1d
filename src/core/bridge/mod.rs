//! Frame fan-out
//!
//! Validated RTCM3 frames leave the core through [`FrameConsumer`]. Consumers
//! receive cheap clones of immutable frames and never touch parser state.
//! Network consumers run on their own threads behind a bounded channel so a
//! slow caster can never stall the serial read loop.

mod caster;

pub use caster::{CasterConfig, CasterRelay, CasterStats, RelayError, DEFAULT_RECONNECT_INTERVAL_SECS};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::protocol::rtcm::RtcmFrame;

/// Receiver of completed, CRC-valid frames
pub trait FrameConsumer: Send {
    /// Short name used in logs and status output
    fn name(&self) -> &str;

    /// Accept one frame. Must not block.
    fn consume(&mut self, frame: &RtcmFrame);

    /// Relay statistics, for consumers that push to a caster
    fn caster_stats(&self) -> Option<CasterStats> {
        None
    }
}

/// Consumer that forwards frames over a bounded channel, dropping when full
pub struct ChannelConsumer {
    name: String,
    tx: Sender<RtcmFrame>,
    dropped: Arc<AtomicU64>,
}

impl ChannelConsumer {
    /// Create consumer and the receiving end of its channel
    pub fn bounded(name: &str, capacity: usize) -> (Self, Receiver<RtcmFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Self {
                name: name.to_string(),
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Frames dropped because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameConsumer for ChannelConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, frame: &RtcmFrame) {
        match self.tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
