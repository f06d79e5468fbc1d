//! Stream driver
//!
//! [`StreamDriver`] is the single ingestion path: the host hands it every
//! chunk read from the receiver, it feeds the reassembler, counts and fans out
//! verified frames, sends GGA fixes to the location averager and offers every
//! other line to the command queue. The host also calls [`StreamDriver::poll`]
//! periodically to drive command retries and stall supervision.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::bridge::{CasterStats, FrameConsumer};
use crate::core::clock::Clock;
use crate::core::handshake::{CommandQueue, DeviceFamily, DeviceIdentity, DeviceProfile};
use crate::core::location::{LocationAverager, MeanLocation};
use crate::core::logger::Logger;
use crate::core::protocol::checksum::{verify_line, ChecksumScope};
use crate::core::protocol::framing::{ByteOutcome, FrameReassembler};
use crate::core::protocol::nmea::is_gga;
use crate::core::protocol::rtcm::RtcmFrame;
use crate::core::transport::{ByteSink, TransportError};

/// Timers governing the handshake and stall supervision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimings {
    /// Resend interval for the head command
    pub command_timeout_ms: u64,
    /// Restart initialization after this long without a valid frame
    pub stall_timeout_ms: u64,
    /// Delay before the first stall check
    pub startup_delay_ms: u64,
}

impl Default for DriverTimings {
    fn default() -> Self {
        Self {
            command_timeout_ms: crate::core::handshake::DEFAULT_COMMAND_TIMEOUT_MS,
            stall_timeout_ms: 60_000,
            startup_delay_ms: 10_000,
        }
    }
}

/// Counters kept by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Bytes received
    pub bytes_read: u64,
    /// Largest chunk handed to the driver
    pub max_chunk: usize,
    /// Verified frames per message type
    pub message_totals: BTreeMap<u16, u64>,
    /// Verified frames
    pub frames: u64,
    /// Complete ASCII lines
    pub lines: u64,
    /// Framing and checksum failures
    pub frame_errors: u64,
    /// Error windows closed by a good frame
    pub read_errors: u64,
    /// Bytes lost inside error windows
    pub missed_bytes: u64,
}

/// Point-in-time view of the relay for operator display
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Receiver family
    pub family: DeviceFamily,
    /// Identity learned from the version reply
    pub identity: DeviceIdentity,
    /// A verified frame has arrived since the last stall
    pub connected: bool,
    /// Stream counters
    pub stream: StreamStats,
    /// Commands awaiting acknowledgement
    pub queue_len: usize,
    /// Command awaiting acknowledgement
    pub queue_head: Option<String>,
    /// Command resends so far
    pub retries: u64,
    /// Samples in the current location batch
    pub location_samples: usize,
    /// Completed location batches
    pub location_batches: u32,
    /// Averaged base position
    pub mean_location: Option<MeanLocation>,
    /// Per-caster relay statistics
    pub casters: Vec<CasterStats>,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "GPS {} {} {}",
            self.identity.device_type, self.identity.firmware, self.identity.serial
        )?;
        writeln!(f, "\tConnected   {}", if self.connected { "Yes" } else { "No" })?;
        writeln!(f, "\tRead Errors {}", self.stream.read_errors)?;
        writeln!(f, "\tFrame Errs  {}", self.stream.frame_errors)?;
        writeln!(f, "\tMax Buffer  {}", self.stream.max_chunk)?;
        match &self.queue_head {
            Some(head) => writeln!(f, "\tQueue       {} ({head})", self.queue_len)?,
            None => writeln!(f, "\tQueue       empty")?,
        }
        writeln!(
            f,
            "\tLocation    {} samples, {} batches",
            self.location_samples, self.location_batches
        )?;
        for (message_type, count) in &self.stream.message_totals {
            writeln!(f, "\t{message_type} - {count}")?;
        }
        for caster in &self.casters {
            writeln!(f, "{caster}")?;
        }
        Ok(())
    }
}

/// Single-threaded receiver stream pipeline
pub struct StreamDriver {
    reassembler: FrameReassembler,
    queue: CommandQueue,
    averager: LocationAverager,
    consumers: Vec<Box<dyn FrameConsumer>>,
    clock: Arc<dyn Clock>,
    logger: Logger,
    timings: DriverTimings,
    stats: StreamStats,
    connected: bool,
    in_error: bool,
    window_missed: u64,
    stall_deadline: u64,
}

impl StreamDriver {
    /// Create driver writing commands to `sink`
    pub fn new(
        profile: &'static DeviceProfile,
        sink: Box<dyn ByteSink>,
        clock: Arc<dyn Clock>,
        logger: Logger,
        timings: DriverTimings,
    ) -> Self {
        let queue = CommandQueue::new(profile, sink, clock.clone(), logger.clone())
            .with_timeout(timings.command_timeout_ms);
        let stall_deadline = clock.now_ms().saturating_add(timings.startup_delay_ms);
        Self {
            reassembler: FrameReassembler::new(logger.clone()),
            queue,
            averager: LocationAverager::new(logger.clone()),
            consumers: Vec::new(),
            clock,
            logger,
            timings,
            stats: StreamStats::default(),
            connected: false,
            in_error: false,
            window_missed: 0,
            stall_deadline,
        }
    }

    /// Add a frame consumer
    pub fn add_consumer(&mut self, consumer: Box<dyn FrameConsumer>) {
        self.logger.info(format!("Relay added : {}", consumer.name()));
        self.consumers.push(consumer);
    }

    /// Start the receiver's setup sequence now
    pub fn initialize(&mut self) -> Result<(), TransportError> {
        self.queue.start_initialization()
    }

    /// Queue an ad-hoc command
    pub fn enqueue(&mut self, command: impl Into<String>) -> Result<(), TransportError> {
        self.queue.enqueue(command)
    }

    /// Feed one chunk read from the receiver.
    ///
    /// Only a failed write to the receiver is returned as an error.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.stats.bytes_read += chunk.len() as u64;
        self.stats.max_chunk = self.stats.max_chunk.max(chunk.len());

        let outcomes = self.reassembler.push_collect(chunk);
        let mut discarded = self.reassembler.take_discarded() as u64;

        for outcome in outcomes {
            match outcome {
                ByteOutcome::Frame(frame) => {
                    self.add_missed(discarded);
                    discarded = 0;
                    self.on_frame(&frame);
                }
                ByteOutcome::Line(line) => {
                    self.stats.lines += 1;
                    self.on_line(&line)?;
                }
                ByteOutcome::Error(error) => {
                    self.stats.frame_errors += 1;
                    self.in_error = true;
                    self.logger.warn(error.to_string());
                }
                ByteOutcome::Continue => {}
            }
        }

        self.add_missed(discarded);
        Ok(())
    }

    fn add_missed(&mut self, bytes: u64) {
        if self.in_error {
            self.window_missed += bytes;
            self.stats.missed_bytes += bytes;
        }
    }

    fn on_frame(&mut self, frame: &RtcmFrame) {
        if self.in_error {
            self.stats.read_errors += 1;
            self.logger.warn(format!(
                ">> E: {} - Skipped {}",
                self.stats.read_errors, self.window_missed
            ));
            self.in_error = false;
            self.window_missed = 0;
        }
        self.connected = true;
        self.stall_deadline = self
            .clock
            .now_ms()
            .saturating_add(self.timings.stall_timeout_ms);
        self.stats.frames += 1;
        *self.stats.message_totals.entry(frame.message_type).or_insert(0) += 1;

        for consumer in &mut self.consumers {
            consumer.consume(frame);
        }
    }

    fn on_line(&mut self, line: &str) -> Result<(), TransportError> {
        if is_gga(line) {
            match verify_line(line, ChecksumScope::ExcludeMarker) {
                Ok(()) => {
                    if let Some(report) = self.averager.process_fix_sentence(line) {
                        self.logger.debug(report.summary());
                    }
                }
                Err(e) => self
                    .logger
                    .warn(format!("ERROR : GPS Checksum error in {line} ({e})")),
            }
            return Ok(());
        }

        self.logger.debug(format!("GPS <- {line}"));
        if self.queue.has_device_reset(line)? {
            return Ok(());
        }
        self.queue.is_command_response(line)?;
        Ok(())
    }

    /// Run timers: resend an overdue command, or restart initialization when
    /// no verified frame has arrived for the stall timeout.
    pub fn poll(&mut self) -> Result<(), TransportError> {
        let now = self.clock.now_ms();
        if self.queue.check_timeout(now)? {
            return Ok(());
        }
        if now < self.stall_deadline {
            return Ok(());
        }

        self.connected = false;
        self.logger.warn("W700 - GPS Timeout");
        self.stall_deadline = now.saturating_add(self.timings.stall_timeout_ms);
        self.queue.start_initialization()
    }

    /// Current status
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            family: self.queue.profile().family,
            identity: self.queue.identity().clone(),
            connected: self.connected,
            stream: self.stats.clone(),
            queue_len: self.queue.len(),
            queue_head: self.queue.head().map(str::to_string),
            retries: self.queue.retries(),
            location_samples: self.averager.samples_in_batch(),
            location_batches: self.averager.batches(),
            mean_location: self.averager.mean_location(),
            casters: self
                .consumers
                .iter()
                .filter_map(|c| c.caster_stats())
                .collect(),
        }
    }

    /// Log the averaged location and return it
    pub fn finish(&mut self) -> Option<MeanLocation> {
        self.averager.log_mean_locations();
        self.averager.mean_location()
    }

    /// A verified frame has arrived since the last stall
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Stream counters
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Command queue
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Location averager
    pub fn averager(&self) -> &LocationAverager {
        &self.averager
    }
}

impl fmt::Debug for StreamDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDriver")
            .field("queue", &self.queue)
            .field("stats", &self.stats)
            .field("connected", &self.connected)
            .field("consumers", &self.consumers.len())
            .finish_non_exhaustive()
    }
}
