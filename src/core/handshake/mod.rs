//! Receiver initialization handshake
//!
//! [`CommandQueue`] sends setup commands one at a time and waits for the
//! receiver to acknowledge the head before sending the next. Replies arrive
//! as ordinary ASCII lines mixed into the data stream, so every line is
//! offered to [`CommandQueue::is_command_response`]. There is no retry
//! ceiling: an unanswered head is resent every timeout period until the
//! receiver answers or the queue is restarted.

pub mod device;
pub mod rules;

pub use device::{
    CommandFraming, DeviceFamily, DeviceIdentity, DeviceProfile, FollowUp, VersionError, QUECTEL,
    UNICORE,
};
pub use rules::{ResponseMatcher, ResponseRule, Verdict};

use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::logger::Logger;
use crate::core::protocol::checksum::verify_line;
use crate::core::protocol::nmea::GNSS_TALKER_PREFIX;
use crate::core::transport::{ByteSink, TransportError};

/// Resend interval for an unacknowledged command
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 8000;

/// Ordered queue of commands awaiting acknowledgement
pub struct CommandQueue {
    pending: VecDeque<String>,
    /// When the head was last sent
    sent_at: u64,
    timeout_ms: u64,
    retries: u64,
    profile: &'static DeviceProfile,
    identity: DeviceIdentity,
    sink: Box<dyn ByteSink>,
    clock: Arc<dyn Clock>,
    logger: Logger,
}

impl CommandQueue {
    /// Create an empty queue for `profile`
    pub fn new(
        profile: &'static DeviceProfile,
        sink: Box<dyn ByteSink>,
        clock: Arc<dyn Clock>,
        logger: Logger,
    ) -> Self {
        Self {
            pending: VecDeque::new(),
            sent_at: 0,
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            retries: 0,
            profile,
            identity: DeviceIdentity::default(),
            sink,
            clock,
            logger,
        }
    }

    /// Set resend interval
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Replace the queue with the profile's startup sequence and send the first command
    pub fn start_initialization(&mut self) -> Result<(), TransportError> {
        self.logger.info("GPS Queue StartInitialiseProcess");
        self.load(self.profile.startup.iter().copied())
    }

    /// Replace the queue with `commands` and send the first one
    pub fn load<I, S>(&mut self, commands: I) -> Result<(), TransportError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.clear();
        self.pending.extend(commands.into_iter().map(Into::into));
        self.send_head()
    }

    /// Append a command, sending it straight away if nothing else is pending
    pub fn enqueue(&mut self, command: impl Into<String>) -> Result<(), TransportError> {
        self.pending.push_back(command.into());
        if self.pending.len() == 1 {
            self.send_head()?;
        }
        Ok(())
    }

    /// (Re)transmit the head command and restart its timer. No-op when empty.
    pub fn send_head(&mut self) -> Result<(), TransportError> {
        let Some(head) = self.pending.front() else {
            return Ok(());
        };
        self.logger.info(format!("GPS -> {head}"));
        let wire = self.profile.framing.frame(head);
        if let Err(e) = self.sink.write_all(wire.as_bytes()) {
            self.logger.error(format!("Error writing to serial port: {e}"));
            return Err(e);
        }
        self.sent_at = self.clock.now_ms();
        Ok(())
    }

    /// Resend the head when it has waited longer than the timeout.
    ///
    /// Returns true when a resend happened.
    pub fn check_timeout(&mut self, now_ms: u64) -> Result<bool, TransportError> {
        let Some(head) = self.pending.front() else {
            return Ok(false);
        };
        if now_ms.saturating_sub(self.sent_at) <= self.timeout_ms {
            return Ok(false);
        }
        self.logger.warn(format!("E940 - Timeout on {head}"));
        self.retries += 1;
        self.send_head()?;
        Ok(true)
    }

    /// Decide whether `line` acknowledges the head command.
    ///
    /// On a match the head is removed, identity is learned from a version
    /// reply, and the next command is sent. Lines that fail their checksum or
    /// do not correlate leave the queue untouched.
    pub fn is_command_response(&mut self, line: &str) -> Result<bool, TransportError> {
        let Some(head) = self.pending.front() else {
            return Ok(false);
        };

        if let Err(e) = verify_line(line, self.profile.scope_for(line)) {
            self.logger.warn(format!("ERROR : GPS Checksum error in {line} ({e})"));
            return Ok(false);
        }

        if line.starts_with(GNSS_TALKER_PREFIX) {
            return Ok(false);
        }

        let matcher = self.profile.matcher_for(head);

        if let Some(ack) = self.profile.setting_ack_for(line) {
            match ack.check(head, line) {
                Verdict::Confirmed => self.logger.info(format!("GPS Configured : {line}")),
                Verdict::Rejected(reason) => self.logger.warn(reason),
                Verdict::NoMatch => {}
            }
            if !matcher.is_setting_ack() {
                return Ok(false);
            }
        }

        match matcher.check(head, line) {
            Verdict::Confirmed => {}
            Verdict::NoMatch => return Ok(false),
            Verdict::Rejected(reason) => {
                if !matcher.is_setting_ack() {
                    self.logger.warn(reason);
                }
                return Ok(false);
            }
        }

        let Some(confirmed) = self.pending.pop_front() else {
            return Ok(false);
        };
        if confirmed == self.profile.version_command {
            self.learn_identity(line);
        }

        if self.pending.is_empty() {
            self.logger.info("GPS Startup Commands Complete");
        } else {
            self.send_head()?;
        }
        Ok(true)
    }

    /// Restart initialization when `line` is the receiver's reboot banner
    pub fn has_device_reset(&mut self, line: &str) -> Result<bool, TransportError> {
        match self.profile.reset_banner {
            Some(banner) if line.starts_with(banner) => {
                self.logger.warn(format!("GPS reset detected : {line}"));
                self.start_initialization()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn learn_identity(&mut self, line: &str) {
        let identity = match self.profile.parse_version(line) {
            Ok(identity) => identity,
            Err(e) => {
                self.logger.warn(e.to_string());
                return;
            }
        };

        match self.profile.follow_up_for(&identity.device_type) {
            FollowUp::Known(command) => {
                self.logger.info(format!("{} Detected", identity.device_type));
                self.pending.push_back(command.to_string());
            }
            FollowUp::Fallback(command) => {
                self.logger.warn(format!(
                    "DANGER 303 Unknown Device '{}' Detected in {line}",
                    identity.device_type
                ));
                self.pending.push_back(command.to_string());
            }
            FollowUp::None => {
                self.logger.info(format!("{} Detected", identity.device_type));
            }
        }
        self.identity = identity;
    }

    /// Number of commands waiting
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Command awaiting acknowledgement
    pub fn head(&self) -> Option<&str> {
        self.pending.front().map(String::as_str)
    }

    /// Pending commands, head first
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// Identity learned from the version reply
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Active receiver profile
    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    /// Timeout resends so far
    pub fn retries(&self) -> u64 {
        self.retries
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pending", &self.pending)
            .field("sent_at", &self.sent_at)
            .field("family", &self.profile.family)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
