//! NTRIP caster relay (NTRIP v1 server push)
//!
//! A worker thread owns the TCP connection. Frames arrive through a bounded
//! channel; while disconnected they are discarded and a reconnect is tried
//! no more often than the configured interval.

use std::collections::VecDeque;
use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::FrameConsumer;
use crate::core::logger::Logger;
use crate::core::protocol::checksum::hex_dump;
use crate::core::protocol::rtcm::RtcmFrame;

/// Minimum spacing between connection attempts
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 300;

/// Send timings kept for the throughput average
const AVERAGE_SEND_SAMPLES: usize = 3600;

/// Frames buffered between the read loop and the worker
const QUEUE_CAPACITY: usize = 256;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One caster endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasterConfig {
    /// Host name or IP
    pub address: String,
    /// TCP port
    pub port: u16,
    /// Mountpoint (sent as the SOURCE credential)
    pub mountpoint: String,
    /// Source password
    pub password: String,
    /// Relay to this caster
    pub enabled: bool,
    /// Seconds between connection attempts
    pub reconnect_interval_secs: u64,
}

impl Default for CasterConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 2101,
            mountpoint: String::new(),
            password: String::new(),
            enabled: true,
            reconnect_interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
        }
    }
}

impl CasterConfig {
    /// Create config with default port and interval
    pub fn new(address: &str, port: u16, mountpoint: &str, password: &str) -> Self {
        Self {
            address: address.to_string(),
            port,
            mountpoint: mountpoint.to_string(),
            password: password.to_string(),
            ..Self::default()
        }
    }

    /// Set reconnect interval
    #[must_use]
    pub fn reconnect_interval_secs(mut self, secs: u64) -> Self {
        self.reconnect_interval_secs = secs;
        self
    }

    /// NTRIP v1 server handshake lines
    pub fn handshake(&self) -> [String; 4] {
        [
            format!("SOURCE {} {}\r\n", self.password, self.mountpoint),
            format!("Source-Agent: NTRIP rtkrelay/{}\r\n", crate::VERSION),
            "STR: \r\n".to_string(),
            "\r\n".to_string(),
        ]
    }
}

/// Caster connection errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Address did not resolve
    #[error("E500 - RTK {0} cannot resolve address")]
    Resolve(String),

    /// Connect or handshake failed
    #[error("E500 - RTK {address} Not connected. ({source})")]
    Connect {
        /// Caster address
        address: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Frame write failed or was short
    #[error("E500 - RTK {address} send failed. ({source})")]
    Send {
        /// Caster address
        address: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Caster relay statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CasterStats {
    /// Caster address
    pub address: String,
    /// Connection status text
    pub status: String,
    /// Successful connections
    pub reconnects: u32,
    /// Frames written
    pub packets_sent: u64,
    /// Frames dropped (queue full or disconnected)
    pub dropped: u64,
    /// Slowest write since the last snapshot, in milliseconds
    pub max_send_ms: f64,
    /// Average throughput over recent writes, kbps
    pub average_kbps: f64,
}

impl fmt::Display for CasterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} - {}", self.address, self.status)?;
        writeln!(f, "\tReconnects {}", self.reconnects)?;
        writeln!(f, "\tSent       {}", self.packets_sent)?;
        writeln!(f, "\tDropped    {}", self.dropped)?;
        writeln!(f, "\tMax Send   {:.3} ms", self.max_send_ms)?;
        write!(f, "\tSpeed      {:.0} kbps", self.average_kbps)
    }
}

#[derive(Debug, Default)]
struct SharedStats {
    stats: CasterStats,
    rates: VecDeque<f64>,
}

impl SharedStats {
    fn record_send(&mut self, len: usize, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.stats.max_send_ms = self.stats.max_send_ms.max(ms);
        if ms > 0.0 {
            if self.rates.len() >= AVERAGE_SEND_SAMPLES {
                self.rates.pop_front();
            }
            self.rates.push_back(len as f64 * 8.0 / ms);
        }
        self.stats.packets_sent += 1;
    }

    fn snapshot(&mut self) -> CasterStats {
        let mut stats = self.stats.clone();
        if !self.rates.is_empty() {
            stats.average_kbps = self.rates.iter().sum::<f64>() / self.rates.len() as f64;
        }
        self.stats.max_send_ms = 0.0;
        stats
    }
}

/// Relay pushing frames to one NTRIP caster
pub struct CasterRelay {
    name: String,
    tx: Option<Sender<RtcmFrame>>,
    stats: Arc<Mutex<SharedStats>>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CasterRelay {
    /// Start the worker thread for `config`
    pub fn start(config: CasterConfig, logger: Logger) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(QUEUE_CAPACITY);
        let stats = Arc::new(Mutex::new(SharedStats::default()));
        {
            let mut shared = stats.lock();
            shared.stats.address = config.address.clone();
            shared.stats.status = "Disconn...".to_string();
        }
        let running = Arc::new(AtomicBool::new(true));

        let name = format!("{}:{}", config.address, config.port);
        let worker = Worker {
            config,
            stream: None,
            last_attempt: None,
            stats: stats.clone(),
            running: running.clone(),
            logger,
        };
        let handle = thread::Builder::new()
            .name(format!("caster {name}"))
            .spawn(move || worker.run(&rx))
            .ok();

        Self {
            name,
            tx: Some(tx),
            stats,
            running,
            handle,
        }
    }

    /// Current statistics. Resets the max send time.
    pub fn stats(&self) -> CasterStats {
        self.stats.lock().snapshot()
    }

    /// Is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the worker and close the connection
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl FrameConsumer for CasterRelay {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, frame: &RtcmFrame) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) = tx.try_send(frame.clone()) {
            self.stats.lock().stats.dropped += 1;
        }
    }

    fn caster_stats(&self) -> Option<CasterStats> {
        Some(self.stats())
    }
}

impl Drop for CasterRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    config: CasterConfig,
    stream: Option<TcpStream>,
    last_attempt: Option<Instant>,
    stats: Arc<Mutex<SharedStats>>,
    running: Arc<AtomicBool>,
    logger: Logger,
}

impl Worker {
    fn run(mut self, rx: &Receiver<RtcmFrame>) {
        while self.running.load(Ordering::Relaxed) {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(frame) => self.handle_frame(&frame),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.receive();
        }
        self.close("Stopped");
    }

    fn handle_frame(&mut self, frame: &RtcmFrame) {
        if self.stream.is_none() {
            self.stats.lock().stats.dropped += 1;
            if let Err(e) = self.reconnect() {
                self.logger.warn(e.to_string());
                self.close("Disconn...");
            }
            return;
        }

        if let Err(e) = self.send(&frame.bytes) {
            self.logger.warn(e.to_string());
            self.close("Disconn...");
        }
    }

    /// Connect when the retry interval has passed. Ok(()) also when skipped.
    fn reconnect(&mut self) -> Result<(), RelayError> {
        let interval = Duration::from_secs(self.config.reconnect_interval_secs);
        if self.last_attempt.is_some_and(|t| t.elapsed() < interval) {
            return Ok(());
        }
        self.last_attempt = Some(Instant::now());

        let address = self.config.address.clone();
        self.logger
            .info(format!("RTK Connecting to {} : {}", address, self.config.port));

        let addr = (address.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(|_| RelayError::Resolve(address.clone()))?
            .next()
            .ok_or_else(|| RelayError::Resolve(address.clone()))?;
        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|source| {
            RelayError::Connect {
                address: address.clone(),
                source,
            }
        })?;
        self.logger.info(format!("Connected {address} OK."));

        for line in self.config.handshake() {
            self.logger
                .debug(format!("    -> '{}'", line.replace("\r\n", "\\r\\n")));
            stream
                .write_all(line.as_bytes())
                .map_err(|source| RelayError::Connect {
                    address: address.clone(),
                    source,
                })?;
        }
        // Short read timeout so caster replies can be polled between frames
        stream
            .set_read_timeout(Some(Duration::from_millis(1)))
            .map_err(|source| RelayError::Connect {
                address: address.clone(),
                source,
            })?;

        self.stream = Some(stream);
        let mut shared = self.stats.lock();
        shared.stats.reconnects += 1;
        shared.stats.status = "Connected".to_string();
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), RelayError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let start = Instant::now();
        stream.write_all(data).map_err(|source| RelayError::Send {
            address: self.config.address.clone(),
            source,
        })?;
        self.stats.lock().record_send(data.len(), start.elapsed());
        Ok(())
    }

    /// Log anything the caster said
    fn receive(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let mut buffer = [0u8; 1024];
        match stream.read(&mut buffer) {
            Ok(0) => {
                self.logger
                    .warn(format!("E500 - RTK {} closed the connection", self.config.address));
                self.close("Disconn...");
            }
            Ok(n) => {
                let data = &buffer[..n];
                let text = if data
                    .iter()
                    .all(|&b| b == b'\r' || b == b'\n' || (32..=126).contains(&b))
                {
                    String::from_utf8_lossy(data).into_owned()
                } else {
                    hex_dump(data)
                };
                self.logger.info(format!(
                    "RECV. {}\r\n{}",
                    self.config.address,
                    text.replace('\n', "\n\t\t")
                ));
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                self.logger
                    .warn(format!("E500 - RTK {} read failed. ({e})", self.config.address));
                self.close("Disconn...");
            }
        }
    }

    fn close(&mut self, status: &str) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.stats.lock().stats.status = status.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::rtcm::encode;
    use bytes::Bytes;
    use std::io::BufRead;
    use std::net::TcpListener;

    #[test]
    fn test_handshake_lines() {
        let config = CasterConfig::new("caster.example.com", 2101, "MOUNT1", "secret");
        let lines = config.handshake();
        assert_eq!(lines[0], "SOURCE secret MOUNT1\r\n");
        assert!(lines[1].starts_with("Source-Agent: NTRIP rtkrelay/"));
        assert_eq!(lines[2], "STR: \r\n");
        assert_eq!(lines[3], "\r\n");
    }

    #[test]
    fn test_stats_average() {
        let mut shared = SharedStats::default();
        shared.record_send(1000, Duration::from_millis(2));
        shared.record_send(1000, Duration::from_millis(8));
        let stats = shared.snapshot();
        assert_eq!(stats.packets_sent, 2);
        assert!((stats.max_send_ms - 8.0).abs() < 1e-9);
        // (4000 + 1000) / 2 bits per ms
        assert!((stats.average_kbps - 2500.0).abs() < 1e-9);
        // Max send time resets after a snapshot
        assert_eq!(shared.snapshot().max_send_ms, 0.0);
    }

    #[test]
    fn test_relay_pushes_frames_after_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = CasterConfig::new("127.0.0.1", port, "MOUNT1", "secret").reconnect_interval_secs(0);

        let mut relay = CasterRelay::start(config, Logger::discard());
        let frame = RtcmFrame::new(Bytes::from(encode(&[0x3E, 0xD0, 0x01])));

        // First frame triggers the connection and is dropped
        relay.consume(&frame);
        let (socket, _) = listener.accept().unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut reader = std::io::BufReader::new(socket);

        let mut header = Vec::new();
        for _ in 0..4 {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            header.push(line);
        }
        assert_eq!(header[0], "SOURCE secret MOUNT1\r\n");
        assert_eq!(header[3], "\r\n");

        // Wait for the worker to mark the link up
        let deadline = Instant::now() + Duration::from_secs(5);
        while relay.stats().status != "Connected" && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        relay.consume(&frame);
        let mut received = vec![0u8; frame.len()];
        reader.read_exact(&mut received).unwrap();
        assert_eq!(received, frame.bytes.to_vec());

        relay.stop();
        let stats = relay.stats();
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.dropped, 1);
        assert!(!relay.is_running());
    }
}
