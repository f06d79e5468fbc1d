//! Base station position averaging
//!
//! GGA fixes are collected in batches of [`BATCH_SIZE`]. Each full batch is
//! reduced to a mean and population standard deviation, and the batch means
//! feed a running mean-of-means that becomes the published base position.

use serde::Serialize;

use crate::core::logger::Logger;
use crate::core::protocol::nmea::{parse_gga, GgaFix, NmeaError};

/// Samples per batch
pub const BATCH_SIZE: usize = 60;

/// Per-axis statistics of one batch
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BatchStats {
    /// Mean latitude (degrees)
    pub lat_mean: f64,
    /// Mean longitude (degrees)
    pub lng_mean: f64,
    /// Mean height (metres)
    pub height_mean: f64,
    /// Latitude standard deviation (degrees)
    pub lat_dev: f64,
    /// Longitude standard deviation (degrees)
    pub lng_dev: f64,
    /// Height standard deviation (metres)
    pub height_dev: f64,
}

/// Result of feeding one accepted fix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixReport {
    /// The parsed fix
    pub fix: GgaFix,
    /// Statistics when this fix completed a batch
    pub batch: Option<BatchStats>,
}

impl FixReport {
    /// Short operator summary: height, satellites, quality
    pub fn summary(&self) -> String {
        format!(
            "H:{:.4} #{} Q:{}",
            self.fix.height, self.fix.satellites, self.fix.quality
        )
    }
}

/// Running mean of all batch means
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanLocation {
    /// Batches contributing
    pub batches: u32,
    /// Latitude (degrees)
    pub latitude: f64,
    /// Longitude (degrees)
    pub longitude: f64,
    /// Height (metres)
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Axis {
    origin: f64,
    total: f64,
}

impl Axis {
    fn add(&mut self, mean: f64, first: bool) {
        if first {
            self.origin = mean;
        } else {
            self.total += mean - self.origin;
        }
    }

    fn value(&self, count: u32) -> f64 {
        self.origin + self.total / f64::from(count)
    }
}

/// Ring of recent fixes plus the running mean-of-means
#[derive(Debug)]
pub struct LocationAverager {
    lats: [f64; BATCH_SIZE],
    lngs: [f64; BATCH_SIZE],
    heights: [f64; BATCH_SIZE],
    index: usize,
    lat: Axis,
    lng: Axis,
    height: Axis,
    count: u32,
    accepted: u64,
    rejected: u64,
    logger: Logger,
}

impl Default for LocationAverager {
    fn default() -> Self {
        Self::new(Logger::discard())
    }
}

impl LocationAverager {
    /// Create empty averager
    pub fn new(logger: Logger) -> Self {
        Self {
            lats: [0.0; BATCH_SIZE],
            lngs: [0.0; BATCH_SIZE],
            heights: [0.0; BATCH_SIZE],
            index: 0,
            lat: Axis::default(),
            lng: Axis::default(),
            height: Axis::default(),
            count: 0,
            accepted: 0,
            rejected: 0,
            logger,
        }
    }

    /// Parse a GGA sentence and accumulate it.
    ///
    /// Returns `None` for sentences that are too short or carry no position.
    pub fn process_fix_sentence(&mut self, line: &str) -> Option<FixReport> {
        let fix = match parse_gga(line) {
            Ok(fix) => fix,
            Err(e @ NmeaError::TooShort { .. }) => {
                self.logger.warn(format!("{e} {line}"));
                return None;
            }
            Err(NmeaError::NotGga) => return None,
        };

        if !fix.has_position() {
            self.rejected += 1;
            self.logger.info(format!("No location data in {line}"));
            return None;
        }

        self.accepted += 1;
        let batch = self.add_sample(fix.latitude, fix.longitude, fix.height);
        Some(FixReport { fix, batch })
    }

    /// Add one sample, closing the batch when the ring is full
    pub fn add_sample(&mut self, lat: f64, lng: f64, height: f64) -> Option<BatchStats> {
        self.lats[self.index] = lat;
        self.lngs[self.index] = lng;
        self.heights[self.index] = height;
        self.index += 1;

        if self.index < BATCH_SIZE {
            return None;
        }

        let stats = self.batch_stats();
        self.logger.info(format!(
            "Location {} : {:.6} {:.6} {:.4} : {:.6} {:.6} {:.6}",
            self.count,
            stats.lat_mean,
            stats.lng_mean,
            stats.height_mean,
            stats.lat_dev * 1000.0,
            stats.lng_dev * 1000.0,
            stats.height_dev
        ));
        self.index = 0;

        let first = self.count == 0;
        self.lat.add(stats.lat_mean, first);
        self.lng.add(stats.lng_mean, first);
        self.height.add(stats.height_mean, first);
        self.count += 1;

        Some(stats)
    }

    fn batch_stats(&self) -> BatchStats {
        let (lat_mean, lat_dev) = mean_and_deviation(&self.lats);
        let (lng_mean, lng_dev) = mean_and_deviation(&self.lngs);
        let (height_mean, height_dev) = mean_and_deviation(&self.heights);
        BatchStats {
            lat_mean,
            lng_mean,
            height_mean,
            lat_dev,
            lng_dev,
            height_dev,
        }
    }

    /// Running mean of all completed batches
    pub fn mean_location(&self) -> Option<MeanLocation> {
        if self.count == 0 {
            return None;
        }
        Some(MeanLocation {
            batches: self.count,
            latitude: self.lat.value(self.count),
            longitude: self.lng.value(self.count),
            height: self.height.value(self.count),
        })
    }

    /// Log the final averaged position. Silent before the first batch.
    pub fn log_mean_locations(&self) {
        let Some(mean) = self.mean_location() else {
            return;
        };
        self.logger.info(format!("Location Mean {}", mean.batches));
        self.logger.info(format!("\tLatitude  {:.6}", mean.latitude));
        self.logger.info(format!("\tLongitude {:.6}", mean.longitude));
        self.logger.info(format!("\tHeight    {:.6}m", mean.height));
    }

    /// Samples in the current, incomplete batch
    pub fn samples_in_batch(&self) -> usize {
        self.index
    }

    /// Completed batches
    pub fn batches(&self) -> u32 {
        self.count
    }

    /// Fixes accepted so far
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Fixes rejected for lacking a position
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Arithmetic mean and population standard deviation
fn mean_and_deviation(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_deviation() {
        let (mean, dev) = mean_and_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(dev, 2.0);
    }

    #[test]
    fn test_batch_closes_at_sixty() {
        let mut averager = LocationAverager::default();
        for n in 0..BATCH_SIZE - 1 {
            assert!(averager.add_sample(1.0, 2.0, n as f64).is_none());
        }
        assert_eq!(averager.samples_in_batch(), BATCH_SIZE - 1);
        let stats = averager.add_sample(1.0, 2.0, 59.0).unwrap();
        assert_eq!(averager.samples_in_batch(), 0);
        assert_eq!(stats.lat_mean, 1.0);
        assert_eq!(stats.lat_dev, 0.0);
        assert!((stats.height_mean - 29.5).abs() < 1e-12);

        let mean = averager.mean_location().unwrap();
        assert_eq!(mean.batches, 1);
        assert_eq!(mean.latitude, stats.lat_mean);
        assert_eq!(mean.longitude, stats.lng_mean);
        assert_eq!(mean.height, stats.height_mean);
    }

    #[test]
    fn test_mean_of_means() {
        let mut averager = LocationAverager::default();
        for _ in 0..BATCH_SIZE {
            averager.add_sample(10.0, 20.0, 30.0);
        }
        for _ in 0..BATCH_SIZE {
            averager.add_sample(12.0, 22.0, 34.0);
        }
        for _ in 0..BATCH_SIZE {
            averager.add_sample(14.0, 24.0, 38.0);
        }
        let mean = averager.mean_location().unwrap();
        assert_eq!(mean.batches, 3);
        // origin + (0 + 2 + 4) / 3: the seed batch adds nothing to the total
        assert!((mean.latitude - 12.0).abs() < 1e-12);
        assert!((mean.longitude - 22.0).abs() < 1e-12);
        assert!((mean.height - 34.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_no_fix() {
        let mut averager = LocationAverager::default();
        assert!(averager
            .process_fix_sentence("$GNGGA,232306.00,,,,,0,00,9999.0,,,,,,*4E")
            .is_none());
        assert!(averager
            .process_fix_sentence(
                "$GNGGA,020816.00,2734.21017577,S,15305.98006651,E,0,34,0.6,34.9570,M,41.1718,M,1.0,0*4E"
            )
            .is_none());
        assert_eq!(averager.samples_in_batch(), 0);
        assert_eq!(averager.rejected(), 2);
        assert!(averager.mean_location().is_none());
    }

    #[test]
    fn test_accepts_fix() {
        let mut averager = LocationAverager::default();
        let report = averager
            .process_fix_sentence(
                "$GNGGA,020816.00,2734.21017577,S,15305.98006651,E,4,34,0.6,34.9570,M,41.1718,M,1.0,0*4A",
            )
            .unwrap();
        assert!(report.batch.is_none());
        assert_eq!(report.summary(), "H:34.9570 #34 Q:4");
        assert_eq!(averager.samples_in_batch(), 1);
    }

    #[test]
    fn test_short_sentence_ignored() {
        let mut averager = LocationAverager::default();
        assert!(averager.process_fix_sentence("$GNGGA,1,2*00").is_none());
        assert_eq!(averager.rejected(), 0);
    }
}
