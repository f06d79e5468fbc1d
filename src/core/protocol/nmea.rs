//! NMEA 0183 fix sentences
//!
//! Only GGA (Global Positioning System Fix Data) is interpreted; every other
//! sentence passes through unexamined.
//!
//! ```text
//! $GNGGA,020816.00,2734.21017577,S,15305.98006651,E,4,34,0.6,34.9570,M,41.1718,M,1.0,0*4A
//! $GNGGA,232306.00,,,,,0,00,9999.0,,,,,,*4E
//! ```

use serde::Serialize;
use thiserror::Error;

/// Fewest comma separated fields a GGA line can have
pub const GGA_MIN_FIELDS: usize = 14;

/// Prefix shared by every GNSS talker sentence
pub const GNSS_TALKER_PREFIX: &str = "$G";

/// GPS fix quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GpsFixQuality {
    #[default]
    Invalid = 0,
    GpsFix = 1,
    DgpsFix = 2,
    PpsFix = 3,
    Rtk = 4,
    FloatRtk = 5,
    Estimated = 6,
    Manual = 7,
    Simulation = 8,
}

impl From<u8> for GpsFixQuality {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::GpsFix,
            2 => Self::DgpsFix,
            3 => Self::PpsFix,
            4 => Self::Rtk,
            5 => Self::FloatRtk,
            6 => Self::Estimated,
            7 => Self::Manual,
            8 => Self::Simulation,
            _ => Self::Invalid,
        }
    }
}

/// GGA parse failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NmeaError {
    /// Not a GGA sentence
    #[error("not a GGA sentence")]
    NotGga,

    /// Too few fields
    #[error("Packet length too short {fields}")]
    TooShort {
        /// Number of fields found
        fields: usize,
    },
}

/// Parsed GGA sentence
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GgaFix {
    /// UTC time as `HH:MM:SS`, or the raw field when too short to format
    pub time: String,
    /// Raw fix quality indicator
    pub quality: u8,
    /// Signed decimal degrees, south negative; 0.0 when absent
    pub latitude: f64,
    /// Signed decimal degrees, west negative; 0.0 when absent
    pub longitude: f64,
    /// Altitude above mean sea level in metres; -1.0 when not a number
    pub height: f64,
    /// Satellites in use
    pub satellites: u32,
}

impl GgaFix {
    /// Fix quality as enum
    pub fn fix_quality(&self) -> GpsFixQuality {
        GpsFixQuality::from(self.quality)
    }

    /// True when the sentence carries a usable position
    pub fn has_position(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0 && self.quality >= 1
    }
}

/// Sentence address without the `$`, e.g. `GNGGA`
pub fn sentence_id(line: &str) -> Option<&str> {
    let body = line.strip_prefix('$')?;
    let end = body.find([',', '*']).unwrap_or(body.len());
    Some(&body[..end])
}

/// True for GGA sentences from any GNSS talker (`GPGGA`, `GNGGA`, ...)
pub fn is_gga(line: &str) -> bool {
    matches!(sentence_id(line), Some(id) if id.len() == 5 && id.starts_with('G') && id.ends_with("GGA"))
}

/// Parse a GGA sentence.
///
/// Empty or unparsable numeric fields fall back to zero (quality, position,
/// satellites) or -1 (height) rather than failing; [`GgaFix::has_position`]
/// tells whether the result is usable.
pub fn parse_gga(line: &str) -> Result<GgaFix, NmeaError> {
    if !is_gga(line) {
        return Err(NmeaError::NotGga);
    }
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < GGA_MIN_FIELDS {
        return Err(NmeaError::TooShort { fields: parts.len() });
    }

    Ok(GgaFix {
        time: format_time(parts[1]),
        quality: parts[6].trim().parse().unwrap_or(0),
        latitude: parse_lat_long(parts[2], 2, parts[3] == "S"),
        longitude: parse_lat_long(parts[4], 3, parts[5] == "W"),
        height: parts[9].trim().parse().unwrap_or(-1.0),
        satellites: parts[7].trim().parse().unwrap_or(0),
    })
}

/// `hhmmss.ss` to `HH:MM:SS`
fn format_time(raw: &str) -> String {
    let raw = raw.trim();
    match (raw.get(0..2), raw.get(2..4), raw.get(4..6)) {
        (Some(h), Some(m), Some(s)) if raw.len() > 7 => format!("{h}:{m}:{s}"),
        _ => raw.to_string(),
    }
}

/// Degrees-minutes (`DDMM.mmmm` / `DDDMM.mmmm`) to signed decimal degrees
fn parse_lat_long(text: &str, degree_digits: usize, negative: bool) -> f64 {
    let text = text.trim();
    let (Some(degrees), Some(minutes)) = (text.get(..degree_digits), text.get(degree_digits..)) else {
        return 0.0;
    };
    let degrees: f64 = degrees.parse().unwrap_or(0.0);
    let minutes: f64 = minutes.parse().unwrap_or(0.0);
    let value = degrees + minutes / 60.0;
    if negative {
        -value
    } else {
        value
    }
}
