//! Receiver families, their startup sequences and identity reports

use serde::{Deserialize, Serialize};

use super::rules::{ResponseMatcher, ResponseRule};
use crate::core::protocol::checksum::{frame_command, ChecksumScope};

/// Placeholder for identity fields not yet reported by the receiver
pub const UNKNOWN: &str = "UNKNOWN";

/// Supported receiver families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    /// Quectel LC29H (PAIR / PQTM command set)
    #[default]
    Quectel,
    /// Unicore UM980 / UM982
    Unicore,
}

impl DeviceFamily {
    /// Get all families
    pub fn all() -> &'static [DeviceFamily] {
        &[DeviceFamily::Quectel, DeviceFamily::Unicore]
    }

    /// Get name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceFamily::Quectel => "Quectel",
            DeviceFamily::Unicore => "Unicore",
        }
    }

    /// Static profile for the family
    pub fn profile(&self) -> &'static DeviceProfile {
        match self {
            DeviceFamily::Quectel => &QUECTEL,
            DeviceFamily::Unicore => &UNICORE,
        }
    }
}

impl std::str::FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quectel" | "lc29h" => Ok(Self::Quectel),
            "unicore" | "um980" | "um982" => Ok(Self::Unicore),
            other => Err(format!("unknown receiver family '{other}'")),
        }
    }
}

/// How commands are put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFraming {
    /// `$<command>*<XX>\r\n`
    Nmea,
    /// `<command>\r\n`
    Plain,
}

impl CommandFraming {
    /// Wire bytes for `command`
    pub fn frame(&self, command: &str) -> String {
        match self {
            CommandFraming::Nmea => frame_command(command),
            CommandFraming::Plain => format!("{command}\r\n"),
        }
    }
}

/// Layout of the line that carries the receiver identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFormat {
    /// `$PQTMVERNO,<firmware>,<date>,<time>`
    QuectelVerno,
    /// `#VERSION,<header>;<type>,<firmware>,<unused>,<serial>-<suffix>,...`
    UnicoreReport,
}

/// Everything that differs between receiver families
#[derive(Debug)]
pub struct DeviceProfile {
    /// Family
    pub family: DeviceFamily,
    /// Model name recorded when the version reply does not carry one
    pub model: &'static str,
    /// Commands sent, in order, by a fresh initialization
    pub startup: &'static [&'static str],
    /// Command whose confirmation carries the identity
    pub version_command: &'static str,
    /// Layout of that confirmation
    pub version_format: VersionFormat,
    /// Device type to follow-up command
    pub follow_ups: &'static [(&'static str, &'static str)],
    /// Follow-up for device types not listed
    pub default_follow_up: Option<&'static str>,
    /// Per command family response rules, first prefix match wins
    pub rules: &'static [ResponseRule],
    /// Rule for commands not covered by `rules`
    pub default_matcher: ResponseMatcher,
    /// Reply prefixes whose XOR checksum covers the leading `$`
    pub marker_inclusive: &'static [&'static str],
    /// Outbound framing
    pub framing: CommandFraming,
    /// Banner printed by the receiver after a reboot
    pub reset_banner: Option<&'static str>,
}

impl DeviceProfile {
    /// Rule governing the response to `command`
    pub fn matcher_for(&self, command: &str) -> &ResponseMatcher {
        self.rules
            .iter()
            .find(|rule| command.starts_with(rule.family))
            .map_or(&self.default_matcher, |rule| &rule.matcher)
    }

    /// Checksum scope for a received line
    pub fn scope_for(&self, line: &str) -> ChecksumScope {
        if self.marker_inclusive.iter().any(|p| line.starts_with(p)) {
            ChecksumScope::IncludeMarker
        } else {
            ChecksumScope::ExcludeMarker
        }
    }

    /// Setting acknowledgement rule whose prefix starts `line`
    pub fn setting_ack_for(&self, line: &str) -> Option<&ResponseMatcher> {
        self.rules
            .iter()
            .map(|rule| &rule.matcher)
            .find(|m| matches!(m, ResponseMatcher::SettingAck { prefix, .. } if line.starts_with(prefix)))
    }

    /// Parse identity out of a confirmed version line
    pub fn parse_version(&self, line: &str) -> Result<DeviceIdentity, VersionError> {
        match self.version_format {
            VersionFormat::QuectelVerno => parse_quectel_version(line, self.model),
            VersionFormat::UnicoreReport => parse_unicore_version(line),
        }
    }

    /// Follow-up command for a device type; `None` for an unlisted type with no default
    pub fn follow_up_for(&self, device_type: &str) -> FollowUp {
        match self.follow_ups.iter().find(|(t, _)| *t == device_type) {
            Some((_, command)) => FollowUp::Known(command),
            None => match self.default_follow_up {
                Some(command) => FollowUp::Fallback(command),
                None => FollowUp::None,
            },
        }
    }
}

/// Outcome of looking up the post-identity command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Command chosen for a recognised device type
    Known(&'static str),
    /// Default command for an unrecognised device type
    Fallback(&'static str),
    /// Family has no follow-up
    None,
}

/// Quectel LC29H base station
pub static QUECTEL: DeviceProfile = DeviceProfile {
    family: DeviceFamily::Quectel,
    model: "LC29H",
    startup: &[
        "PQTMVERNO",
        "PQTMCFGSVIN,W,1,43200,0,0,0,0",
        "PAIR432,1",
        "PAIR434,1",
        "PAIR436,1",
    ],
    version_command: "PQTMVERNO",
    version_format: VersionFormat::QuectelVerno,
    follow_ups: &[],
    default_follow_up: None,
    rules: &[
        ResponseRule {
            family: "PQTMCFGSVIN",
            matcher: ResponseMatcher::SettingAck {
                prefix: "$PQTMCFGSVIN",
                ok_token: "$PQTMCFGSVIN,OK",
            },
        },
        ResponseRule {
            family: "PAIR",
            matcher: ResponseMatcher::EmbeddedDigits {
                ack_prefix: "$PAIR001",
                command_digits: 4..7,
                response_digits: 9..12,
                min_response_len: 15,
                min_command_len: 9,
            },
        },
    ],
    default_matcher: ResponseMatcher::Echo,
    marker_inclusive: &[],
    framing: CommandFraming::Nmea,
    reset_banner: None,
};

/// Unicore UM980 / UM982 base station
pub static UNICORE: DeviceProfile = DeviceProfile {
    family: DeviceFamily::Unicore,
    model: "UM98x",
    startup: &[
        "VERSION",
        "RTCM1005 30",
        "RTCM1033 30",
        "RTCM1077 1",
        "RTCM1087 1",
        "RTCM1097 1",
        "RTCM1117 1",
        "RTCM1127 1",
        "RTCM1137 1",
    ],
    version_command: "VERSION",
    version_format: VersionFormat::UnicoreReport,
    follow_ups: &[("UM982", "CONFIG SIGNALGROUP 3 6"), ("UM980", "CONFIG SIGNALGROUP 2")],
    default_follow_up: Some("CONFIG SIGNALGROUP 3 6"),
    rules: &[ResponseRule {
        family: "VERSION",
        matcher: ResponseMatcher::Report { prefix: "#VERSION" },
    }],
    default_matcher: ResponseMatcher::CommandEcho {
        prefix: "$command,",
        suffix: ",response: OK*",
    },
    marker_inclusive: &["$command,", "$devicename,"],
    framing: CommandFraming::Plain,
    reset_banner: Some("$devicename,COM"),
};

/// What the receiver told us about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// Model, e.g. UM982
    pub device_type: String,
    /// Firmware build
    pub firmware: String,
    /// Serial number without suffix
    pub serial: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_type: UNKNOWN.to_string(),
            firmware: UNKNOWN.to_string(),
            serial: UNKNOWN.to_string(),
        }
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.device_type, self.firmware, self.serial)
    }
}

/// Version line could not be parsed
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// No `;` separated body
    #[error("DANGER 301 : Unknown sections '{0}' Detected")]
    Sections(String),
    /// Body has too few fields
    #[error("DANGER 302 : Unknown split '{0}' Detected")]
    Fields(String),
}

fn strip_checksum(line: &str) -> &str {
    line.rfind('*').map_or(line, |star| &line[..star])
}

fn parse_unicore_version(line: &str) -> Result<DeviceIdentity, VersionError> {
    let body = strip_checksum(line)
        .split(';')
        .nth(1)
        .ok_or_else(|| VersionError::Sections(line.to_string()))?;
    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() < 5 {
        return Err(VersionError::Fields(line.to_string()));
    }
    let serial = parts[3].split('-').next().unwrap_or(parts[3]);
    Ok(DeviceIdentity {
        device_type: parts[0].to_string(),
        firmware: parts[1].to_string(),
        serial: serial.to_string(),
    })
}

fn parse_quectel_version(line: &str, model: &str) -> Result<DeviceIdentity, VersionError> {
    let parts: Vec<&str> = strip_checksum(line).split(',').collect();
    let firmware = parts
        .get(1)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| VersionError::Fields(line.to_string()))?;
    Ok(DeviceIdentity {
        device_type: model.to_string(),
        firmware: (*firmware).to_string(),
        serial: UNKNOWN.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UM982_VERSION: &str = "#VERSION,0,GPS,UNKNOWN,0,0,0,0,0,1261;UM982,R4.10Build11826,\
                                 HRPT00-S10C-P,2310415000012-LR23A0225104240,ff27289609cf869d,2023/11/24*4d0ec3ba";

    #[test]
    fn test_unicore_version() {
        let identity = UNICORE.parse_version(UM982_VERSION).unwrap();
        assert_eq!(identity.device_type, "UM982");
        assert_eq!(identity.firmware, "R4.10Build11826");
        assert_eq!(identity.serial, "2310415000012");
    }

    #[test]
    fn test_unicore_version_errors() {
        assert!(matches!(UNICORE.parse_version("#VERSION,0,GPS*00"), Err(VersionError::Sections(_))));
        assert!(matches!(UNICORE.parse_version("#VERSION,0;UM980,R4*00"), Err(VersionError::Fields(_))));
    }

    #[test]
    fn test_quectel_version() {
        let identity = QUECTEL
            .parse_version("$PQTMVERNO,LC29HDANR11A03S_RSA,2023/03/02,17:00:55*2B")
            .unwrap();
        assert_eq!(identity.device_type, "LC29H");
        assert_eq!(identity.firmware, "LC29HDANR11A03S_RSA");
        assert_eq!(identity.serial, UNKNOWN);
    }

    #[test]
    fn test_follow_ups() {
        assert_eq!(UNICORE.follow_up_for("UM980"), FollowUp::Known("CONFIG SIGNALGROUP 2"));
        assert_eq!(UNICORE.follow_up_for("UM982"), FollowUp::Known("CONFIG SIGNALGROUP 3 6"));
        assert_eq!(UNICORE.follow_up_for("UM981"), FollowUp::Fallback("CONFIG SIGNALGROUP 3 6"));
        assert_eq!(QUECTEL.follow_up_for("LC29H"), FollowUp::None);
    }

    #[test]
    fn test_rule_lookup() {
        assert!(matches!(QUECTEL.matcher_for("PAIR436,1"), ResponseMatcher::EmbeddedDigits { .. }));
        assert!(matches!(QUECTEL.matcher_for("PQTMVERNO"), ResponseMatcher::Echo));
        assert!(matches!(UNICORE.matcher_for("VERSION"), ResponseMatcher::Report { .. }));
        assert!(matches!(UNICORE.matcher_for("RTCM1005 30"), ResponseMatcher::CommandEcho { .. }));
    }

    #[test]
    fn test_scopes_and_framing() {
        assert_eq!(UNICORE.scope_for("$command,VERSION,response: OK*04"), ChecksumScope::IncludeMarker);
        assert_eq!(UNICORE.scope_for("$GNGGA,1*55"), ChecksumScope::ExcludeMarker);
        assert_eq!(QUECTEL.framing.frame("PAIR432,1"), "$PAIR432,1*22\r\n");
        assert_eq!(UNICORE.framing.frame("RTCM1005 30"), "RTCM1005 30\r\n");
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("UM982".parse::<DeviceFamily>(), Ok(DeviceFamily::Unicore));
        assert_eq!("quectel".parse::<DeviceFamily>(), Ok(DeviceFamily::Quectel));
        assert!("ublox".parse::<DeviceFamily>().is_err());
    }
}
