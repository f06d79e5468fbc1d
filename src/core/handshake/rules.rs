//! Response matching rules
//!
//! Receivers acknowledge commands in several shapes. Each shape is a
//! [`ResponseMatcher`] variant; profiles map command families to matchers, so
//! supporting another reply format is a table entry.

use std::ops::Range;

/// Matcher bound to the command family it applies to
#[derive(Debug, Clone)]
pub struct ResponseRule {
    /// Command prefix, e.g. `PAIR`
    pub family: &'static str,
    /// How replies to that family are recognised
    pub matcher: ResponseMatcher,
}

/// Ways a reply can acknowledge the head command
#[derive(Debug, Clone)]
pub enum ResponseMatcher {
    /// Reply starts with `$<command>`
    Echo,
    /// Generic ack carrying the command number at another position,
    /// e.g. `PAIR436,1` acknowledged by `$PAIR001,436,0`
    EmbeddedDigits {
        /// Prefix of the ack sentence
        ack_prefix: &'static str,
        /// Digits inside the command text
        command_digits: Range<usize>,
        /// Same digits inside the reply
        response_digits: Range<usize>,
        /// Shortest acceptable reply
        min_response_len: usize,
        /// Shortest command this rule can correlate
        min_command_len: usize,
    },
    /// Setting acknowledgement, success marked by `ok_token`
    SettingAck {
        /// Prefix of the ack sentence
        prefix: &'static str,
        /// Prefix of a successful ack
        ok_token: &'static str,
    },
    /// `$command,<command>,response: OK*XX`
    CommandEcho {
        /// Text before the echoed command
        prefix: &'static str,
        /// Text after the echoed command
        suffix: &'static str,
    },
    /// Unsolicited report line, e.g. `#VERSION,...`
    Report {
        /// Report prefix
        prefix: &'static str,
    },
}

/// Result of testing a reply against the head command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Reply acknowledges the command
    Confirmed,
    /// Reply is unrelated
    NoMatch,
    /// Reply looks like an ack but fails correlation; reason is logged
    Rejected(String),
}

impl ResponseMatcher {
    /// Test `line` (checksum already verified) against `command`
    pub fn check(&self, command: &str, line: &str) -> Verdict {
        match self {
            ResponseMatcher::Echo => {
                let echoed = line
                    .strip_prefix('$')
                    .is_some_and(|rest| rest.starts_with(command));
                if echoed {
                    Verdict::Confirmed
                } else {
                    Verdict::NoMatch
                }
            }
            ResponseMatcher::EmbeddedDigits {
                ack_prefix,
                command_digits,
                response_digits,
                min_response_len,
                min_command_len,
            } => {
                if !line.starts_with(ack_prefix) {
                    return Verdict::NoMatch;
                }
                if line.len() < *min_response_len {
                    return Verdict::Rejected(format!("ERROR : {ack_prefix} too short {line}"));
                }
                if command.len() < *min_command_len {
                    return Verdict::Rejected(format!("ERROR : {line} too short for {command}"));
                }
                let expected = command.get(command_digits.clone());
                let got = line.get(response_digits.clone());
                if expected.is_some() && expected == got {
                    Verdict::Confirmed
                } else {
                    Verdict::Rejected(format!("ERROR : {ack_prefix} mismatch {line} and ${command}"))
                }
            }
            ResponseMatcher::SettingAck { prefix, ok_token } => {
                if !line.starts_with(prefix) {
                    Verdict::NoMatch
                } else if line.starts_with(ok_token) {
                    Verdict::Confirmed
                } else {
                    Verdict::Rejected(format!("ERROR GPS NOT Configured : {line}"))
                }
            }
            ResponseMatcher::CommandEcho { prefix, suffix } => {
                let echoed = line
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix(command))
                    .is_some_and(|rest| rest.starts_with(suffix));
                if echoed {
                    Verdict::Confirmed
                } else {
                    Verdict::NoMatch
                }
            }
            ResponseMatcher::Report { prefix } => {
                if line.starts_with(prefix) {
                    Verdict::Confirmed
                } else {
                    Verdict::NoMatch
                }
            }
        }
    }

    /// True for setting acknowledgements that only advance their own command
    pub fn is_setting_ack(&self) -> bool {
        matches!(self, ResponseMatcher::SettingAck { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_rule() -> ResponseMatcher {
        ResponseMatcher::EmbeddedDigits {
            ack_prefix: "$PAIR001",
            command_digits: 4..7,
            response_digits: 9..12,
            min_response_len: 15,
            min_command_len: 9,
        }
    }

    #[test]
    fn test_echo() {
        assert_eq!(ResponseMatcher::Echo.check("PQTMVERNO", "$PQTMVERNO,LC29H*00"), Verdict::Confirmed);
        assert_eq!(ResponseMatcher::Echo.check("PQTMVERNO", "$PQTMVER*00"), Verdict::NoMatch);
    }

    #[test]
    fn test_embedded_digits() {
        let rule = pair_rule();
        assert_eq!(rule.check("PAIR436,1", "$PAIR001,436,0*3A"), Verdict::Confirmed);
        assert!(matches!(rule.check("PAIR432,1", "$PAIR001,436,0*3A"), Verdict::Rejected(_)));
        assert!(matches!(rule.check("PAIR436,1", "$PAIR001,43*00"), Verdict::Rejected(_)));
        assert!(matches!(rule.check("PAIR43", "$PAIR001,436,0*3A"), Verdict::Rejected(_)));
        assert_eq!(rule.check("PAIR436,1", "$PQTMVERNO*58"), Verdict::NoMatch);
    }

    #[test]
    fn test_setting_ack() {
        let rule = ResponseMatcher::SettingAck {
            prefix: "$PQTMCFGSVIN",
            ok_token: "$PQTMCFGSVIN,OK",
        };
        assert_eq!(rule.check("PQTMCFGSVIN,W,1", "$PQTMCFGSVIN,OK*70"), Verdict::Confirmed);
        assert!(matches!(rule.check("PQTMCFGSVIN,W,1", "$PQTMCFGSVIN,ERROR*2C"), Verdict::Rejected(_)));
        assert!(rule.is_setting_ack());
    }

    #[test]
    fn test_command_echo() {
        let rule = ResponseMatcher::CommandEcho {
            prefix: "$command,",
            suffix: ",response: OK*",
        };
        assert_eq!(
            rule.check("RTCM1005 30", "$command,RTCM1005 30,response: OK*71"),
            Verdict::Confirmed
        );
        assert_eq!(
            rule.check("RTCM1005 30", "$command,RTCM1033 30,response: OK*74"),
            Verdict::NoMatch
        );
        assert_eq!(
            rule.check("RTCM1005 30", "$command,RTCM1005 30,response: PARSING FAILED*00"),
            Verdict::NoMatch
        );
    }

    #[test]
    fn test_report() {
        let rule = ResponseMatcher::Report { prefix: "#VERSION" };
        assert_eq!(rule.check("VERSION", "#VERSION,0;UM982*00"), Verdict::Confirmed);
        assert_eq!(rule.check("VERSION", "$command,VERSION,response: OK*04"), Verdict::NoMatch);
    }
}
