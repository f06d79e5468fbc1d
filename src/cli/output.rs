//! Output formatting for tool commands

use serde::Serialize;

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Render `value` as JSON, or through `Display` for text output
pub fn render<T>(value: &T, format: OutputFormat) -> String
where
    T: Serialize + std::fmt::Display,
{
    match format {
        OutputFormat::Text => value.to_string(),
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Serialize)]
    struct Sample {
        count: u32,
    }

    impl fmt::Display for Sample {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "count {}", self.count)
        }
    }

    #[test]
    fn test_render() {
        let sample = Sample { count: 3 };
        assert_eq!(render(&sample, OutputFormat::Text), "count 3");
        let json: serde_json::Value =
            serde_json::from_str(&render(&sample, OutputFormat::Json)).unwrap();
        assert_eq!(json["count"], 3);
    }
}
