use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Image format of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Png,
    Webp,
    Jpeg,
}

impl OutputFormat {
    /// Every supported format, in the order they are listed to clients.
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Webp, OutputFormat::Jpeg];

    /// Query-string name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Whether the encoded image keeps an alpha channel.
    pub fn supports_transparency(&self) -> bool {
        !matches!(self, OutputFormat::Jpeg)
    }

    /// Parse an optional query selector, defaulting to PNG.
    pub fn from_query(value: Option<&str>) -> Result<Self, ValidationError> {
        match value {
            None => Ok(OutputFormat::default()),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            _ => Err(ValidationError::InvalidOutputFormat {
                value: s.to_string(),
                expected: OutputFormat::ALL
                    .iter()
                    .map(OutputFormat::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
