//! Audio formats offered to the user.

use std::fmt;

/// Prefix of the inline-button callback data used for format selection.
pub const FORMAT_CALLBACK_PREFIX: &str = "format_";

/// An output format understood by `spotdl --format`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Flac,
    Opus,
}

impl AudioFormat {
    /// Display order of the format keyboard.
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Mp3,
        AudioFormat::M4a,
        AudioFormat::Flac,
        AudioFormat::Opus,
    ];

    /// Lowercase name: CLI flag value and file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Opus => "opus",
        }
    }

    /// Uppercase button label.
    pub fn label(self) -> String {
        self.as_str().to_uppercase()
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Exact (case-sensitive) match on the lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    pub fn callback_data(self) -> String {
        format!("{FORMAT_CALLBACK_PREFIX}{}", self.as_str())
    }

    /// Comma separated list for help texts: `mp3, m4a, flac, opus`.
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_supported_lowercase_names() {
        assert_eq!(AudioFormat::parse("flac"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::parse("FLAC"), None);
        assert_eq!(AudioFormat::parse("wav"), None);
        assert_eq!(AudioFormat::parse(""), None);
    }

    #[test]
    fn callback_data_uses_prefix() {
        assert_eq!(AudioFormat::Opus.callback_data(), "format_opus");
        assert_eq!(AudioFormat::M4a.label(), "M4A");
        assert_eq!(AudioFormat::supported_list(), "mp3, m4a, flac, opus");
    }
}
