//! Recognition of Spotify links.
//!
//! Only track, playlist and album links are accepted, either as
//! `https://open.spotify.com/<kind>/...` URLs or `spotify:<kind>:...` URIs.
//! The trimmed text is handed to the downloader unchanged.

use std::{fmt, sync::OnceLock};

use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Track,
    Playlist,
    Album,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::Track => "track",
            LinkKind::Playlist => "playlist",
            LinkKind::Album => "album",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotifyLink {
    pub kind: LinkKind,
    /// Base62 id when present right after the prefix.
    pub id: Option<String>,
    /// The trimmed user input.
    pub raw: String,
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:https://open\.spotify\.com/(track|playlist|album)/|spotify:(track|playlist|album):)([A-Za-z0-9]+)?",
        )
        .expect("valid regex")
    })
}

impl SpotifyLink {
    /// Parse a user message. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let raw = text.trim();
        let caps = link_regex().captures(raw)?;

        let kind = match caps.get(1).or_else(|| caps.get(2))?.as_str() {
            "track" => LinkKind::Track,
            "playlist" => LinkKind::Playlist,
            "album" => LinkKind::Album,
            _ => return None,
        };

        Some(Self {
            kind,
            id: caps.get(3).map(|m| m.as_str().to_string()),
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
