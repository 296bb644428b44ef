//! User-facing texts (Telegram HTML).

use crate::format::AudioFormat;

pub const CB_HELP: &str = "help";
pub const CB_STATUS: &str = "status";

pub const UNAUTHORIZED: &str = "Unauthorized. Contact the bot owner for access.";
pub const INVALID_LINK: &str = "❗ Please send a valid Spotify track, playlist, or album URL.";
pub const CHOOSE_FORMAT: &str = "🎵 <b>Choose your preferred audio format:</b>";
pub const STATUS_CALLBACK: &str = "✅ Bot is operational and ready to download Spotify music.";
pub const NO_PENDING: &str = "⚠️ No pending downloads. Send a Spotify link first.";
pub const INVALID_FORMAT: &str = "❌ Invalid format selected.";
pub const DOWNLOAD_FAILED: &str = "❌ Failed to download. Try again later.";
pub const SEND_FAILED: &str = "❌ Failed to send file(s). Try again.";
pub const UNKNOWN_ACTION: &str = "Unknown action.";

pub fn welcome() -> String {
    "🎧 <b>Welcome to the Spotify Downloader Bot!</b>\n\n\
Send me a Spotify track, playlist, or album link, \
and you'll be able to choose the audio format for download."
        .to_string()
}

pub fn help() -> String {
    format!(
        "📌 <b>How to use this bot:</b>\n\n\
1️⃣ Send a Spotify track, playlist, or album URL.\n\
2️⃣ Choose your preferred audio format from the options.\n\
3️⃣ Wait while I download your music and send it to you.\n\n\
🔹 Supported formats: {}\n\
🔹 Large playlists/albums are zipped for convenience.\n\n\
Commands:\n\
/start - Welcome message\n\
/help - Help message\n\
/status - Check bot status",
        AudioFormat::supported_list()
    )
}

pub fn help_menu() -> String {
    "<b>Help Menu</b>\n\n\
Send a Spotify link to download music.\n\
After sending, choose your format.\n\
Use /status to check bot status."
        .to_string()
}

pub fn status(pending: usize) -> String {
    let mut out = "✅ Bot is online and ready to download your Spotify music!".to_string();
    if pending > 0 {
        out.push_str(&format!("\n\n⏳ Awaiting format choice: {pending}"));
    }
    out
}

pub fn unknown_command(name: &str) -> String {
    format!(
        "Unknown command: /{}. See /help.",
        escape_html(name)
    )
}

pub fn rate_limited(retry_secs: f64) -> String {
    format!("⏳ Rate limited. Please wait {:.1} seconds.", retry_secs)
}

pub fn downloading(format: AudioFormat) -> String {
    format!(
        "⏬ Downloading in <b>{}</b> format. Please wait...",
        format.label()
    )
}

pub fn archive_caption(tracks: usize, format: AudioFormat) -> String {
    format!(
        "✅ Downloaded {tracks} tracks in <b>{}</b> format.",
        format.label()
    )
}

pub fn track_caption(format: AudioFormat) -> String {
    format!("✅ Here's your track in <b>{}</b> format!", format.label())
}

pub fn too_large(size: u64, limit: u64) -> String {
    format!(
        "❌ Result is too large to send via Telegram ({} MB, limit {} MB).",
        size / (1024 * 1024),
        limit / (1024 * 1024)
    )
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(escape_html("<a&b>\""), "&lt;a&amp;b&gt;&quot;");
    }

    #[test]
    fn help_lists_formats() {
        assert!(help().contains("mp3, m4a, flac, opus"));
    }

    #[test]
    fn status_mentions_pending_only_when_present() {
        assert!(!status(0).contains("Awaiting"));
        assert!(status(2).contains("Awaiting format choice: 2"));
    }

    #[test]
    fn unknown_command_is_escaped() {
        assert_eq!(unknown_command("<x>"), "Unknown command: /&lt;x&gt;. See /help.");
    }
}
