use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Telegram Bot API upload cap for bots (50 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Empty means the bot answers everyone.
    pub telegram_allowed_users: Vec<i64>,

    // Downloader
    pub spotdl_path: PathBuf,
    pub download_dir: PathBuf,
    pub download_timeout: Duration,

    // Delivery
    pub max_upload_bytes: u64,
    pub chat_action_interval: Duration,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    // Audit
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,
}

impl Config {
    /// Load from the process environment, creating the download root.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let cfg = Self::from_lookup(|key| env::var(key).ok())?;
        fs::create_dir_all(&cfg.download_dir)?;
        Ok(cfg)
    }

    /// Build a config from an arbitrary key lookup. No filesystem side effects.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let str_of = |key: &str| get(key).and_then(non_empty);

        let telegram_bot_token = str_of("TELEGRAM_BOT_TOKEN")
            .or_else(|| str_of("BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let telegram_allowed_users = parse_csv_i64(str_of("TELEGRAM_ALLOWED_USERS"));

        let spotdl_path = str_of("SPOTDL_PATH")
            .map(PathBuf::from)
            .or_else(|| which_in_path("spotdl"))
            .unwrap_or_else(|| PathBuf::from("spotdl"));
        let download_dir = PathBuf::from(str_of("DOWNLOAD_DIR").unwrap_or("downloads".to_string()));
        let download_timeout =
            Duration::from_secs(parse_u64(str_of("DOWNLOAD_TIMEOUT_SECS")).unwrap_or(300));

        let max_upload_bytes =
            parse_u64(str_of("MAX_UPLOAD_BYTES")).unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        // Telegram shows a chat action for ~5s; anything faster is wasted calls.
        let chat_action_interval = Duration::from_millis(
            parse_u64(str_of("CHAT_ACTION_INTERVAL_MS"))
                .unwrap_or(4000)
                .max(1000),
        );

        let rate_limit_enabled = parse_bool(str_of("RATE_LIMIT_ENABLED")).unwrap_or(true);
        let rate_limit_requests = parse_u64(str_of("RATE_LIMIT_REQUESTS"))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(10);
        let rate_limit_window =
            Duration::from_secs(parse_u64(str_of("RATE_LIMIT_WINDOW")).unwrap_or(60));

        let audit_log_path = str_of("AUDIT_LOG_PATH").map(PathBuf::from);
        let audit_log_json = parse_bool(str_of("AUDIT_LOG_JSON")).unwrap_or(false);

        if download_timeout.is_zero() {
            return Err(Error::Config(
                "DOWNLOAD_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            spotdl_path,
            download_dir,
            download_timeout,
            max_upload_bytes,
            chat_action_interval,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable_file(candidate))
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "   ")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn falls_back_to_bot_token() {
        let cfg = Config::from_lookup(lookup(&[("BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(cfg.telegram_bot_token, "123:abc");
    }

    #[test]
    fn defaults() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        assert!(cfg.telegram_allowed_users.is_empty());
        assert_eq!(cfg.download_dir, PathBuf::from("downloads"));
        assert_eq!(cfg.download_timeout, Duration::from_secs(300));
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(cfg.rate_limit_enabled);
        assert_eq!(cfg.rate_limit_requests, 10);
        assert_eq!(cfg.audit_log_path, None);
    }

    #[test]
    fn overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_ALLOWED_USERS", "1, 2,x,,3"),
            ("SPOTDL_PATH", "/opt/spotdl/bin/spotdl"),
            ("DOWNLOAD_DIR", "/var/lib/bot"),
            ("DOWNLOAD_TIMEOUT_SECS", "42"),
            ("RATE_LIMIT_ENABLED", "off"),
            ("AUDIT_LOG_PATH", "/tmp/audit.log"),
            ("AUDIT_LOG_JSON", "yes"),
        ]))
        .unwrap();
        assert_eq!(cfg.telegram_allowed_users, vec![1, 2, 3]);
        assert_eq!(cfg.spotdl_path, PathBuf::from("/opt/spotdl/bin/spotdl"));
        assert_eq!(cfg.download_dir, PathBuf::from("/var/lib/bot"));
        assert_eq!(cfg.download_timeout, Duration::from_secs(42));
        assert!(!cfg.rate_limit_enabled);
        assert_eq!(cfg.audit_log_path, Some(PathBuf::from("/tmp/audit.log")));
        assert!(cfg.audit_log_json);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("DOWNLOAD_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn dotenv_parsing() {
        let parsed = parse_dotenv(
            "# comment\n\nBOT_TOKEN=\"abc\"\nexport DOWNLOAD_DIR = '/data'\nnoequals\n=novalue\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("BOT_TOKEN".to_string(), "abc".to_string()),
                ("DOWNLOAD_DIR".to_string(), "/data".to_string()),
            ]
        );
    }
}
