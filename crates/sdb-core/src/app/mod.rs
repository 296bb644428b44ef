//! Update dispatch: commands, link submissions and inline-button callbacks.
//!
//! Everything here talks to the outside world through [`MessagingPort`] and
//! [`Downloader`], so the whole flow runs against in-memory fakes in tests.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::Config,
    domain::UserId,
    download::Downloader,
    format::{AudioFormat, FORMAT_CALLBACK_PREFIX},
    messaging::{
        port::MessagingPort,
        types::{
            CallbackQuery, Command, IncomingUpdate, InlineButton, InlineKeyboard, TextMessage,
        },
    },
    pending::{PendingDownloads, UserLocks},
    security::{is_authorized, RateLimiter},
    spotify::SpotifyLink,
    Result,
};

mod selection;
pub mod texts;


pub struct BotService {
    cfg: Arc<Config>,
    messenger: Arc<dyn MessagingPort>,
    downloader: Arc<dyn Downloader>,
    pending: PendingDownloads,
    user_locks: UserLocks,
    rate_limiter: Mutex<RateLimiter>,
    audit: Option<AuditLogger>,
    request_seq: AtomicU64,
}

impl BotService {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        );
        let audit = cfg
            .audit_log_path
            .as_ref()
            .map(|p| AuditLogger::new(p.clone(), cfg.audit_log_json));

        Self {
            cfg,
            messenger,
            downloader,
            pending: PendingDownloads::new(),
            user_locks: UserLocks::default(),
            rate_limiter: Mutex::new(rate_limiter),
            audit,
            request_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn pending(&self) -> &PendingDownloads {
        &self.pending
    }

    pub async fn handle(&self, update: IncomingUpdate) -> Result<()> {
        let from = match &update {
            IncomingUpdate::Command(c) => &c.from,
            IncomingUpdate::Text(t) => &t.from,
            IncomingUpdate::Callback(q) => &q.from,
        };

        if !is_authorized(Some(from.user_id), &self.cfg.telegram_allowed_users) {
            warn!(user_id = from.user_id.0, "unauthorized update");
            self.audit(AuditEvent::auth(from.user_id.0, from.display_name(), false));
            return match &update {
                IncomingUpdate::Callback(q) => {
                    self.messenger
                        .answer_callback_query(&q.callback_id, Some("Unauthorized"), true)
                        .await
                }
                _ => self
                    .messenger
                    .send_html(from.chat_id, texts::UNAUTHORIZED)
                    .await
                    .map(|_| ()),
            };
        }

        match update {
            IncomingUpdate::Command(c) => self.handle_command(c).await,
            IncomingUpdate::Text(t) => self.handle_text(t).await,
            IncomingUpdate::Callback(q) => self.handle_callback(q).await,
        }
    }

    async fn handle_command(&self, cmd: Command) -> Result<()> {
        let chat_id = cmd.from.chat_id;
        debug!(user_id = cmd.from.user_id.0, command = %cmd.name, "command");

        match cmd.name.as_str() {
            "start" => {
                let keyboard = InlineKeyboard::single_row(vec![
                    InlineButton::new("Help", texts::CB_HELP),
                    InlineButton::new("Status", texts::CB_STATUS),
                ]);
                self.messenger
                    .send_inline_keyboard(chat_id, &texts::welcome(), keyboard)
                    .await?;
            }
            "help" => {
                self.messenger.send_html(chat_id, &texts::help()).await?;
            }
            "status" => {
                let pending = self.pending.len().await;
                self.messenger
                    .send_html(chat_id, &texts::status(pending))
                    .await?;
            }
            other => {
                self.messenger
                    .send_html(chat_id, &texts::unknown_command(other))
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_text(&self, msg: TextMessage) -> Result<()> {
        let user_id = msg.from.user_id;
        let chat_id = msg.from.chat_id;
        info!(user_id = user_id.0, message = %msg.text, "text message");

        let Some(link) = SpotifyLink::parse(&msg.text) else {
            self.messenger.send_html(chat_id, texts::INVALID_LINK).await?;
            return Ok(());
        };

        let (ok, retry_after) = self.rate_limiter.lock().await.check(user_id);
        if !ok {
            let retry = retry_after.unwrap_or_default().as_secs_f64();
            warn!(user_id = user_id.0, retry_after = retry, "rate limited");
            self.audit(AuditEvent::rate_limit(
                user_id.0,
                msg.from.display_name(),
                retry,
            ));
            self.messenger
                .send_html(chat_id, &texts::rate_limited(retry))
                .await?;
            return Ok(());
        }

        self.audit(AuditEvent::link(
            user_id.0,
            msg.from.display_name(),
            link.as_str(),
        ));
        info!(user_id = user_id.0, kind = %link.kind, url = %link.raw, "link accepted");
        self.pending.insert(user_id, link).await;

        let keyboard = InlineKeyboard::single_row(
            AudioFormat::ALL
                .iter()
                .map(|f| InlineButton::new(f.label(), f.callback_data()))
                .collect(),
        );
        self.messenger
            .send_inline_keyboard(chat_id, texts::CHOOSE_FORMAT, keyboard)
            .await?;
        Ok(())
    }

    async fn handle_callback(&self, q: CallbackQuery) -> Result<()> {
        debug!(user_id = q.from.user_id.0, data = %q.data, "callback");

        if q.data == texts::CB_HELP {
            self.messenger
                .answer_callback_query(&q.callback_id, None, false)
                .await?;
            return self.messenger.edit_html(q.message, &texts::help_menu()).await;
        }

        if q.data == texts::CB_STATUS {
            self.messenger
                .answer_callback_query(&q.callback_id, None, false)
                .await?;
            return self
                .messenger
                .edit_html(q.message, texts::STATUS_CALLBACK)
                .await;
        }

        if let Some(requested) = q.data.strip_prefix(FORMAT_CALLBACK_PREFIX) {
            self.messenger
                .answer_callback_query(&q.callback_id, None, false)
                .await?;
            return self.select_format(&q, requested).await;
        }

        self.messenger
            .answer_callback_query(&q.callback_id, Some(texts::UNKNOWN_ACTION), true)
            .await
    }

    /// Directory private to one download attempt.
    fn request_dir(&self, user: UserId) -> PathBuf {
        let seq = self.request_seq.fetch_add(1, Ordering::SeqCst);
        self.cfg.download_dir.join(format!("{}-{seq}", user.0))
    }

    /// Effective upload cap: the stricter of config and messenger limits.
    fn upload_limit(&self) -> u64 {
        self.cfg
            .max_upload_bytes
            .min(self.messenger.capabilities().max_upload_bytes)
    }

    fn audit(&self, event: AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(e) = audit.write(event) {
            warn!(error = %e, path = %audit.path().display(), "failed to write audit event");
        }
    }
}
