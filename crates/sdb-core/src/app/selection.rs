use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::{
    archive::{archive_file_name, zip_files},
    audit::AuditEvent,
    domain::ChatId,
    download::{DownloadOutcome, DownloadRequest},
    errors::Error,
    format::AudioFormat,
    messaging::{port::MessagingPort, types::CallbackQuery, types::ChatAction},
    Result,
};

use super::{texts, BotService};

/// How a finished download reached the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Audio,
    Archive { tracks: usize },
}

impl BotService {
    /// Handle a `format_<x>` button press.
    pub(super) async fn select_format(&self, q: &CallbackQuery, requested: &str) -> Result<()> {
        let user_id = q.from.user_id;

        // One attempt per user at a time; a second tap waits and then finds
        // the pending record already consumed.
        let _guard = self.user_locks.lock_user(user_id).await;

        let Some(pending) = self.pending.get(user_id).await else {
            return self.messenger.edit_html(q.message, texts::NO_PENDING).await;
        };

        let Some(format) = AudioFormat::parse(requested) else {
            warn!(user_id = user_id.0, requested, "invalid format selected");
            return self.messenger.edit_html(q.message, texts::INVALID_FORMAT).await;
        };

        // Consumed now, so a link sent while this one downloads survives it.
        self.pending.remove(user_id).await;
        info!(
            user_id = user_id.0,
            waited_secs = pending.submitted_at.elapsed().as_secs(),
            "format selected"
        );

        let dir = self.request_dir(user_id);
        let result = self
            .download_and_deliver(q, pending.link.as_str(), format, &dir)
            .await;

        remove_dir_best_effort(&dir).await;
        result
    }

    async fn download_and_deliver(
        &self,
        q: &CallbackQuery,
        url: &str,
        format: AudioFormat,
        dir: &Path,
    ) -> Result<()> {
        let user_id = q.from.user_id;
        let chat_id = q.from.chat_id;
        let username = q.from.display_name();

        self.messenger
            .edit_html(q.message, &texts::downloading(format))
            .await?;

        info!(user_id = user_id.0, url, %format, dir = %dir.display(), "starting download");
        let req = DownloadRequest {
            url: url.to_string(),
            format,
            output_dir: dir.to_path_buf(),
        };

        let files = match self.download_with_chat_action(chat_id, req).await {
            Ok(outcome) if !outcome.is_empty() => outcome.files,
            Ok(_) => {
                warn!(user_id = user_id.0, url, %format, "downloader produced no files");
                self.audit(AuditEvent::download(
                    user_id.0,
                    username,
                    url,
                    format.as_str(),
                    Err("no files produced"),
                ));
                return self.messenger.edit_html(q.message, texts::DOWNLOAD_FAILED).await;
            }
            Err(e) => {
                error!(user_id = user_id.0, url, %format, error = %e, "download failed");
                self.audit(AuditEvent::download(
                    user_id.0,
                    username,
                    url,
                    format.as_str(),
                    Err(e.to_string().as_str()),
                ));
                return self.messenger.edit_html(q.message, texts::DOWNLOAD_FAILED).await;
            }
        };

        info!(user_id = user_id.0, %format, files = files.len(), "download finished");

        match self.deliver(chat_id, dir, files, format).await {
            Ok(delivery) => {
                info!(user_id = user_id.0, ?delivery, "delivered");
                let count = match delivery {
                    Delivery::Audio => 1,
                    Delivery::Archive { tracks } => tracks,
                };
                self.audit(AuditEvent::download(
                    user_id.0,
                    username,
                    url,
                    format.as_str(),
                    Ok(count),
                ));
            }
            Err(Error::TooLarge { size, limit }) => {
                warn!(user_id = user_id.0, size, limit, "result exceeds upload limit");
                self.audit(AuditEvent::download(
                    user_id.0,
                    username,
                    url,
                    format.as_str(),
                    Err("too large"),
                ));
                self.messenger
                    .send_html(chat_id, &texts::too_large(size, limit))
                    .await?;
            }
            Err(e) => {
                error!(user_id = user_id.0, error = %e, "error sending file(s)");
                self.audit(AuditEvent::download(
                    user_id.0,
                    username,
                    url,
                    format.as_str(),
                    Err(e.to_string().as_str()),
                ));
                self.messenger.send_html(chat_id, texts::SEND_FAILED).await?;
            }
        }

        Ok(())
    }

    /// Run the downloader while repeating a "typing" chat action.
    async fn download_with_chat_action(
        &self,
        chat_id: ChatId,
        req: DownloadRequest,
    ) -> Result<DownloadOutcome> {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let messenger: Arc<dyn MessagingPort> = self.messenger.clone();
        let interval = self.cfg.chat_action_interval;

        let action_task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                  _ = tick.tick() => {
                    let _ = messenger.send_chat_action(chat_id, ChatAction::Typing).await;
                  }
                  _ = &mut stop_rx => break,
                }
            }
        });

        let result = self.downloader.download(req).await;

        let _ = stop_tx.send(());
        let _ = action_task.await;
        result
    }

    async fn deliver(
        &self,
        chat_id: ChatId,
        dir: &Path,
        files: Vec<PathBuf>,
        format: AudioFormat,
    ) -> Result<Delivery> {
        let limit = self.upload_limit();

        // Entries are stored, so the archive is at least the sum of its parts.
        let size = total_size(&files).await?;
        if size > limit {
            return Err(Error::TooLarge { size, limit });
        }

        let _ = self
            .messenger
            .send_chat_action(chat_id, ChatAction::UploadDocument)
            .await;

        if let [single] = files.as_slice() {
            self.messenger
                .send_audio(chat_id, single, &texts::track_caption(format))
                .await?;
            return Ok(Delivery::Audio);
        }

        let tracks = files.len();
        let base = dir.to_path_buf();
        let data = tokio::task::spawn_blocking(move || zip_files(&base, &files))
            .await
            .map_err(|e| Error::External(format!("zip task failed: {e}")))??;

        let size = data.len() as u64;
        if size > limit {
            return Err(Error::TooLarge { size, limit });
        }

        self.messenger
            .send_document(
                chat_id,
                &archive_file_name(format),
                data,
                &texts::archive_caption(tracks, format),
            )
            .await?;
        Ok(Delivery::Archive { tracks })
    }
}

async fn total_size(files: &[PathBuf]) -> Result<u64> {
    let mut total = 0u64;
    for f in files {
        total = total.saturating_add(tokio::fs::metadata(f).await?.len());
    }
    Ok(total)
}

async fn remove_dir_best_effort(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "failed to clean up download dir"),
    }
}
