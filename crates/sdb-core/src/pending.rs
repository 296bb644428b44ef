//! In-memory "pending selection" state.
//!
//! A user submits a link, then picks a format from an inline keyboard. Between
//! the two steps the link lives here, keyed by user. Nothing is persisted and
//! records never expire: a new submission simply overwrites the old one.

use std::{collections::HashMap, sync::Arc, time::Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{domain::UserId, spotify::SpotifyLink};

#[derive(Clone, Debug)]
pub struct PendingDownload {
    pub link: SpotifyLink,
    pub submitted_at: Instant,
}

#[derive(Debug, Default)]
pub struct PendingDownloads {
    inner: Mutex<HashMap<UserId, PendingDownload>>,
}

impl PendingDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `link` for `user`, returning the record it replaced.
    pub async fn insert(&self, user: UserId, link: SpotifyLink) -> Option<PendingDownload> {
        self.inner.lock().await.insert(
            user,
            PendingDownload {
                link,
                submitted_at: Instant::now(),
            },
        )
    }

    pub async fn get(&self, user: UserId) -> Option<PendingDownload> {
        self.inner.lock().await.get(&user).cloned()
    }

    pub async fn remove(&self, user: UserId) -> Option<PendingDownload> {
        self.inner.lock().await.remove(&user)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Per-user async locks; download attempts of one user run one at a time.
///
/// Only locks somebody holds or waits on are kept.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Guards and waiters each hold a clone; a count of one means idle.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn link(s: &str) -> SpotifyLink {
        SpotifyLink::parse(s).unwrap()
    }

    #[tokio::test]
    async fn new_submission_overwrites() {
        let p = PendingDownloads::new();
        let u = UserId(1);

        assert!(p.insert(u, link("spotify:track:a")).await.is_none());
        let prev = p.insert(u, link("spotify:album:b")).await.unwrap();
        assert_eq!(prev.link.raw, "spotify:track:a");

        assert_eq!(p.get(u).await.unwrap().link.raw, "spotify:album:b");
        assert_eq!(p.len().await, 1);
    }

    #[tokio::test]
    async fn remove_consumes_record() {
        let p = PendingDownloads::new();
        let u = UserId(1);
        p.insert(u, link("spotify:track:a")).await;

        assert!(p.remove(u).await.is_some());
        assert!(p.remove(u).await.is_none());
        assert!(p.get(u).await.is_none());
        assert!(p.is_empty().await);
    }

    #[tokio::test]
    async fn records_are_per_user() {
        let p = PendingDownloads::new();
        p.insert(UserId(1), link("spotify:track:a")).await;
        p.insert(UserId(2), link("spotify:track:b")).await;
        p.remove(UserId(1)).await;
        assert_eq!(p.get(UserId(2)).await.unwrap().link.raw, "spotify:track:b");
    }

    #[tokio::test]
    async fn user_lock_serializes_same_user() {
        let locks = Arc::new(UserLocks::default());
        let guard = locks.lock_user(UserId(1)).await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock_user(UserId(1)).await;
        });

        // Other users are not blocked.
        let _other = locks.lock_user(UserId(2)).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn idle_user_locks_are_pruned() {
        let locks = UserLocks::default();
        drop(locks.lock_user(UserId(1)).await);
        drop(locks.lock_user(UserId(2)).await);

        let _held = locks.lock_user(UserId(3)).await;
        let map = locks.inner.lock().await;
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&UserId(3)));
    }
}
