use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ChatError, Result, StoreError};
use crate::store::LikeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct LikeEntry {
    confirmed: bool,
    optimistic: Option<bool>,
    state: PendingState,
    /// Sequence of the newest toggle started on this post.
    latest: u64,
}

impl LikeEntry {
    fn confirmed(liked: bool) -> Self {
        Self {
            confirmed: liked,
            optimistic: None,
            state: PendingState::Confirmed,
            latest: 0,
        }
    }
}

/// A toggle started with [`LikeOverlay::begin_toggle`] and not yet settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToggle {
    pub post_id: Uuid,
    pub requested: bool,
    seq: u64,
}

/// Optimistic like toggles for one viewer.
///
/// The confirmed value only changes when the store accepts a write. While a
/// write is pending the overlay shows the requested value; a failed write
/// falls back to the confirmed one. When toggles overlap, only the newest
/// one decides what is shown.
pub struct LikeOverlay<L> {
    viewer: Uuid,
    store: Arc<L>,
    entries: HashMap<Uuid, LikeEntry>,
    next_seq: u64,
}

impl<L: LikeStore> LikeOverlay<L> {
    pub fn new(viewer: Uuid, store: Arc<L>) -> Self {
        Self {
            viewer,
            store,
            entries: HashMap::new(),
            next_seq: 1,
        }
    }

    pub async fn fetch_status(&mut self, post_id: Uuid) -> Result<bool> {
        let liked = self
            .store
            .like_status(post_id, self.viewer)
            .await
            .map_err(ChatError::Fetch)?;
        self.entries.insert(post_id, LikeEntry::confirmed(liked));
        Ok(liked)
    }

    pub fn is_liked(&self, post_id: Uuid) -> bool {
        self.entries
            .get(&post_id)
            .is_some_and(|e| e.optimistic.unwrap_or(e.confirmed))
    }

    pub fn state(&self, post_id: Uuid) -> Option<PendingState> {
        self.entries.get(&post_id).map(|e| e.state)
    }

    /// Flip the displayed value and mark it pending.
    pub fn begin_toggle(&mut self, post_id: Uuid) -> PendingToggle {
        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = self.entries.entry(post_id).or_insert(LikeEntry::confirmed(false));
        let requested = !entry.optimistic.unwrap_or(entry.confirmed);
        entry.optimistic = Some(requested);
        entry.state = PendingState::Pending;
        entry.latest = seq;
        PendingToggle {
            post_id,
            requested,
            seq,
        }
    }

    /// Settle a toggle started with [`begin_toggle`](Self::begin_toggle).
    ///
    /// A superseded toggle still records an accepted write as confirmed,
    /// but leaves the newer pending value and state alone.
    pub fn complete_toggle(
        &mut self,
        toggle: PendingToggle,
        outcome: std::result::Result<(), StoreError>,
    ) -> Result<bool> {
        let PendingToggle {
            post_id,
            requested,
            seq,
        } = toggle;
        let Some(entry) = self.entries.get_mut(&post_id) else {
            return outcome.map(|()| requested).map_err(ChatError::Update);
        };
        let latest = entry.latest == seq;

        match outcome {
            Ok(()) => {
                entry.confirmed = requested;
                if latest {
                    entry.optimistic = None;
                    entry.state = PendingState::Confirmed;
                }
                Ok(requested)
            }
            Err(e) => {
                if latest {
                    warn!("Like toggle on post {} failed, rolling back: {}", post_id, e);
                    entry.optimistic = None;
                    entry.state = PendingState::Failed;
                } else {
                    debug!("Superseded like toggle on post {} failed: {}", post_id, e);
                }
                Err(ChatError::Update(e))
            }
        }
    }

    pub async fn toggle(&mut self, post_id: Uuid) -> Result<bool> {
        let pending = self.begin_toggle(post_id);
        let outcome = self.store.set_like(post_id, self.viewer, pending.requested).await;
        self.complete_toggle(pending, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLikeStore;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn toggle_confirms_on_success() {
        let store = Arc::new(FakeLikeStore::default());
        let (viewer, post) = (Uuid::new_v4(), Uuid::new_v4());
        let mut overlay = LikeOverlay::new(viewer, store.clone());

        assert!(!overlay.fetch_status(post).await.unwrap());
        assert!(overlay.toggle(post).await.unwrap());

        assert!(overlay.is_liked(post));
        assert_eq!(overlay.state(post), Some(PendingState::Confirmed));
        assert!(store.is_liked(post, viewer));
    }

    #[tokio::test]
    async fn pending_shows_requested_value() {
        let store = Arc::new(FakeLikeStore::default());
        let (viewer, post) = (Uuid::new_v4(), Uuid::new_v4());
        let mut overlay = LikeOverlay::new(viewer, store);

        let pending = overlay.begin_toggle(post);
        assert!(pending.requested);
        assert!(overlay.is_liked(post));
        assert_eq!(overlay.state(post), Some(PendingState::Pending));
    }

    #[tokio::test]
    async fn failure_rolls_back_to_confirmed() {
        let store = Arc::new(FakeLikeStore::default());
        let (viewer, post) = (Uuid::new_v4(), Uuid::new_v4());
        let mut overlay = LikeOverlay::new(viewer, store.clone());
        overlay.toggle(post).await.unwrap();

        store.fail.store(true, Ordering::SeqCst);
        let err = overlay.toggle(post).await.unwrap_err();

        assert!(matches!(err, ChatError::Update(StoreError::Transport(_))));
        assert!(overlay.is_liked(post));
        assert_eq!(overlay.state(post), Some(PendingState::Failed));
    }

    #[test]
    fn overlapping_toggles_settle_on_the_newest() {
        let store = Arc::new(FakeLikeStore::default());
        let (viewer, post) = (Uuid::new_v4(), Uuid::new_v4());
        let mut overlay = LikeOverlay::new(viewer, store);

        let like = overlay.begin_toggle(post);
        let unlike = overlay.begin_toggle(post);
        assert!(like.requested && !unlike.requested);

        // The first write lands while the second is still in flight.
        assert!(overlay.complete_toggle(like, Ok(())).unwrap());
        assert!(!overlay.is_liked(post));
        assert_eq!(overlay.state(post), Some(PendingState::Pending));

        overlay
            .complete_toggle(unlike, Err(StoreError::Transport("offline".into())))
            .unwrap_err();
        assert!(overlay.is_liked(post));
        assert_eq!(overlay.state(post), Some(PendingState::Failed));
    }

    #[test]
    fn superseded_failure_keeps_newer_pending_value() {
        let store = Arc::new(FakeLikeStore::default());
        let (viewer, post) = (Uuid::new_v4(), Uuid::new_v4());
        let mut overlay = LikeOverlay::new(viewer, store);

        let like = overlay.begin_toggle(post);
        let unlike = overlay.begin_toggle(post);
        overlay
            .complete_toggle(like, Err(StoreError::Transport("offline".into())))
            .unwrap_err();
        assert!(!overlay.is_liked(post));
        assert_eq!(overlay.state(post), Some(PendingState::Pending));

        assert!(!overlay.complete_toggle(unlike, Ok(())).unwrap());
        assert_eq!(overlay.state(post), Some(PendingState::Confirmed));
    }
}
