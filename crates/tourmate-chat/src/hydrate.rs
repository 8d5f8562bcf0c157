use std::collections::{HashMap, HashSet};

use futures_util::future::{join, join_all};
use tracing::warn;
use uuid::Uuid;

use tourmate_types::models::{PostSummary, UserSummary};

use crate::store::MetadataSource;

/// An id whose metadata could not be fetched. Rendered with placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataMiss {
    Post(Uuid),
    User(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct Hydrated {
    pub posts: HashMap<Uuid, PostSummary>,
    pub users: HashMap<Uuid, UserSummary>,
    pub misses: Vec<MetadataMiss>,
}

/// Fetch metadata for every id, one request per id, all concurrently.
///
/// Never fails as a whole: an id that cannot be fetched is logged and listed
/// in `misses`.
pub async fn hydrate<M>(meta: &M, post_ids: &HashSet<Uuid>, user_ids: &HashSet<Uuid>) -> Hydrated
where
    M: MetadataSource + ?Sized,
{
    let posts = join_all(post_ids.iter().map(|&id| async move { (id, meta.post(id).await) }));
    let users = join_all(user_ids.iter().map(|&id| async move { (id, meta.user(id).await) }));
    let (posts, users) = join(posts, users).await;

    let mut hydrated = Hydrated::default();
    for (id, result) in posts {
        match result {
            Ok(post) => {
                hydrated.posts.insert(id, post);
            }
            Err(e) => {
                warn!("Post metadata {} unavailable: {}", id, e);
                hydrated.misses.push(MetadataMiss::Post(id));
            }
        }
    }
    for (id, result) in users {
        match result {
            Ok(user) => {
                hydrated.users.insert(id, user);
            }
            Err(e) => {
                warn!("User metadata {} unavailable: {}", id, e);
                hydrated.misses.push(MetadataMiss::User(id));
            }
        }
    }
    hydrated
}

/// A metadata request issued against a specific cache generation.
#[derive(Debug, Clone)]
pub struct HydrationTicket {
    pub generation: u64,
    pub post_ids: HashSet<Uuid>,
    pub user_ids: HashSet<Uuid>,
}

/// The answer to a [`HydrationTicket`], still tagged with its generation so
/// the cache can drop it if the view moved on.
#[derive(Debug, Clone)]
pub struct HydrationResult {
    pub generation: u64,
    pub hydrated: Hydrated,
}

pub async fn fetch<M>(meta: &M, ticket: HydrationTicket) -> HydrationResult
where
    M: MetadataSource + ?Sized,
{
    let hydrated = hydrate(meta, &ticket.post_ids, &ticket.user_ids).await;
    HydrationResult {
        generation: ticket.generation,
        hydrated,
    }
}
