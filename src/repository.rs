use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{NormalizedPost, Result};

/// Persistence seam for normalized posts. Storage itself is an external
/// collaborator; this crate only produces data for it and never assumes
/// transaction semantics.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Persist a page of normalized posts, returning how many were stored.
    async fn save_posts(&self, posts: Vec<NormalizedPost>) -> Result<usize>;

    /// Page through stored posts published after the cursor, oldest first.
    async fn find_after(
        &self,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<NormalizedPost>>;
}
