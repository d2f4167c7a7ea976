use tracing::{debug, warn};

use crate::cms::{Cursor, PageSource};
use crate::error::CmsError;
use crate::models::{PostSummary, SearchPage, SummaryFields};

/// The posts shown on the index, plus where to fetch more.
///
/// `load_more` takes `&mut self`, so one listing never has two fetches in flight.
/// Share it behind a `tokio::sync::Mutex` to queue callers in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostListing {
    posts: Vec<PostSummary>,
    next_page: Option<Cursor>,
}

fn parse_next_page(next_page: Option<String>) -> Option<Cursor> {
    let raw = next_page?;
    match Cursor::parse(&raw) {
        Ok(cursor) => Some(cursor),
        Err(e) => {
            warn!("Dropping malformed next_page: {}", e);
            None
        }
    }
}

fn project(page: SearchPage<SummaryFields>) -> (Vec<PostSummary>, Option<Cursor>) {
    let posts = page.results.into_iter().map(PostSummary::from).collect();
    (posts, parse_next_page(page.next_page))
}

impl PostListing {
    /// Seeds the listing from the first page fetched at startup.
    pub fn initialize(seed: SearchPage<SummaryFields>) -> Self {
        let (posts, next_page) = project(seed);
        Self { posts, next_page }
    }

    /// An empty listing positioned at `cursor`.
    pub fn resume(cursor: Cursor) -> Self {
        Self {
            posts: Vec::new(),
            next_page: Some(cursor),
        }
    }

    pub fn posts(&self) -> &[PostSummary] {
        &self.posts
    }

    pub fn next_page(&self) -> Option<&Cursor> {
        self.next_page.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.next_page.is_some()
    }

    /// Fetches the page at the cursor and appends it. Returns how many posts were added.
    ///
    /// Without a cursor this does nothing. On error the listing is left as it was.
    pub async fn load_more<S>(&mut self, source: &S) -> Result<usize, CmsError>
    where
        S: PageSource + Sync + ?Sized,
    {
        let Some(cursor) = self.next_page.as_ref() else {
            return Ok(0);
        };

        debug!("Loading more posts from {}", cursor);
        let page = source.fetch_page(cursor).await?;
        let (posts, next_page) = project(page);
        let added = posts.len();

        self.posts.extend(posts);
        self.next_page = next_page;
        Ok(added)
    }
}
