use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cms::DocumentSource;
use crate::error::CmsError;
use crate::models::PostDetail;
use crate::rich_text::as_text;

pub const WORDS_PER_MINUTE: usize = 200;

/// Upper bound on remembered unknown slugs.
pub const MAX_MISSING: usize = 1024;

/// Fetches a post by slug and projects it for rendering.
pub async fn resolve<S>(source: &S, slug: &str) -> Result<PostDetail, CmsError>
where
    S: DocumentSource + Sync + ?Sized,
{
    let doc = source.post_by_uid(slug).await?;
    Ok(PostDetail::from(doc))
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

impl PostDetail {
    /// Words in every heading and body.
    pub fn word_count(&self) -> usize {
        self.content
            .iter()
            .map(|block| count_words(&block.heading) + count_words(&as_text(&block.body)))
            .sum()
    }

    /// Estimated minutes to read, rounded up.
    pub fn reading_time(&self) -> u32 {
        reading_time_for(self.word_count())
    }
}

pub fn reading_time_for(words: usize) -> u32 {
    words.div_ceil(WORDS_PER_MINUTE) as u32
}

/// A post page is either still being fetched or ready to render.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Pending,
    Resolved(Arc<PostDetail>),
}

#[derive(Debug, Clone)]
struct Entry {
    resolution: Resolution,
    resolved_at: Option<Instant>,
}

/// What a request for a slug should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Render the placeholder and start resolving.
    Start,
    /// Render the placeholder; a resolve is already running.
    Pending,
    /// Render the post. `refresh` asks for a background revalidation.
    Ready { post: Arc<PostDetail>, refresh: bool },
    Missing,
}

/// Post pages resolved so far, keyed by slug.
#[derive(Debug, Default)]
pub struct DetailCache {
    entries: HashMap<String, Entry>,
    /// Unknown slugs and when the CMS said so.
    missing: HashMap<String, Instant>,
    revalidate_after: Duration,
}

impl DetailCache {
    pub fn new(revalidate_after: Duration) -> Self {
        Self {
            revalidate_after,
            ..Self::default()
        }
    }

    /// Looks up `slug`, marking it pending when it is new or due for revalidation.
    pub fn lookup(&mut self, slug: &str, now: Instant) -> Lookup {
        if let Some(&seen) = self.missing.get(slug) {
            if now.duration_since(seen) < self.revalidate_after {
                return Lookup::Missing;
            }
            self.missing.remove(slug);
        }

        match self.entries.get_mut(slug) {
            None => {
                self.entries.insert(
                    slug.to_string(),
                    Entry {
                        resolution: Resolution::Pending,
                        resolved_at: None,
                    },
                );
                Lookup::Start
            }
            Some(Entry {
                resolution: Resolution::Pending,
                ..
            }) => Lookup::Pending,
            Some(entry) => {
                let Resolution::Resolved(post) = &entry.resolution else {
                    return Lookup::Pending;
                };
                let stale = entry
                    .resolved_at
                    .is_some_and(|at| now.duration_since(at) >= self.revalidate_after);
                if stale {
                    // One refresh at a time; the stale page keeps being served meanwhile.
                    entry.resolved_at = Some(now);
                }
                Lookup::Ready {
                    post: post.clone(),
                    refresh: stale,
                }
            }
        }
    }

    pub fn resolution(&self, slug: &str) -> Option<&Resolution> {
        self.entries.get(slug).map(|entry| &entry.resolution)
    }

    pub fn store(&mut self, slug: &str, post: PostDetail, now: Instant) {
        self.missing.remove(slug);
        self.entries.insert(
            slug.to_string(),
            Entry {
                resolution: Resolution::Resolved(Arc::new(post)),
                resolved_at: Some(now),
            },
        );
    }

    /// Records a failed resolve. Unknown slugs stay missing until the
    /// revalidate interval passes; other errors are retried.
    pub fn fail(&mut self, slug: &str, err: &CmsError, now: Instant) {
        if matches!(err, CmsError::NotFound { .. }) {
            self.entries.remove(slug);
            self.remember_missing(slug, now);
        } else if let Some(Entry {
            resolution: Resolution::Pending,
            ..
        }) = self.entries.get(slug)
        {
            self.entries.remove(slug);
        }
    }

    fn remember_missing(&mut self, slug: &str, now: Instant) {
        if self.missing.len() >= MAX_MISSING && !self.missing.contains_key(slug) {
            let ttl = self.revalidate_after;
            self.missing.retain(|_, seen| now.duration_since(*seen) < ttl);
            if self.missing.len() >= MAX_MISSING {
                let oldest = self
                    .missing
                    .iter()
                    .min_by_key(|(_, seen)| **seen)
                    .map(|(slug, _)| slug.clone());
                if let Some(oldest) = oldest {
                    self.missing.remove(&oldest);
                }
            }
        }
        self.missing.insert(slug.to_string(), now);
    }
}
