use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tokio::{fs, time::Instant};
use tracing::{error, info, warn};

use crate::cms::PrismicClient;
use crate::detail::resolve;
use crate::error::CmsError;
use crate::pagination::PostListing;
use crate::state::{AppState, Templates};

pub async fn load_templates(dir: &Path) -> Result<Templates, std::io::Error> {
    Ok(Templates {
        layout: fs::read_to_string(dir.join("layout.html")).await?,
        header: fs::read_to_string(dir.join("header.html")).await?,
        not_found: fs::read_to_string(dir.join("not_found.html")).await?,
        loading: fs::read_to_string(dir.join("loading.html")).await?,
    })
}

pub async fn reload_templates(app_state: &AppState) {
    info!("Reloading templates...");
    match load_templates(&app_state.config.template_dir).await {
        Ok(templates) => {
            *app_state.templates.write().await = templates;
            info!("Templates successfully reloaded.");
        }
        Err(e) => {
            error!("Failed to reload templates: {}", e);
        }
    }
}

/// First page of posts, as shown on the index.
pub async fn load_listing(cms: &PrismicClient, page_size: u32) -> Result<PostListing, CmsError> {
    let seed = cms.post_summaries(page_size).await?;
    let listing = PostListing::initialize(seed);
    info!(
        posts = listing.posts().len(),
        has_more = listing.has_more(),
        "Loaded post listing"
    );
    Ok(listing)
}

/// Replaces the index listing, keeping the old one if the fetch fails.
pub async fn refresh_listing(app_state: &AppState) {
    match load_listing(&app_state.cms, app_state.config.page_size).await {
        Ok(listing) => *app_state.listing.write().await = listing,
        Err(e) => error!("Failed to refresh post listing: {}", e),
    }
}

/// Fetches `slug` and records the outcome in the detail cache.
pub async fn resolve_into_cache(app_state: &AppState, slug: &str) {
    match resolve(&app_state.cms, slug).await {
        Ok(post) => {
            info!(%slug, "Resolved post");
            app_state.details.lock().await.store(slug, post, Instant::now());
        }
        Err(e) => {
            warn!(%slug, "Failed to resolve post: {}", e);
            app_state.details.lock().await.fail(slug, &e, Instant::now());
        }
    }
}

pub fn spawn_resolve(app_state: Arc<AppState>, slug: String) {
    tokio::spawn(async move {
        resolve_into_cache(&app_state, &slug).await;
    });
}

/// Resolves the posts on the first page ahead of any request.
pub async fn prerender_posts(app_state: &AppState) -> Result<usize, CmsError> {
    let uids = app_state.cms.post_uids(app_state.config.page_size).await?;
    {
        let mut details = app_state.details.lock().await;
        for uid in &uids {
            details.lookup(uid, Instant::now());
        }
    }
    join_all(uids.iter().map(|uid| resolve_into_cache(app_state, uid))).await;
    Ok(uids.len())
}

/// Refreshes the index listing every revalidate interval.
pub fn start_revalidation(app_state: Arc<AppState>) {
    let period = app_state.config.revalidate;
    info!(?period, "Starting listing revalidation");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            info!("Revalidating post listing...");
            refresh_listing(&app_state).await;
        }
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::cms::tests::MockCms;
    use crate::config::Config;
    use crate::detail::Resolution;

    fn template_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
    }

    pub(crate) async fn test_state(server: &MockCms) -> Arc<AppState> {
        test_state_with(server, &[]).await
    }

    /// Like `test_state`, with extra environment variables.
    pub(crate) async fn test_state_with(server: &MockCms, env: &[(&str, &str)]) -> Arc<AppState> {
        let config = Config::from_lookup(|name| match name {
            "PRISMIC_API_ENDPOINT" => Some(server.endpoint()),
            "TEMPLATE_DIR" => Some(template_dir().display().to_string()),
            _ => env
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string()),
        })
        .unwrap();
        let cms = PrismicClient::new(&config.api_endpoint, config.access_token.clone()).unwrap();
        let templates = load_templates(&config.template_dir).await.unwrap();
        let listing = load_listing(&cms, config.page_size).await.unwrap();
        Arc::new(AppState::new(config, cms, templates, listing))
    }

    #[tokio::test]
    async fn loads_bundled_templates() {
        let templates = load_templates(&template_dir()).await.unwrap();
        assert!(templates.layout.contains("{{ content }}"));
        assert!(templates.not_found.contains("{{slug}}"));
        assert!(!templates.loading.is_empty());
    }

    #[tokio::test]
    async fn missing_template_dir_is_an_error() {
        assert!(load_templates(Path::new("/definitely/not/here")).await.is_err());
    }

    #[tokio::test]
    async fn seeds_listing_from_first_page() {
        let server = MockCms::start().await;
        let state = test_state(&server).await;

        let listing = state.listing.read().await;
        assert_eq!(listing.posts().len(), 1);
        assert_eq!(listing.posts()[0].title, "First post");
        assert!(listing.has_more());
    }

    #[tokio::test]
    async fn prerenders_first_page_posts() {
        let server = MockCms::start().await;
        let state = test_state(&server).await;

        assert_eq!(prerender_posts(&state).await.unwrap(), 1);
        let details = state.details.lock().await;
        assert!(matches!(details.resolution("first"), Some(Resolution::Resolved(_))));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_listing() {
        let server = MockCms::start().await;
        let seeded = test_state(&server).await;
        let listing = seeded.listing.read().await.clone();

        // Nothing listens on port 1.
        let cms = PrismicClient::new("http://127.0.0.1:1/api/v2", None).unwrap();
        let state = AppState::new(seeded.config.clone(), cms, Templates::default(), listing);

        refresh_listing(&state).await;
        assert_eq!(state.listing.read().await.posts().len(), 1);
    }
}
