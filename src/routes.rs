use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, get_service},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::services::ServeDir;
use tracing::debug;

use crate::content_loader::spawn_resolve;
use crate::detail::Lookup;
use crate::error::PageError;
use crate::hot_reload::ws_handler;
use crate::pages::{self, Page};
use crate::pagination::PostListing;
use crate::state::{AppState, RouterState};

pub fn router(router_state: RouterState, static_dir: &FsPath) -> Router {
    let mut router = Router::new()
        .route("/", get(homepage))
        .route("/posts/more", get(more_posts))
        .route("/post/{slug}", get(post_page))
        .nest_service("/static", get_service(ServeDir::new(static_dir)));
    if router_state.app_state.config.is_development {
        router = router.route("/ws", get(ws_handler));
    }
    router.with_state(router_state)
}

async fn homepage(State(state): State<Arc<AppState>>) -> Html<String> {
    let templates = state.templates.read().await;
    let listing = state.listing.read().await;
    let content = pages::render_home(&listing, state.config.locale);

    Html(pages::render_with_layout(
        &templates,
        Page {
            title: "Posts",
            head: "",
            content: &content,
        },
        state.config.locale,
        state.config.is_development,
    ))
}

#[derive(Deserialize, Debug)]
pub struct MoreQuery {
    cursor: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MorePosts {
    pub html: String,
    pub next_page: Option<String>,
}

/// One "load more" step, driven by the cursor the browser holds.
async fn more_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MoreQuery>,
) -> Result<Json<MorePosts>, PageError> {
    let cursor = state.cms.cursor_from(&query.cursor)?;
    let mut listing = PostListing::resume(cursor);
    let added = listing.load_more(&state.cms).await?;
    debug!(added, "Served more posts");

    Ok(Json(MorePosts {
        html: pages::render_post_items(listing.posts(), state.config.locale),
        next_page: listing.next_page().map(|cursor| cursor.to_string()),
    }))
}

async fn post_page(Path(slug): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let lookup = state.details.lock().await.lookup(&slug, Instant::now());
    let templates = state.templates.read().await;
    let locale = state.config.locale;
    let is_development = state.config.is_development;

    match lookup {
        Lookup::Start => {
            spawn_resolve(state.clone(), slug);
            Html(pages::loading_page(&templates, locale, is_development)).into_response()
        }
        Lookup::Pending => {
            Html(pages::loading_page(&templates, locale, is_development)).into_response()
        }
        Lookup::Ready { post, refresh } => {
            if refresh {
                debug!(%slug, "Revalidating post");
                spawn_resolve(state.clone(), slug);
            }
            let content = pages::render_post(&post, locale);
            Html(pages::render_with_layout(
                &templates,
                Page {
                    title: &post.title,
                    head: "",
                    content: &content,
                },
                locale,
                is_development,
            ))
            .into_response()
        }
        Lookup::Missing => (
            StatusCode::NOT_FOUND,
            Html(pages::not_found_page(&templates, &slug, locale, is_development)),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    use crate::cms::tests::MockCms;
    use crate::content_loader::tests::{test_state, test_state_with};
    use crate::detail::Resolution;

    async fn app(state: Arc<AppState>) -> Router {
        let (tx, _rx) = broadcast::channel(1);
        router(
            RouterState {
                app_state: state,
                broadcaster: tx,
            },
            FsPath::new(env!("CARGO_MANIFEST_DIR")).join("static").as_path(),
        )
    }

    async fn fetch(app: &Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn wait_until_settled(state: &AppState, slug: &str) {
        for _ in 0..100 {
            if !matches!(state.details.lock().await.resolution(slug), Some(Resolution::Pending)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never resolved", slug);
    }

    #[tokio::test]
    async fn homepage_renders_seed_and_load_more_button() {
        let server = MockCms::start().await;
        let app = app(test_state(&server).await).await;

        let (status, body) = fetch(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("First post"));
        assert!(body.contains("data-next-page"));
        assert!(body.contains("Carregar mais posts"));
    }

    #[tokio::test]
    async fn load_more_then_pagination_ends() {
        let server = MockCms::start().await;
        let state = test_state(&server).await;
        let cursor = state
            .listing
            .read()
            .await
            .next_page()
            .map(|cursor| cursor.to_string())
            .unwrap();
        let app = app(state).await;

        let uri = format!("/posts/more?cursor={}", urlencode(&cursor));
        let (status, body) = fetch(&app, &uri).await;
        assert_eq!(status, StatusCode::OK);

        let more: MorePosts = serde_json::from_str(&body).unwrap();
        assert!(more.html.contains("Second post"));
        assert!(more.html.contains("href=\"/post/second\""));
        assert_eq!(more.next_page, None);
    }

    #[tokio::test]
    async fn load_more_rejects_foreign_cursor() {
        let server = MockCms::start().await;
        let app = app(test_state(&server).await).await;

        let uri = format!("/posts/more?cursor={}", urlencode("https://evil.example/x"));
        let (status, body) = fetch(&app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("error"));
    }

    #[tokio::test]
    async fn post_page_shows_placeholder_then_content() {
        let server = MockCms::start().await;
        let state = test_state(&server).await;
        let app = app(state.clone()).await;

        let (status, body) = fetch(&app, "/post/hooks").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Carregando..."));

        wait_until_settled(&state, "hooks").await;
        let (status, body) = fetch(&app, "/post/hooks").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h1>Looked up</h1>"));
        assert!(body.contains("1 min"));
        assert!(body.contains("05 mar 2022"));
    }

    #[tokio::test]
    async fn unknown_post_becomes_not_found() {
        let server = MockCms::start().await;
        let state = test_state(&server).await;
        let app = app(state.clone()).await;

        fetch(&app, "/post/missing").await;
        wait_until_settled(&state, "missing").await;

        let (status, body) = fetch(&app, "/post/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("missing"));
    }

    #[tokio::test]
    async fn access_token_never_reaches_the_browser() {
        let server = MockCms::start().await;
        let state = test_state_with(&server, &[("PRISMIC_ACCESS_TOKEN", "secret")]).await;
        let cursor = state
            .listing
            .read()
            .await
            .next_page()
            .map(|cursor| cursor.to_string())
            .unwrap();
        let app = app(state).await;

        let (status, home) = fetch(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(home.contains("data-next-page"));
        assert!(!home.contains("secret"));

        // A cursor that still carries the token is accepted but not echoed back.
        let leaked = format!("{}&access_token=secret", cursor);
        let (status, body) = fetch(&app, &format!("/posts/more?cursor={}", urlencode(&leaked))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("secret"));
        let more: MorePosts = serde_json::from_str(&body).unwrap();
        assert!(more.html.contains("Second post"));
    }

    #[tokio::test]
    async fn ws_route_only_in_development() {
        let server = MockCms::start().await;

        let production = app(test_state(&server).await).await;
        let (status, _) = fetch(&production, "/ws").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let development = app(test_state_with(&server, &[("RUST_ENV", "development")]).await).await;
        let (status, _) = fetch(&development, "/ws").await;
        assert_ne!(status, StatusCode::NOT_FOUND);
    }

    fn urlencode(raw: &str) -> String {
        reqwest::Url::parse_with_params("http://x/", &[("c", raw)])
            .unwrap()
            .query()
            .unwrap()
            .trim_start_matches("c=")
            .to_string()
    }
}
