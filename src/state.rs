use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::cms::PrismicClient;
use crate::config::Config;
use crate::detail::DetailCache;
use crate::pagination::PostListing;

pub type RefreshBroadcaster = broadcast::Sender<()>;

/// HTML shells read from the template directory.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    pub layout: String,    // {{ lang }}, {{ title }}, {{ head }}, {{ header }}, {{ content }}
    pub header: String,
    pub not_found: String, // supports {{slug}} placeholder
    pub loading: String,
}

pub struct AppState {
    pub templates: RwLock<Templates>,
    pub listing: RwLock<PostListing>,
    pub details: Mutex<DetailCache>,
    pub cms: PrismicClient,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, cms: PrismicClient, templates: Templates, listing: PostListing) -> Self {
        Self {
            templates: RwLock::new(templates),
            listing: RwLock::new(listing),
            details: Mutex::new(DetailCache::new(config.revalidate)),
            cms,
            config,
        }
    }
}

#[derive(Clone)]
pub struct RouterState {
    pub app_state: Arc<AppState>,
    pub broadcaster: RefreshBroadcaster,
}

impl axum::extract::FromRef<RouterState> for Arc<AppState> {
    fn from_ref(state: &RouterState) -> Self {
        state.app_state.clone()
    }
}

impl axum::extract::FromRef<RouterState> for RefreshBroadcaster {
    fn from_ref(state: &RouterState) -> Self {
        state.broadcaster.clone()
    }
}
