use std::{path::Path, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use notify_debouncer_full::{
    new_debouncer, DebouncedEvent,
    notify::{RecursiveMode, Watcher, Error as NotifyError},
};
use tracing::{debug, error, info};

use crate::content_loader::reload_templates;
use crate::state::{AppState, RefreshBroadcaster};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(tx): State<RefreshBroadcaster>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, tx))
}

async fn handle_socket(mut socket: WebSocket, tx: RefreshBroadcaster) {
    let mut rx = tx.subscribe();

    if rx.recv().await.is_ok()
        && socket.send(Message::Text("reload".into())).await.is_err()
    {
        debug!("Client disconnected before reload message could be sent");
    }
}

/// Editor swap and backup files (Emacs `.#*`, `*~`, Vim `*.swp`).
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|s| s.starts_with(".#") || s.ends_with('~') || s.ends_with(".swp"))
}

fn is_relevant(event: &DebouncedEvent) -> bool {
    let kind = &event.event.kind;
    (kind.is_modify() || kind.is_create() || kind.is_remove())
        && !event.event.paths.iter().any(|path| is_temp_file(path))
}

/// Watches the template directory and reloads templates on change, then tells browsers to refresh.
pub fn start_template_watcher(tx: RefreshBroadcaster, app_state: Arc<AppState>) {
    let template_dir = app_state.config.template_dir.clone();
    info!(dir = %template_dir.display(), "Starting template watcher for hot-reload...");
    tokio::spawn(async move {
        let (watcher_tx, mut watcher_rx) = tokio::sync::mpsc::channel(1);

        let debouncer = new_debouncer(Duration::from_millis(200), None, move |res: Result<Vec<DebouncedEvent>, Vec<NotifyError>>| {
            match res {
                Ok(events) => {
                    let changed: Vec<&DebouncedEvent> = events.iter().filter(|e| is_relevant(e)).collect();
                    if !changed.is_empty() {
                        debug!("Template change detected: {:?}", changed.iter().flat_map(|e| &e.event.paths).map(|p| p.display()).collect::<Vec<_>>());
                        if let Err(e) = watcher_tx.blocking_send(()) {
                            error!("Failed to send watcher event: {}", e);
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        error!("Watcher error: {}", e);
                    }
                }
            }
        });
        let mut debouncer = match debouncer {
            Ok(debouncer) => debouncer,
            Err(e) => {
                error!("Failed to create debouncer, hot-reload disabled: {}", e);
                return;
            }
        };

        if let Err(e) = debouncer.watcher().watch(&template_dir, RecursiveMode::Recursive) {
            error!("Failed to watch {}, hot-reload disabled: {}", template_dir.display(), e);
            return;
        }

        // The debouncer stops watching when dropped, so keep it in this task.
        while watcher_rx.recv().await.is_some() {
            reload_templates(&app_state).await;

            if let Err(e) = tx.send(()) {
                debug!("No browsers to notify of reload: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_editor_temp_files() {
        assert!(is_temp_file(Path::new("templates/.#layout.html")));
        assert!(is_temp_file(Path::new("templates/layout.html~")));
        assert!(is_temp_file(Path::new("templates/.layout.html.swp")));
        assert!(!is_temp_file(Path::new("templates/layout.html")));
    }
}
