//! Catalog hot reload.
//!
//! Watches the catalog file with `notify`. After each change (100ms
//! debounce) the file is re-read and a new ToolBox built with the same
//! settings, client and custom tools. On success the inner `Arc<ToolBox>` is
//! swapped and connected peers get tools-list-changed and
//! resources-list-changed notifications. A file that fails to load keeps the
//! previous tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify::Watcher;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::ServerSettings;
use crate::ctx::CustomRegistry;
use crate::duplo::Dispatch;
use crate::server::DuploCloudMcp;
use crate::server::handler::{PeersHandle, ToolBoxHandle};
use crate::toolbox::ToolBox;

/// Everything needed to rebuild the tool box from the catalog file.
#[derive(Clone)]
pub struct ReloadSource {
    pub path: PathBuf,
    pub settings: ServerSettings,
    pub client: Arc<dyn Dispatch>,
    pub custom: CustomRegistry,
    pub environment: Map<String, Value>,
}

impl ReloadSource {
    /// Load the catalog file and register tools from it.
    pub async fn rebuild(&self) -> crate::Result<ToolBox> {
        let catalog = Catalog::load_file(&self.path)?;
        let mut mcp =
            DuploCloudMcp::new(self.settings.clone(), self.client.clone(), Arc::new(catalog))?
                .with_custom(self.custom.clone())
                .with_environment(self.environment.clone());
        mcp.register_tools(None);
        Ok(mcp.into_toolbox())
    }
}

/// Watch the catalog file and swap in a rebuilt tool box on each change.
/// Returns when `cancel` fires or the watcher stops.
pub async fn run_hot_reload(
    source: ReloadSource,
    toolbox_handle: ToolBoxHandle,
    peers_handle: PeersHandle,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<notify::Event>>();

    // notify's EventHandler is implemented for FnMut, not for tokio senders.
    let mut watcher = match notify::recommended_watcher(move |event| {
        let _ = tx.send(event);
    }) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "failed to create file watcher for catalog reload");
            return;
        }
    };

    if let Err(e) = watcher.watch(&source.path, RecursiveMode::NonRecursive) {
        tracing::error!(
            path = %source.path.display(),
            error = %e,
            "failed to watch catalog file"
        );
        return;
    }

    // Dropping the watcher stops the OS-level watch.
    let _watcher = watcher;

    tracing::info!(path = %source.path.display(), "watching catalog file for changes");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(Ok(_)) => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        while rx.try_recv().is_ok() {}

                        match source.rebuild().await {
                            Ok(toolbox) => {
                                let tool_count = toolbox.tool_count();
                                {
                                    let mut guard = toolbox_handle.write().await;
                                    *guard = Arc::new(toolbox);
                                }
                                tracing::info!(
                                    tools = %tool_count,
                                    path = %source.path.display(),
                                    "catalog reloaded"
                                );
                                notify_peers(&peers_handle).await;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    path = %source.path.display(),
                                    "catalog reload failed, keeping previous tools"
                                );
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "file watcher error during catalog reload");
                    }
                    None => {
                        tracing::debug!("catalog watcher channel closed");
                        return;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("catalog reload cancelled");
                return;
            }
        }
    }
}

/// Send list-changed notifications to every peer. Peers whose transport has
/// closed are dropped.
async fn notify_peers(peers_handle: &PeersHandle) {
    let mut peers = peers_handle.lock().await;
    let mut live_peers = Vec::with_capacity(peers.len());
    for peer in peers.drain(..) {
        let notified = match peer.notify_tool_list_changed().await {
            Ok(_) => peer.notify_resource_list_changed().await,
            Err(e) => Err(e),
        };
        match notified {
            Ok(_) => live_peers.push(peer),
            Err(e) => {
                tracing::debug!(error = %e, "pruning stale peer after list-changed error");
            }
        }
    }
    *peers = live_peers;
}
