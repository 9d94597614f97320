use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::ResultStore;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result_count = state.store.as_ref().and_then(|s| s.count().ok());
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "resultCount": result_count,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = req.str_param("path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match ResultStore::open(&path) {
        Ok(store) => {
            // Best-effort: a broken ingest.json must not prevent the workspace from opening.
            let cfg = match config::load_workspace_config(&path) {
                Ok(Some(cfg)) => cfg,
                Ok(None) => config::IngestConfig::default(),
                Err(e) => {
                    log::warn!("ignoring {}: {:#}", config::CONFIG_FILE, e);
                    config::IngestConfig::default()
                }
            };
            log::info!("workspace selected: {}", path.to_string_lossy());

            state.workspace = Some(path.clone());
            state.store = Some(store);
            state.config = cfg;
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "config": state.config,
                }),
            )
        }
        Err(e) => {
            log::error!("failed to open workspace {}: {}", path.to_string_lossy(), e);
            err(&req.id, "db_open_failed", e.to_string(), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
