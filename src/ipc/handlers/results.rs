use crate::ingest;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{ResultStore, SearchQuery};
use serde_json::json;
use std::path::{Path, PathBuf};

fn store_mut(state: &mut AppState) -> Result<&mut ResultStore, HandlerErr> {
    state
        .store
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn search(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let query = SearchQuery::new(
        req.str_param("reg"),
        req.str_param("className"),
        req.str_param("batch"),
    )?;
    let store = store_mut(state)?;
    let results = store.query(&query)?;
    if results.is_empty() {
        return Err(HandlerErr {
            code: "not_found",
            message: "no results found for this registration number, class and batch".into(),
            details: Some(json!({
                "reg": query.registration_number,
                "className": query.class_name,
                "batch": query.batch,
            })),
        });
    }
    Ok(json!({ "results": results }))
}

fn discard_upload(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("failed to remove upload {}: {}", path.to_string_lossy(), e);
    }
}

fn ingest_file(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(path) = req.str_param("filePath").map(PathBuf::from) else {
        return Err(HandlerErr::new("bad_params", "missing filePath"));
    };
    if state.store.is_none() {
        discard_upload(&path);
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    }

    let cfg = state.config.clone();
    let store = store_mut(state)?;
    match ingest::ingest_upload(store, &path, &cfg) {
        Ok(summary) => Ok(json!(summary)),
        Err(e) => {
            log::error!("upload {} rejected: {}", path.to_string_lossy(), e);
            Err(e.into())
        }
    }
}

fn clear(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let deleted = store_mut(state)?.clear_all()?;
    log::info!("cleared {} result rows", deleted);
    Ok(json!({ "success": true, "deleted": deleted }))
}

fn deduplicate(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let removed = store.deduplicate()?;
    let unique_index = store.has_unique_index()?;
    Ok(json!({ "removed": removed, "uniqueIndex": unique_index }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&mut AppState, &Request) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "results.search" => search,
            "results.ingest" => ingest_file,
            "results.clear" => clear,
            "results.deduplicate" => deduplicate,
            _ => return None,
        };
    Some(match handler(state, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
