use std::time::SystemTime;

use axum::extract::{Path, State};
use axum::Json;
use protocol::api::{
    ActionResponse, WorkspaceCreateRequest, WorkspaceCreateResponse, WorkspaceListResponse,
    WorkspaceMetadata,
};

use crate::error::ApiError;
use crate::files::format_time;
use crate::paths::validate_entry_name;
use crate::server::AppState;

const METADATA_FILE: &str = ".metadata.json";

pub(crate) async fn create_workspace(
    State(state): State<AppState>,
    Json(body): Json<WorkspaceCreateRequest>,
) -> Result<Json<WorkspaceCreateResponse>, ApiError> {
    validate_entry_name("workspace", &body.name)?;
    let path = state.config.work_dir.join(&body.name);
    if tokio::fs::try_exists(&path).await? {
        return Err(ApiError::bad_request("Workspace already exists"));
    }
    tokio::fs::create_dir_all(&path).await?;
    let metadata = WorkspaceMetadata {
        name: body.name.clone(),
        description: body.description,
        created_at: Some(format_time(SystemTime::now())),
    };
    let raw = serde_json::to_vec_pretty(&metadata)
        .map_err(|err| ApiError::internal(format!("failed to encode metadata: {err}")))?;
    tokio::fs::write(path.join(METADATA_FILE), raw).await?;
    tracing::info!(event = "workspace.created", name = %body.name, "workspace created");
    Ok(Json(WorkspaceCreateResponse {
        success: true,
        workspace: body.name,
        path: path.display().to_string(),
    }))
}

/// Visible top-level directories of the work dir, with their metadata if any.
pub(crate) async fn list_workspaces(
    State(state): State<AppState>,
) -> Result<Json<WorkspaceListResponse>, ApiError> {
    let mut workspaces = Vec::new();
    let mut entries = tokio::fs::read_dir(&state.config.work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.file_type().await?.is_dir() {
            continue;
        }
        workspaces.push(read_metadata(&entry.path(), name).await);
    }
    workspaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(WorkspaceListResponse { workspaces }))
}

async fn read_metadata(dir: &std::path::Path, name: String) -> WorkspaceMetadata {
    let fallback = || WorkspaceMetadata {
        name: name.clone(),
        description: None,
        created_at: None,
    };
    let raw = match tokio::fs::read(dir.join(METADATA_FILE)).await {
        Ok(raw) => raw,
        Err(_) => return fallback(),
    };
    match serde_json::from_slice(&raw) {
        Ok(metadata) => metadata,
        Err(err) => {
            tracing::warn!(workspace = %name, error = %err, "unreadable workspace metadata");
            fallback()
        }
    }
}

pub(crate) async fn delete_workspace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    validate_entry_name("workspace", &name)?;
    let path = state.config.work_dir.join(&name);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::not_found("Workspace not found"))?;
    if !metadata.is_dir() {
        return Err(ApiError::not_found("Workspace not found"));
    }
    tokio::fs::remove_dir_all(&path).await?;
    tracing::info!(event = "workspace.deleted", name = %name, "workspace deleted");
    Ok(Json(ActionResponse::ok(format!("Workspace {name} deleted"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_state;
    use axum::http::StatusCode;

    fn create_body(name: &str) -> Json<WorkspaceCreateRequest> {
        Json(WorkspaceCreateRequest {
            name: name.to_string(),
            description: Some("lysozyme in water".to_string()),
        })
    }

    #[tokio::test]
    async fn create_list_delete_roundtrip() {
        let (state, dir) = test_state("echo");
        create_workspace(State(state.clone()), create_body("lyso"))
            .await
            .expect("create");
        assert!(dir.join("lyso").join(METADATA_FILE).is_file());
        std::fs::create_dir_all(dir.join("bare")).expect("mkdir");
        std::fs::write(dir.join("notes.txt"), b"x").expect("write");

        let Json(listed) = list_workspaces(State(state.clone())).await.expect("list");
        let names: Vec<_> = listed.workspaces.iter().map(|ws| ws.name.as_str()).collect();
        assert_eq!(names, vec!["bare", "lyso"]);
        assert!(listed.workspaces[0].created_at.is_none());
        assert_eq!(
            listed.workspaces[1].description.as_deref(),
            Some("lysozyme in water")
        );
        assert!(listed.workspaces[1].created_at.is_some());

        delete_workspace(State(state.clone()), Path("lyso".to_string()))
            .await
            .expect("delete");
        assert!(!dir.join("lyso").exists());
        let err = delete_workspace(State(state), Path("lyso".to_string()))
            .await
            .expect_err("gone");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_and_invalid_names_are_rejected() {
        let (state, _dir) = test_state("echo");
        create_workspace(State(state.clone()), create_body("run"))
            .await
            .expect("create");
        let err = create_workspace(State(state.clone()), create_body("run"))
            .await
            .expect_err("duplicate");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = create_workspace(State(state.clone()), create_body("../escape"))
            .await
            .expect_err("escape");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = delete_workspace(State(state), Path("..".to_string()))
            .await
            .expect_err("escape");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
