use axum::extract::{Path, State};
use axum::Json;
use protocol::api::{
    TemplateContent, TemplateCreateRequest, TemplateCreateResponse, TemplateEntry,
    TemplateListResponse,
};

use crate::error::ApiError;
use crate::paths::validate_entry_name;
use crate::server::AppState;

/// Visible regular files of the templates directory, sorted by name.
pub(crate) async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<TemplateListResponse>, ApiError> {
    let dir = state.config.templates_dir();
    let mut templates = Vec::new();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(TemplateListResponse { templates }));
        }
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.file_type().await?.is_file() {
            continue;
        }
        templates.push(TemplateEntry {
            name,
            path: entry.path().display().to_string(),
        });
    }
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(TemplateListResponse { templates }))
}

pub(crate) async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TemplateContent>, ApiError> {
    validate_entry_name("template", &name)?;
    let path = state.config.templates_dir().join(&name);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Template not found"));
        }
        Err(err) => return Err(err.into()),
    };
    let content = String::from_utf8(bytes)
        .map_err(|_| ApiError::bad_request("Template is not a text file"))?;
    Ok(Json(TemplateContent { name, content }))
}

/// Writes (or replaces) a template.
pub(crate) async fn create_template(
    State(state): State<AppState>,
    Json(body): Json<TemplateCreateRequest>,
) -> Result<Json<TemplateCreateResponse>, ApiError> {
    validate_entry_name("template", &body.name)?;
    let dir = state.config.templates_dir();
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(&body.name);
    tokio::fs::write(&path, body.content.as_bytes()).await?;
    tracing::info!(
        event = "template.saved",
        name = %body.name,
        size = body.content.len(),
        "template saved"
    );
    Ok(Json(TemplateCreateResponse {
        success: true,
        name: body.name,
        path: path.display().to_string(),
    }))
}
