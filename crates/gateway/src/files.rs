use std::path::{Path as FsPath, PathBuf};
use std::time::SystemTime;

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::api::{
    ActionResponse, EntryKind, FileEntry, FileListResponse, FileViewResponse, UploadResponse,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::paths::{resolve_entry, resolve_relative};
use crate::server::AppState;

const DEFAULT_VIEW_LINES: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubdirQuery {
    #[serde(default)]
    subdir: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ViewQuery {
    lines: Option<usize>,
}

/// Wildcard captures may carry the leading slash of the URL segment.
fn entry_path(state: &AppState, raw: &str) -> Result<PathBuf, ApiError> {
    resolve_entry(&state.config.work_dir, raw.trim_start_matches('/'))
}

fn upload_file_name(raw: Option<&str>) -> Result<String, ApiError> {
    let raw = raw.unwrap_or_default();
    let name = FsPath::new(raw)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("upload is missing a file name"))?;
    Ok(name.to_string())
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(err.status(), "invalid_upload", err.body_text())
}

fn too_large(limit: u64) -> ApiError {
    ApiError::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        "too_large",
        format!("File too large (limit {limit} bytes)"),
    )
}

/// Streams the `file` field of a multipart body into `<work_dir>/<subdir>/`.
pub(crate) async fn upload_file(
    State(state): State<AppState>,
    Query(query): Query<SubdirQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let target_dir = resolve_relative(&state.config.work_dir, &query.subdir)?;
    let limit = state.config.max_upload_bytes;
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = upload_file_name(field.file_name())?;
        tokio::fs::create_dir_all(&target_dir).await?;
        let path = target_dir.join(&filename);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut size: u64 = 0;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(multipart_error(err));
                }
            };
            size += chunk.len() as u64;
            if size > limit {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(too_large(limit));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        let subdir = query.subdir.trim().trim_matches('/');
        let relative = if subdir.is_empty() {
            filename.clone()
        } else {
            format!("{subdir}/{filename}")
        };
        tracing::info!(event = "file.uploaded", path = %relative, size, "file uploaded");
        return Ok(Json(UploadResponse {
            success: true,
            filename,
            path: relative,
            size,
        }));
    }
    Err(ApiError::bad_request("multipart body has no `file` field"))
}

/// Visible entries of a directory, sorted by name. A missing directory lists empty.
pub(crate) async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<SubdirQuery>,
) -> Result<Json<FileListResponse>, ApiError> {
    let target_dir = resolve_relative(&state.config.work_dir, &query.subdir)?;
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(&target_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(FileListResponse {
                files,
                directory: query.subdir,
            }));
        }
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().await?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        files.push(FileEntry {
            name,
            kind,
            size: metadata.is_file().then(|| metadata.len()),
            modified: metadata.modified().ok().map(format_time),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(FileListResponse {
        files,
        directory: query.subdir,
    }))
}

pub(crate) fn format_time(time: SystemTime) -> String {
    humantime::format_rfc3339_seconds(time).to_string()
}

/// First `lines` lines of a UTF-8 file; `lines=0` returns the whole file.
pub(crate) async fn view_file(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<FileViewResponse>, ApiError> {
    let path = entry_path(&state, &raw)?;
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::bad_request("Path is not a file"));
    }
    let bytes = tokio::fs::read(&path).await?;
    let text =
        String::from_utf8(bytes).map_err(|_| ApiError::bad_request("File is not a text file"))?;
    let limit = query.lines.unwrap_or(DEFAULT_VIEW_LINES);
    let all: Vec<&str> = text.split_inclusive('\n').collect();
    let shown = if limit == 0 {
        all.len()
    } else {
        all.len().min(limit)
    };
    Ok(Json(FileViewResponse {
        path: raw.trim_start_matches('/').to_string(),
        content: all[..shown].concat(),
        lines_shown: shown,
        truncated: shown < all.len(),
    }))
}

pub(crate) async fn download_file(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let path = entry_path(&state, &raw)?;
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::bad_request("Path is not a file"));
    }
    let file = tokio::fs::File::open(&path).await?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().replace('"', "_"))
        .unwrap_or_default();
    let disposition = format!("attachment; filename=\"{filename}\"");
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, metadata.len().to_string()),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

pub(crate) async fn delete_file(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let path = entry_path(&state, &raw)?;
    let metadata = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(&path).await?;
    } else {
        tokio::fs::remove_file(&path).await?;
    }
    let relative = raw.trim_start_matches('/');
    tracing::info!(event = "file.deleted", path = %relative, "file deleted");
    Ok(Json(ActionResponse::ok(format!("Deleted {relative}"))))
}
