//! Chunked upload/download over the storage directory.
//!
//! Every path is `storage_dir/<filename>` with the filename restricted to a
//! safe character set. Uploads land in `<final>.part` and are renamed into
//! place at finish; any violation mid-transfer deletes the partial file.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use super::require_str;
use crate::config::OverwritePolicy;
use crate::context::ServerContext;
use crate::protocol::{ErrorCode, Request, Response, Value, MAX_ARRAY_SIZE};
use crate::router::CommandHandler;
use crate::session::{DownloadTransfer, Session, UploadTransfer};

pub const MAX_FILENAME_LEN: usize = 128;
pub const TEMP_SUFFIX: &str = ".part";
const MAX_RENAME_ATTEMPTS: u32 = 1000;

pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FILENAME_LEN || name.contains("..") {
        return false;
    }
    name.bytes()
        .all(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.')
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

fn temp_name(name: &str) -> String {
    format!("{}{}", name, TEMP_SUFFIX)
}

/// A name is taken by a committed file or by another upload's partial file.
async fn name_taken(dir: &Path, name: &str) -> bool {
    exists(&dir.join(name)).await || exists(&dir.join(temp_name(name))).await
}

/// First free `base_N.ext`, falling back to `base_upload.ext`.
async fn unique_name(dir: &Path, name: &str) -> String {
    let (base, ext) = split_extension(name);
    for n in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = format!("{}_{}{}", base, n, ext);
        if !name_taken(dir, &candidate).await {
            return candidate;
        }
    }
    format!("{}_upload{}", base, ext)
}

/// Requested chunk size clamped to the configured maximum; absent or
/// non-positive means the maximum.
fn effective_chunk_size(req: &Request, max: u32) -> u32 {
    match req.args.get_i64("chunk_size") {
        Some(n) if n > 0 => n.min(i64::from(max)) as u32,
        _ => max,
    }
}

/// Validate `chunk_index` against the expected one. On failure the response
/// is already filled in.
fn check_chunk_index(req: &Request, expected: u64, resp: &mut Response) -> Option<u64> {
    let index = match req.args.get_i64("chunk_index") {
        Some(i) if i >= 0 => i as u64,
        _ => {
            resp.fail(ErrorCode::BadRequest, "invalid chunk_index");
            return None;
        }
    };
    if index != expected {
        resp.fail(ErrorCode::TransferStateError, "chunk_index mismatch");
        resp.set("expected_index", expected);
        return None;
    }
    Some(index)
}

pub struct ListFiles;

#[async_trait]
impl CommandHandler for ListFiles {
    async fn handle(
        &self,
        ctx: &ServerContext,
        _session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        let mut names = match list_storage(&ctx.config.storage_dir).await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list {:?}: {}", ctx.config.storage_dir, e);
                resp.fail(ErrorCode::InternalError, "list files failed");
                return;
            }
        };
        names.sort();

        let count = names.len();
        let truncated = count > MAX_ARRAY_SIZE;
        names.truncate(MAX_ARRAY_SIZE);

        let files: Vec<Value> = names.into_iter().map(Value::from).collect();
        resp.set("files", files);
        resp.set("count", count as u64);
        resp.set("truncated", truncated);
    }
}

async fn list_storage(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(TEMP_SUFFIX) {
            names.push(name);
        }
    }
    Ok(names)
}

pub struct UploadInit;

#[async_trait]
impl CommandHandler for UploadInit {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        if session.upload.is_some() {
            resp.fail(ErrorCode::TransferStateError, "upload already in progress");
            return;
        }

        let filename = match req.args.get_str("filename") {
            Some(name) if is_safe_filename(name) => name,
            _ => {
                resp.fail(ErrorCode::BadRequest, "invalid filename");
                return;
            }
        };
        let declared_size = match req.args.get_i64("file_size") {
            Some(size) if size > 0 => size as u64,
            _ => {
                resp.fail(ErrorCode::BadRequest, "invalid file_size");
                return;
            }
        };
        if declared_size > ctx.config.max_file_size {
            resp.fail(ErrorCode::BadRequest, "file too large");
            return;
        }

        let storage = &ctx.config.storage_dir;
        let mut final_name = filename.to_string();
        match ctx.config.overwrite {
            OverwritePolicy::Reject if exists(&storage.join(filename)).await => {
                warn!("Upload rejected, {} exists", filename);
                resp.fail(ErrorCode::FileExists, "file exists");
                return;
            }
            OverwritePolicy::Rename if name_taken(storage, filename).await => {
                final_name = unique_name(storage, filename).await;
                debug!("{} taken, uploading as {}", filename, final_name);
            }
            _ => {}
        }

        let final_path = storage.join(&final_name);
        let temp_path = storage.join(temp_name(&final_name));
        let opened = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await;
        let file = match opened {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("Upload of {} refused, another upload holds {:?}", final_name, temp_path);
                resp.fail(ErrorCode::TransferStateError, "upload in progress for filename");
                return;
            }
            Err(e) => {
                error!("Failed to open {:?}: {}", temp_path, e);
                resp.fail(ErrorCode::InternalError, "open temp file failed");
                return;
            }
        };

        let chunk_size = effective_chunk_size(req, ctx.config.max_chunk_bytes);
        let upload_id = ctx.ids.next_upload();
        info!("Upload {} started: {} ({} bytes)", upload_id, final_name, declared_size);

        resp.succeed("upload_init_ok");
        resp.set("upload_id", upload_id.as_str());
        resp.set("filename", final_name.as_str());
        resp.set("chunk_size", chunk_size);
        resp.set("next_index", 0i64);

        session.upload = Some(UploadTransfer {
            upload_id,
            final_name,
            final_path,
            temp_path,
            declared_size,
            received_size: 0,
            next_index: 0,
            chunk_size,
            file: Some(file),
        });
    }
}

/// Shared id check for the commands that continue an upload. `required`
/// controls whether an absent id is a mismatch.
fn check_upload_id(
    session: &Session,
    req: &Request,
    required: bool,
    resp: &mut Response,
) -> bool {
    let Some(upload) = &session.upload else {
        resp.fail(ErrorCode::TransferStateError, "no upload in progress");
        return false;
    };
    match req.args.get_str("upload_id") {
        Some(id) if id == upload.upload_id => true,
        None if !required => true,
        _ => {
            resp.fail(ErrorCode::TransferStateError, "upload_id mismatch");
            false
        }
    }
}

pub struct UploadChunk;

#[async_trait]
impl CommandHandler for UploadChunk {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        if !check_upload_id(session, req, true, resp) {
            return;
        }
        let Some(upload) = session.upload.as_mut() else {
            return;
        };

        let Some(index) = check_chunk_index(req, upload.next_index, resp) else {
            return;
        };
        let Some(data_b64) = require_str(req, "data_b64", resp) else {
            return;
        };
        let Ok(data) = STANDARD.decode(data_b64) else {
            resp.fail(ErrorCode::BadRequest, "invalid base64");
            return;
        };
        if data.len() > ctx.config.max_chunk_bytes as usize {
            resp.fail(ErrorCode::BadRequest, "chunk too large");
            return;
        }

        if upload.received_size + data.len() as u64 > upload.declared_size {
            warn!("Upload {} overflowed its declared size", upload.upload_id);
            session.abort_upload().await;
            resp.fail(ErrorCode::SizeMismatch, "size overflow");
            return;
        }

        let written = match upload.file.as_mut() {
            Some(file) => file.write_all(&data).await,
            None => Err(std::io::Error::other("upload file already closed")),
        };
        if let Err(e) = written {
            error!("Write failed for {:?}: {}", upload.temp_path, e);
            session.abort_upload().await;
            resp.fail(ErrorCode::InternalError, "write failed");
            return;
        }

        upload.received_size += data.len() as u64;
        upload.next_index = index + 1;

        resp.succeed("chunk_ok");
        resp.set("received", upload.received_size);
        resp.set("next_index", upload.next_index);
    }
}

pub struct UploadFinish;

impl UploadFinish {
    async fn commit(
        policy: OverwritePolicy,
        upload: &mut UploadTransfer,
    ) -> Result<(), (ErrorCode, &'static str)> {
        if let Some(mut file) = upload.file.take() {
            if let Err(e) = file.flush().await {
                error!("Flush failed for {:?}: {}", upload.temp_path, e);
                return Err((ErrorCode::InternalError, "write failed"));
            }
        }

        if upload.received_size != upload.declared_size {
            warn!(
                "Upload {} size mismatch: received {} of {}",
                upload.upload_id, upload.received_size, upload.declared_size
            );
            return Err((ErrorCode::SizeMismatch, "size mismatch"));
        }

        if policy != OverwritePolicy::Overwrite && exists(&upload.final_path).await {
            warn!("Upload {} destination appeared: {:?}", upload.upload_id, upload.final_path);
            return Err((ErrorCode::FileExists, "file exists"));
        }

        if let Err(e) = fs::rename(&upload.temp_path, &upload.final_path).await {
            let retry = policy == OverwritePolicy::Overwrite && exists(&upload.final_path).await;
            if !retry {
                error!("Rename to {:?} failed: {}", upload.final_path, e);
                return Err((ErrorCode::InternalError, "rename failed"));
            }
            let retried = match fs::remove_file(&upload.final_path).await {
                Ok(()) => fs::rename(&upload.temp_path, &upload.final_path).await,
                Err(e) => Err(e),
            };
            if let Err(e) = retried {
                error!(
                    "Rename to {:?} failed after removing destination: {}",
                    upload.final_path, e
                );
                return Err((ErrorCode::InternalError, "rename failed"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for UploadFinish {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        if !check_upload_id(session, req, true, resp) {
            return;
        }
        let Some(upload) = session.upload.as_mut() else {
            return;
        };

        if let Err((code, msg)) = Self::commit(ctx.config.overwrite, upload).await {
            session.abort_upload().await;
            resp.fail(code, msg);
            return;
        }

        info!(
            "Upload {} committed: {} ({} bytes)",
            upload.upload_id, upload.final_name, upload.received_size
        );
        resp.succeed("upload_finish_ok");
        resp.set("filename", upload.final_name.as_str());
        resp.set("size", upload.received_size);
        session.upload = None;
    }
}

pub struct UploadAbort;

#[async_trait]
impl CommandHandler for UploadAbort {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        if !check_upload_id(session, req, false, resp) {
            return;
        }
        session.abort_upload().await;
        resp.succeed("upload_aborted");
    }
}

pub struct DownloadInit;

#[async_trait]
impl CommandHandler for DownloadInit {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        if session.download.is_some() {
            resp.fail(ErrorCode::TransferStateError, "download already in progress");
            return;
        }
        let filename = match req.args.get_str("filename") {
            Some(name) if is_safe_filename(name) => name,
            _ => {
                resp.fail(ErrorCode::BadRequest, "invalid filename");
                return;
            }
        };

        let path = ctx.storage_path(filename);
        let file_size = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                resp.fail(ErrorCode::FileNotFound, "file not found");
                return;
            }
        };
        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to open {:?}: {}", path, e);
                resp.fail(ErrorCode::InternalError, "open file failed");
                return;
            }
        };

        let chunk_size = effective_chunk_size(req, ctx.config.max_chunk_bytes);
        let download_id = ctx.ids.next_download();
        info!("Download {} started: {} ({} bytes)", download_id, filename, file_size);

        resp.succeed("download_init_ok");
        resp.set("download_id", download_id.as_str());
        resp.set("file_size", file_size);
        resp.set("chunk_size", chunk_size);
        resp.set("next_index", 0i64);

        session.download = Some(DownloadTransfer {
            download_id,
            filename: filename.to_string(),
            path,
            file_size,
            next_index: 0,
            chunk_size,
            offset: 0,
            file,
        });
    }
}

pub struct DownloadChunk;

#[async_trait]
impl CommandHandler for DownloadChunk {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        let Some(download) = session.download.as_mut() else {
            resp.fail(ErrorCode::TransferStateError, "no download in progress");
            return;
        };
        if req.args.get_str("download_id") != Some(download.download_id.as_str()) {
            resp.fail(ErrorCode::TransferStateError, "download_id mismatch");
            return;
        }
        let Some(index) = check_chunk_index(req, download.next_index, resp) else {
            return;
        };

        let want = u64::from(download.chunk_size);
        let mut buf = Vec::with_capacity(download.chunk_size as usize);
        if let Err(e) = (&mut download.file).take(want).read_to_end(&mut buf).await {
            error!("Read failed for {:?}: {}", download.path, e);
            session.reset_download();
            resp.fail(ErrorCode::InternalError, "read failed");
            return;
        }

        download.offset += buf.len() as u64;
        download.next_index = index + 1;
        let is_last = (buf.len() as u64) < want || download.offset >= download.file_size;

        resp.succeed("chunk_ok");
        resp.set("chunk_index", index);
        resp.set("data_b64", STANDARD.encode(&buf));
        resp.set("is_last", is_last);

        if is_last {
            info!(
                "Download {} complete: {} ({} bytes)",
                download.download_id, download.filename, download.offset
            );
            session.reset_download();
        }
    }
}

pub struct DownloadAbort;

#[async_trait]
impl CommandHandler for DownloadAbort {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        if session.download.is_none() {
            resp.fail(ErrorCode::TransferStateError, "no download in progress");
            return;
        }
        session.reset_download();
        resp.succeed("download_aborted");
    }
}
