//! Blocking-style request/response client over one TCP connection.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::crypto;
use crate::protocol::envelope::{decode_response, encode_request};
use crate::protocol::frame::{read_frame, write_frame};
use crate::protocol::handshake::skip_banner;
use crate::protocol::{Request, Response, Value};

/// Outcome of a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub filename: String,
    pub size: u64,
}

pub struct Client {
    stream: BufReader<TcpStream>,
    banner_checked: bool,
}

fn ensure_ok(resp: Response, what: &str) -> Result<Response> {
    if !resp.ok {
        bail!("{} failed: {} ({})", what, resp.msg, resp.code);
    }
    Ok(resp)
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.context("connect failed")?;
        Ok(Self { stream: BufReader::new(stream), banner_checked: false })
    }

    /// Send one request and wait for its response. A response with
    /// `ok == false` is still `Ok` here.
    pub async fn call(&mut self, req: &Request) -> Result<Response> {
        let text = encode_request(req)?;
        write_frame(self.stream.get_mut(), text.as_bytes()).await?;

        if !self.banner_checked {
            if skip_banner(&mut self.stream).await? {
                debug!("Skipped server banner");
            }
            self.banner_checked = true;
        }

        let payload = read_frame(&mut self.stream).await?;
        Ok(decode_response(&payload)?)
    }

    pub async fn login_low(&mut self, username: &str, password: &str) -> Result<Response> {
        let req = Request::new("LOGIN_LOW").arg("username", username).arg("password", password);
        ensure_ok(self.call(&req).await?, "LOGIN_LOW")
    }

    /// The passphrase is encrypted locally; only the ciphertext is sent.
    pub async fn login_high(
        &mut self,
        username: &str,
        passphrase: &str,
        key: &[u8],
    ) -> Result<Response> {
        let cipher_hex = crypto::des_encrypt_hex(passphrase.as_bytes(), key)?;
        let req = Request::new("LOGIN_HIGH")
            .arg("username", username)
            .arg("password_cipher_hex", cipher_hex);
        ensure_ok(self.call(&req).await?, "LOGIN_HIGH")
    }

    pub async fn list_files(&mut self) -> Result<Vec<String>> {
        let resp = ensure_ok(self.call(&Request::new("LIST_FILES")).await?, "LIST_FILES")?;
        let files = resp
            .data
            .get_array("files")
            .ok_or_else(|| anyhow!("LIST_FILES: missing files"))?;
        Ok(files.iter().filter_map(Value::as_str).map(str::to_string).collect())
    }

    pub async fn upload_file(
        &mut self,
        local: &Path,
        remote: &str,
        chunk_size: u32,
    ) -> Result<UploadSummary> {
        let data = tokio::fs::read(local)
            .await
            .with_context(|| format!("failed to read {:?}", local))?;

        let init = Request::new("UPLOAD_INIT")
            .arg("filename", remote)
            .arg("file_size", data.len() as u64)
            .arg("chunk_size", chunk_size);
        let resp = ensure_ok(self.call(&init).await?, "UPLOAD_INIT")?;
        let upload_id = resp
            .data
            .get_str("upload_id")
            .ok_or_else(|| anyhow!("UPLOAD_INIT: missing upload_id"))?
            .to_string();
        let chunk = resp
            .data
            .get_i64("chunk_size")
            .filter(|n| *n > 0)
            .ok_or_else(|| anyhow!("UPLOAD_INIT: missing chunk_size"))? as usize;

        for (index, piece) in data.chunks(chunk).enumerate() {
            let req = Request::new("UPLOAD_CHUNK")
                .arg("upload_id", upload_id.as_str())
                .arg("chunk_index", index as u64)
                .arg("data_b64", STANDARD.encode(piece));
            let resp = self.call(&req).await?;
            if !resp.ok {
                warn!("Chunk {} rejected: {}", index, resp.msg);
                let abort = Request::new("UPLOAD_ABORT").arg("upload_id", upload_id.as_str());
                let _ = self.call(&abort).await;
                bail!("UPLOAD_CHUNK failed: {} ({})", resp.msg, resp.code);
            }
        }

        let finish = Request::new("UPLOAD_FINISH").arg("upload_id", upload_id.as_str());
        let resp = ensure_ok(self.call(&finish).await?, "UPLOAD_FINISH")?;
        let summary = UploadSummary {
            filename: resp.data.get_str("filename").unwrap_or(remote).to_string(),
            size: resp.data.get_i64("size").unwrap_or(0).max(0) as u64,
        };
        info!("Uploaded {:?} as {} ({} bytes)", local, summary.filename, summary.size);
        Ok(summary)
    }

    /// Fetch `remote` into `local`. On failure the server transfer is aborted
    /// and the partial local file removed.
    pub async fn download_file(
        &mut self,
        remote: &str,
        local: &Path,
        chunk_size: u32,
    ) -> Result<u64> {
        let init = Request::new("DOWNLOAD_INIT")
            .arg("filename", remote)
            .arg("chunk_size", chunk_size);
        let resp = ensure_ok(self.call(&init).await?, "DOWNLOAD_INIT")?;
        let download_id = resp
            .data
            .get_str("download_id")
            .ok_or_else(|| anyhow!("DOWNLOAD_INIT: missing download_id"))?
            .to_string();

        let result = self.receive_chunks(&download_id, local).await;
        if result.is_err() {
            let _ = self.call(&Request::new("DOWNLOAD_ABORT")).await;
            let _ = tokio::fs::remove_file(local).await;
        }
        result
    }

    async fn receive_chunks(&mut self, download_id: &str, local: &Path) -> Result<u64> {
        let mut out = File::create(local)
            .await
            .with_context(|| format!("failed to create {:?}", local))?;
        let mut total = 0u64;

        for index in 0u64.. {
            let req = Request::new("DOWNLOAD_CHUNK")
                .arg("download_id", download_id)
                .arg("chunk_index", index);
            let resp = ensure_ok(self.call(&req).await?, "DOWNLOAD_CHUNK")?;
            let data_b64 = resp
                .data
                .get_str("data_b64")
                .ok_or_else(|| anyhow!("DOWNLOAD_CHUNK: missing data_b64"))?;
            let bytes = STANDARD.decode(data_b64).context("DOWNLOAD_CHUNK: invalid base64")?;
            out.write_all(&bytes).await?;
            total += bytes.len() as u64;

            if resp.data.get_bool("is_last").unwrap_or(false) {
                break;
            }
        }

        out.flush().await?;
        info!("Downloaded {} to {:?} ({} bytes)", download_id, local, total);
        Ok(total)
    }
}
