// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! One URL, one temp file, one atomic rename. Interrupted downloads leave
//! a `.part` file behind and are resumed with a byte range request; the
//! trailing bytes of the partial file are compared against the server's
//! bytes over the overlap region, so a server-side object replacement is
//! detected instead of corrupting the result.

use std::{io, path::{Path, PathBuf}, time::SystemTime};

use chrono::DateTime;
use fs_err as fs;
use futures_util::StreamExt;
use log::{info, warn};
use reqwest::{header, StatusCode};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use url::Url;

use crate::cache::{Artifact, CheckFile, Checksum, CookieAuth, FileCache};
use crate::store;

/// Bytes re-requested before the end of a partial file and byte-compared
/// to detect stale partials
pub const OVERLAP: u64 = 8 * 1024;

/// Retry budget for SSL/connect handshake failures
const SSL_RETRY_COUNT: u32 = 3;

/// Retry budget for read timeouts and short bodies, resuming from the
/// current `.part` length
const RESUME_ATTEMPTS: u32 = 5;

pub(crate) struct Downloader<'a> {
    client: &'a reqwest::Client,
    auth: Option<&'a CookieAuth>,
    structure: &'a Mutex<()>,
}

struct PartialSpec {
    already_downloaded: u64,
    trailing_bytes: Vec<u8>,
}

impl<'a> Downloader<'a> {
    pub fn new(
        client: &'a reqwest::Client,
        auth: Option<&'a CookieAuth>,
        structure: &'a Mutex<()>,
    ) -> Self {
        Self {
            client,
            auth,
            structure,
        }
    }

    /// Download `artifact.url` to `dest`, resuming a `.part` file when
    /// possible, and write the checksum sidecar.
    pub async fn fetch(&self, artifact: &Artifact, dest: &Path) -> Result<(), DownloadError> {
        let part = part_path(dest);

        let mut ssl_budget = SSL_RETRY_COUNT;
        let mut resume_budget = RESUME_ATTEMPTS;
        let mut use_range = true;

        loop {
            match self.attempt(&artifact.url, dest, &part, use_range).await {
                Ok(()) => return Ok(()),
                Err(DownloadError::RangeNotSupported) => {
                    // Close and restart without a range request
                    let _ = fs::remove_file(&part);
                    use_range = false;
                }
                Err(e) if is_connect_failure(&e) && ssl_budget > 0 => {
                    ssl_budget -= 1;
                    warn!("connect failure for {}, retrying: {e}", artifact.url);
                }
                Err(e) if is_resumable(&e) && resume_budget > 0 => {
                    resume_budget -= 1;
                    warn!("interrupted download of {}, resuming: {e}", artifact.url);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        dest: &Path,
        part: &Path,
        use_range: bool,
    ) -> Result<(), DownloadError> {
        let partial = if use_range { read_partial_spec(part)? } else { None };

        let mut request = self.client.get(url.clone()).header(header::ACCEPT, "*/*");

        if let Some(auth) = self.auth {
            if url.host_str().is_some_and(|host| auth.matches(host)) {
                request = request.header(header::COOKIE, auth.cookie.clone());
            }
        }

        if let Some(spec) = &partial {
            let offset = spec.already_downloaded - OVERLAP;
            request = request.header(header::RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(DownloadError::NotFound),
            StatusCode::FORBIDDEN => return Err(DownloadError::Forbidden),
            StatusCode::UNAUTHORIZED => {
                let realm = response
                    .headers()
                    .get(header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_realm);
                return Err(DownloadError::Unauthorized(realm));
            }
            status if !status.is_success() => return Err(DownloadError::Status(status.as_u16())),
            _ => {}
        }

        // A resumed request must be answered with 206 and an exactly
        // matching Content-Range; anything else restarts from zero.
        let resume = match &partial {
            None => None,
            Some(spec) => {
                let offset = spec.already_downloaded - OVERLAP;
                let range = response
                    .headers()
                    .get(header::CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range);

                match range {
                    Some((start, _)) if response.status() == StatusCode::PARTIAL_CONTENT && start == offset => {
                        Some(spec)
                    }
                    _ => return Err(DownloadError::RangeNotSupported),
                }
            }
        };

        let expected_total = match resume {
            None => response.content_length(),
            Some(spec) => {
                let total = response
                    .headers()
                    .get(header::CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range)
                    .and_then(|(_, total)| total);

                total.or_else(|| {
                    response
                        .content_length()
                        .map(|len| len + spec.already_downloaded - OVERLAP)
                })
            }
        };

        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok());
        let server_filename = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_filename);

        // Stream the body into the partial file
        let mut out = match resume {
            Some(_) => {
                tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(part)
                    .await?
            }
            None => tokio::fs::File::create(part).await?,
        };

        let mut overlap_pos = 0usize;
        let mut written = resume.map(|s| s.already_downloaded).unwrap_or(0);
        let mut last_decile = decile(written, expected_total);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let mut data = &chunk[..];

            // First, verify the overlap region against the partial file
            if let Some(spec) = resume {
                let trailing = &spec.trailing_bytes;
                if overlap_pos < trailing.len() {
                    let take = (trailing.len() - overlap_pos).min(data.len());
                    if data[..take] != trailing[overlap_pos..overlap_pos + take] {
                        drop(out);
                        fs::remove_file(part)?;
                        return Err(DownloadError::StalePartial);
                    }
                    overlap_pos += take;
                    data = &data[take..];
                }
            }

            out.write_all(data).await?;
            written += data.len() as u64;

            let current = decile(written, expected_total);
            if current != last_decile {
                last_decile = current;
                if let Some(d) = current {
                    info!("{url}: {}%", d * 10);
                }
            }
        }

        out.flush().await?;
        drop(out);

        // The body must account for every expected byte
        let got = fs::metadata(part)?.len();
        if let Some(expected) = expected_total {
            if got != expected {
                return Err(DownloadError::WrongLength { got, expected });
            }
        }

        self.finalize(url, dest, part, last_modified.map(Into::into), server_filename)
            .await
    }

    /// Atomically publish the partial file and write the sidecar.
    async fn finalize(
        &self,
        url: &Url,
        dest: &Path,
        part: &Path,
        last_modified: Option<SystemTime>,
        server_filename: Option<String>,
    ) -> Result<(), DownloadError> {
        {
            let _structure = self.structure.lock().await;
            fs::rename(part, dest)?;
        }

        if let Some(time) = last_modified {
            let file = std::fs::OpenOptions::new().write(true).open(dest)?;
            file.set_modified(time)?;
        }

        let path = dest.to_owned();
        let sha256 = tokio::task::spawn_blocking(move || crate::cache::hash_file(&path))
            .await
            .map_err(|_| DownloadError::Cancelled)??;

        let check = CheckFile {
            filename: server_filename,
            checksum: Checksum { sha256 },
        };
        store::overwrite(FileCache::check_path(dest), &check)?;

        info!("fetched {url}");
        Ok(())
    }
}

fn read_partial_spec(part: &Path) -> Result<Option<PartialSpec>, DownloadError> {
    use std::io::{Read, Seek, SeekFrom};

    let len = match fs::metadata(part) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Too short to resume safely
    if len <= OVERLAP {
        return Ok(None);
    }

    let mut file = fs::File::open(part)?;
    file.seek(SeekFrom::End(-(OVERLAP as i64)))?;
    let mut trailing_bytes = vec![0u8; OVERLAP as usize];
    file.read_exact(&mut trailing_bytes)?;

    Ok(Some(PartialSpec {
        already_downloaded: len,
        trailing_bytes,
    }))
}

pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Parse `bytes <start>-<end>/<total|*>` into `(start, total)`
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;

    let start = start.trim().parse::<u64>().ok()?;
    let total = match total.trim() {
        "*" => end.trim().parse::<u64>().ok().map(|end| end + 1),
        t => Some(t.parse::<u64>().ok()?),
    };

    Some((start, total))
}

/// Extract the `realm` of a `WWW-Authenticate` header
fn parse_realm(value: &str) -> Option<String> {
    let (_, rest) = value.split_once("realm=\"")?;
    let (realm, _) = rest.split_once('"')?;
    Some(realm.to_owned())
}

/// Extract the filename of a `Content-Disposition` header
fn parse_filename(value: &str) -> Option<String> {
    let (_, rest) = value.split_once("filename=")?;
    let name = rest.split(';').next()?.trim().trim_matches('"');

    // Refuse path-ish names outright
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        None
    } else {
        Some(name.to_owned())
    }
}

fn decile(written: u64, total: Option<u64>) -> Option<u64> {
    let total = total.filter(|t| *t > 0)?;
    Some((written.min(total) * 10) / total)
}

fn is_connect_failure(e: &DownloadError) -> bool {
    match e {
        DownloadError::Request(e) => e.is_connect(),
        _ => false,
    }
}

fn is_resumable(e: &DownloadError) -> bool {
    match e {
        DownloadError::Request(e) => e.is_timeout() || e.is_body(),
        DownloadError::WrongLength { got, expected } => got < expected,
        // The stale partial was deleted, so the retry starts from scratch
        DownloadError::StalePartial => true,
        DownloadError::Io(_) => false,
        _ => false,
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("not found (404)")]
    NotFound,
    #[error("forbidden (403)")]
    Forbidden,
    #[error("unauthorized{}", .0.as_deref().map(|r| format!(" (realm: {r})")).unwrap_or_default())]
    Unauthorized(Option<String>),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("server ignored the range request")]
    RangeNotSupported,
    #[error("partial file is stale, overlap bytes changed on the server")]
    StalePartial,
    #[error("wrong content length: got {got}, expected {expected}")]
    WrongLength { got: u64, expected: u64 },
    #[error("download cancelled")]
    Cancelled,
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store: {0}")]
    Store(#[from] store::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}
