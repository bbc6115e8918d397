// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Content-addressed on-disk cache keyed by URL. Each cached file has a
//! companion sidecar (the check file) recording the server-advertised
//! filename and the SHA-256 of the content; an absent sidecar means the
//! cached file is not trusted and is refetched.

use std::{
    io,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use fs_err as fs;
use log::debug;
use nix::fcntl::{flock, FlockArg};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use url::Url;

use crate::store;

pub use self::download::DownloadError;

pub mod download;

/// Default bound on concurrent network operations; some servers refuse
/// many simultaneous connections.
pub const DEFAULT_MAX_PARALLEL: usize = 2;

/// Sidecar file extension
const CHECK_EXTENSION: &str = "checked";

/// Something downloadable, addressed by URL
#[derive(Debug, Clone)]
pub struct Artifact {
    pub url: Url,
    /// Changing artifacts (channel indexes) revalidate whenever the TTL
    /// has elapsed; immutable artifacts are trusted once present.
    pub changing: bool,
    /// Server-side modification marker forcing a refetch when newer than
    /// the cached copy
    pub last_modified: Option<DateTime<Utc>>,
    /// Expected content checksum, verified after download when present
    pub checksum_sha256: Option<String>,
}

impl Artifact {
    pub fn changing(url: Url) -> Self {
        Self {
            url,
            changing: true,
            last_modified: None,
            checksum_sha256: None,
        }
    }

    pub fn fixed(url: Url) -> Self {
        Self {
            url,
            changing: false,
            last_modified: None,
            checksum_sha256: None,
        }
    }
}

/// Sidecar stored next to each cached artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checksum {
    pub sha256: String,
}

/// Host-matched session cookie supplied via the environment; the header
/// is only attached when the request host equals the domain or is a
/// dot-suffixed subdomain of it.
#[derive(Debug, Clone)]
pub struct CookieAuth {
    pub domain: String,
    pub cookie: String,
}

impl CookieAuth {
    /// Parse `<domain>=<cookie>` as supplied in `SC4PAC_AUTH_COOKIE`
    pub fn from_env_value(value: &str) -> Option<Self> {
        let (domain, cookie) = value.split_once('=')?;
        if domain.is_empty() || cookie.is_empty() {
            return None;
        }
        Some(Self {
            domain: domain.to_owned(),
            cookie: cookie.to_owned(),
        })
    }

    pub fn matches(&self, host: &str) -> bool {
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }
}

/// The two-tier cache root: channel indexes and metadata as well as
/// artifact archives live under it, keyed by a URL-derived path.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    client: reqwest::Client,
    auth: Option<CookieAuth>,
    max_parallel: usize,
    /// Bounds concurrent downloads
    pool: Arc<Semaphore>,
    /// Serializes directory creation and final renames
    structure: Arc<Mutex<()>>,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        Self::with_max_parallel(root, DEFAULT_MAX_PARALLEL)
    }

    pub fn with_max_parallel(root: impl Into<PathBuf>, max_parallel: usize) -> Result<Self, Error> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(Duration::from_secs(60))
            .build()?;

        let auth = std::env::var("SC4PAC_AUTH_COOKIE")
            .ok()
            .as_deref()
            .and_then(CookieAuth::from_env_value);

        let max_parallel = max_parallel.max(1);

        Ok(Self {
            root: root.into(),
            client,
            auth,
            max_parallel,
            pool: Arc::new(Semaphore::new(max_parallel)),
            structure: Arc::new(Mutex::new(())),
        })
    }

    /// Max concurrent network operations callers should issue
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Local cache path for a URL. The key is a function of the URL only.
    pub fn path_for(&self, url: &Url) -> PathBuf {
        let mut path = self.root.join("files").join(sanitize(url.host_str().unwrap_or("local")));

        let segments = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default();

        for segment in &segments {
            path.push(sanitize(segment));
        }
        if segments.is_empty() {
            path.push("index");
        }

        // Disambiguate queries without leaking them into the filesystem
        if let Some(query) = url.query() {
            let digest = Sha256::digest(query.as_bytes());
            let suffix = hex::encode(&digest[..4]);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "index".to_owned());
            path.set_file_name(format!("{name}~{suffix}"));
        }

        path
    }

    pub fn check_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".");
        name.push(CHECK_EXTENSION);
        path.with_file_name(name)
    }

    /// Last fetch time of a cached file, taken from its sidecar; absence
    /// means "never fetched".
    pub fn ttl(path: &Path) -> Option<SystemTime> {
        let check = Self::check_path(path);
        fs::metadata(check).ok()?.modified().ok()
    }

    pub fn read_check(path: &Path) -> Option<CheckFile> {
        store::read(Self::check_path(path)).ok().flatten()
    }

    /// Return a local file for the artifact, downloading on miss or when
    /// the TTL has elapsed.
    pub async fn file(&self, artifact: &Artifact, ttl: Duration) -> Result<PathBuf, Error> {
        let dest = self.path_for(&artifact.url);

        if self.is_fresh(artifact, &dest, ttl) {
            return Ok(dest);
        }

        // Serialize concurrent downloads of the same URL; a lock held by
        // another process is an error, not a wait.
        let _url_lock = self.lock_url(&dest).await?;

        // Another process may have fetched while we waited for the lock
        if self.is_fresh(artifact, &dest, ttl) {
            return Ok(dest);
        }

        let _permit = self.pool.acquire().await.map_err(|_| Error::PoolClosed)?;

        download::Downloader::new(&self.client, self.auth.as_ref(), &self.structure)
            .fetch(artifact, &dest)
            .await
            .map_err(|source| Error::Download {
                url: artifact.url.clone(),
                source,
            })?;

        if let Some(expected) = &artifact.checksum_sha256 {
            let check = Self::read_check(&dest).ok_or_else(|| Error::Checksum {
                url: artifact.url.clone(),
                expected: expected.clone(),
                got: "<missing sidecar>".to_owned(),
            })?;
            if !check.checksum.sha256.eq_ignore_ascii_case(expected) {
                return Err(Error::Checksum {
                    url: artifact.url.clone(),
                    expected: expected.clone(),
                    got: check.checksum.sha256,
                });
            }
        }

        Ok(dest)
    }

    fn is_fresh(&self, artifact: &Artifact, dest: &Path, ttl: Duration) -> bool {
        if !dest.exists() {
            return false;
        }
        let Some(fetched) = Self::ttl(dest) else {
            // No sidecar: the cached file is not trusted
            return false;
        };

        if artifact.changing {
            let expired = fetched
                .elapsed()
                .map(|elapsed| elapsed > ttl)
                .unwrap_or(true);
            if expired {
                debug!("cache entry expired for {}", artifact.url);
                return false;
            }
        }

        if let Some(remote) = artifact.last_modified {
            let fetched: DateTime<Utc> = fetched.into();
            if remote > fetched {
                debug!("remote copy of {} is newer than cache", artifact.url);
                return false;
            }
        }

        true
    }

    /// Take the per-URL advisory lock, creating parents as needed.
    async fn lock_url(&self, dest: &Path) -> Result<UrlLock, Error> {
        let _structure = self.structure.lock().await;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        let lock_path = dest.with_file_name(name);

        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(Error::Io)?;

        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => Ok(UrlLock(Arc::new(file))),
            Err(nix::errno::Errno::EWOULDBLOCK) => Err(Error::Locked(lock_path)),
            Err(e) => Err(Error::Flock(e)),
        }
    }
}

/// Advisory lock over one cache entry, released on drop
#[derive(Debug, Clone)]
#[allow(unused)]
struct UrlLock(Arc<fs::File>);

/// Recompute the SHA-256 of a cached file and compare against its sidecar.
pub fn verify(url: &Url, path: &Path) -> Result<(), Error> {
    let check = FileCache::read_check(path).ok_or_else(|| Error::Checksum {
        url: url.clone(),
        expected: "<sidecar>".to_owned(),
        got: "<missing sidecar>".to_owned(),
    })?;

    let got = hash_file(path).map_err(Error::Io)?;
    if got.eq_ignore_ascii_case(&check.checksum.sha256) {
        Ok(())
    } else {
        Err(Error::Checksum {
            url: url.clone(),
            expected: check.checksum.sha256,
            got,
        })
    }
}

pub(crate) fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn sanitize(segment: &str) -> String {
    let cleaned = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    // Keep dot-files and empty segments representable
    match cleaned.trim_start_matches('.') {
        "" => "_".to_owned(),
        _ => cleaned,
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("download of {url} failed: {source}")]
    Download {
        url: Url,
        #[source]
        source: DownloadError,
    },
    #[error("checksum mismatch for {url}: expected {expected}, got {got}")]
    Checksum {
        url: Url,
        expected: String,
        got: String,
    },
    #[error("cache entry is locked by another process: {0:?}")]
    Locked(PathBuf),
    #[error("obtaining advisory lock")]
    Flock(#[source] nix::Error),
    #[error("download pool closed")]
    PoolClosed,
    #[error("building http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn cache() -> FileCache {
        FileCache::new(std::env::temp_dir().join("sc4pac-test-cache")).unwrap()
    }

    #[test]
    fn cache_path_is_a_function_of_the_url() {
        let cache = cache();
        let url = Url::parse("https://example.org/channel/sc4pac-channel-contents.json").unwrap();

        let a = cache.path_for(&url);
        let b = cache.path_for(&url);
        assert_eq!(a, b);

        let suffix = a
            .strip_prefix(&cache.root)
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert_eq!(suffix, "files/example.org/channel/sc4pac-channel-contents.json");
    }

    #[test]
    fn query_strings_are_disambiguated() {
        let cache = cache();
        let plain = Url::parse("https://example.org/download?id=1").unwrap();
        let other = Url::parse("https://example.org/download?id=2").unwrap();

        assert_ne!(cache.path_for(&plain), cache.path_for(&other));
    }

    #[test]
    fn hostile_segments_are_sanitized() {
        let cache = cache();
        let url = Url::parse("https://example.org/a/%2E%2E/b%3Fc").unwrap();

        let path = cache.path_for(&url);
        assert!(path.starts_with(cache.root.join("files").join("example.org")));
        for component in path.components() {
            assert_ne!(component.as_os_str(), "..");
        }
    }

    #[test]
    fn check_path_appends_extension() {
        let path = Path::new("/cache/files/example.org/big.zip");
        assert_eq!(
            FileCache::check_path(path),
            Path::new("/cache/files/example.org/big.zip.checked")
        );
    }

    #[test]
    fn cookie_auth_host_matching() {
        let auth = CookieAuth::from_env_value("example.org=session=abc123").unwrap();
        assert_eq!(auth.domain, "example.org");
        assert_eq!(auth.cookie, "session=abc123");

        assert!(auth.matches("example.org"));
        assert!(auth.matches("files.example.org"));
        assert!(!auth.matches("notexample.org"));
        assert!(!auth.matches("example.org.evil.com"));
    }
}
