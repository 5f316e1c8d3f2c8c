//! Reqwest-backed file acquirer.
//!
//! Downloads land in a content-addressed cache directory; files that need
//! no responsive encoding are copied into a static-serving directory and
//! addressed by URL from there.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use log::debug;
use regex::Regex;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::asset::ResponsiveImage;
use crate::error::AcquireError;
use crate::parse_cache::content_digest;
use crate::resolver::{AcquiredFile, FileAcquirer};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// CMS thumbnail renditions carry a `-WxH` suffix before the extension.
static RENDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-(\d+)x(\d+)(\.\w+)$").unwrap_or_else(|e| panic!("invalid rendition regex: {e}"))
});

/// Acquirer that fetches managed files over HTTP.
pub struct HttpAcquirer {
    client: Client,
    cache_dir: PathBuf,
    static_dir: PathBuf,
    /// URL prefix the static directory is served under.
    static_prefix: String,
}

impl HttpAcquirer {
    /// Build an acquirer writing downloads to `cache_dir` and public copies
    /// to `static_dir`, served under `static_prefix`.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        static_dir: impl Into<PathBuf>,
        static_prefix: impl Into<String>,
    ) -> Result<Self, AcquireError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AcquireError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
            static_dir: static_dir.into(),
            static_prefix: static_prefix.into().trim_end_matches('/').to_string(),
        })
    }
}

impl FileAcquirer for HttpAcquirer {
    async fn acquire(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<AcquiredFile, AcquireError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Http(status.as_u16()));
        }

        let file_name = file_name_from_url(url);
        let extension = extension_of(&file_name);
        let dir = self.cache_dir.join(content_digest(url.as_bytes()));
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&file_name);

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_reqwest_error)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        debug!("acquired {url} -> {}", path.display());

        Ok(AcquiredFile {
            url: url.to_string(),
            file_name,
            extension,
            path,
        })
    }

    async fn encode_responsive(
        &self,
        file: &AcquiredFile,
    ) -> Result<ResponsiveImage, AcquireError> {
        // Rendition generation runs in a separate service against the
        // static copy; here the base rendition is the copy itself.
        let src = self.copy_to_static(file).await?;
        Ok(ResponsiveImage::plain(src))
    }

    async fn copy_to_static(&self, file: &AcquiredFile) -> Result<String, AcquireError> {
        tokio::fs::create_dir_all(&self.static_dir).await?;
        let target = self.static_dir.join(&file.file_name);
        tokio::fs::copy(&file.path, &target).await?;
        Ok(format!("{}/{}", self.static_prefix, file.file_name))
    }

    async fn alternate_rendition(&self, url: &str) -> Option<String> {
        smaller_rendition(url)
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> AcquireError {
    if error.is_timeout() {
        AcquireError::Timeout
    } else {
        AcquireError::Other(error.to_string())
    }
}

/// Sanitized filename derived from the last path segment of `url`.
fn file_name_from_url(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(ToString::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download".to_string());
    sanitize_filename::sanitize(segment)
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Derive a half-size rendition URL from a `-WxH` thumbnail suffix, when
/// one is present and still meaningfully smaller.
fn smaller_rendition(url: &str) -> Option<String> {
    let captures = RENDITION_RE.captures(url)?;
    let width: u32 = captures.get(1)?.as_str().parse().ok()?;
    let height: u32 = captures.get(2)?.as_str().parse().ok()?;
    if width < 2 || height < 2 {
        return None;
    }
    let replacement = format!("-{}x{}{}", width / 2, height / 2, &captures[3]);
    Some(RENDITION_RE.replace(url, replacement.as_str()).into_owned())
}
