//! Optional download of missing assets from a remote mirror of the original site.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::AssetPath;

const SEGMENT_ESCAPES: &AsciiSet = &CONTROLS
  .add(b' ')
  .add(b'"')
  .add(b'#')
  .add(b'%')
  .add(b'<')
  .add(b'>')
  .add(b'?')
  .add(b'`')
  .add(b'{')
  .add(b'}');

fn default_timeout_secs() -> u64 {
  20
}

/// Remote mirror settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MirrorConfig {
  /// Base URL the asset path is appended to.
  pub base_url: String,
  /// Per-request timeout in seconds.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

/// Reasons a single asset could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
  /// The HTTP client could not be built or the request failed.
  #[error("request to {url} failed: {source}")]
  Request {
    /// Requested URL.
    url: String,
    /// Client error.
    #[source]
    source: reqwest::Error,
  },
  /// The mirror answered with a non-success status.
  #[error("{url} answered with status {status}")]
  Status {
    /// Requested URL.
    url: String,
    /// HTTP status code.
    status: u16,
  },
  /// The downloaded bytes could not be stored.
  #[error("failed to store {}: {source}", .path.display())]
  Store {
    /// Destination on disk.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: io::Error,
  },
}

/// Source of asset bytes.
pub trait AssetFetcher {
  /// URL the asset is fetched from, for logs and reports.
  fn locate(&self, path: &AssetPath) -> String;

  /// Download the asset.
  fn fetch(&self, path: &AssetPath) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher for a configured mirror.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  base_url: String,
  client: reqwest::blocking::Client,
}

impl HttpFetcher {
  /// Build a client honouring the mirror timeout.
  pub fn new(config: &MirrorConfig) -> Result<Self, FetchError> {
    let client = reqwest::blocking::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|source| FetchError::Request {
        url: config.base_url.clone(),
        source,
      })?;
    Ok(Self {
      base_url: config.base_url.trim_end_matches('/').to_string(),
      client,
    })
  }
}

impl AssetFetcher for HttpFetcher {
  fn locate(&self, path: &AssetPath) -> String {
    let encoded: Vec<String> = path
      .as_str()
      .split('/')
      .map(|segment| utf8_percent_encode(segment, SEGMENT_ESCAPES).to_string())
      .collect();
    format!("{}/{}", self.base_url, encoded.join("/"))
  }

  fn fetch(&self, path: &AssetPath) -> Result<Vec<u8>, FetchError> {
    let url = self.locate(path);
    let request_error = |source| FetchError::Request {
      url: url.clone(),
      source,
    };

    let response = self.client.get(&url).send().map_err(request_error)?;
    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        url: url.clone(),
        status: status.as_u16(),
      });
    }
    let body = response.bytes().map_err(request_error)?;
    Ok(body.to_vec())
  }
}

/// Fetch `path` and store it under `asset_root`, creating parent directories.
pub fn fetch_into<F: AssetFetcher + ?Sized>(
  fetcher: &F,
  path: &AssetPath,
  asset_root: &Path,
) -> Result<PathBuf, FetchError> {
  let bytes = fetcher.fetch(path)?;
  let destination = path.to_fs_path(asset_root);
  let store_error = |source| FetchError::Store {
    path: destination.clone(),
    source,
  };

  if let Some(parent) = destination.parent() {
    fs::create_dir_all(parent).map_err(store_error)?;
  }
  fs::write(&destination, &bytes).map_err(store_error)?;
  tracing::info!("fetched {} ({} bytes)", path, bytes.len());
  Ok(destination)
}

#[cfg(test)]
pub(crate) mod testing {
  use std::cell::RefCell;
  use std::collections::BTreeMap;

  use super::*;

  /// Fetcher serving canned bytes and recording every request.
  #[derive(Debug, Default)]
  pub struct FakeFetcher {
    pub files: BTreeMap<String, Vec<u8>>,
    pub requests: RefCell<Vec<String>>,
  }

  impl FakeFetcher {
    pub fn serving<const N: usize>(files: [(&str, &[u8]); N]) -> Self {
      Self {
        files: files
          .into_iter()
          .map(|(path, bytes)| (path.to_string(), bytes.to_vec()))
          .collect(),
        requests: RefCell::new(Vec::new()),
      }
    }
  }

  impl AssetFetcher for FakeFetcher {
    fn locate(&self, path: &AssetPath) -> String {
      format!("mirror://{path}")
    }

    fn fetch(&self, path: &AssetPath) -> Result<Vec<u8>, FetchError> {
      self.requests.borrow_mut().push(path.to_string());
      self
        .files
        .get(path.as_str())
        .cloned()
        .ok_or_else(|| FetchError::Status {
          url: self.locate(path),
          status: 404,
        })
    }
  }
}
