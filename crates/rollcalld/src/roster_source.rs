//! Where the roster comes from, and turning it into a [`RosterIndex`].

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use rollcall_core::{
    decode_image, parse_listing, EncoderError, FaceEncoder, FrameError, RosterEntry, RosterIndex,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reference photos fetched concurrently while loading.
const PHOTO_FETCH_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid roster listing: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("entry has no photo_url")]
    MissingPhoto,
    #[error("reference photo: {0}")]
    Photo(#[from] FrameError),
    #[error("face encoding failed: {0}")]
    Encoder(#[from] EncoderError),
    #[error("roster encoding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait RosterSource: Send + Sync {
    /// List every roster entry. Failure here is fatal to startup.
    async fn entries(&self) -> Result<Vec<RosterEntry>, RosterError>;

    /// Fetch the encoded reference photo of one entry.
    async fn photo(&self, entry: &RosterEntry) -> Result<Vec<u8>, RosterError>;
}

/// Roster collection served over HTTP: `GET {base_url}/{collection}`.
pub struct HttpRosterSource {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    token: Option<String>,
}

impl HttpRosterSource {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
            token,
        }
    }
}

#[async_trait]
impl RosterSource for HttpRosterSource {
    async fn entries(&self) -> Result<Vec<RosterEntry>, RosterError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.collection.trim_matches('/')
        );
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let body = request.send().await?.error_for_status()?.text().await?;
        Ok(parse_listing(&body)?)
    }

    async fn photo(&self, entry: &RosterEntry) -> Result<Vec<u8>, RosterError> {
        fetch_photo(&self.client, entry, None).await
    }
}

/// Roster listing kept in a local JSON file. Relative photo paths resolve
/// against the file's directory.
pub struct FileRosterSource {
    client: reqwest::Client,
    path: PathBuf,
}

impl FileRosterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl RosterSource for FileRosterSource {
    async fn entries(&self) -> Result<Vec<RosterEntry>, RosterError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RosterError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(parse_listing(&text)?)
    }

    async fn photo(&self, entry: &RosterEntry) -> Result<Vec<u8>, RosterError> {
        fetch_photo(&self.client, entry, self.path.parent()).await
    }
}

/// Download an `http(s)` photo or read a local one.
async fn fetch_photo(
    client: &reqwest::Client,
    entry: &RosterEntry,
    base_dir: Option<&Path>,
) -> Result<Vec<u8>, RosterError> {
    let locator = entry
        .photo_url
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(RosterError::MissingPhoto)?;

    if locator.starts_with("http://") || locator.starts_with("https://") {
        let bytes = client.get(locator).send().await?.error_for_status()?.bytes().await?;
        return Ok(bytes.to_vec());
    }

    let path = match base_dir {
        Some(dir) if Path::new(locator).is_relative() => dir.join(locator),
        _ => PathBuf::from(locator),
    };
    tokio::fs::read(&path)
        .await
        .map_err(|source| RosterError::Io { path, source })
}

/// Build the roster index from `source`, encoding reference photos with
/// `encoder` on a blocking thread. The encoder is handed back afterwards.
pub async fn load_roster(
    source: &dyn RosterSource,
    mut encoder: Box<dyn FaceEncoder>,
) -> Result<(RosterIndex, Box<dyn FaceEncoder>), RosterError> {
    let entries = source.entries().await?;
    tracing::info!(entries = entries.len(), "fetching reference photos");

    let fetched: Vec<(RosterEntry, Result<Vec<u8>, RosterError>)> = stream::iter(entries)
        .map(|entry| async move {
            let photo = source.photo(&entry).await;
            (entry, photo)
        })
        .buffered(PHOTO_FETCH_CONCURRENCY)
        .collect()
        .await;

    let (index, encoder) = tokio::task::spawn_blocking(move || {
        let index = RosterIndex::build(fetched, |_, photo: Result<Vec<u8>, RosterError>| {
            let image = decode_image(&photo?)?;
            let encodings = encoder.encode(&image)?;
            Ok::<_, RosterError>(encodings.into_iter().map(|e| e.embedding).collect())
        });
        (index, encoder)
    })
    .await?;

    Ok((index, encoder))
}
