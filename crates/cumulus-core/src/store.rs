use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::error::BoundaryError;
use crate::settings::{StoreSettings, StudioSettings};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;

/// Conventional 2xx success range.
pub fn is_success(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// Where serialized designs live. Implementations only move bytes; they never
/// interpret the payload.
///
/// Status codes follow HTTP conventions even for local backends so callers
/// branch the same way regardless of where a design is stored.
#[async_trait]
pub trait DesignStore: Send + Sync {
    async fn save(&self, name: &str, data: &str) -> Result<u16, BoundaryError>;
    async fn load(&self, name: &str) -> Result<(u16, String), BoundaryError>;
    async fn list(&self) -> Result<Vec<String>, BoundaryError>;
}

/// Build the store selected in settings.
pub fn open_store(settings: &StudioSettings) -> Box<dyn DesignStore> {
    match &settings.store {
        StoreSettings::File => Box::new(FileDesignStore::new(crate::settings::designs_dir())),
        StoreSettings::Http { base_url } => Box::new(HttpDesignStore::new(base_url.clone())),
    }
}

const DESIGN_SUFFIX: &str = ".design.json";

fn valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
}

// --- File backend ---

/// One JSON file per design under a directory (by default `~/.cumulus/designs`).
pub struct FileDesignStore {
    dir: PathBuf,
}

impl FileDesignStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, DESIGN_SUFFIX))
    }
}

#[async_trait]
impl DesignStore for FileDesignStore {
    /// Atomic write (temp file + rename) so a reader never sees a truncated design.
    async fn save(&self, name: &str, data: &str) -> Result<u16, BoundaryError> {
        if !valid_name(name) {
            return Ok(STATUS_BAD_REQUEST);
        }
        let io = |e: std::io::Error| BoundaryError::Transport(e.to_string());
        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;
        let path = self.path_for(name);
        let existed = tokio::fs::try_exists(&path).await.map_err(io)?;
        let tmp = self.dir.join(format!(".{}{}.tmp", name, DESIGN_SUFFIX));
        tokio::fs::write(&tmp, data).await.map_err(io)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io)?;
        Ok(if existed { STATUS_OK } else { STATUS_CREATED })
    }

    async fn load(&self, name: &str) -> Result<(u16, String), BoundaryError> {
        if !valid_name(name) {
            return Ok((STATUS_BAD_REQUEST, String::new()));
        }
        match tokio::fs::read_to_string(self.path_for(name)).await {
            Ok(data) => Ok((STATUS_OK, data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((STATUS_NOT_FOUND, String::new())),
            Err(e) => Err(BoundaryError::Transport(e.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<String>, BoundaryError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(BoundaryError::Transport(e.to_string())),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BoundaryError::Transport(e.to_string()))?
        {
            let file = entry.file_name().to_string_lossy().to_string();
            if let Some(name) = file.strip_suffix(DESIGN_SUFFIX) {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

// --- HTTP backend ---

/// Remote design service: `PUT`/`GET {base}/designs/{name}`, `GET {base}/designs`.
pub struct HttpDesignStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDesignStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, name: Option<&str>) -> Result<reqwest::Url, BoundaryError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| BoundaryError::Transport(format!("bad store url '{}': {e}", self.base_url)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BoundaryError::Transport(format!("store url '{}' cannot take a path", self.base_url)))?;
            segments.pop_if_empty().push("designs");
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }
}

fn transport(e: reqwest::Error) -> BoundaryError {
    BoundaryError::Transport(e.to_string())
}

#[async_trait]
impl DesignStore for HttpDesignStore {
    async fn save(&self, name: &str, data: &str) -> Result<u16, BoundaryError> {
        let response = self
            .client
            .put(self.url(Some(name))?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(data.to_string())
            .send()
            .await
            .map_err(transport)?;
        Ok(response.status().as_u16())
    }

    async fn load(&self, name: &str) -> Result<(u16, String), BoundaryError> {
        let response = self
            .client
            .get(self.url(Some(name))?)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;
        Ok((status, body))
    }

    async fn list(&self) -> Result<Vec<String>, BoundaryError> {
        let response = self.client.get(self.url(None)?).send().await.map_err(transport)?;
        let status = response.status().as_u16();
        if !is_success(status) {
            return Err(BoundaryError::Status {
                operation: "list",
                code: status,
            });
        }
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| BoundaryError::Payload(e.to_string()))
    }
}

// --- In-memory backend ---

/// Process-local store. Handy for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryDesignStore {
    designs: Mutex<BTreeMap<String, String>>,
}

impl MemoryDesignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DesignStore for MemoryDesignStore {
    async fn save(&self, name: &str, data: &str) -> Result<u16, BoundaryError> {
        if !valid_name(name) {
            return Ok(STATUS_BAD_REQUEST);
        }
        let previous = self.designs.lock().await.insert(name.to_string(), data.to_string());
        Ok(if previous.is_some() { STATUS_OK } else { STATUS_CREATED })
    }

    async fn load(&self, name: &str) -> Result<(u16, String), BoundaryError> {
        Ok(match self.designs.lock().await.get(name) {
            Some(data) => (STATUS_OK, data.clone()),
            None => (STATUS_NOT_FOUND, String::new()),
        })
    }

    async fn list(&self) -> Result<Vec<String>, BoundaryError> {
        Ok(self.designs.lock().await.keys().cloned().collect())
    }
}
