//! Artifact transports
//!
//! Every model and table is fetched by name through [`ArtifactSource`].
//! Retries and timeouts live here, in the transport, never in the engine.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{PredictionError, Result};

/// Fetches raw artifact bytes by name
pub trait ArtifactSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Vec<u8>>;

    /// Human-readable location, used in logs
    fn describe(&self) -> String;
}

/// Artifacts stored as files in one directory
#[derive(Debug, Clone)]
pub struct FsArtifactSource {
    root: PathBuf,
}

impl FsArtifactSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSource for FsArtifactSource {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        // names are flat file names; never let one escape the root
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(PredictionError::ArtifactLoad {
                name: name.to_string(),
                reason: "artifact names must be plain file names".to_string(),
            });
        }
        let path = self.root.join(name);
        debug!("Reading artifact {:?}", path);
        fs::read(&path).map_err(|e| PredictionError::ArtifactLoad {
            name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// In-process artifacts, for tests and callers embedding their own models
#[derive(Debug, Default)]
pub struct MemoryArtifactSource {
    artifacts: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.artifacts.write().insert(name.into(), bytes.into());
    }

    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.artifacts.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

impl ArtifactSource for MemoryArtifactSource {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.artifacts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PredictionError::ArtifactLoad {
                name: name.to_string(),
                reason: "not present in memory source".to_string(),
            })
    }

    fn describe(&self) -> String {
        format!("memory ({} artifacts)", self.len())
    }
}

#[cfg(feature = "remote")]
pub use remote::{HttpArtifactSource, HttpSourceConfig};

#[cfg(feature = "remote")]
mod remote {
    use std::time::Duration;

    use tracing::warn;

    use super::ArtifactSource;
    use crate::error::{PredictionError, Result};

    /// HTTP transport configuration
    #[derive(Debug, Clone)]
    pub struct HttpSourceConfig {
        /// Request timeout in seconds
        pub timeout_secs: u64,
        /// Max attempts per artifact
        pub max_retries: u32,
        /// Base backoff between attempts in milliseconds
        pub backoff_ms: u64,
    }

    impl Default for HttpSourceConfig {
        fn default() -> Self {
            Self {
                timeout_secs: 30,
                max_retries: 3,
                backoff_ms: 500,
            }
        }
    }

    /// Artifacts served from a blob store over HTTP(S)
    pub struct HttpArtifactSource {
        client: reqwest::blocking::Client,
        base_url: String,
        config: HttpSourceConfig,
    }

    impl HttpArtifactSource {
        pub fn new(base_url: impl Into<String>, config: HttpSourceConfig) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| PredictionError::ArtifactLoad {
                    name: "<client>".to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                config,
            })
        }

        fn url(&self, name: &str) -> String {
            format!("{}/{}", self.base_url, name)
        }
    }

    impl ArtifactSource for HttpArtifactSource {
        fn load(&self, name: &str) -> Result<Vec<u8>> {
            let url = self.url(name);
            let mut last_error = String::from("no attempts made");

            for attempt in 0..self.config.max_retries {
                match self.client.get(&url).send() {
                    Ok(response) if response.status().is_success() => {
                        return response.bytes().map(|b| b.to_vec()).map_err(|e| {
                            PredictionError::ArtifactLoad {
                                name: name.to_string(),
                                reason: e.to_string(),
                            }
                        });
                    }
                    Ok(response) => {
                        last_error = format!("HTTP {}", response.status());
                        // a missing artifact will not appear on retry
                        if response.status().is_client_error() {
                            break;
                        }
                    }
                    Err(e) => last_error = e.to_string(),
                }

                warn!(
                    "Fetching {} failed (attempt {}/{}): {}",
                    url,
                    attempt + 1,
                    self.config.max_retries,
                    last_error
                );
                if attempt + 1 < self.config.max_retries {
                    std::thread::sleep(Duration::from_millis(
                        self.config.backoff_ms * (attempt as u64 + 1),
                    ));
                }
            }

            Err(PredictionError::ArtifactLoad {
                name: name.to_string(),
                reason: format!("{}: {}", url, last_error),
            })
        }

        fn describe(&self) -> String {
            format!("remote {}", self.base_url)
        }
    }
}
