use std::cell::Cell;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;
use tracing::{debug, warn};

use super::catalog::{CharacterCatalog, CharacterDefinition};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("no character definition named '{character_class}'")]
    UnknownCharacter { character_class: String },
    #[error("loader for '{character_class}' stopped without a result")]
    Abandoned { character_class: String },
    #[error("loading '{character_class}' timed out after {seconds:.1}s")]
    TimedOut {
        character_class: String,
        seconds: f32,
    },
    #[error("loading '{character_class}' failed: {reason}")]
    Failed {
        character_class: String,
        reason: String,
    },
}

pub type LoadResult = Result<CharacterDefinition, LoadError>;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadPoll {
    Pending,
    Ready(LoadResult),
}

/// In-flight asset resolution for one character class.
#[derive(Debug)]
pub struct PendingCharacter {
    character_class: String,
    receiver: Receiver<LoadResult>,
}

impl PendingCharacter {
    /// Returns the sending half a worker completes, plus the handle the caller polls.
    pub fn channel(character_class: impl Into<String>) -> (Sender<LoadResult>, Self) {
        let (sender, receiver) = bounded(1);
        (
            sender,
            Self {
                character_class: character_class.into(),
                receiver,
            },
        )
    }

    /// Already resolved.
    pub fn ready(character_class: impl Into<String>, result: LoadResult) -> Self {
        let (sender, pending) = Self::channel(character_class);
        let _ = sender.send(result);
        pending
    }

    pub fn character_class(&self) -> &str {
        &self.character_class
    }

    pub fn poll(&self) -> LoadPoll {
        match self.receiver.try_recv() {
            Ok(result) => LoadPoll::Ready(result),
            Err(TryRecvError::Empty) => LoadPoll::Pending,
            Err(TryRecvError::Disconnected) => LoadPoll::Ready(Err(self.abandoned())),
        }
    }

    /// Blocks up to `timeout` for the result.
    pub fn wait(&self, timeout: Duration) -> LoadPoll {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => LoadPoll::Ready(result),
            Err(RecvTimeoutError::Timeout) => LoadPoll::Pending,
            Err(RecvTimeoutError::Disconnected) => LoadPoll::Ready(Err(self.abandoned())),
        }
    }

    fn abandoned(&self) -> LoadError {
        LoadError::Abandoned {
            character_class: self.character_class.clone(),
        }
    }
}

/// Resolves a character class to its definition without blocking the caller.
pub trait CharacterLoader {
    fn resolve(&self, character_class: &str) -> PendingCharacter;
}

#[derive(Debug, Clone, Default)]
pub struct CatalogLoaderConfig {
    /// Artificial delay before each lookup completes.
    pub latency: Duration,
    /// Classes whose resolution always fails.
    pub fail_classes: HashSet<String>,
}

impl CatalogLoaderConfig {
    pub fn with_fail_classes(mut self, raw: &str) -> Self {
        self.fail_classes = raw
            .split(',')
            .map(str::trim)
            .filter(|class| !class.is_empty())
            .map(str::to_string)
            .collect();
        self
    }
}

/// Looks definitions up in a compiled catalog on short-lived worker threads.
#[derive(Debug)]
pub struct CatalogLoader {
    catalog: Arc<CharacterCatalog>,
    config: CatalogLoaderConfig,
    next_worker: Cell<u64>,
}

impl CatalogLoader {
    pub fn new(catalog: Arc<CharacterCatalog>, config: CatalogLoaderConfig) -> Self {
        Self {
            catalog,
            config,
            next_worker: Cell::new(0),
        }
    }

    fn lookup(
        catalog: &CharacterCatalog,
        character_class: &str,
        forced_failure: bool,
    ) -> LoadResult {
        if forced_failure {
            return Err(LoadError::Failed {
                character_class: character_class.to_string(),
                reason: "failure forced by configuration".to_string(),
            });
        }
        catalog
            .get(character_class)
            .cloned()
            .ok_or_else(|| LoadError::UnknownCharacter {
                character_class: character_class.to_string(),
            })
    }
}

impl CharacterLoader for CatalogLoader {
    fn resolve(&self, character_class: &str) -> PendingCharacter {
        let worker_id = self.next_worker.get();
        self.next_worker.set(worker_id.wrapping_add(1));

        let (sender, pending) = PendingCharacter::channel(character_class);
        let catalog = Arc::clone(&self.catalog);
        let latency = self.config.latency;
        let forced_failure = self.config.fail_classes.contains(character_class);
        let class = character_class.to_string();

        let spawned = thread::Builder::new()
            .name(format!("character-load-{worker_id}"))
            .spawn(move || {
                if !latency.is_zero() {
                    thread::sleep(latency);
                }
                let result = Self::lookup(&catalog, &class, forced_failure);
                if sender.send(result).is_err() {
                    debug!(character_class = %class, "character_load_result_dropped");
                }
            });

        match spawned {
            Ok(_) => pending,
            Err(error) => {
                warn!(character_class, error = %error, "character_load_worker_spawn_failed");
                PendingCharacter::ready(
                    character_class,
                    Err(LoadError::Failed {
                        character_class: character_class.to_string(),
                        reason: format!("could not start loader thread: {error}"),
                    }),
                )
            }
        }
    }
}
