use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod board;
pub mod content;
pub mod events;
pub mod grid;
pub mod room;
pub mod roster;

pub use app::{
    run_app, run_app_with_metrics, LoopConfig, LoopExit, LoopMetricsSnapshot, LoopSummary,
    MetricsHandle, Scene, SceneCommand, SLOW_FRAME_ENV_VAR, TPS_ENV_VAR,
};
pub use board::{Board, BoardError, GridBoard};
pub use content::{
    compile_character_catalog, CatalogError, CatalogErrorCode, CatalogLoader, CatalogLoaderConfig,
    CatalogRequest, CharacterCatalog, CharacterDefinition, CharacterLoader, LoadError, LoadPoll,
    LoadResult, PendingCharacter, SourceLocation,
};
pub use events::{EventBus, Handler, HandlerError, Notification, NotificationKind};
pub use grid::{Coordinates, GridBounds};
pub use room::{
    CharacterRosterEntry, CharacterStats, RangedStat, RoomCommand, RoomError, RoomEvent,
    RoomEventKind, RoomOutbox, RoomSession, RoomSubscription, SubscriptionId,
};
pub use roster::{
    CharacterController, MoveError, MoveOutcome, MoveTicket, MovementTuning, RosterConfig,
    RosterDeps, RosterManager, RosterState,
};

pub const ROOT_ENV_VAR: &str = "TILEROOM_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub base_content_dir: PathBuf,
    pub mods_dir: PathBuf,
}

impl AppPaths {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            base_content_dir: root.join("assets").join("base"),
            mods_dir: root.join("mods"),
            root,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "TILEROOM_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/tileroom\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    resolve_root().map(AppPaths::from_root)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
