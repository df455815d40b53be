use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tileroom_engine::{
    compile_character_catalog, resolve_app_paths, CatalogError, CatalogLoader,
    CatalogLoaderConfig, CatalogRequest, LoopConfig, RosterConfig, StartupError,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::script::{SessionScript, SessionScriptError};
use super::session::GameSession;

const ENABLED_MODS_ENV_VAR: &str = "TILEROOM_ENABLED_MODS";
const PLAYER_ID_ENV_VAR: &str = "TILEROOM_PLAYER_ID";
const LOAD_LATENCY_ENV_VAR: &str = "TILEROOM_LOAD_LATENCY_MS";
const FAIL_CLASSES_ENV_VAR: &str = "TILEROOM_FAIL_CLASSES";
const DEFAULT_SESSION_FILE: &str = "demo.json";

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Script(#[from] SessionScriptError),
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) session: GameSession,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Tileroom Startup ===");

    let app_paths = resolve_app_paths()?;
    let request = CatalogRequest::from_mod_list(&env_or_empty(ENABLED_MODS_ENV_VAR));
    let catalog = compile_character_catalog(&app_paths, &request)?;
    info!(
        root = %app_paths.root.display(),
        mods = request.enabled_mods.len(),
        definitions = catalog.len(),
        "character_catalog_ready"
    );

    let session_path = session_path(env::args().nth(1), &app_paths.root);
    let mut script = SessionScript::load(&session_path)?;
    if let Some(player_id) = non_empty(env_or_empty(PLAYER_ID_ENV_VAR)) {
        script.player_id = player_id;
    }
    info!(
        path = %session_path.display(),
        player_id = script.player_id.as_str(),
        events = script.events.len(),
        clicks = script.clicks.len(),
        "session_script_loaded"
    );

    let loader_config = CatalogLoaderConfig {
        latency: parse_latency(&env_or_empty(LOAD_LATENCY_ENV_VAR))?,
        ..CatalogLoaderConfig::default()
    }
    .with_fail_classes(&env_or_empty(FAIL_CLASSES_ENV_VAR));
    let loader = CatalogLoader::new(Arc::new(catalog), loader_config);

    Ok(AppWiring {
        config: LoopConfig::default().with_env_overrides(),
        session: GameSession::new(script, Box::new(loader), RosterConfig::default()),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn env_or_empty(var: &str) -> String {
    env::var(var).unwrap_or_default()
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn session_path(arg: Option<String>, root: &Path) -> PathBuf {
    match arg.and_then(non_empty) {
        Some(path) => PathBuf::from(path),
        None => root.join("sessions").join(DEFAULT_SESSION_FILE),
    }
}

fn parse_latency(raw: &str) -> Result<Duration, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Duration::ZERO);
    }
    trimmed
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| AppError::InvalidEnv {
            var: LOAD_LATENCY_ENV_VAR,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_path_defaults_under_root() {
        let root = Path::new("/srv/tileroom");
        assert_eq!(
            session_path(None, root),
            Path::new("/srv/tileroom/sessions/demo.json")
        );
        assert_eq!(
            session_path(Some("  ".to_string()), root),
            Path::new("/srv/tileroom/sessions/demo.json")
        );
        assert_eq!(
            session_path(Some("custom.json".to_string()), root),
            Path::new("custom.json")
        );
    }

    #[test]
    fn latency_parses_millis_or_rejects() {
        assert_eq!(parse_latency("").expect("empty"), Duration::ZERO);
        assert_eq!(
            parse_latency(" 250 ").expect("millis"),
            Duration::from_millis(250)
        );
        assert!(matches!(
            parse_latency("soon"),
            Err(AppError::InvalidEnv {
                var: LOAD_LATENCY_ENV_VAR,
                ..
            })
        ));
    }
}
