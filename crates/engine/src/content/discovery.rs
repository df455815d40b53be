use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::AppPaths;

use super::compiler::{CatalogError, CatalogErrorCode};

#[derive(Debug, Clone, Default)]
pub struct CatalogRequest {
    /// Mod ids in load order. Later mods override earlier definitions.
    pub enabled_mods: Vec<String>,
}

impl CatalogRequest {
    /// Parses a comma separated mod list, skipping blank entries.
    pub fn from_mod_list(raw: &str) -> Self {
        Self {
            enabled_mods: raw
                .split(',')
                .map(str::trim)
                .filter(|mod_id| !mod_id.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ModSource {
    pub mod_id: String,
    pub source_dir: PathBuf,
}

pub(crate) fn discover_mod_sources(
    app_paths: &AppPaths,
    request: &CatalogRequest,
) -> Result<Vec<ModSource>, CatalogError> {
    let mut seen = HashSet::<String>::new();
    let mut sources = vec![ModSource {
        mod_id: "base".to_string(),
        source_dir: app_paths.base_content_dir.clone(),
    }];

    for mod_id in &request.enabled_mods {
        let trimmed = mod_id.trim();
        if trimmed.is_empty() {
            return Err(discovery_error(
                "<discovery>",
                &app_paths.mods_dir,
                "enabled mod id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(discovery_error(
                trimmed,
                &app_paths.mods_dir,
                format!("mod '{trimmed}' is enabled more than once"),
            ));
        }
        let mod_dir = app_paths.mods_dir.join(trimmed);
        ensure_dir_exists(trimmed, &mod_dir)?;
        sources.push(ModSource {
            mod_id: trimmed.to_string(),
            source_dir: mod_dir,
        });
    }

    Ok(sources)
}

fn ensure_dir_exists(mod_id: &str, path: &Path) -> Result<(), CatalogError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(discovery_error(
            mod_id,
            path,
            format!(
                "enabled mod '{}' not found at {}; check enabled mod list",
                mod_id,
                path.display()
            ),
        ))
    }
}

fn discovery_error(mod_id: &str, path: &Path, message: String) -> CatalogError {
    CatalogError {
        code: CatalogErrorCode::Discovery,
        message,
        mod_id: mod_id.to_string(),
        file_path: path.to_path_buf(),
        location: None,
    }
}
