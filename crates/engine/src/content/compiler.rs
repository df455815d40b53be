use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, info};

use crate::AppPaths;

use super::catalog::{CharacterCatalog, CharacterDefinition, DEFAULT_MOVE_SPEED};
use super::discovery::{discover_mod_sources, CatalogRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInMod,
}

#[derive(Debug, Clone)]
pub struct CatalogError {
    pub code: CatalogErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (mod={}, file={}, line={}, column={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (mod={}, file={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Reads `<CharacterDef>` entries from base content and every enabled mod, in load order.
pub fn compile_character_catalog(
    app_paths: &AppPaths,
    request: &CatalogRequest,
) -> Result<CharacterCatalog, CatalogError> {
    let sources = discover_mod_sources(app_paths, request)?;

    let mut merged = BTreeMap::<String, CharacterDefinition>::new();

    for source in sources {
        let xml_files = collect_xml_files_sorted(&source.source_dir)
            .map_err(|error| read_error(&source.mod_id, error.path, error.source))?;
        let mut seen_in_mod = HashSet::<String>::new();

        for xml_file in xml_files {
            let raw = fs::read_to_string(&xml_file)
                .map_err(|source_err| read_error(&source.mod_id, xml_file.clone(), source_err))?;
            let defs = parse_defs_document(&source.mod_id, &xml_file, &raw)?;
            for def in defs {
                if !seen_in_mod.insert(def.def_name.clone()) {
                    return Err(CatalogError {
                        code: CatalogErrorCode::DuplicateDefInMod,
                        message: format!(
                            "duplicate CharacterDef '{}' in mod '{}'",
                            def.def_name, source.mod_id
                        ),
                        mod_id: source.mod_id.clone(),
                        file_path: xml_file.clone(),
                        location: None,
                    });
                }
                if merged.contains_key(&def.def_name) {
                    debug!(
                        def_name = %def.def_name,
                        mod_id = %source.mod_id,
                        "character_def_overridden"
                    );
                }
                merged.insert(def.def_name.clone(), def);
            }
        }
    }

    let catalog: CharacterCatalog = merged.into_values().collect();
    info!(
        definitions = catalog.len(),
        enabled_mods = request.enabled_mods.len(),
        "character_catalog_compiled"
    );
    Ok(catalog)
}

fn parse_defs_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
) -> Result<Vec<CharacterDefinition>, CatalogError> {
    let doc = Document::parse(raw).map_err(|error| CatalogError {
        code: CatalogErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = ParseContext {
        mod_id,
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            CatalogErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "CharacterDef" {
            return Err(ctx.error_at(
                CatalogErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; expected <CharacterDef>",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        defs.push(parse_character_def(&ctx, child)?);
    }

    Ok(defs)
}

struct ParseContext<'a, 'input> {
    mod_id: &'a str,
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl ParseContext<'_, '_> {
    fn error_at(
        &self,
        code: CatalogErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> CatalogError {
        let pos = self.doc.text_pos_at(node.range().start);
        CatalogError {
            code,
            message,
            mod_id: self.mod_id.to_string(),
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }

    fn required_text(&self, node: Node<'_, '_>, field_name: &str) -> Result<String, CatalogError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                CatalogErrorCode::MissingField,
                format!("field <{field_name}> must not be empty"),
                node,
            ));
        }
        Ok(value)
    }

    fn non_negative_number(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<f32, CatalogError> {
        let value = self.required_text(node, field_name)?;
        let parsed = value.parse::<f32>().map_err(|_| {
            self.error_at(
                CatalogErrorCode::InvalidValue,
                format!("{field_name} '{value}' is not a valid number"),
                node,
            )
        })?;
        if !parsed.is_finite() || parsed < 0.0 {
            return Err(self.error_at(
                CatalogErrorCode::InvalidValue,
                format!("{field_name} must be finite and >= 0"),
                node,
            ));
        }
        Ok(parsed)
    }

    fn missing(&self, node: Node<'_, '_>, field_name: &str) -> CatalogError {
        self.error_at(
            CatalogErrorCode::MissingField,
            format!("missing required field <{field_name}> in <CharacterDef>"),
            node,
        )
    }
}

fn parse_character_def(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<CharacterDefinition, CatalogError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut move_speed: Option<f32> = None;
    let mut intro_seconds: Option<f32> = None;
    let mut avatar: Option<String> = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(ctx.error_at(
                CatalogErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <CharacterDef>"),
                field,
            ));
        }

        match field_name.as_str() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "label" => label = Some(ctx.required_text(field, "label")?),
            "moveSpeed" => move_speed = Some(ctx.non_negative_number(field, "moveSpeed")?),
            "introSeconds" => {
                intro_seconds = Some(ctx.non_negative_number(field, "introSeconds")?)
            }
            "avatar" => avatar = Some(ctx.required_text(field, "avatar")?),
            "tags" => {}
            _ => {
                return Err(ctx.error_at(
                    CatalogErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <CharacterDef>"),
                    field,
                ))
            }
        }
    }

    let Some(def_name) = def_name else {
        return Err(ctx.missing(node, "defName"));
    };
    let Some(label) = label else {
        return Err(ctx.missing(node, "label"));
    };

    Ok(CharacterDefinition {
        def_name,
        label,
        move_speed: move_speed.unwrap_or(DEFAULT_MOVE_SPEED),
        intro_seconds: intro_seconds.unwrap_or(0.0),
        avatar,
    })
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_cached_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(mod_id: &str, path: PathBuf, source: std::io::Error) -> CatalogError {
    CatalogError {
        code: CatalogErrorCode::ReadFile,
        message: format!("failed to read content: {source}"),
        mod_id: mod_id.to_string(),
        file_path: path,
        location: None,
    }
}
