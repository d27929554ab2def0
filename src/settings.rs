//! Settings infrastructure for astrols.
//!
//! This module loads `astrols.toml` files that configure script isolation, extra
//! ambient declarations, framework integrations and logging.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::parser::INLINE_ATTRIBUTE;
use crate::virtual_code::{FrameworkRegistry, LanguageModule};

/// File name searched for by [`discover_settings`].
pub const SETTINGS_FILE: &str = "astrols.toml";

/// Root settings structure loaded from astrols.toml.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compiler: CompilerSettings,
    pub typescript: TypeScriptSettings,
    pub frameworks: FrameworkSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Attributes that opt a `<script>` out of module isolation.
    pub inline_attributes: Vec<String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            inline_attributes: vec![INLINE_ATTRIBUTE.to_string()],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TypeScriptSettings {
    /// Declaration files appended to the built-in globals.
    /// Paths are relative to the directory holding astrols.toml.
    pub ambient_declarations: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FrameworkSettings {
    /// File extensions of framework components importable from markup.
    pub enabled: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive, e.g. `debug` or `astrols=trace`.
    pub level: Option<String>,
}

/// Parse settings from TOML text.
pub fn parse_settings(content: &str) -> Result<Settings> {
    Ok(toml::from_str(content)?)
}

/// Load settings from an astrols.toml file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(content) => match parse_settings(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path.display(), e);
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Discover astrols.toml by searching up the directory tree, then direct children.
///
/// Search order:
/// 1. Walk up from `start_dir` to filesystem root
/// 2. If not found, check immediate child directories of `start_dir`
///
/// Returns `(settings, settings_dir)` where `settings_dir` is the directory
/// containing the found file (used for resolving relative paths).
/// If not found, returns `(Settings::default(), start_dir)`.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(SETTINGS_FILE);
        if candidate.is_file() {
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }

    if let Ok(entries) = std::fs::read_dir(start_dir) {
        let mut children: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        children.sort();
        for child in children {
            let candidate = child.join(SETTINGS_FILE);
            if candidate.is_file() {
                return (load_settings(&candidate), child);
            }
        }
    }

    (Settings::default(), start_dir.to_path_buf())
}

/// Read the configured declaration files and join them.
///
/// Unreadable files are skipped with a warning.
pub fn load_ambient_declarations(settings: &Settings, settings_dir: &Path) -> String {
    let mut declarations = String::new();
    for path in &settings.typescript.ambient_declarations {
        let full_path = if path.is_absolute() {
            path.clone()
        } else {
            settings_dir.join(path)
        };
        match read_declaration_file(&full_path) {
            Ok(content) => {
                declarations.push_str(&content);
                if !content.ends_with('\n') {
                    declarations.push('\n');
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
    declarations
}

fn read_declaration_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Build the language module described by the settings.
pub fn build_language_module(settings: &Settings, settings_dir: &Path) -> LanguageModule {
    LanguageModule::new(settings.compiler.inline_attributes.clone())
        .with_extra_declarations(&load_ambient_declarations(settings, settings_dir))
        .with_frameworks(FrameworkRegistry::with_shims(&settings.frameworks.enabled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_code::LanguageKind;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_sections_missing() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings.compiler.inline_attributes, vec!["is:inline"]);
        assert!(settings.typescript.ambient_declarations.is_empty());
        assert!(settings.frameworks.enabled.is_empty());
        assert!(settings.log.level.is_none());
    }

    #[test]
    fn parse_all_sections() {
        let settings = parse_settings(
            r#"
[compiler]
inline_attributes = ["is:inline", "data-inline"]

[typescript]
ambient_declarations = ["env.d.ts"]

[frameworks]
enabled = ["vue"]

[log]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(settings.compiler.inline_attributes.len(), 2);
        assert_eq!(
            settings.typescript.ambient_declarations,
            vec![PathBuf::from("env.d.ts")]
        );
        assert_eq!(settings.frameworks.enabled, vec!["vue"]);
        assert_eq!(settings.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn malformed_settings_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "[compiler\ninline_attributes = 3").unwrap();

        assert!(matches!(
            parse_settings("[compiler]\ninline_attributes = 3"),
            Err(Error::Settings(_))
        ));
        let settings = load_settings(&path);
        assert_eq!(settings.compiler.inline_attributes, vec!["is:inline"]);
    }

    #[test]
    fn discover_settings_in_current_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            "[frameworks]\nenabled = [\"svelte\"]\n",
        )
        .unwrap();

        let (settings, settings_dir) = discover_settings(dir.path());
        assert_eq!(settings_dir, dir.path());
        assert_eq!(settings.frameworks.enabled, vec!["svelte"]);
    }

    #[test]
    fn discover_settings_in_parent_dir() {
        let parent = TempDir::new().unwrap();
        let child = parent.path().join("src").join("pages");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(
            parent.path().join(SETTINGS_FILE),
            "[log]\nlevel = \"warn\"\n",
        )
        .unwrap();

        let (settings, settings_dir) = discover_settings(&child);
        assert_eq!(settings_dir, parent.path());
        assert_eq!(settings.log.level.as_deref(), Some("warn"));
    }

    #[test]
    fn discover_settings_in_child_dir() {
        let parent = TempDir::new().unwrap();
        let child = parent.path().join("site");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(
            child.join(SETTINGS_FILE),
            "[compiler]\ninline_attributes = [\"data-raw\"]\n",
        )
        .unwrap();

        let (settings, settings_dir) = discover_settings(parent.path());
        assert_eq!(settings_dir, child);
        assert_eq!(settings.compiler.inline_attributes, vec!["data-raw"]);
    }

    #[test]
    fn discover_settings_parent_preferred_over_child() {
        let parent = TempDir::new().unwrap();
        let child = parent.path().join("nested");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(parent.path().join(SETTINGS_FILE), "[log]\nlevel = \"info\"\n").unwrap();
        std::fs::write(child.join(SETTINGS_FILE), "[log]\nlevel = \"trace\"\n").unwrap();

        let (settings, settings_dir) = discover_settings(parent.path());
        assert_eq!(settings_dir, parent.path());
        assert_eq!(settings.log.level.as_deref(), Some("info"));
    }

    #[test]
    fn ambient_declarations_are_read_relative_to_settings_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("env.d.ts"), "declare const SITE: string;").unwrap();
        let settings = parse_settings(
            "[typescript]\nambient_declarations = [\"env.d.ts\", \"missing.d.ts\"]\n",
        )
        .unwrap();

        let declarations = load_ambient_declarations(&settings, dir.path());
        assert_eq!(declarations, "declare const SITE: string;\n");
    }

    #[test]
    fn language_module_from_settings() {
        let dir = TempDir::new().unwrap();
        let settings = parse_settings(
            "[compiler]\ninline_attributes = [\"data-raw\"]\n[frameworks]\nenabled = [\"vue\"]\n",
        )
        .unwrap();

        let module = build_language_module(&settings, dir.path());
        assert_eq!(module.inline_attributes(), ["data-raw".to_string()]);
        assert_eq!(
            module.kind_of("/x/Counter.vue"),
            LanguageKind::Framework("vue".to_string())
        );
    }
}
