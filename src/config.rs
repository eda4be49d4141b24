//! Project configuration loader describing entries, aliases and output naming.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::asset_paths::{
    AssetClassifier, DEFAULT_ASSET_PATTERNS, OutputLayout, normalise_public_base,
};
use crate::project::{BuildOptions, lexical_clean};
use crate::resolve::{AliasTable, canonical};

/// File name looked up in the project root when no configuration path is given.
pub const DEFAULT_CONFIG_FILE: &str = "webview.config.json";

/// Discoverable project configuration.
///
/// Every field is optional in the JSON file; omitted fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root, relative to the directory holding the configuration file.
    pub root: String,
    /// HTML entry document relative to the root, or `null` for script-only builds.
    pub html_entry: Option<String>,
    /// Additional script entries relative to the root.
    pub entries: Vec<String>,
    /// Public base prefixed to every emitted URL.
    pub base: String,
    /// Alias prefix to directory (relative to the root).
    pub alias: BTreeMap<String, String>,
    /// Output root, relative to the project root.
    pub out_dir: String,
    /// Replace the output root's previous contents.
    pub empty_out_dir: bool,
    /// Fixed file name of the first entry chunk.
    pub entry_file_names: String,
    /// Pattern for every other chunk.
    pub chunk_file_names: String,
    /// Pattern for emitted assets.
    pub asset_file_names: String,
    /// Glob patterns (`**/*.ext`) of additional passthrough assets.
    pub assets_include: Vec<String>,
    /// Extensions tried, in order, for extension-less specifiers.
    pub resolve_extensions: Vec<String>,
    /// Directory copied verbatim into the output root.
    pub public_dir: String,
    /// Build mode exposed as `import.meta.env.MODE`.
    pub mode: String,
    /// Write `manifest.json` next to the bundle.
    pub manifest: bool,
    /// Accepted for compatibility; source maps are never emitted.
    pub sourcemap: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: ".".into(),
            html_entry: Some("index.html".into()),
            entries: Vec::new(),
            base: "./".into(),
            alias: BTreeMap::from([("@".to_string(), ".".to_string())]),
            out_dir: "../assets".into(),
            empty_out_dir: true,
            entry_file_names: "main.js".into(),
            chunk_file_names: "chunks/[name].js".into(),
            asset_file_names: "assets/[name].[ext]".into(),
            assets_include: DEFAULT_ASSET_PATTERNS.iter().map(|p| p.to_string()).collect(),
            resolve_extensions: vec![".mjs".into(), ".js".into(), ".json".into()],
            public_dir: "public".into(),
            mode: "production".into(),
            manifest: false,
            sourcemap: false,
        }
    }
}

/// Errors that can occur while loading or validating the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Io {
        /// Path that caused the error.
        path: PathBuf,
        /// Source I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the JSON configuration file.
    Parse {
        /// Path that caused the error.
        path: PathBuf,
        /// Source parse error.
        source: serde_json::Error,
    },
    /// A value is well-formed JSON but cannot be used.
    Invalid(String),
}

impl ProjectConfig {
    /// Load `webview.config.json` from `dir`, falling back to defaults when it does not exist.
    ///
    /// A file that exists but cannot be read or parsed is still an error.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        match fs::read_to_string(&candidate) {
            Ok(contents) => Self::parse(&candidate, &contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "no {} in {}, using defaults",
                    DEFAULT_CONFIG_FILE,
                    dir.display()
                );
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Io {
                path: candidate,
                source: err,
            }),
        }
    }

    /// Read configuration from a specific JSON file, which must exist.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::parse(path, &contents)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            source: err,
        })
    }

    /// Validate the configuration and resolve it against `config_dir` into build options.
    pub fn into_options(self, config_dir: &Path) -> Result<BuildOptions, ConfigError> {
        let root_path = config_dir.join(&self.root);
        let root = canonical(&root_path).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "project root {} does not exist",
                root_path.display()
            ))
        })?;

        let base = normalise_public_base(&self.base).map_err(ConfigError::Invalid)?;
        let layout = OutputLayout {
            entry_file_name: self.entry_file_names,
            chunk_pattern: self.chunk_file_names,
            asset_pattern: self.asset_file_names,
        };
        layout.validate().map_err(ConfigError::Invalid)?;

        let html_entry = self
            .html_entry
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| lexical_clean(&root.join(entry)));
        let entries: Vec<PathBuf> = self
            .entries
            .iter()
            .map(|entry| lexical_clean(&root.join(entry)))
            .collect();
        if html_entry.is_none() && entries.is_empty() {
            return Err(ConfigError::Invalid(
                "configure an html_entry or at least one script entry".into(),
            ));
        }

        let aliases = AliasTable::from_config(&self.alias, &root).map_err(ConfigError::Invalid)?;
        let classifier = AssetClassifier::from_patterns(&self.assets_include, html_entry.clone())
            .map_err(ConfigError::Invalid)?;

        let mut extensions = Vec::with_capacity(self.resolve_extensions.len());
        for extension in self.resolve_extensions {
            let extension = extension.trim();
            if extension.is_empty() {
                continue;
            }
            let extension = if extension.starts_with('.') {
                extension.to_string()
            } else {
                format!(".{extension}")
            };
            if !extensions.contains(&extension) {
                extensions.push(extension);
            }
        }

        if self.sourcemap {
            tracing::warn!("`sourcemap` is set but source maps are not emitted");
        }

        Ok(BuildOptions {
            out_dir: lexical_clean(&root.join(&self.out_dir)),
            public_dir: root.join(&self.public_dir),
            root,
            html_entry,
            entries,
            base,
            aliases,
            classifier,
            layout,
            extensions,
            clean: self.empty_out_dir,
            mode: self.mode,
            write_manifest: self.manifest,
        })
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            Self::Invalid(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}
