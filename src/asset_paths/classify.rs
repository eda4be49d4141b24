//! Routing of source files into scripts, passthrough assets and the HTML entry.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::models::Classification;

/// Web asset extensions the bundler always passes through, regardless of configuration.
pub const BUILTIN_ASSET_EXTENSIONS: &[&str] = &[
    "apng", "avif", "gif", "ico", "jfif", "jpeg", "jpg", "pjp", "pjpeg", "png", "svg", "webp",
    "aac", "flac", "m4a", "mov", "mp4", "opus", "wav", "webm", "vtt", "eot", "otf", "ttf",
    "woff", "woff2", "css", "pdf", "txt", "webmanifest",
];

/// Asset patterns required by Three.js scenes: models, materials, textures, point clouds, audio.
pub const DEFAULT_ASSET_PATTERNS: &[&str] = &[
    "**/*.gltf",
    "**/*.glb",
    "**/*.babylon",
    "**/*.obj",
    "**/*.mtl",
    "**/*.hdr",
    "**/*.tga",
    "**/*.pcb",
    "**/*.pcd",
    "**/*.prwm",
    "**/*.mat",
    "**/*.mp3",
    "**/*.ogg",
];

/// Pure classifier deciding how each discovered file is handled.
#[derive(Debug, Clone)]
pub struct AssetClassifier {
    extensions: BTreeSet<String>,
    html_entry: Option<PathBuf>,
}

impl AssetClassifier {
    /// Build a classifier from extension patterns such as `**/*.glb`, `*.glb`, `.glb` or `glb`.
    ///
    /// The built-in web asset list is always included.
    pub fn from_patterns<I, S>(patterns: I, html_entry: Option<PathBuf>) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extensions: BTreeSet<String> = BUILTIN_ASSET_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect();
        for pattern in patterns {
            extensions.insert(normalise_pattern(pattern.as_ref())?);
        }
        Ok(Self {
            extensions,
            html_entry,
        })
    }

    /// Classify a path. Asset suffixes win over the HTML entry, and scripts are the fallback.
    ///
    /// Matching is case-sensitive on the literal file name suffix; the longest registered
    /// extension that matches is reported.
    pub fn classify(&self, path: &Path) -> Classification {
        if let Some(extension) = self.matching_extension(path) {
            return Classification::Asset {
                extension: extension.to_string(),
            };
        }

        if self.html_entry.as_deref() == Some(path) {
            return Classification::EntryHtml;
        }

        Classification::Script
    }

    /// Same extension set, recognising `html_entry` as the entry document instead.
    pub fn for_html_entry(&self, html_entry: Option<PathBuf>) -> Self {
        Self {
            extensions: self.extensions.clone(),
            html_entry,
        }
    }

    /// Registered extensions, without the leading dot.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    fn matching_extension(&self, path: &Path) -> Option<&str> {
        let file_name = path.file_name()?.to_str()?;
        self.extensions
            .iter()
            .filter(|ext| {
                file_name.len() > ext.len() + 1
                    && file_name
                        .strip_suffix(ext.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            })
            .max_by_key(|ext| ext.len())
            .map(String::as_str)
    }
}

fn normalise_pattern(pattern: &str) -> Result<String, String> {
    let trimmed = pattern.trim();
    let extension = trimmed
        .trim_start_matches("**/")
        .trim_start_matches('*')
        .trim_start_matches('.');

    let valid = !extension.is_empty()
        && extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if valid {
        Ok(extension.to_string())
    } else {
        Err(format!(
            "asset pattern `{pattern}` must name a literal extension such as `**/*.glb`"
        ))
    }
}
