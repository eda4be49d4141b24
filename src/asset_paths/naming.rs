use std::collections::BTreeSet;
use std::path::Path;

/// Output naming patterns for the emitted tree.
///
/// Every produced path is relative to the output root and always uses forward slashes, so
/// the resulting references work from a `file://` document regardless of the platform the
/// bundle was built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Fixed top-level file name of the designated entry chunk.
    pub entry_file_name: String,
    /// Pattern for every other chunk, containing `[name]`.
    pub chunk_pattern: String,
    /// Pattern for assets, containing `[name]` and optionally `[ext]`.
    pub asset_pattern: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            entry_file_name: "main.js".into(),
            chunk_pattern: "chunks/[name].js".into(),
            asset_pattern: "assets/[name].[ext]".into(),
        }
    }
}

impl OutputLayout {
    /// Validate that every pattern produces a relative path inside the output root.
    pub fn validate(&self) -> Result<(), String> {
        for (label, value) in [
            ("entry file name", &self.entry_file_name),
            ("chunk file pattern", &self.chunk_pattern),
            ("asset file pattern", &self.asset_pattern),
        ] {
            ensure_relative_output(label, value)?;
        }
        if !self.chunk_pattern.contains("[name]") {
            return Err(format!(
                "chunk file pattern `{}` must contain [name]",
                self.chunk_pattern
            ));
        }
        if !self.asset_pattern.contains("[name]") {
            return Err(format!(
                "asset file pattern `{}` must contain [name]",
                self.asset_pattern
            ));
        }
        Ok(())
    }

    /// Output path for a chunk other than the designated entry chunk.
    pub fn chunk_path(&self, name: &str) -> String {
        self.chunk_pattern.replace("[name]", name)
    }

    /// Output path for an asset, e.g. `assets/model.glb`.
    pub fn asset_path(&self, source: &Path, extension: &str) -> String {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = file_name
            .strip_suffix(extension)
            .and_then(|rest| rest.strip_suffix('.'))
            .unwrap_or(&file_name);

        self.asset_pattern
            .replace("[name]", name)
            .replace("[ext]", extension)
            .replace('\\', "/")
    }
}

/// Reject absolute, scheme-rooted or parent-escaping output paths.
pub fn ensure_relative_output(label: &str, value: &str) -> Result<(), String> {
    let normalised = value.replace('\\', "/");
    if normalised.is_empty() {
        return Err(format!("{label} must not be empty"));
    }
    if normalised.starts_with('/') || has_scheme(&normalised) {
        return Err(format!("{label} `{value}` must be a relative path"));
    }
    if normalised.split('/').any(|segment| segment == "..") {
        return Err(format!("{label} `{value}` must stay inside the output directory"));
    }
    Ok(())
}

/// Normalise the configured public base into a relative prefix ending with `/`.
///
/// The consuming WebView has no HTTP origin, so `/`-rooted or scheme-rooted bases are rejected.
pub fn normalise_public_base(base: &str) -> Result<String, String> {
    let trimmed = base.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Ok("./".into());
    }
    if trimmed.starts_with('/') || has_scheme(trimmed) {
        return Err(format!(
            "base `{base}` must be relative (such as `./`) for an origin-less WebView"
        ));
    }
    let mut normalised = trimmed.replace('\\', "/");
    if !normalised.ends_with('/') {
        normalised.push('/');
    }
    Ok(normalised)
}

/// Join the public base with an output-relative path.
pub fn public_url(base: &str, output_path: &str) -> String {
    format!("{}{}", base, output_path.trim_start_matches("./"))
}

/// Turn a module stem into a chunk name that is unique within `used`.
pub fn unique_chunk_name(stem: &str, used: &mut BTreeSet<String>) -> String {
    let mut base = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    while base.contains("__") {
        base = base.replace("__", "_");
    }
    if base.is_empty() {
        base = "chunk".into();
    }

    let mut candidate = base.clone();
    let mut counter = 1;
    while used.contains(&candidate) {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }

    used.insert(candidate.clone());
    candidate
}

fn has_scheme(value: &str) -> bool {
    value.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    })
}
