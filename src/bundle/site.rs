//! HTML patching for the entry document.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::asset_paths::public_url;
use crate::bundle::manifest::OutputManifest;
use crate::error::{BuildError, BuildResult};
use crate::models::{Chunk, DependencyKind, ModuleNode};

struct SitePatterns {
    module_preload: Regex,
    tag: Regex,
    crossorigin: Regex,
}

fn site_patterns() -> &'static SitePatterns {
    static PATTERNS: OnceLock<SitePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SitePatterns {
        module_preload: Regex::new(
            r#"(?is)[ \t]*<link\b[^>]*\brel\s*=\s*["']?modulepreload["']?[^>]*>[ \t]*\r?\n?"#,
        )
        .expect("invalid modulepreload regex"),
        tag: Regex::new(r"(?s)<[A-Za-z][^>]*>").expect("invalid tag regex"),
        crossorigin: Regex::new(
            r#"(?i)\s+crossorigin(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+))?"#,
        )
        .expect("invalid crossorigin regex"),
    })
}

/// Rewrite the HTML entry so it loads the emitted chunks as classic scripts.
///
/// Each `<script src>` becomes deferred tags for the chunks its entry needs followed by the
/// entry chunk itself; a chunk already loaded earlier in the document is not repeated. Resource
/// attributes point at the emitted assets. Module preloads and `crossorigin` attributes are
/// removed, neither means anything to a `file://` document.
pub fn rewrite_html(
    html: &ModuleNode,
    chunks: &[Chunk],
    outputs: &OutputManifest,
    base: &str,
) -> BuildResult<String> {
    let Some(source) = html.payload.text() else {
        return Err(BuildError::InvalidConfig(format!(
            "{} is not a text document",
            html.path.display()
        )));
    };

    let mut dependencies: Vec<_> = html.dependencies.iter().collect();
    dependencies.sort_by_key(|dep| dep.dependency.span.start);

    let mut loaded: BTreeSet<&str> = BTreeSet::new();
    let mut text = String::with_capacity(source.len());
    let mut cursor = 0;
    for dep in dependencies {
        let span = dep.dependency.span.clone();
        if span.start < cursor {
            continue;
        }
        let replacement = match dep.dependency.kind {
            DependencyKind::HtmlScript => {
                let chunk = chunks
                    .iter()
                    .find(|chunk| chunk.entry.as_deref() == Some(dep.target.as_path()))
                    .ok_or_else(|| BuildError::ModuleResolution {
                        importer: html.path.clone(),
                        specifier: dep.dependency.specifier.clone(),
                    })?;
                let tags: Vec<String> = chunk
                    .imports
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(chunk.file_name.as_str()))
                    .filter(|file| loaded.insert(*file))
                    .map(|file| {
                        format!("<script defer src=\"{}\"></script>", public_url(base, file))
                    })
                    .collect();
                tags.join("\n")
            }
            DependencyKind::HtmlResource => {
                let output = outputs.output_for(&dep.target).ok_or_else(|| {
                    BuildError::UnsupportedReference {
                        importer: html.path.clone(),
                        specifier: dep.dependency.specifier.clone(),
                        reason: "resource was not emitted as an asset".into(),
                    }
                })?;
                public_url(base, output)
            }
            _ => continue,
        };
        text.push_str(&source[cursor..span.start]);
        text.push_str(&replacement);
        cursor = span.end;
    }
    text.push_str(&source[cursor..]);

    let patterns = site_patterns();
    text = patterns.module_preload.replace_all(&text, "").into_owned();
    text = patterns
        .tag
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            patterns.crossorigin.replace_all(&caps[0], "").into_owned()
        })
        .into_owned();

    Ok(text)
}
