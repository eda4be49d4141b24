//! Dependency extraction for scripts and the HTML entry document.
//!
//! This is a pattern scanner rather than a full parser: it recognises module syntax at the start
//! of a line, which is how bundled Three.js sources and hand-written entry scripts are laid out.
//! Every reference carries the byte span the emitter replaces later.

use std::ops::Range;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::asset_paths::is_external_reference;
use crate::models::{Dependency, DependencyKind, ImportClause, ReExportClause};

const QUOTED: &str = r#"(?:'([^'\n]*)'|"([^"\n]*)")"#;

struct ScriptPatterns {
  static_import: Regex,
  side_effect: Regex,
  re_export: Regex,
  dynamic_import: Regex,
  asset_url: Regex,
}

fn script_patterns() -> &'static ScriptPatterns {
  static PATTERNS: OnceLock<ScriptPatterns> = OnceLock::new();
  PATTERNS.get_or_init(|| ScriptPatterns {
    static_import: Regex::new(&format!(
      r"(?m)^[ \t]*import\s+([\w$*{{}},\s]+?)\s+from\s*{QUOTED}[ \t]*;?"
    ))
    .expect("invalid static import regex"),
    side_effect: Regex::new(&format!(r"(?m)^[ \t]*import\s*{QUOTED}[ \t]*;?"))
      .expect("invalid side-effect import regex"),
    re_export: Regex::new(&format!(
      r"(?m)^[ \t]*export\s*(\*\s*as\s+[\w$]+|\*|\{{[^}}]*\}})\s*from\s*{QUOTED}[ \t]*;?"
    ))
    .expect("invalid re-export regex"),
    dynamic_import: Regex::new(&format!(r"\bimport\s*\(\s*{QUOTED}\s*\)"))
      .expect("invalid dynamic import regex"),
    asset_url: Regex::new(&format!(
      r"new\s+URL\s*\(\s*{QUOTED}\s*,\s*import\.meta\.url\s*\)"
    ))
    .expect("invalid asset URL regex"),
  })
}

struct HtmlPatterns {
  script: Regex,
  resource_tag: Regex,
  attribute: Regex,
  module_preload: Regex,
}

fn html_patterns() -> &'static HtmlPatterns {
  static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
  PATTERNS.get_or_init(|| HtmlPatterns {
    script: Regex::new(
      r#"(?is)<script\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>\s*</script\s*>"#,
    )
    .expect("invalid script tag regex"),
    resource_tag: Regex::new(r"(?is)<(?:link|img|source|video|audio|track|input)\b[^>]*>")
      .expect("invalid resource tag regex"),
    attribute: Regex::new(r#"(?is)\b(?:src|href|poster)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
      .expect("invalid attribute regex"),
    module_preload: Regex::new(r#"(?i)\brel\s*=\s*["']?modulepreload"#)
      .expect("invalid modulepreload regex"),
  })
}

/// Extract dependencies from JavaScript source, ordered by position.
pub fn scan_script(source: &str) -> Vec<Dependency> {
  let patterns = script_patterns();
  let mut found = Vec::new();

  for caps in patterns.static_import.captures_iter(source) {
    if let Some(specifier) = quoted(&caps, 2) {
      found.push(Dependency {
        specifier,
        kind: DependencyKind::Import(parse_import_clause(&caps[1])),
        span: whole(&caps),
      });
    }
  }
  for caps in patterns.side_effect.captures_iter(source) {
    if let Some(specifier) = quoted(&caps, 1) {
      found.push(Dependency {
        specifier,
        kind: DependencyKind::SideEffect,
        span: whole(&caps),
      });
    }
  }
  for caps in patterns.re_export.captures_iter(source) {
    if let Some(specifier) = quoted(&caps, 2) {
      found.push(Dependency {
        specifier,
        kind: DependencyKind::ReExport(parse_re_export_clause(&caps[1])),
        span: whole(&caps),
      });
    }
  }
  for caps in patterns.dynamic_import.captures_iter(source) {
    if let Some(specifier) = quoted(&caps, 1) {
      found.push(Dependency {
        specifier,
        kind: DependencyKind::Dynamic,
        span: whole(&caps),
      });
    }
  }
  for caps in patterns.asset_url.captures_iter(source) {
    if let Some(specifier) = quoted(&caps, 1)
      && !is_external_reference(&specifier)
    {
      found.push(Dependency {
        specifier,
        kind: DependencyKind::AssetUrl,
        span: whole(&caps),
      });
    }
  }

  let comments = comment_spans(source);
  found.retain(|dep| !in_comment(&comments, dep.span.start));
  without_overlaps(found)
}

/// Byte ranges of `//` and `/* */` comments. String and template literals are skipped so a
/// `//` inside a URL string does not open a comment.
pub fn comment_spans(source: &str) -> Vec<Range<usize>> {
  let bytes = source.as_bytes();
  let mut spans = Vec::new();
  let mut index = 0;
  while index < bytes.len() {
    match bytes[index] {
      quote @ (b'\'' | b'"' | b'`') => {
        index += 1;
        while index < bytes.len() && bytes[index] != quote {
          if bytes[index] == b'\\' {
            index += 1;
          } else if quote != b'`' && bytes[index] == b'\n' {
            break;
          }
          index += 1;
        }
        index += 1;
      }
      b'/' if bytes.get(index + 1) == Some(&b'/') => {
        let end = source[index..]
          .find('\n')
          .map_or(bytes.len(), |offset| index + offset);
        spans.push(index..end);
        index = end;
      }
      b'/' if bytes.get(index + 1) == Some(&b'*') => {
        let end = source[index + 2..]
          .find("*/")
          .map_or(bytes.len(), |offset| index + 2 + offset + 2);
        spans.push(index..end);
        index = end;
      }
      _ => index += 1,
    }
  }
  spans
}

/// Whether `offset` falls inside one of `spans`.
pub fn in_comment(spans: &[Range<usize>], offset: usize) -> bool {
  spans.iter().any(|span| span.contains(&offset))
}

/// Extract `<script src>` entries and resource attributes from an HTML document.
///
/// External URLs are skipped and `rel="modulepreload"` links are ignored, since the emitter
/// drops them from the output.
pub fn scan_html(source: &str) -> Vec<Dependency> {
  let patterns = html_patterns();
  let mut found = Vec::new();

  for caps in patterns.script.captures_iter(source) {
    if let Some(specifier) = quoted(&caps, 1) {
      if is_external_reference(&specifier) {
        tracing::warn!("leaving external script reference `{specifier}` untouched");
        continue;
      }
      found.push(Dependency {
        specifier,
        kind: DependencyKind::HtmlScript,
        span: whole(&caps),
      });
    }
  }

  for tag in patterns.resource_tag.find_iter(source) {
    if patterns.module_preload.is_match(tag.as_str()) {
      continue;
    }
    for caps in patterns.attribute.captures_iter(tag.as_str()) {
      let Some(value) = caps.get(1).or_else(|| caps.get(2)) else {
        continue;
      };
      let specifier = value.as_str().trim().to_string();
      if is_external_reference(&specifier) {
        tracing::debug!("leaving external reference `{specifier}` untouched");
        continue;
      }
      found.push(Dependency {
        specifier,
        kind: DependencyKind::HtmlResource,
        span: tag.start() + value.start()..tag.start() + value.end(),
      });
    }
  }

  without_overlaps(found)
}

/// Parse the binding list between `import` and `from`.
pub fn parse_import_clause(raw: &str) -> ImportClause {
  let mut clause = ImportClause::default();
  let (outside, braced) = match (raw.find('{'), raw.rfind('}')) {
    (Some(open), Some(close)) if open < close => (
      format!("{}{}", &raw[..open], &raw[close + 1..]),
      Some(&raw[open + 1..close]),
    ),
    _ => (raw.to_string(), None),
  };

  for part in outside.split(',').map(str::trim).filter(|part| !part.is_empty()) {
    if let Some(namespace) = part.strip_prefix('*') {
      let name = namespace.trim().trim_start_matches("as").trim();
      if !name.is_empty() {
        clause.namespace = Some(name.to_string());
      }
    } else {
      clause.default = Some(part.to_string());
    }
  }

  if let Some(braced) = braced {
    clause.named = parse_binding_list(braced);
  }
  clause
}

fn parse_re_export_clause(raw: &str) -> ReExportClause {
  let raw = raw.trim();
  if raw == "*" {
    return ReExportClause::All;
  }
  if let Some(rest) = raw.strip_prefix('*') {
    let name = rest.trim().trim_start_matches("as").trim();
    return ReExportClause::Namespace(name.to_string());
  }
  ReExportClause::Named(parse_binding_list(
    raw.trim_start_matches('{').trim_end_matches('}'),
  ))
}

/// Parse `a, b as c` into `(a, a)` and `(b, c)` pairs.
pub fn parse_binding_list(raw: &str) -> Vec<(String, String)> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|item| !item.is_empty())
    .map(|item| {
      let mut words = item.split_whitespace();
      let imported = words.next().unwrap_or_default().to_string();
      match (words.next(), words.next()) {
        (Some("as"), Some(local)) => (imported, local.to_string()),
        _ => (imported.clone(), imported),
      }
    })
    .collect()
}

fn quoted(caps: &Captures<'_>, first_group: usize) -> Option<String> {
  caps
    .get(first_group)
    .or_else(|| caps.get(first_group + 1))
    .map(|m| m.as_str().to_string())
}

fn whole(caps: &Captures<'_>) -> Range<usize> {
  caps.get(0).map(|m| m.range()).unwrap_or_default()
}

fn without_overlaps(mut found: Vec<Dependency>) -> Vec<Dependency> {
  found.sort_by_key(|dep| (dep.span.start, std::cmp::Reverse(dep.span.end)));
  let mut kept: Vec<Dependency> = Vec::with_capacity(found.len());
  for dep in found {
    if kept.last().is_some_and(|last| dep.span.start < last.span.end) {
      continue;
    }
    kept.push(dep);
  }
  kept
}
