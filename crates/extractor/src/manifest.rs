//! Dependency-manifest extraction: `requirements.txt`, `Cargo.toml`,
//! `package.json`, and `pyproject.toml` entries become `dependsOn` facts,
//! with coarse capability categories inferred from dependency names.

use std::collections::HashSet;
use symkg_protocol::{ContextTag, Predicate};
use symkg_store::{Fact, FactEndpoint, FactRecord, Provenance};

pub(crate) fn extract_manifest_facts(
    project: &str,
    file: &str,
    content: &str,
    revision: u64,
) -> Vec<FactRecord> {
    let deps = parse_dependencies(file, content);

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for dep in deps {
        if !seen.insert(dep.clone()) {
            continue;
        }
        records.push(FactRecord::new(
            Fact::new(
                FactEndpoint::literal(project),
                Predicate::DependsOn,
                FactEndpoint::literal(dep.clone()),
                ContextTag::Dependencies,
            ),
            Provenance::new(file, revision),
        ));
        if let Some(category) = infer_feature_category(&dep) {
            records.push(FactRecord::new(
                Fact::new(
                    FactEndpoint::literal(project),
                    Predicate::HasFeature,
                    FactEndpoint::literal(category),
                    ContextTag::Features,
                ),
                Provenance::new(file, revision),
            ));
        }
    }
    records
}

fn parse_dependencies(file: &str, content: &str) -> Vec<String> {
    let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
    match name.to_ascii_lowercase().as_str() {
        "requirements.txt" => parse_requirements(content),
        "cargo.toml" => parse_cargo_toml(content),
        "package.json" => parse_package_json(content),
        "pyproject.toml" => parse_pyproject(content),
        _ => Vec::new(),
    }
}

fn parse_requirements(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(requirement_name)
        .collect()
}

/// Strip version specifiers and extras from one requirement line.
fn requirement_name(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(line.len());
    let name = &line[..end];
    (!name.is_empty()).then(|| name.to_string())
}

fn parse_cargo_toml(content: &str) -> Vec<String> {
    let value: toml::Value = match toml::from_str(content) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("unparsable Cargo.toml skipped: {err}");
            return Vec::new();
        }
    };
    let mut deps = Vec::new();
    for table in ["dependencies", "dev-dependencies"] {
        if let Some(entries) = value.get(table).and_then(toml::Value::as_table) {
            deps.extend(entries.keys().cloned());
        }
    }
    deps
}

fn parse_package_json(content: &str) -> Vec<String> {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("unparsable package.json skipped: {err}");
            return Vec::new();
        }
    };
    let mut deps = Vec::new();
    for table in ["dependencies", "devDependencies"] {
        if let Some(entries) = value.get(table).and_then(serde_json::Value::as_object) {
            deps.extend(entries.keys().cloned());
        }
    }
    deps
}

fn parse_pyproject(content: &str) -> Vec<String> {
    let value: toml::Value = match toml::from_str(content) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("unparsable pyproject.toml skipped: {err}");
            return Vec::new();
        }
    };
    value
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(toml::Value::as_str)
                .filter_map(requirement_name)
                .collect()
        })
        .unwrap_or_default()
}

/// Coarse capability inferred from a dependency name alone. Deliberately
/// keyword-based: good enough to seed the `features` sub-graph even for
/// obfuscated codebases where imports are the only signal.
fn infer_feature_category(dep: &str) -> Option<&'static str> {
    let lowered = dep.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if has(&["tts", "audio", "sound", "speech", "voice"]) {
        Some("voice_processing")
    } else if has(&["crypto", "hashlib", "ssl", "nacl"]) {
        Some("cryptography")
    } else if has(&["translat"]) {
        Some("translation")
    } else if has(&["request", "http", "socket", "useragent", "websocket"]) {
        Some("networking")
    } else if has(&["prompt", "colorama", "termcolor", "rich", "curses"]) {
        Some("terminal_ui")
    } else if has(&["psutil", "pexpect"]) {
        Some("system_integration")
    } else {
        None
    }
}
