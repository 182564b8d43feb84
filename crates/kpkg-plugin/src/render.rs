//! Text rendered into package payloads

use kpkg_kube::resources::{App, Package, PackageMetadata};
use serde_json::Value;

/// Data URL for a base64 SVG icon
pub fn icon_url(icon_svg_base64: &str) -> String {
    if icon_svg_base64.is_empty() {
        String::new()
    } else {
        format!("data:image/svg+xml;base64,{}", icon_svg_base64)
    }
}

/// Markdown readme assembled from metadata and one package version
///
/// The release date goes under the release notes and is dropped when there
/// are none.
pub fn readme(metadata: &PackageMetadata, package: &Package) -> String {
    let spec = &package.spec;
    let mut out = String::new();
    let mut section = |title: &str, body: &str| {
        let body = body.trim();
        if !body.is_empty() {
            out.push_str(&format!("## {}\n\n{}\n\n", title, body));
        }
    };

    section("Description", &metadata.spec.long_description);
    section("Capacity requirements", &spec.capacity_requirements_description);
    let release_notes = match spec.released_at {
        Some(released_at) if !spec.release_notes.trim().is_empty() => format!(
            "{}\n\nReleased at: {}",
            spec.release_notes.trim(),
            released_at.format("%B, %-d %Y")
        ),
        _ => spec.release_notes.clone(),
    };
    section("Release notes", &release_notes);
    section("Support", &metadata.spec.support_description);
    let licenses: Vec<String> = spec
        .licenses
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| format!("- {}", l))
        .collect();
    section("Licenses", &licenses.join("\n"));

    out.trim_end().to_string()
}

/// Commented-out YAML defaults derived from an OpenAPI v3 values schema
///
/// Properties use their `default`, or the zero value of their type.
/// Returns an empty string for schemas without properties.
pub fn default_values(schema: Option<&Value>) -> String {
    let Some(schema) = schema else {
        return String::new();
    };
    match render_defaults(schema) {
        Ok(yaml) => yaml,
        Err(e) => {
            tracing::warn!("failed to derive default values from schema: {}", e);
            "# There is an error while parsing the schema.".to_string()
        }
    }
}

fn render_defaults(schema: &Value) -> Result<String, String> {
    let Value::Object(root) = schema else {
        return Err("schema is not an object".to_string());
    };
    let Some(properties) = root.get("properties") else {
        return Ok(String::new());
    };
    let defaults = defaults_for(properties)?;
    if defaults.as_object().is_some_and(|m| m.is_empty()) {
        return Ok(String::new());
    }

    let yaml = serde_yaml::to_string(&sorted_yaml(&defaults).map_err(|e| e.to_string())?)
        .map_err(|e| e.to_string())?;
    Ok(yaml.lines().map(|line| format!("# {}\n", line)).collect())
}

fn defaults_for(properties: &Value) -> Result<Value, String> {
    let Value::Object(properties) = properties else {
        return Err("properties is not an object".to_string());
    };
    let mut out = serde_json::Map::new();
    for (key, property) in properties {
        let value = match property.get("default") {
            Some(default) => default.clone(),
            None => zero_value(property)?,
        };
        out.insert(key.clone(), value);
    }
    Ok(Value::Object(out))
}

fn zero_value(property: &Value) -> Result<Value, String> {
    let kind = property.get("type").and_then(Value::as_str);
    let value = match (kind, property.get("properties")) {
        (Some("string"), _) => Value::String(String::new()),
        (Some("integer") | Some("number"), _) => Value::from(0),
        (Some("boolean"), _) => Value::Bool(false),
        (Some("array"), _) => Value::Array(Vec::new()),
        (Some("object") | None, Some(nested)) => defaults_for(nested)?,
        (Some("object"), None) => Value::Object(serde_json::Map::new()),
        _ => Value::Null,
    };
    Ok(value)
}

/// YAML value with mapping keys in sorted order
fn sorted_yaml(value: &Value) -> serde_yaml::Result<serde_yaml::Value> {
    Ok(match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut mapping = serde_yaml::Mapping::new();
            for key in keys {
                mapping.insert(serde_yaml::Value::String(key.clone()), sorted_yaml(&map[key])?);
            }
            serde_yaml::Value::Mapping(mapping)
        }
        Value::Array(items) => serde_yaml::Value::Sequence(
            items.iter().map(sorted_yaml).collect::<serde_yaml::Result<_>>()?,
        ),
        other => serde_yaml::to_value(other)?,
    })
}

/// Notes from the App's deploy and fetch output
pub fn post_installation_notes(app: Option<&App>) -> String {
    let Some(status) = app.and_then(|a| a.status.as_ref()) else {
        return String::new();
    };
    let stdout = |step: &Option<kpkg_kube::resources::AppStepStatus>| {
        step.as_ref().map(|s| s.stdout.trim().to_string()).unwrap_or_default()
    };
    let stderr = |step: &Option<kpkg_kube::resources::AppStepStatus>| {
        step.as_ref().map(|s| s.stderr.trim().to_string()).unwrap_or_default()
    };

    let mut out = String::new();
    for (heading, entries) in [
        (
            "Installation output",
            [("Deploy", stdout(&status.deploy)), ("Fetch", stdout(&status.fetch))],
        ),
        (
            "Errors",
            [("Deploy", stderr(&status.deploy)), ("Fetch", stderr(&status.fetch))],
        ),
    ] {
        if entries.iter().all(|(_, text)| text.is_empty()) {
            continue;
        }
        out.push_str(&format!("## {}\n\n", heading));
        for (step, text) in entries.iter().filter(|(_, text)| !text.is_empty()) {
            out.push_str(&format!("### {}\n\n```\n{}\n```\n\n", step, text));
        }
    }
    out.trim_end().to_string()
}

/// Values of every secret an install reads, labelled by secret
pub fn values_applied<'a>(values: impl IntoIterator<Item = (&'a str, String)>) -> String {
    values
        .into_iter()
        .map(|(secret, content)| format!("\n# {}\n{}\n---", secret, content.trim()))
        .collect::<String>()
        .trim()
        .to_string()
}
