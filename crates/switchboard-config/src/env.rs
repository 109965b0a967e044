use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.NAME }}` and `{{ env.NAME | default("value") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("must be valid regex")
    })
}

/// Expand every placeholder in a whole configuration document
///
/// Comment lines (first non-blank character `#`) are copied untouched so a
/// commented-out secret never has to exist in the environment.
pub fn expand_env(document: &str) -> Result<String, String> {
    let mut expanded = Vec::new();

    for line in document.lines() {
        if line.trim_start().starts_with('#') {
            expanded.push(line.to_owned());
        } else {
            expanded.push(expand_value(line)?);
        }
    }

    let mut output = expanded.join("\n");
    if document.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

/// Expand placeholders inside a single value such as an API key
pub fn expand_value(value: &str) -> Result<String, String> {
    let mut output = String::with_capacity(value.len());
    let mut cursor = 0;

    for captures in placeholder().captures_iter(value) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        output.push_str(&value[cursor..whole.start()]);
        output.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    output.push_str(&value[cursor..]);
    Ok(output)
}

fn resolve(captures: &Captures<'_>) -> Result<String, String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str());

    let Some(var) = key.strip_prefix("env.").filter(|rest| !rest.is_empty() && !rest.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var}`")),
    }
}
