//! Parsers for package-manager listing output

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use uca_core::{Result, UcaError};

fn dependency_names(entry: &Value, into: &mut HashSet<String>) {
    if let Some(deps) = entry.get("dependencies").and_then(Value::as_object) {
        into.extend(deps.keys().cloned());
    }
}

/// Names under `dependencies` in `npm list -g --json` output
pub fn parse_npm_packages(out: &str) -> Result<HashSet<String>> {
    let payload: Value = serde_json::from_str(out)?;
    let mut names = HashSet::new();
    dependency_names(&payload, &mut names);
    Ok(names)
}

/// Names from `pnpm list -g --json`, which is an array of projects or one object
pub fn parse_pnpm_packages(out: &str) -> Result<HashSet<String>> {
    let payload: Value = serde_json::from_str(out)?;
    let mut names = HashSet::new();
    match &payload {
        Value::Array(entries) => entries
            .iter()
            .for_each(|entry| dependency_names(entry, &mut names)),
        Value::Object(_) => dependency_names(&payload, &mut names),
        other => {
            return Err(UcaError::ProbeOutput {
                command: "pnpm list".to_string(),
                message: format!("unexpected JSON {}", other),
            })
        }
    }
    Ok(names)
}

/// Package names from free-form `name@version` listings (yarn, bun)
pub fn parse_package_list_output(out: &str) -> HashSet<String> {
    out.lines()
        .flat_map(str::split_whitespace)
        .filter_map(parse_package_from_token)
        .collect()
}

/// Extract `name` from a token like `"@scope/name@1.2.3",`
///
/// A leading `@` is a scope marker, not a version separator.
pub fn parse_package_from_token(token: &str) -> Option<String> {
    let token = token
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | ','))
        .trim_end_matches(|c| matches!(c, ')' | ':' | ','))
        .trim_start_matches('(');
    let idx = token.rfind('@')?;
    if idx == 0 || idx == token.len() - 1 {
        return None;
    }
    Some(token[..idx].to_string())
}

/// Tool names from `uv tool list` (first field of each line)
pub fn parse_uv_tools(out: &str) -> HashSet<String> {
    out.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// `id@version` lines from `code --list-extensions --show-versions`
pub fn parse_code_extensions(out: &str) -> HashMap<String, String> {
    out.lines()
        .map(str::trim)
        .filter_map(|line| {
            let idx = line.rfind('@')?;
            (idx > 0).then(|| (line[..idx].to_string(), line[idx + 1..].to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_npm_packages() {
        let out = r#"{"dependencies": {"@openai/codex": {"version": "0.1.0"}, "npm": {}}}"#;
        let names = parse_npm_packages(out).unwrap();
        assert!(names.contains("@openai/codex"));
        assert!(names.contains("npm"));

        assert!(parse_npm_packages("{}").unwrap().is_empty());
        assert!(parse_npm_packages("npm ERR! oops").is_err());
    }

    #[test]
    fn test_parse_pnpm_shapes() {
        let array = r#"[{"path": "/g", "dependencies": {"opencode-ai": {}}}]"#;
        assert!(parse_pnpm_packages(array).unwrap().contains("opencode-ai"));

        let object = r#"{"dependencies": {"@github/copilot": {}}}"#;
        assert!(parse_pnpm_packages(object).unwrap().contains("@github/copilot"));

        assert!(parse_pnpm_packages("42").is_err());
    }

    #[test]
    fn test_parse_package_from_token() {
        assert_eq!(
            parse_package_from_token("\"@google/gemini-cli@0.4.1\","),
            Some("@google/gemini-cli".to_string())
        );
        assert_eq!(
            parse_package_from_token("(opencode-ai@1.0.0):"),
            Some("opencode-ai".to_string())
        );
        assert_eq!(parse_package_from_token("@scope"), None);
        assert_eq!(parse_package_from_token("name@"), None);
        assert_eq!(parse_package_from_token("info"), None);
    }

    #[test]
    fn test_parse_package_list_output() {
        let out = "yarn global v1.22.22\ninfo \"@qwen-code/qwen-code@0.0.9\" has binaries:\n   - qwen\nDone in 0.1s.\n";
        let names = parse_package_list_output(out);
        assert_eq!(names.len(), 1);
        assert!(names.contains("@qwen-code/qwen-code"));
    }

    #[test]
    fn test_parse_uv_tools() {
        let names = parse_uv_tools("aider-chat v0.86.1\n- aider\n\nruff v0.6.0\n");
        assert!(names.contains("aider-chat"));
        assert!(names.contains("ruff"));
    }

    #[test]
    fn test_parse_code_extensions() {
        let exts = parse_code_extensions("saoudrizwan.claude-dev@3.2.1\n@bad\nContinue.continue@1.0.0\n");
        assert_eq!(exts.len(), 2);
        assert_eq!(exts["saoudrizwan.claude-dev"], "3.2.1");
    }
}
