//! Structural validation of task definition documents.
//!
//! Runs on the raw YAML value before any typed decoding so each failure can
//! name the exact field that broke the rule.

use crate::error::{PatchstormError, Result};
use crate::run_config::AgentProvider;
use serde_yaml::{Mapping, Value};

const PROVIDERS: [&str; 2] = ["codex", "claude_code"];

/// Validate a parsed document against the task definition schema.
pub fn validate_document(doc: &Value) -> Result<()> {
    let root = doc
        .as_mapping()
        .ok_or_else(|| violation("the document must be a mapping"))?;

    let agent = required_mapping(root, "agent", "agent")?;
    let provider = required_string(agent, "provider", "agent.provider")?;
    if AgentProvider::from_str(provider).is_none() {
        return Err(violation(format!(
            "agent.provider must be one of: {} (found '{}')",
            PROVIDERS.join(", "),
            provider
        )));
    }

    let commit = required_mapping(root, "commit", "commit")?;
    required_string(commit, "message", "commit.message")?;

    validate_prompts(root)?;
    validate_repos(root)?;

    optional_string(root, "search_query", "search_query")?;
    for flag in ["draft", "dry", "skip_pr"] {
        if let Some(value) = root.get(flag)
            && !value.is_bool()
        {
            return Err(violation(format!("{} must be a boolean", flag)));
        }
    }
    if let Some(value) = root.get("reviewers") {
        string_list(value, "reviewers")?;
    }

    Ok(())
}

fn validate_prompts(root: &Mapping) -> Result<()> {
    let prompts = root
        .get("prompts")
        .ok_or_else(|| violation("prompts is required"))?
        .as_sequence()
        .ok_or_else(|| violation("prompts must be a list of {prompt: string} entries"))?;

    if prompts.is_empty() {
        return Err(violation("prompts must contain at least one entry"));
    }

    for (i, entry) in prompts.iter().enumerate() {
        let path = format!("prompts[{}]", i);
        let entry = entry
            .as_mapping()
            .ok_or_else(|| violation(format!("{} must be a mapping with a 'prompt' key", path)))?;
        required_string(entry, "prompt", &format!("{}.prompt", path))?;
    }
    Ok(())
}

fn validate_repos(root: &Mapping) -> Result<()> {
    let Some(repos) = root.get("repos") else {
        return Ok(());
    };

    match repos {
        Value::Mapping(selection) => {
            if let Some(include) = selection.get("include") {
                string_list(include, "repos.include")?;
            }
            optional_string(selection, "search_query", "repos.search_query")?;
            Ok(())
        }
        Value::Sequence(_) => Err(violation(
            "'repos' must be an object with 'include' and/or 'search_query' properties; \
             the bare-list format is no longer supported (move the list under 'repos.include')",
        )),
        _ => Err(violation(
            "'repos' must be an object with 'include' and/or 'search_query' properties",
        )),
    }
}

fn required_mapping<'a>(parent: &'a Mapping, key: &str, path: &str) -> Result<&'a Mapping> {
    parent
        .get(key)
        .ok_or_else(|| violation(format!("{} is required", path)))?
        .as_mapping()
        .ok_or_else(|| violation(format!("{} must be a mapping", path)))
}

fn required_string<'a>(parent: &'a Mapping, key: &str, path: &str) -> Result<&'a str> {
    parent
        .get(key)
        .ok_or_else(|| violation(format!("{} is required", path)))?
        .as_str()
        .ok_or_else(|| violation(format!("{} must be a string", path)))
}

fn optional_string(parent: &Mapping, key: &str, path: &str) -> Result<()> {
    match parent.get(key) {
        Some(value) if !value.is_string() => {
            Err(violation(format!("{} must be a string", path)))
        }
        _ => Ok(()),
    }
}

fn string_list(value: &Value, path: &str) -> Result<()> {
    let items = value
        .as_sequence()
        .ok_or_else(|| violation(format!("{} must be a list of strings", path)))?;
    for (i, item) in items.iter().enumerate() {
        if !item.is_string() {
            return Err(violation(format!("{}[{}] must be a string", path, i)));
        }
    }
    Ok(())
}

fn violation(message: impl Into<String>) -> PatchstormError {
    PatchstormError::Definition(message.into())
}
