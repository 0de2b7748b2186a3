//! Tests for task definition parsing and schema validation.

use super::*;

const FULL: &str = r#"
agent:
  provider: claude_code
commit:
  message: Pin actions to SHAs
prompts:
  - prompt: Pin every action
  - prompt: Add tag comments
repos:
  include:
    - acme/api
    - acme/web
    - acme/api
  search_query: path:.github tj-actions
draft: true
dry: false
skip_pr: true
reviewers: [octocat, hubot]
"#;

const MINIMAL: &str = r#"
agent:
  provider: codex
commit:
  message: Fix typo
prompts:
  - prompt: Fix the typo in README
"#;

fn definition_error(yaml: &str) -> String {
    match TaskDefinition::from_yaml(yaml) {
        Err(PatchstormError::Definition(msg)) => msg,
        other => panic!("expected a definition error, got {:?}", other),
    }
}

#[test]
fn test_parse_full_definition() {
    let def = TaskDefinition::from_yaml(FULL).unwrap();

    assert_eq!(def.agent_provider, AgentProvider::ClaudeCode);
    assert_eq!(def.commit_message, "Pin actions to SHAs");
    assert_eq!(def.prompts, vec!["Pin every action", "Add tag comments"]);
    let repos = def.repos.as_ref().unwrap();
    assert_eq!(repos.include.len(), 2);
    assert_eq!(repos.search_query.as_deref(), Some("path:.github tj-actions"));
    assert_eq!(def.draft, Some(true));
    assert_eq!(def.dry, Some(false));
    assert_eq!(def.skip_pr, Some(true));
    assert_eq!(def.reviewers.as_ref().unwrap().len(), 2);
    assert_eq!(
        def.effective_search_query().unwrap(),
        Some("path:.github tj-actions")
    );
}

#[test]
fn test_parse_minimal_definition() {
    let def = TaskDefinition::from_yaml(MINIMAL).unwrap();

    assert_eq!(def.agent_provider, AgentProvider::Codex);
    assert!(def.repos.is_none());
    assert!(def.draft.is_none());
    assert!(def.reviewers.is_none());
    assert!(def.included_repos().is_empty());
    assert_eq!(def.effective_search_query().unwrap(), None);
}

#[test]
fn test_top_level_search_query() {
    let yaml = format!("{}search_query: language:python\n", MINIMAL);
    let def = TaskDefinition::from_yaml(&yaml).unwrap();
    assert_eq!(def.effective_search_query().unwrap(), Some("language:python"));
}

#[test]
fn test_both_search_queries_conflict() {
    let yaml = format!(
        "{}repos:\n  search_query: a\nsearch_query: b\n",
        MINIMAL
    );
    let def = TaskDefinition::from_yaml(&yaml).unwrap();
    let err = def.effective_search_query().unwrap_err();
    assert!(matches!(err, PatchstormError::Conflict(_)));
}

#[test]
fn test_legacy_repos_list_rejected() {
    let yaml = format!("{}repos:\n  - acme/api\n  - acme/web\n", MINIMAL);
    let msg = definition_error(&yaml);
    assert!(msg.contains("'repos' must be an object"));
    assert!(msg.contains("bare-list"));
}

#[test]
fn test_repos_scalar_rejected() {
    let yaml = format!("{}repos: acme/api\n", MINIMAL);
    assert!(definition_error(&yaml).contains("'repos' must be an object"));
}

#[test]
fn test_missing_required_fields_named() {
    let msg = definition_error("commit:\n  message: m\nprompts:\n  - prompt: p\n");
    assert_eq!(msg, "agent is required");

    let msg = definition_error("agent:\n  provider: codex\nprompts:\n  - prompt: p\n");
    assert_eq!(msg, "commit is required");

    let msg = definition_error("agent:\n  provider: codex\ncommit:\n  message: m\n");
    assert_eq!(msg, "prompts is required");

    let msg = definition_error("agent: {}\ncommit:\n  message: m\nprompts:\n  - prompt: p\n");
    assert_eq!(msg, "agent.provider is required");
}

#[test]
fn test_unknown_provider_rejected() {
    let yaml = MINIMAL.replace("codex", "gemini");
    let msg = definition_error(&yaml);
    assert!(msg.contains("agent.provider must be one of: codex, claude_code"));
    assert!(msg.contains("gemini"));
}

#[test]
fn test_empty_prompts_rejected() {
    let msg = definition_error("agent:\n  provider: codex\ncommit:\n  message: m\nprompts: []\n");
    assert!(msg.contains("at least one entry"));
}

#[test]
fn test_prompt_entry_without_prompt_key_named() {
    let yaml = "agent:\n  provider: codex\ncommit:\n  message: m\nprompts:\n  - prompt: ok\n  - text: nope\n";
    assert_eq!(definition_error(yaml), "prompts[1].prompt is required");
}

#[test]
fn test_flag_type_checked() {
    let yaml = format!("{}draft: yes please\n", MINIMAL);
    assert_eq!(definition_error(&yaml), "draft must be a boolean");
}

#[test]
fn test_include_items_must_be_strings() {
    let yaml = format!("{}repos:\n  include:\n    - acme/api\n    - 42\n", MINIMAL);
    assert_eq!(definition_error(&yaml), "repos.include[1] must be a string");
}

#[test]
fn test_non_mapping_document_rejected() {
    assert!(definition_error("- just\n- a list\n").contains("must be a mapping"));
}

#[test]
fn test_invalid_yaml_rejected() {
    assert!(definition_error("agent: [unclosed").contains("failed to parse"));
}

#[test]
fn test_load_missing_file_is_usage_error() {
    let err = TaskDefinition::load("/nonexistent/task.yaml").unwrap_err();
    assert!(matches!(err, PatchstormError::Usage(_)));
}
