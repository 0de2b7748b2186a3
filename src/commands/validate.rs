//! Implementation of the `patchstorm validate` command.

use crate::cli::ValidateArgs;
use crate::error::Result;
use crate::task_definition::TaskDefinition;

/// Execute the `patchstorm validate` command.
///
/// Runs schema validation only; no settings, network, or queue involved.
pub fn cmd_validate(args: ValidateArgs) -> Result<()> {
    let task = TaskDefinition::load(&args.file)?;
    // Surfaces the search-query conflict without resolving anything.
    task.effective_search_query()?;

    println!("OK");
    println!("  agent: {}", task.agent_provider);
    println!("  commit message: {}", task.commit_message);
    println!("  prompts: {}", task.prompts.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PatchstormError;
    use tempfile::TempDir;

    fn write(content: &str) -> (TempDir, ValidateArgs) {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("task.yaml");
        std::fs::write(&file, content).unwrap();
        (temp, ValidateArgs { file })
    }

    #[test]
    fn test_valid_definition() {
        let (_temp, args) = write(
            "agent:\n  provider: codex\ncommit:\n  message: m\nprompts:\n  - prompt: p\n",
        );
        assert!(cmd_validate(args).is_ok());
    }

    #[test]
    fn test_schema_violation_is_reported() {
        let (_temp, args) = write("agent:\n  provider: codex\nprompts:\n  - prompt: p\n");
        let err = cmd_validate(args).unwrap_err();
        assert!(matches!(err, PatchstormError::Definition(_)));
        assert!(err.to_string().contains("commit"));
    }

    #[test]
    fn test_conflicting_queries_are_reported() {
        let (_temp, args) = write(
            "agent:\n  provider: codex\ncommit:\n  message: m\nprompts:\n  - prompt: p\nrepos:\n  search_query: a\nsearch_query: b\n",
        );
        assert!(matches!(
            cmd_validate(args).unwrap_err(),
            PatchstormError::Conflict(_)
        ));
    }
}
