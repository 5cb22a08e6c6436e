//! Batch identity for a synchronization run.

use std::env;
use std::process::Command;

use tracing::debug;
use uuid::Uuid;

/// Branch recorded when neither the environment nor git can name one.
pub const UNKNOWN_BRANCH: &str = "unknown";

/// CI/deploy variables consulted, in order, for the branch name.
pub const BRANCH_ENV_VARS: &[&str] = &[
    "VERCEL_GIT_COMMIT_REF",
    "GITHUB_HEAD_REF",
    "GITHUB_REF_NAME",
    "CI_COMMIT_REF_NAME",
    "BRANCH",
];

/// Identity stamped on every record written by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStamp {
    /// Globally unique id for this run.
    pub batch_id: String,
    /// Branch/environment the run writes for.
    pub branch: String,
}

impl BatchStamp {
    /// Builds a stamp from known values.
    pub fn new(batch_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            branch: branch.into(),
        }
    }

    /// Fresh batch id plus a resolved branch. Never fails.
    pub fn generate(explicit_branch: Option<&str>) -> Self {
        let stamp = Self::new(Uuid::new_v4().to_string(), resolve_branch(explicit_branch));
        debug!(batch = %stamp.batch_id, branch = %stamp.branch, "generated batch stamp");
        stamp
    }
}

/// Resolves the branch from an explicit value, the environment, then git.
pub fn resolve_branch(explicit: Option<&str>) -> String {
    resolve_branch_with(explicit, |key| env::var(key).ok(), git_branch)
}

/// [`resolve_branch`] with injectable lookups.
pub fn resolve_branch_with<E, G>(explicit: Option<&str>, lookup_env: E, git: G) -> String
where
    E: Fn(&str) -> Option<String>,
    G: FnOnce() -> Option<String>,
{
    if let Some(branch) = explicit.and_then(clean) {
        return branch;
    }
    if let Some(branch) = BRANCH_ENV_VARS
        .iter()
        .find_map(|key| lookup_env(*key).as_deref().and_then(clean))
    {
        return branch;
    }
    git()
        .as_deref()
        .and_then(clean)
        .filter(|branch| branch != "HEAD")
        .unwrap_or_else(|| UNKNOWN_BRANCH.to_string())
}

fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn git_branch() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_branch_wins() {
        let branch = resolve_branch_with(
            Some("release"),
            env_of(&[("BRANCH", "main")]),
            || Some("dev".into()),
        );
        assert_eq!(branch, "release");
    }

    #[test]
    fn environment_before_git() {
        let branch = resolve_branch_with(
            None,
            env_of(&[("GITHUB_REF_NAME", "feature/x"), ("BRANCH", "other")]),
            || Some("dev".into()),
        );
        assert_eq!(branch, "feature/x");
    }

    #[test]
    fn blank_values_are_ignored() {
        let branch = resolve_branch_with(
            Some("  "),
            env_of(&[("VERCEL_GIT_COMMIT_REF", "")]),
            || Some("dev\n".into()),
        );
        assert_eq!(branch, "dev");
    }

    #[test]
    fn detached_head_and_missing_git_fall_back() {
        assert_eq!(
            resolve_branch_with(None, env_of(&[]), || Some("HEAD\n".into())),
            UNKNOWN_BRANCH
        );
        assert_eq!(resolve_branch_with(None, env_of(&[]), || None), UNKNOWN_BRANCH);
    }

    #[test]
    fn batch_ids_are_unique() {
        let first = BatchStamp::generate(Some("main"));
        let second = BatchStamp::generate(Some("main"));
        assert_ne!(first.batch_id, second.batch_id);
        assert_eq!(first.branch, "main");
    }
}
