//! Repository metadata for the workspace a prompt came from.

use std::path::Path;
use std::process::Command;

use crate::models::GitInfo;

/// Find the repository enclosing `workspace` and describe its state.
///
/// Walks from `workspace` towards the filesystem root and stops at the first
/// directory whose `.git` entry git accepts as a repository. A broken `.git`
/// is passed over. Never fails: when no repository is
/// found, or the workspace is empty, the default (`is_repo: false`) is
/// returned. Individual lookups that fail inside a repository leave their
/// field empty.
pub fn enrich(workspace: &str) -> GitInfo {
    if workspace.is_empty() {
        return GitInfo::default();
    }

    let mut current = Path::new(workspace);
    loop {
        if is_repo_root(current) {
            return describe_repo(current);
        }
        match current.parent() {
            Some(parent) if parent != current && !parent.as_os_str().is_empty() => {
                current = parent;
            }
            _ => return GitInfo::default(),
        }
    }
}

fn is_repo_root(dir: &Path) -> bool {
    let dot_git = dir.join(".git");
    if !dot_git.exists() {
        return false;
    }
    // An explicit --git-dir stops git from discovering a parent repository.
    let dot_git = dot_git.to_string_lossy().into_owned();
    git_output(dir, &["--git-dir", dot_git.as_str(), "rev-parse", "--git-dir"]).is_some()
}

fn describe_repo(repo_dir: &Path) -> GitInfo {
    let mut info = GitInfo {
        is_repo: true,
        ..GitInfo::default()
    };

    if let Some(remote) = first_remote(repo_dir) {
        info.remote_url = git_output(repo_dir, &["remote", "get-url", &remote]).unwrap_or_default();
    }

    // Unborn HEAD (no commits yet) leaves both commit and branch empty.
    if let Some(sha) = git_output(repo_dir, &["rev-parse", "HEAD"]) {
        info.commit_hash = sha;
        // Fails on a detached HEAD
        info.branch_name =
            git_output(repo_dir, &["symbolic-ref", "--quiet", "--short", "HEAD"]).unwrap_or_default();
    }

    info
}

fn first_remote(repo_dir: &Path) -> Option<String> {
    let remotes = git_output(repo_dir, &["remote"])?;
    remotes
        .lines()
        .map(str::trim)
        .find(|r| !r.is_empty())
        .map(str::to_string)
}

/// Trimmed stdout of a successful, non-empty git invocation.
fn git_output(repo_dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_workspace_is_not_a_repo() {
        assert_eq!(enrich(""), GitInfo::default());
    }

    #[test]
    fn broken_git_entry_is_not_a_repo() {
        let tmp = tempfile::TempDir::new().unwrap();
        let workspace = tmp.path().join("project");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join(".git"), "not a gitfile").unwrap();

        assert_eq!(enrich(&workspace.display().to_string()), GitInfo::default());
    }

    #[test]
    fn missing_directory_is_not_a_repo() {
        let info = enrich("/definitely/not/a/real/workspace/path");
        assert!(!info.is_repo);
        assert!(info.remote_url.is_empty());
        assert!(info.commit_hash.is_empty());
        assert!(info.branch_name.is_empty());
    }
}
