use mapper_protocol::ChangeSet;
use std::path::Path;

use crate::error::ChangeError;
use crate::git::{split_nul, GitRepo};

/// Which history window to derive changed paths from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRange {
    /// Explicit `base..target` (or any revision range git accepts).
    Range(String),
    /// `rev..HEAD`.
    Since(String),
    /// Every file touched by commits since a date (`git log --since`).
    SinceDate(String),
    /// `HEAD~1..HEAD`.
    LastCommit,
}

impl ChangeRange {
    fn revisions(&self) -> (Option<String>, Option<String>) {
        match self {
            ChangeRange::Range(spec) => match spec.split_once("..") {
                Some((base, target)) => (
                    Some(base.trim_end_matches('.').to_string()).filter(|s| !s.is_empty()),
                    Some(target.trim_start_matches('.').to_string()).filter(|s| !s.is_empty()),
                ),
                None => (Some(spec.clone()), None),
            },
            ChangeRange::Since(rev) => (Some(rev.clone()), Some("HEAD".to_string())),
            ChangeRange::SinceDate(_) => (None, Some("HEAD".to_string())),
            ChangeRange::LastCommit => (Some("HEAD~1".to_string()), Some("HEAD".to_string())),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ChangeRange::Range(spec) => spec.clone(),
            ChangeRange::Since(rev) => format!("{rev}..HEAD"),
            ChangeRange::SinceDate(date) => format!("since {date}"),
            ChangeRange::LastCommit => "HEAD~1..HEAD".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeListOptions {
    pub range: ChangeRange,
    pub include_untracked: bool,
}

impl Default for ChangeListOptions {
    fn default() -> Self {
        Self {
            range: ChangeRange::LastCommit,
            include_untracked: false,
        }
    }
}

/// Derive the changed-file list from git history.
///
/// Fails with [`ChangeError::Unavailable`] when there is no usable repository, so callers can
/// fall back to a full scan instead of retrying.
pub async fn list_changed(
    root: &Path,
    options: &ChangeListOptions,
) -> Result<ChangeSet, ChangeError> {
    let git = GitRepo::detect(root).await?;
    list_changed_in(&git, options).await
}

/// Paths come back relative to the repository's root directory; changes outside it are left
/// out, so a root below the work tree top level only sees its own subtree.
pub async fn list_changed_in(
    git: &GitRepo,
    options: &ChangeListOptions,
) -> Result<ChangeSet, ChangeError> {
    let mut paths = match &options.range {
        ChangeRange::SinceDate(date) => {
            let since = format!("--since={date}");
            let out = git
                .run_listing(&["log", &since, "--relative", "--name-only", "--pretty=format:"])
                .await?;
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        }
        range => {
            let spec = match range {
                ChangeRange::Range(spec) => spec.clone(),
                other => other.describe(),
            };
            let out = git
                .run_listing(&["diff", "--relative", "--name-status", "-z", &spec])
                .await?;
            parse_name_status(&out.stdout)
        }
    };

    if options.include_untracked {
        let out = git
            .run_listing(&["ls-files", "--others", "--exclude-standard", "-z"])
            .await?;
        paths.extend(split_nul(&out.stdout));
    }

    let (base, target) = options.range.revisions();
    let mut set = ChangeSet::from_paths(paths);
    set.base = base;
    set.target = target;
    log::info!(
        "{} changed paths for {}",
        set.len(),
        options.range.describe()
    );
    Ok(set)
}

/// Parse `git diff --name-status -z`. Renames and copies contribute both paths.
fn parse_name_status(stdout: &[u8]) -> Vec<String> {
    let tokens: Vec<&[u8]> = stdout
        .split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .collect();

    let mut changed = Vec::new();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let status = tokens[idx];
        idx = idx.saturating_add(1);

        if idx >= tokens.len() {
            break;
        }
        changed.push(String::from_utf8_lossy(tokens[idx]).into_owned());
        idx = idx.saturating_add(1);

        let Some(first) = status.first() else {
            continue;
        };
        if *first == b'R' || *first == b'C' {
            if idx >= tokens.len() {
                break;
            }
            changed.push(String::from_utf8_lossy(tokens[idx]).into_owned());
            idx = idx.saturating_add(1);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{git_ok, init_repo};
    use pretty_assertions::assert_eq;

    fn paths(set: &ChangeSet) -> Vec<String> {
        set.paths.iter().cloned().collect()
    }

    #[test]
    fn name_status_parser_handles_renames() {
        let raw = b"M\0src/a.rs\0R100\0old.rs\0new.rs\0D\0gone.rs\0";
        assert_eq!(
            parse_name_status(raw),
            vec!["src/a.rs", "old.rs", "new.rs", "gone.rs"]
        );
    }

    #[test]
    fn range_revisions_are_split() {
        assert_eq!(
            ChangeRange::Range("v1..v2".into()).revisions(),
            (Some("v1".into()), Some("v2".into()))
        );
        assert_eq!(
            ChangeRange::Range("main...feature".into()).revisions(),
            (Some("main".into()), Some("feature".into()))
        );
        assert_eq!(
            ChangeRange::Since("abc".into()).revisions(),
            (Some("abc".into()), Some("HEAD".into()))
        );
    }

    #[tokio::test]
    async fn unavailable_outside_repositories() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = list_changed(dir.path(), &ChangeListOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChangeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn lists_changes_between_commits_including_renames() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let repo = dir.path();
        init_repo(repo).await;

        tokio::fs::write(repo.join("a.txt"), "alpha\n").await.unwrap();
        tokio::fs::write(repo.join("keep.txt"), "keep\n").await.unwrap();
        git_ok(repo, &["add", "."]).await;
        git_ok(repo, &["commit", "-m", "c1"]).await;
        let c1 = git_ok(repo, &["rev-parse", "HEAD"]).await;

        git_ok(repo, &["mv", "a.txt", "b.txt"]).await;
        git_ok(repo, &["commit", "-am", "c2"]).await;

        let set = list_changed(
            repo,
            &ChangeListOptions {
                range: ChangeRange::Since(c1.clone()),
                include_untracked: false,
            },
        )
        .await
        .expect("changes");
        assert_eq!(paths(&set), vec!["a.txt", "b.txt"]);
        assert_eq!(set.base.as_deref(), Some(c1.as_str()));
        assert_eq!(set.target.as_deref(), Some("HEAD"));

        let last = list_changed(repo, &ChangeListOptions::default())
            .await
            .expect("last commit");
        assert_eq!(paths(&last), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn subdirectory_roots_see_paths_relative_to_themselves() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let repo = dir.path();
        init_repo(repo).await;
        tokio::fs::create_dir_all(repo.join("pkg/src")).await.unwrap();
        tokio::fs::create_dir_all(repo.join("other")).await.unwrap();
        tokio::fs::write(repo.join("pkg/src/a.rs"), "a\n").await.unwrap();
        tokio::fs::write(repo.join("other/x.rs"), "x\n").await.unwrap();
        git_ok(repo, &["add", "."]).await;
        git_ok(repo, &["commit", "-m", "c1"]).await;
        let c1 = git_ok(repo, &["rev-parse", "HEAD"]).await;

        tokio::fs::write(repo.join("pkg/src/a.rs"), "a2\n").await.unwrap();
        tokio::fs::write(repo.join("other/x.rs"), "x2\n").await.unwrap();
        git_ok(repo, &["commit", "-am", "c2"]).await;

        let sub = repo.join("pkg");
        let last = list_changed(&sub, &ChangeListOptions::default())
            .await
            .expect("last commit");
        assert_eq!(paths(&last), vec!["src/a.rs"]);

        let since = list_changed(
            &sub,
            &ChangeListOptions {
                range: ChangeRange::Since(c1),
                include_untracked: false,
            },
        )
        .await
        .expect("since");
        assert_eq!(paths(&since), vec!["src/a.rs"]);

        let dated = list_changed(
            &sub,
            &ChangeListOptions {
                range: ChangeRange::SinceDate("1970-01-02".into()),
                include_untracked: false,
            },
        )
        .await
        .expect("since date");
        assert_eq!(paths(&dated), vec!["src/a.rs"]);
    }

    #[tokio::test]
    async fn includes_untracked_on_request() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let repo = dir.path();
        init_repo(repo).await;

        tokio::fs::write(repo.join("a.txt"), "alpha\n").await.unwrap();
        git_ok(repo, &["add", "."]).await;
        git_ok(repo, &["commit", "-m", "c1"]).await;
        tokio::fs::write(repo.join("a.txt"), "alpha2\n").await.unwrap();
        git_ok(repo, &["commit", "-am", "c2"]).await;
        tokio::fs::write(repo.join("new.txt"), "fresh\n").await.unwrap();

        let set = list_changed(
            repo,
            &ChangeListOptions {
                range: ChangeRange::LastCommit,
                include_untracked: true,
            },
        )
        .await
        .expect("changes");
        assert_eq!(paths(&set), vec!["a.txt", "new.txt"]);
    }

    #[tokio::test]
    async fn bad_revision_is_a_command_failure() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let repo = dir.path();
        init_repo(repo).await;
        tokio::fs::write(repo.join("a.txt"), "alpha\n").await.unwrap();
        git_ok(repo, &["add", "."]).await;
        git_ok(repo, &["commit", "-m", "c1"]).await;

        let err = list_changed(
            repo,
            &ChangeListOptions {
                range: ChangeRange::Range("nope..HEAD".into()),
                include_untracked: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChangeError::CommandFailed(_)));
    }
}
