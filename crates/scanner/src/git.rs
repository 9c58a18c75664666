use mapper_protocol::{normalize_rel_path, GitInfo};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::time::{timeout, Duration};

use crate::error::ChangeError;

// Probes must stay cheap and bounded; listings and diffs get a more generous budget.
const GIT_PROBE_TIMEOUT: Duration = Duration::from_millis(2_000);
const GIT_LIST_TIMEOUT: Duration = Duration::from_secs(60);

/// A detected git work tree. Constructed once at startup via [`GitRepo::detect`]; holding one
/// means the git binary ran and the root is inside a work tree.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

pub(crate) struct GitOutput {
    pub stdout: Vec<u8>,
}

impl GitRepo {
    /// Returns `Unavailable` when git is missing or `root` is not inside a work tree.
    pub async fn detect(root: &Path) -> Result<Self, ChangeError> {
        let out = timeout(
            GIT_PROBE_TIMEOUT,
            tokio::process::Command::new("git")
                .arg("-C")
                .arg(root)
                .arg("rev-parse")
                .arg("--is-inside-work-tree")
                .output(),
        )
        .await
        .map_err(|_| ChangeError::Unavailable("git rev-parse timed out".into()))?
        .map_err(|err| ChangeError::Unavailable(format!("git not runnable: {err}")))?;

        if !out.status.success() || String::from_utf8_lossy(&out.stdout).trim() != "true" {
            return Err(ChangeError::Unavailable(format!(
                "{} is not inside a git work tree",
                root.display()
            )));
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) async fn run(
        &self,
        args: &[&str],
        budget: Duration,
    ) -> Result<GitOutput, ChangeError> {
        let out = timeout(
            budget,
            tokio::process::Command::new("git")
                .arg("-C")
                .arg(&self.root)
                .args(args)
                .output(),
        )
        .await
        .map_err(|_| ChangeError::Timeout(format!("git {}", args.join(" "))))??;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let msg = if stderr.is_empty() {
                format!("git {} exited with {}", args.join(" "), out.status)
            } else {
                stderr
            };
            return Err(ChangeError::CommandFailed(msg));
        }
        Ok(GitOutput { stdout: out.stdout })
    }

    async fn probe_line(&self, args: &[&str]) -> Option<String> {
        let out = self.run(args, GIT_PROBE_TIMEOUT).await.ok()?;
        let line = String::from_utf8_lossy(&out.stdout).trim().to_string();
        (!line.is_empty()).then_some(line)
    }

    /// Best-effort head/branch/dirty summary for snapshot metadata.
    pub async fn info(&self) -> GitInfo {
        let head = self.probe_line(&["rev-parse", "HEAD"]).await;
        let branch = self
            .probe_line(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await;
        let dirty = self
            .run(&["status", "--porcelain", "-z"], GIT_PROBE_TIMEOUT)
            .await
            .ok()
            .map(|out| !out.stdout.is_empty());
        GitInfo {
            head,
            branch,
            dirty,
        }
    }

    /// Tracked plus untracked-but-not-ignored files, optionally narrowed by pathspecs.
    pub async fn list_files(&self, pathspecs: &[String]) -> Result<Vec<String>, ChangeError> {
        let mut args: Vec<&str> = vec!["ls-files", "-co", "--exclude-standard", "-z"];
        if !pathspecs.is_empty() {
            args.push("--");
            args.extend(pathspecs.iter().map(String::as_str));
        }
        let out = self.run(&args, GIT_LIST_TIMEOUT).await?;
        Ok(split_nul(&out.stdout))
    }

    /// How many of the last `commits` commits touched each path, relative to the root.
    pub async fn churn(&self, commits: usize) -> Result<BTreeMap<String, usize>, ChangeError> {
        let limit = commits.to_string();
        let out = self
            .run_listing(&["log", "-n", &limit, "--relative", "--name-only", "--pretty=format:"])
            .await?;
        let mut counts = BTreeMap::new();
        for line in String::from_utf8_lossy(&out.stdout).lines() {
            let path = normalize_rel_path(line);
            if !path.is_empty() {
                *counts.entry(path).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    pub(crate) async fn run_listing(&self, args: &[&str]) -> Result<GitOutput, ChangeError> {
        self.run(args, GIT_LIST_TIMEOUT).await
    }
}

pub(crate) fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}
