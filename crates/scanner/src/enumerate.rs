use ignore::WalkBuilder;
use mapper_protocol::{
    escapes_root, git_pathspecs, module_id, normalize_rel_path, ChangeSet, ChangedScope,
    FileSourceKind, PathFilter,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::git::GitRepo;

/// Candidate files for one scan, as sorted, deduplicated root-relative paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    pub source: FileSourceKind,
    pub paths: Vec<String>,
}

/// Lists candidate files from git, the filesystem, or an explicit changed list.
#[derive(Debug, Clone)]
pub struct FileEnumerator {
    root: PathBuf,
    filter: PathFilter,
    pathspecs: Vec<String>,
    follow_symlinks: bool,
    module_depth: usize,
    /// Root-relative paths the scanner writes itself.
    skipped: BTreeSet<String>,
}

impl FileEnumerator {
    pub fn new(root: impl AsRef<Path>, config: &ScanConfig) -> Result<Self> {
        let filter = PathFilter::new(&config.include, &config.exclude)
            .map_err(|err| ScanError::Configuration(format!("invalid glob: {err}")))?;
        let pathspecs = if config.git_pathspec {
            git_pathspecs(&config.include, &config.exclude)
        } else {
            Vec::new()
        };
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            filter,
            pathspecs,
            follow_symlinks: config.follow_symlinks,
            module_depth: config.module_depth,
            skipped: BTreeSet::new(),
        })
    }

    /// Never report `rel_path`, whatever the source says.
    pub fn skip_path(&mut self, rel_path: &str) {
        let normalized = normalize_rel_path(rel_path);
        if !normalized.is_empty() {
            self.skipped.insert(normalized);
        }
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Enumerate candidates. A changed list takes precedence over every other source: with
    /// [`ChangedScope::Files`] it is the candidate list itself, with [`ChangedScope::Modules`] the
    /// full listing is narrowed to the modules it touches. Otherwise git is used when available
    /// and the filesystem walk is the fallback.
    pub async fn enumerate(
        &self,
        git: Option<&GitRepo>,
        changed: Option<&ChangeSet>,
        scope: ChangedScope,
    ) -> Result<Enumeration> {
        let Some(changed) = changed else {
            return self.list_all(git).await;
        };

        match scope {
            ChangedScope::Files => {
                let paths = self.from_changed(changed);
                log::info!(
                    "Restricted to {} of {} changed paths",
                    paths.len(),
                    changed.len()
                );
                Ok(Enumeration {
                    source: FileSourceKind::ChangedList,
                    paths,
                })
            }
            ChangedScope::Modules => {
                let modules = changed.modules(self.module_depth);
                let mut listing = self.list_all(git).await?;
                listing
                    .paths
                    .retain(|path| modules.contains(&module_id(path, self.module_depth)));
                log::info!(
                    "Restricted to {} files in {} changed modules",
                    listing.paths.len(),
                    modules.len()
                );
                Ok(listing)
            }
        }
    }

    async fn list_all(&self, git: Option<&GitRepo>) -> Result<Enumeration> {
        if let Some(git) = git {
            match git.list_files(&self.pathspecs).await {
                Ok(listed) => {
                    let paths = self.finish(listed);
                    log::info!("Found {} files via git", paths.len());
                    return Ok(Enumeration {
                        source: FileSourceKind::Git,
                        paths,
                    });
                }
                Err(err) => {
                    log::warn!("git listing failed, falling back to filesystem walk: {err}");
                }
            }
        }

        let walker = self.clone();
        let paths = tokio::task::spawn_blocking(move || walker.walk())
            .await
            .map_err(|err| ScanError::Other(format!("filesystem walk panicked: {err}")))?;
        log::info!("Found {} files via filesystem walk", paths.len());
        Ok(Enumeration {
            source: FileSourceKind::Filesystem,
            paths,
        })
    }

    /// Filesystem traversal honouring `.gitignore` and `.git/info/exclude`.
    pub fn walk(&self) -> Vec<String> {
        let mut files = Vec::new();

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .follow_links(self.follow_symlinks);
        let root = self.root.clone();
        builder.filter_entry(move |entry| {
            !entry
                .path()
                .strip_prefix(&root)
                .is_ok_and(|rel| rel.starts_with(".git"))
        });

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }
                    match entry.path().strip_prefix(&self.root) {
                        Ok(rel) => files.push(rel.to_string_lossy().into_owned()),
                        Err(_) => {
                            log::debug!("Skipping entry outside root {}", entry.path().display())
                        }
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        self.finish(files)
    }

    fn from_changed(&self, changed: &ChangeSet) -> Vec<String> {
        let existing = changed
            .paths
            .iter()
            .filter(|path| {
                if escapes_root(path) {
                    log::warn!("Ignoring changed path outside the root: {path}");
                    return false;
                }
                true
            })
            .filter(|path| match std::fs::metadata(self.root.join(path.as_str())) {
                Ok(meta) => meta.is_file(),
                Err(_) => {
                    log::debug!("Changed path {path} no longer exists");
                    false
                }
            })
            .cloned()
            .collect();
        self.finish(existing)
    }

    /// Normalize, filter, drop unwanted symlinks, sort and dedupe.
    fn finish(&self, raw: Vec<String>) -> Vec<String> {
        let mut paths: Vec<String> = raw
            .iter()
            .map(|p| normalize_rel_path(p))
            .filter(|p| !p.is_empty() && !self.skipped.contains(p))
            .filter(|p| self.filter.allows(p))
            .filter(|p| self.follow_symlinks || !self.is_symlink(p))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    fn is_symlink(&self, rel: &str) -> bool {
        std::fs::symlink_metadata(self.root.join(rel))
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{git_ok, init_repo};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    fn config(include: &[&str], exclude: &[&str]) -> ScanConfig {
        ScanConfig {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn walk_applies_defaults_gitignore_and_filters() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/lib.rs", "pub fn a() {}");
        write(root, "src/gen/out.rs", "// generated");
        write(root, "docs/guide.md", "# guide");
        write(root, "node_modules/pkg/index.js", "x");
        write(root, "Cargo.lock", "lock");
        write(root, ".gitignore", "scratch.txt\n");
        write(root, "scratch.txt", "ignored");

        let all = FileEnumerator::new(root, &ScanConfig::default())
            .unwrap()
            .walk();
        assert_eq!(
            all,
            vec![".gitignore", "docs/guide.md", "src/gen/out.rs", "src/lib.rs"]
        );

        let narrowed = FileEnumerator::new(root, &config(&["src"], &["gen"]))
            .unwrap()
            .walk();
        assert_eq!(narrowed, vec!["src/lib.rs"]);
    }

    #[test]
    fn invalid_glob_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let err = FileEnumerator::new(dir.path(), &config(&["src/[oops"], &[])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped_unless_followed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "real.txt", "data");
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();

        let skipped = FileEnumerator::new(root, &ScanConfig::default())
            .unwrap()
            .walk();
        assert_eq!(skipped, vec!["real.txt"]);

        let followed = FileEnumerator::new(
            root,
            &ScanConfig {
                follow_symlinks: true,
                ..ScanConfig::default()
            },
        )
        .unwrap()
        .walk();
        assert_eq!(followed, vec!["link.txt", "real.txt"]);
    }

    #[tokio::test]
    async fn changed_list_skips_deleted_and_filtered_paths() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/a.rs", "a");
        write(root, "docs/b.md", "b");

        let enumerator = FileEnumerator::new(root, &config(&[], &["docs"])).unwrap();
        let changed = ChangeSet::from_paths(["src/a.rs", "docs/b.md", "src/deleted.rs"]);
        let out = enumerator
            .enumerate(None, Some(&changed), ChangedScope::Files)
            .await
            .unwrap();
        assert_eq!(out.source, FileSourceKind::ChangedList);
        assert_eq!(out.paths, vec!["src/a.rs"]);
    }

    #[tokio::test]
    async fn changed_paths_cannot_reach_outside_the_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        write(dir.path(), "secret.txt", "outside");
        write(&root, "src/a.rs", "a");

        let enumerator = FileEnumerator::new(&root, &ScanConfig::default()).unwrap();
        let mut changed = ChangeSet::from_paths(["src/a.rs"]);
        // Bypass normalization the way a deserialized change set could.
        changed.paths.insert("../secret.txt".to_string());
        changed.paths.insert("src/../../secret.txt".to_string());
        let out = enumerator
            .enumerate(None, Some(&changed), ChangedScope::Files)
            .await
            .unwrap();
        assert_eq!(out.paths, vec!["src/a.rs"]);
    }

    #[tokio::test]
    async fn modules_scope_widens_to_whole_modules() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "core/a.rs", "a");
        write(root, "core/b.rs", "b");
        write(root, "core/deep/c.rs", "c");
        write(root, "api/routes.rs", "r");
        write(root, "README.md", "readme");

        let enumerator = FileEnumerator::new(root, &ScanConfig::default()).unwrap();
        let changed = ChangeSet::from_paths(["core/a.rs", "core/removed.rs"]);
        let out = enumerator
            .enumerate(None, Some(&changed), ChangedScope::Modules)
            .await
            .unwrap();
        assert_eq!(out.source, FileSourceKind::Filesystem);
        assert_eq!(out.paths, vec!["core/a.rs", "core/b.rs", "core/deep/c.rs"]);

        let with_root = ChangeSet::from_paths(["README.md"]);
        let out = enumerator
            .enumerate(None, Some(&with_root), ChangedScope::Modules)
            .await
            .unwrap();
        assert_eq!(out.paths, vec!["README.md"]);
    }

    #[test]
    fn skipped_paths_never_surface() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/lib.rs", "pub fn a() {}");
        write(root, "state/cache.json", "{}");

        let mut enumerator = FileEnumerator::new(root, &ScanConfig::default()).unwrap();
        assert_eq!(enumerator.walk(), vec!["src/lib.rs", "state/cache.json"]);
        enumerator.skip_path("./state/cache.json");
        assert_eq!(enumerator.walk(), vec!["src/lib.rs"]);
    }

    #[tokio::test]
    async fn git_source_matches_in_process_filters() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        init_repo(root).await;
        write(root, "src/lib.rs", "pub fn a() {}");
        write(root, "src/gen/out.rs", "// generated");
        write(root, "README.md", "# readme");
        git_ok(root, &["add", "."]).await;
        git_ok(root, &["commit", "-m", "init"]).await;

        let git = GitRepo::detect(root).await.unwrap();
        for git_pathspec in [true, false] {
            let cfg = ScanConfig {
                git_pathspec,
                ..config(&["src"], &["gen"])
            };
            let enumerator = FileEnumerator::new(root, &cfg).unwrap();
            let out = enumerator
                .enumerate(Some(&git), None, ChangedScope::Files)
                .await
                .unwrap();
            assert_eq!(out.source, FileSourceKind::Git);
            assert_eq!(out.paths, vec!["src/lib.rs"]);
            assert_eq!(enumerator.walk(), out.paths);
        }
    }

    #[tokio::test]
    async fn filesystem_is_used_without_git() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        let out = FileEnumerator::new(dir.path(), &ScanConfig::default())
            .unwrap()
            .enumerate(None, None, ChangedScope::Files)
            .await
            .unwrap();
        assert_eq!(out.source, FileSourceKind::Filesystem);
        assert_eq!(out.paths, vec!["a.txt"]);
    }
}
