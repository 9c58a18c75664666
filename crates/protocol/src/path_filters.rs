use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::paths::normalize_rel_path;

/// Paths that are never worth scanning: VCS metadata, dependency and build trees, lockfiles,
/// compiled artifacts and media.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // VCS / tooling
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    "**/.idea/**",
    "**/.vscode/**",
    "**/.cache/**",
    "**/.mapper/**",
    // dependencies / builds
    "**/node_modules/**",
    "**/__pycache__/**",
    "**/.pytest_cache/**",
    "**/.mypy_cache/**",
    "**/.ruff_cache/**",
    "**/venv/**",
    "**/.venv/**",
    "**/dist/**",
    "**/build/**",
    "**/.next/**",
    "**/.nuxt/**",
    "**/.output/**",
    "**/coverage/**",
    "**/.nyc_output/**",
    "**/target/**",
    "**/vendor/**",
    "**/.bundle/**",
    "**/.cargo/**",
    "**/.gradle/**",
    "**/.turbo/**",
    "**/.parcel-cache/**",
    "**/.vercel/**",
    "**/.svelte-kit/**",
    "**/.serverless/**",
    "**/.terraform/**",
    "**/Pods/**",
    // lockfiles
    "**/*.lock",
    "**/package-lock.json",
    "**/pnpm-lock.yaml",
    "**/bun.lockb",
    // compiled artifacts
    "**/*.pyc",
    "**/*.pyo",
    "**/*.so",
    "**/*.dylib",
    "**/*.dll",
    "**/*.exe",
    "**/*.o",
    "**/*.a",
    "**/*.lib",
    "**/*.class",
    "**/*.jar",
    "**/*.war",
    "**/*.whl",
    // scratch files
    "**/*.log",
    "**/*.tmp",
    "**/*.bak",
    "**/*.swp",
    // media / archives / fonts
    "**/*.png",
    "**/*.jpg",
    "**/*.jpeg",
    "**/*.gif",
    "**/*.ico",
    "**/*.svg",
    "**/*.webp",
    "**/*.mp3",
    "**/*.mp4",
    "**/*.wav",
    "**/*.mov",
    "**/*.pdf",
    "**/*.zip",
    "**/*.tar",
    "**/*.gz",
    "**/*.7z",
    "**/*.woff",
    "**/*.woff2",
    "**/*.ttf",
    "**/*.otf",
];

/// Compiled include/exclude filter applied to every enumerated relative path.
///
/// A path is allowed when it matches no default ignore pattern, matches at least one include
/// pattern (if any are configured), and matches no exclude pattern.
#[derive(Debug, Clone)]
pub struct PathFilter {
    defaults: GlobSet,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, globset::Error> {
        let defaults = build_set(DEFAULT_IGNORE_PATTERNS.iter().copied())?;
        let include = non_empty(include)
            .map(|patterns| build_set(patterns.iter().map(String::as_str)))
            .transpose()?;
        let exclude = non_empty(exclude)
            .map(|patterns| build_set(patterns.iter().map(String::as_str)))
            .transpose()?;
        Ok(Self {
            defaults,
            include,
            exclude,
        })
    }

    /// Filter that applies only the default ignore set.
    pub fn defaults_only() -> Result<Self, globset::Error> {
        Self::new(&[], &[])
    }

    pub fn is_active(&self) -> bool {
        self.include.is_some() || self.exclude.is_some()
    }

    pub fn allows(&self, rel_path: &str) -> bool {
        let rel_path = normalize_rel_path(rel_path);
        if rel_path.is_empty() {
            return false;
        }
        if self.defaults.is_match(&rel_path) {
            return false;
        }
        if let Some(include) = &self.include {
            if !include.is_match(&rel_path) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&rel_path) {
                return false;
            }
        }
        true
    }
}

fn non_empty(patterns: &[String]) -> Option<Vec<String>> {
    let cleaned: Vec<String> = patterns
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn build_set<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        for expanded in expand_pattern(pattern) {
            builder.add(compile(&expanded)?);
        }
    }
    builder.build()
}

/// Expand one user pattern into the globs it stands for.
///
/// gitignore-style anchoring: a leading or inner `/` anchors the pattern at the root, a bare
/// pattern like `*.rs` or `docs` matches at any depth. Every pattern also covers the contents
/// of a directory it names.
fn expand_pattern(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();
    let base = pattern.trim_start_matches('/').trim_end_matches('/');
    if base.is_empty() {
        return Vec::new();
    }
    let anchored = pattern.starts_with('/') || base.contains('/');
    let mut roots = vec![base.to_string()];
    if !anchored {
        roots.push(format!("**/{base}"));
    }

    let mut out = Vec::with_capacity(roots.len() * 2);
    for root in roots {
        if !root.ends_with("/**") {
            out.push(format!("{root}/**"));
        }
        out.push(root);
    }
    out
}

/// Translate include/exclude patterns into `git ls-files` pathspecs with the same meaning as
/// [`PathFilter`].
pub fn git_pathspecs(include: &[String], exclude: &[String]) -> Vec<String> {
    let mut specs = Vec::new();
    for pattern in include {
        specs.extend(
            expand_pattern(pattern)
                .into_iter()
                .map(|glob| format!(":(glob){glob}")),
        );
    }
    if specs.is_empty() && exclude.iter().any(|p| !p.trim().is_empty()) {
        // Exclude-only pathspecs need a positive match to subtract from.
        specs.push(":(glob)**".to_string());
    }
    for pattern in exclude {
        specs.extend(
            expand_pattern(pattern)
                .into_iter()
                .map(|glob| format!(":(exclude,glob){glob}")),
        );
    }
    specs
}

fn compile(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}
