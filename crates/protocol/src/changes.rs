use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::paths::{escapes_root, module_id, normalize_rel_path};

/// Whether a change-restricted scan or plan covers only the changed files or their whole modules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangedScope {
    Files,
    #[default]
    Modules,
}

impl ChangedScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangedScope::Files => "files",
            ChangedScope::Modules => "modules",
        }
    }
}

/// A set of changed root-relative paths plus the revisions they were derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
pub struct ChangeSet {
    pub paths: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChangedListDocument {
    List(Vec<String>),
    Object {
        #[serde(alias = "paths")]
        files: Vec<String>,
        #[serde(default)]
        base: Option<String>,
        #[serde(default)]
        target: Option<String>,
    },
}

impl ChangeSet {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        set.extend(paths);
        set
    }

    /// Parse a changed-file list: either JSON (`["a", "b"]`, `{"files": [...]}` or a serialized
    /// [`ChangeSet`]) or plain text with one path per line. Blank lines and `#` comments are
    /// ignored.
    pub fn parse_list(text: &str) -> Self {
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(doc) = serde_json::from_str::<ChangedListDocument>(trimmed) {
                return match doc {
                    ChangedListDocument::List(paths) => Self::from_paths(paths),
                    ChangedListDocument::Object {
                        files,
                        base,
                        target,
                    } => Self {
                        base,
                        target,
                        ..Self::from_paths(files)
                    },
                };
            }
        }

        Self::from_paths(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    pub fn extend<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            let raw = path.as_ref();
            if escapes_root(raw) {
                log::warn!("Ignoring changed path outside the root: {raw}");
                continue;
            }
            let normalized = normalize_rel_path(raw);
            if !normalized.is_empty() {
                self.paths.insert(normalized);
            }
        }
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.paths.extend(other.paths);
        if self.base.is_none() {
            self.base = other.base;
        }
        if self.target.is_none() {
            self.target = other.target;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Module ids touched by the changed paths at the given depth.
    pub fn modules(&self, depth: usize) -> BTreeSet<String> {
        self.paths.iter().map(|path| module_id(path, depth)).collect()
    }

    /// Plain-text form: one path per line.
    pub fn to_text(&self) -> String {
        self.paths.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_plain_text_lists() {
        let set = ChangeSet::parse_list("./src/lib.rs\n\n# comment\nsrc/main.rs\nsrc/lib.rs\n");
        assert_eq!(
            set.paths.iter().cloned().collect::<Vec<_>>(),
            vec!["src/lib.rs".to_string(), "src/main.rs".to_string()]
        );
    }

    #[test]
    fn parses_json_lists_and_objects() {
        let list = ChangeSet::parse_list(r#"["a/x.rs", "./b/y.rs"]"#);
        assert!(list.contains("a/x.rs"));
        assert!(list.contains("b/y.rs"));

        let object = ChangeSet::parse_list(r#"{"root": "/repo", "files": ["c/z.rs"]}"#);
        assert_eq!(object.len(), 1);
        assert!(object.contains("c/z.rs"));
    }

    #[test]
    fn serialized_change_sets_parse_back() {
        let mut original = ChangeSet::from_paths(["src/a.rs", "src/b.rs"]);
        original.base = Some("v1".into());
        original.target = Some("HEAD".into());
        let text = serde_json::to_string(&original).unwrap();
        assert_eq!(ChangeSet::parse_list(&text), original);
    }

    #[test]
    fn paths_outside_the_root_are_dropped() {
        let set = ChangeSet::parse_list("../secret.txt\nsrc/a.rs\nsrc/../../etc/passwd\n");
        assert_eq!(set.paths.iter().collect::<Vec<_>>(), vec!["src/a.rs"]);

        let json = ChangeSet::parse_list(r#"{"files": ["../x.rs", "b.rs"]}"#);
        assert_eq!(json.paths.iter().collect::<Vec<_>>(), vec!["b.rs"]);
    }

    #[test]
    fn malformed_json_falls_back_to_lines() {
        let set = ChangeSet::parse_list("[not json\nsrc/a.rs");
        assert!(set.contains("[not json"));
        assert!(set.contains("src/a.rs"));
    }

    #[test]
    fn modules_follow_depth() {
        let set = ChangeSet::from_paths(["core/a.rs", "core/sub/b.rs", "README.md"]);
        let modules: Vec<String> = set.modules(1).into_iter().collect();
        assert_eq!(modules, vec![".".to_string(), "core".to_string()]);
    }

    #[test]
    fn merge_keeps_first_revisions() {
        let mut a = ChangeSet::from_paths(["a.rs"]);
        a.base = Some("v1".into());
        let mut b = ChangeSet::from_paths(["b.rs"]);
        b.base = Some("v0".into());
        b.target = Some("HEAD".into());
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.base.as_deref(), Some("v1"));
        assert_eq!(a.target.as_deref(), Some("HEAD"));
    }
}
