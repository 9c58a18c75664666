/// Module id used when the whole repository is a single module, and for root-level files.
pub const ROOT_MODULE: &str = ".";

/// True when `raw` has a `..` component and so could resolve outside the root.
pub fn escapes_root(raw: &str) -> bool {
    raw.trim()
        .replace('\\', "/")
        .split('/')
        .any(|part| part == "..")
}

/// Normalize a user- or tool-supplied relative path into the stable identity form used by
/// snapshots: forward slashes, no leading `./` or `/`, no trailing `/`.
///
/// Paths that escape the root normalize to the empty string, which every caller drops.
pub fn normalize_rel_path(raw: &str) -> String {
    if escapes_root(raw) {
        return String::new();
    }
    let mut value = raw.trim().replace('\\', "/");
    while let Some(rest) = value.strip_prefix("./") {
        value = rest.to_string();
    }
    let value = value.trim_matches('/');
    if value == "." {
        return String::new();
    }
    value.to_string()
}

/// Derive the module identifier for `rel_path`.
///
/// The module is the first `depth` directory components of the path. Files that sit shallower
/// than `depth` use their full parent directory, root-level files map to [`ROOT_MODULE`], and a
/// depth of 0 puts every file into [`ROOT_MODULE`].
pub fn module_id(rel_path: &str, depth: usize) -> String {
    if depth == 0 {
        return ROOT_MODULE.to_string();
    }

    let normalized = normalize_rel_path(rel_path);
    let mut components: Vec<&str> = normalized
        .split('/')
        .filter(|part| !part.is_empty())
        .collect();
    // The last component is the file name.
    components.pop();

    if components.is_empty() {
        return ROOT_MODULE.to_string();
    }
    components.truncate(depth);
    components.join("/")
}
