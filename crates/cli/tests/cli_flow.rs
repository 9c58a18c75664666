use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn mapper(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mapper").expect("binary");
    cmd.current_dir(workdir)
        .env_remove("MAPPER_WORKERS")
        .env_remove("MAPPER_TOKENIZER_PATH")
        .env("RUST_LOG", "warn");
    cmd
}

fn setup_project() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("core")).unwrap();
    fs::create_dir_all(root.join("api")).unwrap();
    fs::write(root.join("core/a.rs"), "pub fn alpha() -> u32 {\n    40 + 2\n}\n").unwrap();
    fs::write(root.join("core/b.rs"), "pub fn beta() {}\n").unwrap();
    fs::write(root.join("api/routes.rs"), "pub const ROUTES: &[&str] = &[\"/\", \"/health\"];\n")
        .unwrap();
    fs::write(root.join("README.md"), "# demo project\n").unwrap();
    temp
}

fn scan_json(root: &Path, extra: &[&str]) -> Value {
    let output = mapper(root)
        .arg("scan")
        .arg(".")
        .arg("--no-git")
        .args(extra)
        .output()
        .expect("scan run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("snapshot json")
}

#[test]
fn scan_prints_a_snapshot_and_writes_the_cache() {
    let temp = setup_project();
    let root = temp.path();

    let snapshot = scan_json(root, &[]);
    assert_eq!(snapshot["total_files"], 4);
    assert_eq!(snapshot["complete"], true);
    assert_eq!(snapshot["source"], "filesystem");
    let modules = snapshot["modules"].as_object().expect("modules");
    let mut ids: Vec<&str> = modules.keys().map(String::as_str).collect();
    ids.sort();
    assert_eq!(ids, vec![".", "api", "core"]);
    assert_eq!(snapshot["directories"], serde_json::json!(["api", "core"]));
    assert!(root.join(".mapper/scan-cache.json").is_file());

    let again = scan_json(root, &[]);
    assert_eq!(again["root_fingerprint"], snapshot["root_fingerprint"]);
    assert_eq!(again["cache"]["hits"], 4);
    assert_eq!(again["cache"]["tokenized"], 0);
}

#[test]
fn scan_writes_to_output_file_and_diffs_against_previous() {
    let temp = setup_project();
    let root = temp.path();

    mapper(root)
        .args(["scan", ".", "--no-git", "-o", "out/first.json"])
        .assert()
        .success();
    assert!(root.join("out/first.json").is_file());

    fs::write(root.join("api/extra.rs"), "pub fn extra() {}\n").unwrap();
    let snapshot = scan_json(root, &["--previous", "out/first.json", "--exclude", "out/**"]);
    let diff = &snapshot["diff"];
    assert_eq!(diff["files_added"], serde_json::json!(["api/extra.rs"]));
    assert_eq!(diff["modules"]["api"], "modified");
    assert_eq!(diff["modules"]["core"], "unchanged");
}

fn scanned_paths(snapshot: &Value) -> Vec<&str> {
    snapshot["files"]
        .as_array()
        .expect("files")
        .iter()
        .filter_map(|f| f["path"].as_str())
        .collect()
}

#[test]
fn changed_scope_picks_files_or_whole_modules() {
    let temp = setup_project();
    let root = temp.path();
    fs::write(root.join("changed.txt"), "core/a.rs
../outside.txt
").unwrap();

    let modules = scan_json(root, &["--changed", "changed.txt"]);
    assert_eq!(modules["complete"], false);
    assert_eq!(modules["changed_scope"], "modules");
    assert_eq!(scanned_paths(&modules), vec!["core/a.rs", "core/b.rs"]);
    assert_eq!(modules["changed_paths"], serde_json::json!(["core/a.rs"]));

    let files = scan_json(root, &["--changed", "changed.txt", "--changed-scope", "files"]);
    assert_eq!(files["changed_scope"], "files");
    assert_eq!(scanned_paths(&files), vec!["core/a.rs"]);
}

#[test]
fn partial_data_exits_with_code_three() {
    let temp = setup_project();
    let root = temp.path();
    fs::write(root.join("core/big.rs"), "x".repeat(4096)).unwrap();

    let output = mapper(root)
        .args(["scan", ".", "--no-git", "--max-file-size", "1024"])
        .output()
        .expect("scan run");
    assert_eq!(output.status.code(), Some(3));
    let snapshot: Value = serde_json::from_slice(&output.stdout).expect("snapshot json");
    assert_eq!(snapshot["warnings"], 1);
    let big = snapshot["files"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["path"] == "core/big.rs")
        .expect("oversized record kept");
    assert_eq!(big["flag"], "oversized");
    assert_eq!(big["tokens"], 0);
}

#[test]
fn input_errors_exit_with_code_two() {
    let temp = setup_project();
    let root = temp.path();

    mapper(root)
        .args(["scan", ".", "--no-git", "--previous", "missing.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing.json"));

    fs::write(root.join(".mapper.toml"), "module_depth = \"deep\"\n").unwrap();
    mapper(root)
        .args(["scan", ".", "--no-git"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains(".mapper.toml"));

    mapper(root)
        .args(["scan", ".", "--no-git", "--no-config", "--tokenizer", "exact"])
        .assert()
        .code(2);

    mapper(root)
        .args(["scan", ".", "--no-config", "--include", "["])
        .assert()
        .code(2);
}

#[test]
fn config_file_sets_module_depth() {
    let temp = setup_project();
    let root = temp.path();
    fs::write(root.join(".mapper.toml"), "module_depth = 0\n").unwrap();

    let snapshot = scan_json(root, &["--exclude", ".mapper.toml"]);
    let modules = snapshot["modules"].as_object().expect("modules");
    assert_eq!(modules.keys().collect::<Vec<_>>(), vec!["."]);

    let overridden = scan_json(root, &["--module-depth", "1", "--exclude", ".mapper.toml"]);
    assert_eq!(overridden["modules"].as_object().unwrap().len(), 3);
}

#[test]
fn plan_splits_a_saved_snapshot() {
    let temp = setup_project();
    let root = temp.path();
    mapper(root)
        .args(["scan", ".", "--no-git", "-o", "snap.json"])
        .assert()
        .success();

    let output = mapper(root)
        .args(["plan", "snap.json", "--max-tokens", "100000"])
        .output()
        .expect("plan run");
    assert!(output.status.success());
    let plan: Value = serde_json::from_slice(&output.stdout).expect("plan json");
    assert_eq!(plan["stats"]["buckets"], 1);
    assert_eq!(plan["stats"]["files"], 4);
    assert_eq!(plan["buckets"][0]["id"], 1);

    mapper(root)
        .args(["plan", "snap.json", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bucket 1"))
        .stdout(predicate::str::contains("Total: 1 buckets, 4 files"));
}

#[test]
fn plan_honours_changed_lists_and_rejects_bad_budgets() {
    let temp = setup_project();
    let root = temp.path();
    mapper(root)
        .args(["scan", ".", "--no-git", "-o", "snap.json"])
        .assert()
        .success();
    fs::write(root.join("changed.txt"), "core/b.rs\n").unwrap();

    let output = mapper(root)
        .args(["plan", "snap.json", "--changed", "changed.txt", "--scope", "files"])
        .output()
        .expect("plan run");
    assert!(output.status.success());
    let plan: Value = serde_json::from_slice(&output.stdout).expect("plan json");
    assert_eq!(plan["stats"]["files"], 1);
    assert_eq!(plan["buckets"][0]["files"][0]["path"], "core/b.rs");

    let output = mapper(root)
        .args(["plan", "snap.json", "--changed", "-"])
        .write_stdin("core/b.rs\n")
        .output()
        .expect("plan run");
    let plan: Value = serde_json::from_slice(&output.stdout).expect("plan json");
    assert_eq!(plan["stats"]["files"], 2);
    assert_eq!(plan["changed_scope"], "modules");

    mapper(root)
        .args(["plan", "snap.json", "--max-tokens", "0"])
        .assert()
        .code(2);

    fs::write(root.join("elsewhere.txt"), "nowhere/x.rs\n").unwrap();
    mapper(root)
        .args(["plan", "snap.json", "--changed", "elsewhere.txt"])
        .assert()
        .code(2);
}

#[test]
fn changes_outside_a_repository_exit_with_code_four() {
    let temp = setup_project();
    mapper(temp.path())
        .args(["changes", "."])
        .assert()
        .code(4);
}

#[test]
fn schema_command_prints_json_schema() {
    let temp = tempdir().unwrap();
    let output = mapper(temp.path()).arg("schema").output().expect("run");
    assert!(output.status.success());
    let schema: Value = serde_json::from_slice(&output.stdout).expect("schema json");
    assert!(schema["properties"]["files"].is_object());

    let output = mapper(temp.path())
        .args(["schema", "--plan"])
        .output()
        .expect("run");
    let schema: Value = serde_json::from_slice(&output.stdout).expect("schema json");
    assert!(schema["properties"]["buckets"].is_object());
}
