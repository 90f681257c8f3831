//! Integration tests for `relock` commands with `--json` output.

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "relock-cli", "--bin", "relock", "--"]);
    cmd
}

const PACKAGE_JSON: &str = r#"{
  "name": "app",
  "version": "1.0.0",
  "dependencies": { "left-pad": "^1.3.0" }
}
"#;

const YARN_LOCK: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


left-pad@^1.3.0:
  version "1.3.0"
  resolved "https://registry.yarnpkg.com/left-pad/-/left-pad-1.3.0.tgz#5b8a3a7765dfe001261dde915589e782f8c94d1e"
  integrity sha512-XI5MPzVNApjAyhQzphX8BkmKsKUxD4LdyK24iZeQ9wst+6YYbmrv/A0dbWW2mKlPsY8A2jIX0U3+Yjo1frg3dw==
"#;

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("package.json"), PACKAGE_JSON).unwrap();
    fs::write(dir.path().join("yarn.lock"), YARN_LOCK).unwrap();
    dir
}

fn run_json(dir: &TempDir, args: &[&str]) -> (bool, serde_json::Value) {
    let output = cargo_bin()
        .args(args)
        .arg("--json")
        .arg("--cwd")
        .arg(dir.path())
        .output()
        .expect("Failed to run relock");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("Invalid JSON output: {e}\nstdout: {stdout}"));
    (output.status.success(), value)
}

#[test]
fn test_version_json() {
    let dir = tempfile::tempdir().unwrap();
    let (ok, value) = run_json(&dir, &["version"]);
    assert!(ok);
    assert_eq!(value["ok"], true);
    assert!(value["version"].is_string());
    assert_eq!(value["schema_version"], 1);
}

#[test]
fn test_convert_yarn_classic_to_npm3_uses_sibling_manifest() {
    let dir = project();
    let (ok, value) = run_json(&dir, &["convert", "yarn.lock", "--format", "npm-3"]);
    assert!(ok, "{value}");
    assert_eq!(value["format"], "npm-3");

    let lockfile: serde_json::Value =
        serde_json::from_str(value["lockfile"].as_str().unwrap()).unwrap();
    assert_eq!(lockfile["lockfileVersion"], 3);
    assert_eq!(lockfile["packages"][""]["name"], "app");
    assert_eq!(lockfile["packages"]["node_modules/left-pad"]["version"], "1.3.0");
}

#[test]
fn test_convert_writes_output_file() {
    let dir = project();
    let (ok, value) = run_json(
        &dir,
        &["convert", "yarn.lock", "--format", "yarn-berry", "-o", "out.lock"],
    );
    assert!(ok, "{value}");
    assert!(value["output"].as_str().unwrap().ends_with("out.lock"));

    let text = fs::read_to_string(dir.path().join("out.lock")).unwrap();
    assert!(text.contains("__metadata:"));
    assert_eq!(value["blake3"].as_str().unwrap().len(), 64);
    assert!(text.contains("\"left-pad@npm:^1.3.0\":"));
}

#[test]
fn test_parse_then_format_through_snapshot_file() {
    let dir = project();
    let (ok, value) = run_json(&dir, &["parse", "yarn.lock", "-o", "snapshot.json"]);
    assert!(ok, "{value}");
    assert_eq!(value["format"], "yarn-classic");
    assert_eq!(value["records"], 2);

    let (ok, value) = run_json(&dir, &["format", "snapshot.json", "--format", "yarn-classic"]);
    assert!(ok, "{value}");
    let text = value["lockfile"].as_str().unwrap();
    assert!(text.starts_with("# THIS IS AN AUTOGENERATED FILE."));
    assert!(text.contains("left-pad@^1.3.0:"));
    assert!(text.contains("  version \"1.3.0\""));
}

#[test]
fn test_graph_summary() {
    let dir = project();
    let (ok, value) = run_json(&dir, &["graph", "yarn.lock"]);
    assert!(ok, "{value}");
    let graph = &value["graph"];
    assert_eq!(graph["records"], 2);
    assert_eq!(graph["tree_entries"], 2);
    assert_eq!(graph["edges"], 1);
    assert_eq!(graph["placements"], 1);
    assert_eq!(graph["unsatisfied"], serde_json::json!([]));
    assert_eq!(graph["digest"].as_str().unwrap().len(), 64);
    assert!(value.get("analysis").is_none());

    let (_, full) = run_json(&dir, &["graph", "yarn.lock", "--full"]);
    assert_eq!(
        full["analysis"]["placement"]["entries"]["node_modules/left-pad"]["key"],
        "left-pad@1.3.0"
    );
}

#[test]
fn test_missing_record_reports_inconsistent_snapshot() {
    let dir = project();
    let lock = YARN_LOCK.to_string() + "  dependencies:\n    missing \"^2.0.0\"\n";
    fs::write(dir.path().join("yarn.lock"), lock).unwrap();

    let (ok, value) = run_json(&dir, &["graph", "yarn.lock"]);
    assert!(!ok);
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "LOCK_INCONSISTENT_SNAPSHOT");
    assert!(value["error"]["message"].as_str().unwrap().contains("missing"));
}

#[test]
fn test_max_entries_rejects_large_lockfile() {
    let dir = project();
    let (ok, value) = run_json(
        &dir,
        &["convert", "yarn.lock", "--format", "npm-3", "--max-entries", "1"],
    );
    assert!(!ok);
    assert_eq!(value["error"]["code"], "LOCK_TOO_LARGE");
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let (ok, value) = run_json(&dir, &["parse", "nope.lock"]);
    assert!(!ok);
    assert_eq!(value["error"]["code"], "IO_ERROR");
}

#[test]
fn test_debug_dir_receives_dumps() {
    let dir = project();
    let (ok, _) = run_json(
        &dir,
        &["convert", "yarn.lock", "--format", "npm-3", "--debug-dir", "dumps"],
    );
    assert!(ok);

    let dumps = dir.path().join("dumps");
    assert!(dumps.join("snapshot-yarn-classic.json").is_file());
    assert!(dumps.join("tree.json").is_file());
    assert!(dumps.join("placement.json").is_file());

    let tree: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dumps.join("tree.json")).unwrap()).unwrap();
    assert_eq!(tree["roots"][0], "");
}
