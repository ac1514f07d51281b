#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Stands in for the sandboxed build script
const FAKE_TOOL: &str = r#"
if [ "$1" = "targets" ]; then
  if [ -e "$(dirname "$0")/discovery-fails" ]; then
    echo "sandbox not running" >&2
    exit 3
  fi
  echo "linux-x64-light"
  echo "efr32-*"
  echo "foo_app (NOGLOB not globbable)"
  exit 0
fi

target=""
while [ $# -gt 0 ]; do
  case "$1" in
    --target|--target-glob) target="$2"; shift ;;
  esac
  shift
done

case "$target" in
  broken)
    echo "INFO Compiling src/foo.cc"
    echo "INFO /workspace/src/foo.cc:12:5: error: bad thing"
    exit 1 ;;
  noisy)
    echo "INFO ../../src/bar.cc:1:1: warning: meh" ;;
  *)
    echo "built $target" ;;
esac
"#;

struct Fixture {
    dir: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool.sh");
        fs::write(&tool, FAKE_TOOL).unwrap();

        let config = dir.path().join("config.yml");
        fs::write(
            &config,
            format!(
                "sandbox:\n  exec: sh -c\n  mapped_path: /workspace/\n  host_path: /host/chip/\n\
                 build:\n  activate: \"true\"\n  tool: sh {}\n  discovery_args: [targets]\n\
                 cache_file: {}\nstate_file: {}\n",
                tool.display(),
                dir.path().join("targets.list").display(),
                dir.path().join("state.json").display(),
            ),
        )
        .unwrap();

        Self { dir, config }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("buildpane").unwrap();
        cmd.arg("--config").arg(&self.config);
        cmd
    }
}

#[test]
fn test_targets_lists_discovery_and_sentinel() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .arg("targets")
        .assert()
        .success()
        .stdout("linux-x64-light\nefr32-*\nfoo_app (not globbable)\nRE-COMPUTE\n");

    let cache = fs::read_to_string(fixture.path().join("targets.list")).unwrap();
    // Trailing empty discovery line is kept in the cache but never listed
    assert_eq!(
        cache,
        "linux-x64-light\nefr32-*\nfoo_app (NOGLOB not globbable)\n\n"
    );
}

#[test]
fn test_targets_served_from_cache() {
    let fixture = Fixture::new();
    fs::write(fixture.path().join("targets.list"), "cached-one\n").unwrap();

    fixture
        .cmd()
        .arg("targets")
        .assert()
        .success()
        .stdout("cached-one\nRE-COMPUTE\n");

    fixture
        .cmd()
        .args(["targets", "--refresh"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("linux-x64-light\n"));
}

#[test]
fn test_discovery_failure_leaves_no_cache() {
    let fixture = Fixture::new();
    fs::write(fixture.path().join("discovery-fails"), "").unwrap();

    fixture
        .cmd()
        .arg("targets")
        .assert()
        .failure()
        .stderr(predicate::str::contains("target discovery failed"))
        .stderr(predicate::str::contains("sandbox not running"));

    assert!(!fixture.path().join("targets.list").exists());
}

#[test]
fn test_clean_build() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .args(["build", "linux-x64-light"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Starting build for linux-x64-light\n"))
        .stdout(predicate::str::contains("built linux-x64-light\n"))
        .stdout(predicate::str::contains("\n[Finished]"))
        .stdout(predicate::str::contains("linux-x64-light: Finished (0 errors, 0 warnings)"))
        .stdout(predicate::str::contains("\r").not());

    let state = fs::read_to_string(fixture.path().join("state.json")).unwrap();
    assert!(state.contains("\"last_target\": \"linux-x64-light\""));
    assert!(state.contains("\"outcome\": \"finished\""));
}

#[test]
fn test_build_with_errors_fails() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .args(["build", "broken"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "INFO /host/chip/src/foo.cc:12:5: error: bad thing\n",
        ))
        .stdout(predicate::str::contains("/host/chip/src/foo.cc:12:5: error: bad thing\n"))
        .stdout(predicate::str::contains("broken: Finished (1 errors, 0 warnings)"));
}

#[test]
fn test_relative_diagnostic_resolves_against_result_dir() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .args(["build", "noisy"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "/host/chip/out/fake/../../src/bar.cc:1:1: warning: meh",
        ))
        .stdout(predicate::str::contains("noisy: Finished (0 errors, 1 warnings)"));
}

#[test]
fn test_glob_target_builds() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .args(["build", "efr32-*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("built efr32-*"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let fixture = Fixture::new();
    fs::write(&fixture.config, "build:\n  tool: \"\"\n").unwrap();

    fixture
        .cmd()
        .arg("targets")
        .assert()
        .failure()
        .stderr(predicate::str::contains("build.tool must not be empty"));
}
