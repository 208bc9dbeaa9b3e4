use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn clauding(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("clauding");
    cmd.current_dir(root)
        .env("CLAUDING_HOME", root)
        .env("CLAUDING_CONFIG_PATH", root.join("absent-config.toml"))
        .env_remove("CLAUDING_CLAUDE_DIR")
        .env_remove("CLAUDING_CLAUDE_JSON")
        .env_remove("CLAUDING_BACKUP_DIR")
        .env_remove("CLAUDING_BACKUP_ENABLED")
        .arg("--claude-dir")
        .arg(root.join(".claude"));
    cmd
}

/// `gone` is referenced by the log and the dictionary but missing on disk.
fn seed(root: &Path) -> (String, String) {
    let gone = root.join("gone/proj").to_string_lossy().to_string();
    let live = root.join("live");
    fs::create_dir_all(&live).expect("mkdir live");
    let live = live.to_string_lossy().to_string();
    fs::create_dir_all(root.join(".claude/projects")).expect("mkdir projects");

    fs::write(
        root.join(".claude/history.jsonl"),
        format!(
            "{{\"project\":\"{gone}\",\"ts\":1}}\n{{\"project\":\"{live}\",\"ts\":2}}\n{{\"project\":\"{gone}\",\"ts\":3}}\n"
        ),
    )
    .expect("history");
    fs::write(
        root.join(".claude.json"),
        format!("{{\"projects\":{{\"{gone}\":{{\"x\":1}},\"{live}\":{{}}}}}}"),
    )
    .expect("dictionary");
    (gone, live)
}

#[test]
fn clean_path_removes_only_the_orphan() {
    let tmp = tempdir().expect("tempdir");
    let (gone, live) = seed(tmp.path());

    clauding(tmp.path())
        .args(["clean", "--path", gone.as_str()])
        .assert()
        .success()
        .stdout(predicates::str::contains("removed 2 line(s)"));

    assert_eq!(
        fs::read_to_string(tmp.path().join(".claude/history.jsonl")).expect("history"),
        format!("{{\"project\":\"{live}\",\"ts\":2}}\n")
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join(".claude.json")).expect("dictionary"),
        format!("{{\"projects\":{{\"{live}\":{{}}}}}}")
    );

    clauding(tmp.path())
        .args(["clean", "--path", gone.as_str()])
        .assert()
        .success()
        .stdout(predicates::str::contains("nothing to do"))
        .stderr(predicates::str::contains("not referenced"));
}

#[test]
fn clean_without_force_only_reports() {
    let tmp = tempdir().expect("tempdir");
    let (gone, _) = seed(tmp.path());
    let history = fs::read_to_string(tmp.path().join(".claude/history.jsonl")).expect("history");

    clauding(tmp.path())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicates::str::contains("reporting what would be cleaned"))
        .stdout(predicates::str::contains("would apply"));
    assert_eq!(
        fs::read_to_string(tmp.path().join(".claude/history.jsonl")).expect("history"),
        history
    );

    clauding(tmp.path())
        .args(["clean", "--force"])
        .assert()
        .success();
    let after = fs::read_to_string(tmp.path().join(".claude/history.jsonl")).expect("history");
    assert!(!after.contains(gone.as_str()));
}

#[test]
fn clean_refuses_a_path_that_still_exists() {
    let tmp = tempdir().expect("tempdir");
    let (_, live) = seed(tmp.path());

    clauding(tmp.path())
        .args(["clean", "--path", live.as_str()])
        .assert()
        .failure()
        .stderr(predicates::str::contains("still exists on disk"));
}
