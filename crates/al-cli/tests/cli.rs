//! CLI command integration tests.
//! Each test uses a temp directory via AL_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn al_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("al").unwrap();
    cmd.env("AL_DATA_DIR", data_dir.path());
    cmd
}

#[test]
fn stats_fresh_ledger() {
    let dir = TempDir::new().unwrap();
    al_cmd(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("publishers: 0"))
        .stdout(predicate::str::contains("every 30 days"));
}

#[test]
fn visit_then_stats() {
    let dir = TempDir::new().unwrap();

    al_cmd(&dir)
        .args([
            "visit",
            "https://b.com/",
            "--from",
            "https://example.com/article",
            "--at",
            "1000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("visit: example.com"));

    al_cmd(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("publishers: 1"))
        .stdout(predicate::str::contains("example.com"));
}

#[test]
fn visit_internal_url_is_ignored() {
    let dir = TempDir::new().unwrap();

    al_cmd(&dir)
        .args(["visit", "https://a.com/", "--from", "about:blank"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ignored"));

    al_cmd(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("publishers: 0"));
}

#[test]
fn pin_then_report_scales_to_100() {
    let dir = TempDir::new().unwrap();

    al_cmd(&dir)
        .args(["pin", "example.com", "40"])
        .assert()
        .success()
        .stdout(predicate::str::contains("total 100%"));

    // A lone pin absorbs the whole budget.
    al_cmd(&dir)
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains("pinned:"))
        .stdout(predicate::str::contains("100%"));
}

#[test]
fn exclude_removes_from_allocation() {
    let dir = TempDir::new().unwrap();

    al_cmd(&dir)
        .args([
            "visit",
            "https://b.com/",
            "--from",
            "https://example.com/",
            "--at",
            "1000",
        ])
        .assert()
        .success();

    al_cmd(&dir)
        .args(["exclude", "example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("excluded example.com"));

    al_cmd(&dir)
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains("excluded:"))
        .stdout(predicate::str::contains("total: 0%"));
}

#[test]
fn prune_drops_unknown_publishers() {
    let dir = TempDir::new().unwrap();

    for (from, at) in [
        ("https://keep.com/", "1000"),
        ("https://drop.com/", "2000"),
    ] {
        al_cmd(&dir)
            .args(["visit", "https://next.com/", "--from", from, "--at", at])
            .assert()
            .success();
    }

    let list = dir.path().join("publishers.txt");
    std::fs::write(&list, "keep.com\n").unwrap();

    al_cmd(&dir)
        .arg("prune")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("pruned 1 publishers"));

    al_cmd(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("keep.com"))
        .stdout(predicate::str::contains("publishers: 1"));
}

#[test]
fn export_import_roundtrip() {
    let dir = TempDir::new().unwrap();

    al_cmd(&dir)
        .args([
            "visit",
            "https://b.com/",
            "--from",
            "https://example.com/",
            "--at",
            "1000",
        ])
        .assert()
        .success();
    al_cmd(&dir)
        .args(["pin", "example.com", "25"])
        .assert()
        .success();

    let export_path = dir.path().join("export.json");
    al_cmd(&dir)
        .arg("export")
        .arg(&export_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported to"));
    assert!(export_path.exists());

    // Import into a fresh ledger.
    let other = TempDir::new().unwrap();
    al_cmd(&other)
        .arg("import")
        .arg(&export_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 1 publishers"));

    al_cmd(&other)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com"))
        .stdout(predicate::str::contains("25"));
}

#[test]
fn config_gates_apply() {
    let dir = TempDir::new().unwrap();

    // Seed a publisher that clears the default gates.
    let seed = dir.path().join("seed.json");
    std::fs::write(
        &seed,
        r#"{
            "publishers": {
                "good.com": {"key":"good.com","duration":9000,"visits":1,"score":5.0}
            },
            "options": {"scorekeeper":"concave","minPublisherDuration":8000,"minPublisherVisits":1},
            "reconcileStamp": 1,
            "reconcileFrequency": 30
        }"#,
    )
    .unwrap();
    al_cmd(&dir).arg("import").arg(&seed).assert().success();

    al_cmd(&dir)
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains("total: 100%"));

    // A stricter visit gate from config.toml makes it ineligible again.
    std::fs::write(dir.path().join("config.toml"), "min_publisher_visits = 5\n").unwrap();
    al_cmd(&dir)
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains("total: 0%"));
}
