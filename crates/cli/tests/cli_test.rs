//! Integration tests for the `unlock` binary.

#[path = "../../core/tests/common/mod.rs"]
mod common;

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use common::{CONTENT, FixtureBuilder, Scheme, read_back, stream_data};
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("unlock").unwrap()
}

fn locked(dir: &Path, name: &str, scheme: Scheme, user: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, FixtureBuilder::new(scheme).user(user).build()).unwrap();
    path
}

fn assert_unlocked(path: &Path) {
    let (_, objects) = read_back(&fs::read(path).unwrap());
    assert_eq!(stream_data(&objects, 4), CONTENT);
}

#[test]
fn password_flag_writes_default_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "report.pdf", Scheme::Aes128, "secret");

    cmd()
        .arg(&input)
        .args(["-p", "secret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("report_unlocked.pdf"));
    assert_unlocked(&dir.path().join("report_unlocked.pdf"));
}

#[test]
fn explicit_output_path() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "in.pdf", Scheme::Aes256, "pw");
    let output = dir.path().join("nested/out.pdf");

    cmd()
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(["--password", "pw"])
        .assert()
        .success();
    assert_unlocked(&output);
}

#[test]
fn wrong_password_exits_one_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "report.pdf", Scheme::Rc4Key40, "secret");

    cmd()
        .arg(&input)
        .args(["-p", "secre"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("incorrect password"));
    assert!(!dir.path().join("report_unlocked.pdf").exists());
}

#[test]
fn password_list_reports_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "doc.pdf", Scheme::Rc4Key128, "bar");
    let list = dir.path().join("words.txt");
    fs::write(&list, "foo\n\nbar\nbaz\n").unwrap();

    cmd()
        .arg(&input)
        .arg("--password-list")
        .arg(&list)
        .args(["--threads", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("candidate #2"));
    assert_unlocked(&dir.path().join("doc_unlocked.pdf"));
}

#[test]
fn try_common_finds_weak_password() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "weak.pdf", Scheme::Rc4Key40, "qwerty");

    cmd().arg(&input).arg("--try-common").assert().success();
    assert_unlocked(&dir.path().join("weak_unlocked.pdf"));
}

#[test]
fn password_is_read_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "prompt.pdf", Scheme::Aes128, "typed");

    cmd()
        .arg(&input)
        .write_stdin("typed\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Password:"));
    assert_unlocked(&dir.path().join("prompt_unlocked.pdf"));
}

#[test]
fn check_only_reports_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "enc.pdf", Scheme::Rc4Key128, "");

    cmd()
        .arg(&input)
        .arg("--check-only")
        .assert()
        .success()
        .stdout(predicate::str::contains("encrypted (/Standard, V=2, R=3, 128-bit key)"));
    assert!(!dir.path().join("enc_unlocked.pdf").exists());
}

#[test]
fn plaintext_input_is_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "plain.pdf", Scheme::Plain, "");

    for extra in [&["--check-only"][..], &["-p", "x"][..]] {
        cmd()
            .arg(&input)
            .args(extra)
            .assert()
            .success()
            .stdout(predicate::str::contains("not encrypted"));
    }
    assert!(!dir.path().join("plain_unlocked.pdf").exists());
}

#[test]
fn corrupt_input_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("junk.pdf");
    fs::write(&input, b"not a pdf").unwrap();

    cmd().arg(&input).args(["-p", "x"]).assert().code(1);
}

#[test]
fn missing_input_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg(dir.path().join("absent.pdf"))
        .args(["-p", "x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn conflicting_credentials_exit_two() {
    cmd()
        .args(["in.pdf", "-p", "x", "--try-common"])
        .assert()
        .code(2);
}

#[test]
fn batch_mirrors_successes_and_summarises() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("docs");
    locked(&input, "a.pdf", Scheme::Rc4Key40, "pw");
    locked(&input, "b.pdf", Scheme::Aes256, "pw");
    locked(&input, "c.pdf", Scheme::Aes128, "other");
    locked(&input, "sub/d.pdf", Scheme::Rc4Key128, "pw");

    cmd()
        .arg(&input)
        .args(["--batch", "-r", "-p", "pw", "--threads", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("processed 3, failed 1"))
        .stderr(predicate::str::contains("c.pdf"));

    let output = root.path().join("docs_unlocked");
    assert_unlocked(&output.join("a.pdf"));
    assert_unlocked(&output.join("b.pdf"));
    assert_unlocked(&output.join("sub").join("d.pdf"));
    assert!(!output.join("c.pdf").exists());
}

#[test]
fn batch_check_only_lists_status() {
    let root = tempfile::tempdir().unwrap();
    locked(root.path(), "a.pdf", Scheme::Rc4Key40, "pw");
    locked(root.path(), "b.pdf", Scheme::Plain, "");

    cmd()
        .arg(root.path())
        .args(["--batch", "--check-only"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("a.pdf: encrypted")
                .and(predicate::str::contains("b.pdf: not encrypted")),
        );
}

#[test]
fn batch_on_a_file_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let input = locked(dir.path(), "a.pdf", Scheme::Plain, "");
    cmd()
        .arg(&input)
        .args(["--batch", "-p", "x"])
        .assert()
        .code(2);
}
