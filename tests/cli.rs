use assert_cmd::Command;

mod common;

#[test]
fn runs() {
    let mut cmd = Command::cargo_bin("annoport").unwrap();
    cmd.assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = Command::cargo_bin("annoport").unwrap();
    cmd.arg("-V");
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("annoport"));
}

#[test]
fn formats_lists_all_builtins() {
    let mut cmd = Command::cargo_bin("annoport").unwrap();
    cmd.arg("formats");
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("coco"))
        .stdout(predicates::str::contains("yolo"))
        .stdout(predicates::str::contains("textgrid"));
}

#[test]
fn export_writes_files_and_reports_stats() {
    let temp = tempfile::tempdir().expect("create temp dir");

    let context = common::bbox_context(3, "cat");
    let context_path = temp.path().join("context.json");
    std::fs::write(
        &context_path,
        serde_json::to_string(&context).expect("serialize context"),
    )
    .expect("write context json");

    let output_path = temp.path().join("annotations.json");

    let mut cmd = Command::cargo_bin("annoport").unwrap();
    cmd.args([
        "export",
        context_path.to_str().unwrap(),
        "--format",
        "coco",
        "--output",
        output_path.to_str().unwrap(),
    ]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Export to 'coco' succeeded"))
        .stdout(predicates::str::contains("num_images: 3"));

    assert!(output_path.is_file());
}

#[test]
fn unknown_format_exits_nonzero() {
    let temp = tempfile::tempdir().expect("create temp dir");

    let context = common::bbox_context(1, "cat");
    let context_path = temp.path().join("context.json");
    std::fs::write(
        &context_path,
        serde_json::to_string(&context).expect("serialize context"),
    )
    .expect("write context json");

    let mut cmd = Command::cargo_bin("annoport").unwrap();
    cmd.args([
        "export",
        context_path.to_str().unwrap(),
        "--format",
        "protobuf",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Unknown export format"));
}

#[test]
fn incompatible_context_exits_nonzero_with_report() {
    let temp = tempfile::tempdir().expect("create temp dir");

    // Image-only context pushed through a text format.
    let context = common::bbox_context(1, "cat");
    let context_path = temp.path().join("context.json");
    std::fs::write(
        &context_path,
        serde_json::to_string(&context).expect("serialize context"),
    )
    .expect("write context json");

    let mut cmd = Command::cargo_bin("annoport").unwrap();
    cmd.args([
        "export",
        context_path.to_str().unwrap(),
        "--format",
        "conll2003",
        "--output",
        temp.path().join("out.conll").to_str().unwrap(),
    ]);
    cmd.assert()
        .failure()
        .stdout(predicates::str::contains("FAILED"))
        .stdout(predicates::str::contains("no span schema"));
}

#[test]
fn malformed_context_reports_parse_error() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let context_path = temp.path().join("context.json");
    std::fs::write(&context_path, "{not json").expect("write bad json");

    let mut cmd = Command::cargo_bin("annoport").unwrap();
    cmd.args(["export", context_path.to_str().unwrap(), "--format", "coco"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Failed to parse export context"));
}
