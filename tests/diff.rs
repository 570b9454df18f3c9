use std::process::Command;

const DIFF: &str = "\
diff --git a/src/app.ts b/src/app.ts
+let x = 1;
diff --git a/package-lock.json b/package-lock.json
+{}
";

fn quill_diff(dir: &std::path::Path, args: &[&str]) -> std::process::Output {
    let diff_path = dir.join("change.diff");
    std::fs::write(&diff_path, DIFF).unwrap();
    Command::new(env!("CARGO_BIN_EXE_quill"))
        .arg("diff")
        .arg("--file")
        .arg(&diff_path)
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
}

#[test]
fn diff_drops_ignored_sections() {
    let dir = tempfile::tempdir().unwrap();
    let output = quill_diff(dir.path(), &[]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout, "diff --git a/src/app.ts b/src/app.ts\n+let x = 1;\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ignored package-lock.json"));
}

#[test]
fn diff_respects_extra_ignores_and_budget() {
    let dir = tempfile::tempdir().unwrap();
    let output = quill_diff(dir.path(), &["--ignore", "src/**", "--json"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["text"], "");
    assert_eq!(value["wasTruncated"], false);
    assert_eq!(value["report"]["ignored"].as_array().unwrap().len(), 2);

    let output = quill_diff(dir.path(), &["--max-chars", "20", "--json"]);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["wasTruncated"], true);
    assert_eq!(value["text"], "");
}

#[test]
fn diff_reads_project_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".quill.toml"),
        "[diff]\nignore_patterns = [\"*.ts\"]\n",
    )
    .unwrap();
    let output = quill_diff(dir.path(), &[]);
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("package-lock.json"));
    assert!(!stdout.contains("app.ts"));
}
