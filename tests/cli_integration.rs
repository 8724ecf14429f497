use std::io::Write;
use std::process::Command;

fn instances() -> serde_json::Value {
    serde_json::json!([
        {"name": "web-1", "status": "RUNNING", "zone": "europe-west1-d", "cpus": 4,
         "labels": {"env": "prod"}, "tags": ["http", "https"]},
        {"name": "web-2", "status": "TERMINATED", "zone": "us-east1-b", "cpus": 2,
         "labels": {"env": "dev"}},
        {"name": "db-1", "status": "RUNNING", "zone": "europe-west1-b", "cpus": 16,
         "labels": {"env": "prod"}, "tags": ["db"]}
    ])
}

fn write_input(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::with_suffix(suffix).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn names(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| {
            let record: serde_json::Value = serde_json::from_str(line).unwrap();
            record["name"].as_str().unwrap().to_string()
        })
        .collect()
}

#[test]
fn filters_json_array_to_stdout() {
    let input = write_input(".json", &instances().to_string());

    let output = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--input")
        .arg(input.path())
        .arg("--filter")
        .arg("status=RUNNING AND labels.env:prod")
        .output()
        .expect("failed to execute process");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(names(&output.stdout), vec!["web-1", "db-1"]);
}

#[test]
fn filters_json_lines_to_file_in_parallel() {
    let lines: Vec<String> = instances()
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record.to_string())
        .collect();
    let input = write_input(".jsonl", &lines.join("\n"));
    let output_file = tempfile::NamedTempFile::with_suffix(".jsonl").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--input")
        .arg(input.path())
        .arg("--output")
        .arg(output_file.path())
        .arg("--filter")
        .arg("cpus>=4 zone:(europe-west1-b europe-west1-d)")
        .arg("--parallel")
        .arg("--batch-size")
        .arg("1")
        .arg("--verbose")
        .status()
        .expect("failed to execute process");

    assert!(status.success());
    let content = std::fs::read(output_file.path()).unwrap();
    assert_eq!(names(&content), vec!["web-1", "db-1"]);
}

#[test]
fn check_prints_canonical_filter() {
    let output = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--check")
        .arg("--filter")
        .arg("NOT  zone:*   name=web-1")
        .output()
        .expect("failed to execute process");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "NOT zone:* name=web-1");
}

#[test]
fn check_rejects_syntax_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--check")
        .arg("--filter")
        .arg("a=1 AND (b=2")
        .output()
        .expect("failed to execute process");

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn explain_prints_yaml_tree() {
    let output = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--explain")
        .arg("--filter")
        .arg("a=1 OR b:*")
        .output()
        .expect("failed to execute process");

    assert!(output.status.success());
    let tree: serde_json::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    assert_eq!(tree["kind"], "binary");
    assert_eq!(tree["operands"][1]["kind"], "is_defined");
}

#[test]
fn ambiguous_filter_fails_the_run() {
    let input = write_input(".json", &instances().to_string());

    let output = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--input")
        .arg(input.path())
        .arg("--filter")
        .arg("status=RUNNING AND cpus>4 OR name=web-2")
        .output()
        .expect("failed to execute process");

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ambiguous"));
}

#[test]
fn named_filter_from_config() {
    let input = write_input(".json", &instances().to_string());
    let config = write_input(
        ".yaml",
        r#"
filters:
  stopped: "status=TERMINATED"
  tagged:
    filter: "tags:https"
    description: "Instances serving https"
runtime:
  batch_size: 2
"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--input")
        .arg(input.path())
        .arg("--config")
        .arg(config.path())
        .arg("--name")
        .arg("tagged")
        .output()
        .expect("failed to execute process");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(names(&output.stdout), vec!["web-1"]);

    let output = Command::new(env!("CARGO_BIN_EXE_cloudfilter"))
        .arg("--input")
        .arg(input.path())
        .arg("--config")
        .arg(config.path())
        .arg("--name")
        .arg("missing")
        .output()
        .expect("failed to execute process");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("stopped"));
}
