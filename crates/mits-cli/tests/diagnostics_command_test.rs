use std::path::PathBuf;
use std::process::{Command, Output};

fn rules_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..").join("rules")
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mits"))
        .arg("--rules")
        .arg(rules_root())
        .args(args)
        .output()
        .expect("mits should execute")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_catalogs_healthy() {
    let output = run(&["catalogs", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["version"], "mits-5.0");
    assert_eq!(json["summary"]["charge_classes"], 10);
    assert_eq!(json["summary"]["enums"]["payment-frequency"], 7);
    assert!(json["findings"].as_array().unwrap().is_empty());
}

#[test]
fn test_catalogs_missing_version_fails() {
    let output = run(&["catalogs", "--catalog-version", "mits-0.1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("CATALOG:VERSION_NOT_FOUND"));
}

#[test]
fn test_codes_listing() {
    let output = run(&["codes"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("WELLFORMED:PARSE_ERROR"));
    assert!(text.contains("ENGINE:LEVEL_CRASH"));

    let output = run(&["codes", "--category", "semantic", "--json"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let codes: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["code"].as_str().unwrap())
        .collect();
    assert!(codes.iter().all(|c| c.starts_with("SEMANTIC:")));
    assert!(codes.contains(&"SEMANTIC:INVALID_CHARGE_CLASS"));
}

#[test]
fn test_unknown_category_is_usage_error() {
    let output = run(&["codes", "--category", "SPELLING"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_profiles_listing_and_detail() {
    let output = run(&["profiles"]);
    assert!(output.status.success());
    let names: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    for expected in ["default", "ils", "marketplace", "pms"] {
        assert!(names.iter().any(|n| n == expected), "{names:?}");
    }

    let output = run(&["profiles", "pms"]);
    assert!(output.status.success());
    let profile: serde_yaml::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    assert_eq!(profile["name"].as_str(), Some("pms"));
    assert_eq!(profile["enabled_levels"].as_sequence().unwrap().len(), 3);
    assert_eq!(
        profile["severity_overrides"]["SEMANTIC:INCONSISTENT_RENT_REQUIREMENT"].as_str(),
        Some("error")
    );

    assert_eq!(run(&["profiles", "nope"]).status.code(), Some(2));
}

#[test]
fn test_versions_listing() {
    let output = run(&["versions"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "mits-5.0");
}
