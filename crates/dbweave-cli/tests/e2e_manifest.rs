//! Manifest validation from file to report.

use std::io::Write;

use dbweave_cli::CliError;
use dbweave_cli::check::{CheckReport, check_manifest};
use dbweave_cli::manifest::Manifest;
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

fn manifest_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(json.as_bytes()).expect("write manifest");
    file
}

fn load(json: &str) -> Manifest {
    let file = manifest_file(json);
    Manifest::load(file.path()).expect("load")
}

#[test]
fn valid_page_reports_dependencies_and_conflicts() {
    let manifest = load(
        r#"{
          "origin": "http://localhost:3000",
          "components": [
            {"kind": "db-table", "id": "a1",
             "props": {"sql": "select authorid,name from author", "key": "authorid", "update": "author"}},
            {"kind": "db-list", "id": "books",
             "props": {"sql": "select * from book", "connected": "a1:authorid"}},
            {"kind": "db-update", "id": "form",
             "props": {"table": "book", "key": "bookid", "fields": "title,year:int", "update": "book"}},
            {"kind": "db-foreign",
             "props": {"foreign": "authorid", "field": "name", "table": "author", "selected": "form"}}
          ]
        }"#,
    );
    let report = check_manifest(&manifest).expect("valid");
    assert_eq!(report.components, 4);
    assert_eq!(report.dependencies, 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("authorid: "));
}

#[test]
fn rejected_properties_and_cycles_are_all_reported() {
    let manifest = load(
        r#"{
          "components": [
            {"kind": "db-table", "id": "left", "props": {"connected": "right:id", "colour": "red"}},
            {"kind": "db-table", "id": "right", "props": {"connected": "left:id"}},
            {"kind": "db-list", "id": "left"}
          ]
        }"#,
    );
    let err = check_manifest(&manifest).expect_err("rejected");
    assert_eq!(err.exit_code(), 2);
    let CliError::Rejected { problems } = err else {
        panic!("expected rejection, got {err}");
    };
    assert_eq!(problems.len(), 3);
    assert!(problems[0].starts_with("left: "));
    assert!(problems[1].starts_with("right: "));
    assert!(problems[2].starts_with("left: "));
}

#[test]
fn undeclared_producer_is_a_warning() {
    let manifest = load(
        r#"{"components": [
            {"kind": "db-list", "id": "books", "props": {"sql": "select * from book", "connected": "ghost:authorid"}}
        ]}"#,
    );
    let report = check_manifest(&manifest).expect("valid");
    assert_eq!(
        report,
        CheckReport {
            components: 1,
            dependencies: 1,
            warnings: vec!["books: producer `ghost` is not declared".to_string()],
        }
    );
}

#[test]
fn unreadable_and_malformed_files_have_distinct_exit_codes() {
    let missing = Manifest::load(std::path::Path::new("/nonexistent/page.json")).expect_err("missing");
    assert!(matches!(missing, CliError::Read { .. }));
    assert_eq!(missing.exit_code(), 1);

    let file = manifest_file("{\"components\": [");
    let malformed = Manifest::load(file.path()).expect_err("malformed");
    assert!(matches!(malformed, CliError::Manifest { .. }));
    assert_eq!(malformed.exit_code(), 2);
}
