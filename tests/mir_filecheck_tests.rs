//! FileCheck-style tests for MIR files
//!
//! This test suite runs every .mir file under tests/filetests through the driver
//! named by its RUN directive and validates the output against its CHECK directives,
//! similar to how LLVM's FileCheck works but implemented in Rust.

use cpu0_legalize::mir::{TestRunner, TestSpec};
use std::fs;
use std::path::{Path, PathBuf};

fn filetest_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetests")
}

/// Discovers all .mir files in a directory recursively
fn discover_mir_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(discover_mir_files(&path));
            } else if path.extension().and_then(|s| s.to_str()) == Some("mir") {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn run_file(path: &Path) -> Result<(), String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let spec = TestSpec::parse(&contents)?;
    TestRunner::new(false).run_test(&spec)
}

/// Test helper that runs one MIR file through FileCheck validation
fn run_filecheck_test(mir_file: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = filetest_root().join(mir_file);
    run_file(&path).unwrap_or_else(|e| panic!("Test {} failed: {}", mir_file, e));
}

#[test]
fn test_print_filecheck() {
    run_filecheck_test("mir/print.mir");
}

#[test]
fn test_force_long_branch_filecheck() {
    run_filecheck_test("mir/force_long_branch.mir");
}

#[test]
fn test_pic_long_branch_filecheck() {
    run_filecheck_test("mir/pic_long_branch.mir");
}

#[test]
fn test_pic_lowered_filecheck() {
    run_filecheck_test("mir/pic_lowered.mir");
}

#[test]
fn test_gp_disp_filecheck() {
    run_filecheck_test("mir/gp_disp.mir");
}

#[test]
fn test_split_stats_filecheck() {
    run_filecheck_test("mir/split_stats.mir");
}

#[test]
fn test_materialize_filecheck() {
    run_filecheck_test("materialize/lui_addiu.mir");
    run_filecheck_test("materialize/end_in_add.mir");
    run_filecheck_test("materialize/wide_shift.mir");
}

/// Runs every discovered file and reports all failures at once
#[test]
fn test_all_filetests() {
    let _ = env_logger::builder().is_test(true).try_init();
    let files = discover_mir_files(&filetest_root());
    assert!(!files.is_empty(), "no .mir files under {}", filetest_root().display());

    let mut failures = Vec::new();
    for path in &files {
        if let Err(e) = run_file(path) {
            failures.push(format!("{}: {}", path.display(), e));
        }
    }

    println!("Ran {} filetests, {} failed", files.len(), failures.len());
    if !failures.is_empty() {
        panic!("Filetest failures:\n{}", failures.join("\n"));
    }
}
