//! Integration Test: OS Boundary Confinement
//!
//! **Policy**: Raw OS calls live in three files only. Everything else talks to
//! the OS through their safe wrappers, and only the process helper may end a
//! process.
//!
//! - `unsafe` only in the shared-memory segment and semaphore wrappers and
//!   the process helper
//! - `std::process::exit` only in the process helper (the forked worker's exit)
//! - no `.unwrap()` / `.expect(` in library production code

use architectural_enforcement::{is_allowed, production_lines};

const UNSAFE_ALLOWED: &[&str] = &[
    "transport/shared_memory/segment.rs",
    "transport/shared_memory/semaphore.rs",
    "transport/process.rs",
];

const EXIT_ALLOWED: &[&str] = &["transport/process.rs"];

const SOURCE_DIRS: &[&str] = &["shuttle/core/src", "shuttle/bench/src"];

fn report(title: &str, violations: &[String]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!("\nFound {} violation(s). Fix these before merging!", violations.len());
}

#[test]
fn test_unsafe_confined_to_os_wrappers() {
    let violations: Vec<String> = SOURCE_DIRS
        .iter()
        .flat_map(|dir| production_lines(dir))
        .filter(|line| line.code.contains("unsafe") && !is_allowed(&line.path, UNSAFE_ALLOWED))
        .map(|line| format!("{}:{} - {}", line.path, line.number, line.code.trim()))
        .collect();

    report("unsafe outside the OS-boundary modules", &violations);
}

#[test]
fn test_process_exit_only_in_process_helper() {
    let violations: Vec<String> = SOURCE_DIRS
        .iter()
        .flat_map(|dir| production_lines(dir))
        .filter(|line| line.code.contains("process::exit") && !is_allowed(&line.path, EXIT_ALLOWED))
        .map(|line| format!("{}:{} - {}", line.path, line.number, line.code.trim()))
        .collect();

    report("process::exit outside the process helper", &violations);
}

#[test]
fn test_no_unwrap_in_library_code() {
    let violations: Vec<String> = production_lines("shuttle/core/src")
        .into_iter()
        .filter(|line| line.code.contains(".unwrap()") || line.code.contains(".expect("))
        .map(|line| format!("{}:{} - {}", line.path, line.number, line.code.trim()))
        .collect();

    report("unwrap/expect in library production code", &violations);
}

#[test]
fn test_scan_sees_the_process_helper() {
    // Guard against the scan silently finding nothing
    let exits = production_lines("shuttle/core/src")
        .into_iter()
        .filter(|line| line.code.contains("process::exit"))
        .count();
    assert_eq!(exits, 1, "expected exactly one process::exit in the worker fork path");
}
