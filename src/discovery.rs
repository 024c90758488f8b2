//! File discovery and static AST scanning.
//!
//! Scans source files without importing them: module-level `test_*`
//! functions, `Test*` classes and their `test_*` methods, and the decorators
//! attached to each, resolved through [`crate::resolver::Bindings`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rustpython_parser::text_size::Ranged;
use rustpython_parser::{Parse, ast};
use walkdir::WalkDir;

use crate::item::TestItem;
use crate::marker::{self, Marker};
use crate::resolver::Bindings;

/// Find candidate test files under the given paths.
///
/// A file is a test file if its name matches `test_*.py`. Directories are
/// walked recursively; files are accepted as given regardless of name.
pub fn find_test_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut test_files = Vec::new();

    for path in paths {
        if path.is_file() {
            test_files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let p = entry.path();
                if is_test_file(p) {
                    test_files.push(p.to_path_buf());
                }
            }
        }
    }

    test_files.sort();
    test_files.dedup();
    Ok(test_files)
}

fn is_test_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    file_name.starts_with("test_") && file_name.ends_with(".py")
}

fn is_test_name(name: &str) -> bool {
    name.starts_with("test_")
}

fn is_test_class(name: &str) -> bool {
    name.starts_with("Test")
}

fn offset_to_line(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].chars().filter(|&c| c == '\n').count() + 1
}

/// A test class is instantiated with no arguments (besides `self`), so an
/// `__init__` that requires any is a collection error rather than a runtime
/// one. Returns a human-readable reason when the class cannot be collected.
fn init_requires_args(class: &ast::StmtClassDef) -> Option<String> {
    let init = class.body.iter().find_map(|stmt| match stmt {
        ast::Stmt::FunctionDef(func) if func.name.as_str() == "__init__" => Some(func),
        _ => None,
    })?;

    // `self` is the first positional parameter and is never required here.
    let required_positional = init
        .args
        .posonlyargs
        .iter()
        .chain(init.args.args.iter())
        .skip(1)
        .filter(|a| a.default.is_none())
        .count();
    let required_kwonly = init.args.kwonlyargs.iter().filter(|a| a.default.is_none()).count();

    if required_positional > 0 || required_kwonly > 0 {
        Some(format!("class `{}` has an __init__ that requires arguments", class.name))
    } else {
        None
    }
}

/// Parse one file, yielding every `TestItem` it declares.
///
/// A parse error is returned to the caller rather than swallowed here;
/// [`extract_tests`] decides how to degrade a single bad file.
pub fn extract_tests_from_file(path: &Path) -> Result<Vec<TestItem>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let suite = ast::Suite::parse(&source, "<test>")
        .map_err(|e| anyhow::anyhow!("parse error in {}: {}", path.display(), e))?;

    let bindings = Bindings::from_suite(&suite);
    let legacy_alias = bindings.uses_legacy_alias();
    let mut items = Vec::new();

    for stmt in &suite {
        match stmt {
            ast::Stmt::FunctionDef(func) if is_test_name(func.name.as_str()) => {
                let markers = marker::extract_markers(&func.decorator_list, &bindings, &source);
                items.push(TestItem {
                    source_file: path.to_path_buf(),
                    class_name: None,
                    function_name: func.name.to_string(),
                    markers,
                    line: offset_to_line(&source, func.range().start().into()),
                    legacy_alias,
                });
            }
            ast::Stmt::ClassDef(class) if is_test_class(class.name.as_str()) => {
                if let Some(reason) = init_requires_args(class) {
                    eprintln!(
                        "warning: {} ({}): collection error, skipping class",
                        reason,
                        path.display()
                    );
                    continue;
                }

                let class_markers: Vec<Marker> =
                    marker::extract_markers(&class.decorator_list, &bindings, &source);
                for body_stmt in &class.body {
                    if let ast::Stmt::FunctionDef(method) = body_stmt {
                        if is_test_name(method.name.as_str()) {
                            let mut markers = class_markers.clone();
                            markers.extend(marker::extract_markers(
                                &method.decorator_list,
                                &bindings,
                                &source,
                            ));
                            items.push(TestItem {
                                source_file: path.to_path_buf(),
                                class_name: Some(class.name.to_string()),
                                function_name: method.name.to_string(),
                                markers,
                                line: offset_to_line(&source, method.range().start().into()),
                                legacy_alias,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(items)
}

/// Extract tests from every file, downgrading a single file's parse failure
/// to a warning so the rest of the run still proceeds.
///
/// Files are scanned in parallel; each is independent, so there is nothing to
/// synchronize beyond collecting the results.
pub fn extract_tests(files: &[PathBuf]) -> Vec<TestItem> {
    files
        .par_iter()
        .flat_map(|file| match extract_tests_from_file(file) {
            Ok(items) => items,
            Err(e) => {
                eprintln!("warning: {e}");
                Vec::new()
            }
        })
        .collect()
}
