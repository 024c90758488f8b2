//! The pre- and post-expansion test item types, and the `NodeId` addressing
//! scheme that ties discovery, scheduling, and worker results together.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::marker::Marker;

/// Stable, wire-safe identifier for a test item: `path::[Class::]function[case]`.
pub type NodeId = String;

pub fn nodeid_stem(file: &Path, class: Option<&str>, function: &str) -> NodeId {
    let file = file.display();
    match class {
        Some(class) => format!("{file}::{class}::{function}"),
        None => format!("{file}::{function}"),
    }
}

/// A test function or method discovered by the scanner, before parametrize
/// expansion. Markers are kept in source order, outermost first, with any
/// class-level markers prepended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestItem {
    pub source_file: PathBuf,
    pub class_name: Option<String>,
    pub function_name: String,
    pub markers: Vec<Marker>,
    pub line: usize,
    /// True when any marker on this item was resolved through the legacy
    /// `pytest` alias rather than the native module name.
    pub legacy_alias: bool,
}

impl TestItem {
    pub fn nodeid_stem(&self) -> NodeId {
        nodeid_stem(&self.source_file, self.class_name.as_deref(), &self.function_name)
    }

    pub fn is_skipped(&self) -> bool {
        crate::marker::is_skipped(&self.markers)
    }

    pub fn skip_reason(&self) -> Option<String> {
        crate::marker::skip_reason(&self.markers)
    }

    pub fn xdist_group(&self) -> Option<String> {
        crate::marker::xdist_group(&self.markers)
    }
}

/// A fully expanded, executable test item — the unit the scheduler assigns
/// to a worker and the unit a worker reports a result for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableItem {
    pub nodeid: NodeId,
    pub source_file: PathBuf,
    pub class_name: Option<String>,
    pub function_name: String,
    pub skip_reason: Option<String>,
    pub xdist_group: Option<String>,
    /// Argument name -> raw source expression, in parametrize-declared order.
    pub param_bindings: Vec<(String, String)>,
    pub legacy_alias: bool,
}

impl ExecutableItem {
    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}
