//! Tracks import aliases so decorator expressions can be canonicalized
//! regardless of how the test-framework module was imported.
//!
//! Recognizes exactly the four binding forms a source file can use to bring
//! the marker namespace into scope: `import M`, `import M as A`,
//! `from M import N`, `from M import N as A`.

use std::collections::HashMap;

use rustpython_parser::ast;

/// Module names treated as the canonical marker namespace. `rtest` is the
/// embedded, non-deprecated spelling; `pytest` is accepted for
/// compatibility (see [`crate::marker`] deprecation handling).
const ROOTS: [&str; 2] = ["pytest", "rtest"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    Module(String),
    Symbol(String, String),
}

#[derive(Debug, Default)]
pub struct Bindings {
    map: HashMap<String, Binding>,
}

impl Bindings {
    pub fn from_suite(suite: &[ast::Stmt]) -> Self {
        let mut map = HashMap::new();
        for stmt in suite {
            collect_from_stmt(stmt, &mut map);
        }
        Self { map }
    }

    /// True if any binding in this file resolves to the legacy `pytest` root.
    pub fn uses_legacy_alias(&self) -> bool {
        self.map.values().any(|b| match b {
            Binding::Module(m) => m == "pytest" || m.starts_with("pytest."),
            Binding::Symbol(m, _) => m == "pytest" || m.starts_with("pytest."),
        })
    }

    /// Resolve a decorator expression (bare name, attribute chain, or the
    /// callee of a call expression) to its canonical path, e.g.
    /// `["mark", "xdist_group"]`. Returns `None` when the expression does
    /// not resolve through a recognized root.
    pub fn canonical_path(&self, expr: &ast::Expr) -> Option<Vec<String>> {
        let (leftmost, attrs) = split_chain(expr)?;
        match self.map.get(&leftmost)? {
            Binding::Module(m) => {
                let suffix = module_suffix(m)?;
                let mut path = suffix;
                path.extend(attrs);
                (!path.is_empty()).then_some(path)
            }
            Binding::Symbol(m, name) => {
                let mut path = module_suffix(m)?;
                path.push(name.clone());
                path.extend(attrs);
                Some(path)
            }
        }
    }
}

fn module_suffix(module: &str) -> Option<Vec<String>> {
    for root in ROOTS {
        if module == root {
            return Some(Vec::new());
        }
        if let Some(rest) = module.strip_prefix(root).and_then(|r| r.strip_prefix('.')) {
            return Some(rest.split('.').map(str::to_string).collect());
        }
    }
    None
}

/// Walk an attribute chain leftmost-first, returning the base identifier
/// and the remaining attribute segments in left-to-right order.
fn split_chain(expr: &ast::Expr) -> Option<(String, Vec<String>)> {
    match expr {
        ast::Expr::Name(name) => Some((name.id.to_string(), Vec::new())),
        ast::Expr::Attribute(attr) => {
            let (base, mut segments) = split_chain(&attr.value)?;
            segments.push(attr.attr.to_string());
            Some((base, segments))
        }
        _ => None,
    }
}

fn collect_from_stmt(stmt: &ast::Stmt, map: &mut HashMap<String, Binding>) {
    match stmt {
        ast::Stmt::Import(import) => {
            for alias in &import.names {
                let module = alias.name.to_string();
                let local = alias
                    .asname
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| module.split('.').next().unwrap().to_string());
                map.insert(local, Binding::Module(module));
            }
        }
        ast::Stmt::ImportFrom(import) => {
            let Some(module) = import.module.as_ref() else {
                return;
            };
            let module = module.to_string();
            for alias in &import.names {
                let name = alias.name.to_string();
                let local = alias.asname.as_ref().map(|a| a.to_string()).unwrap_or_else(|| name.clone());
                map.insert(local, Binding::Symbol(module.clone(), name));
            }
        }
        ast::Stmt::ClassDef(class) => {
            for body_stmt in &class.body {
                collect_from_stmt(body_stmt, map);
            }
        }
        _ => {}
    }
}
