//! The closed set of decorator markers recognized on test functions and classes.
//!
//! A `Marker` is produced purely from syntax: the scanner never imports or
//! evaluates the file it is reading. Anything this module cannot place into
//! one of the known variants becomes `Marker::Unknown` rather than an error,
//! so novel decorators never block discovery.

use rustpython_parser::ast;
use serde::{Deserialize, Serialize};

use crate::resolver::Bindings;

/// One case of a `parametrize` decorator.
///
/// `values` holds the raw source text of each argument expression, in
/// argname order. They are never evaluated here; only a worker process,
/// which has the module imported, can give them meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterCase {
    pub values: Vec<String>,
    pub explicit_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Marker {
    Parametrize {
        argnames: Vec<String>,
        cases: Vec<ParameterCase>,
    },
    Skip {
        reason: Option<String>,
    },
    XdistGroup {
        name: String,
    },
    Unknown {
        attribute_path: Vec<String>,
    },
}

impl Marker {
    pub fn as_parametrize(&self) -> Option<(&[String], &[ParameterCase])> {
        match self {
            Marker::Parametrize { argnames, cases } => Some((argnames, cases)),
            _ => None,
        }
    }
}

/// Extract markers from a decorator list, in source order (outermost first).
///
/// `source` is the full file text, needed to slice out raw parametrize case
/// expressions without evaluating them.
pub fn extract_markers(decorators: &[ast::Expr], bindings: &Bindings, source: &str) -> Vec<Marker> {
    decorators
        .iter()
        .filter_map(|d| parse_decorator(d, bindings, source))
        .collect()
}

pub fn is_skipped(markers: &[Marker]) -> bool {
    markers.iter().any(|m| matches!(m, Marker::Skip { .. }))
}

pub fn skip_reason(markers: &[Marker]) -> Option<String> {
    markers.iter().find_map(|m| match m {
        Marker::Skip { reason } => Some(reason.clone().unwrap_or_default()),
        _ => None,
    })
}

pub fn xdist_group(markers: &[Marker]) -> Option<String> {
    markers.iter().find_map(|m| match m {
        Marker::XdistGroup { name } => Some(name.clone()),
        _ => None,
    })
}

pub fn parametrize_stack(markers: &[Marker]) -> Vec<(&[String], &[ParameterCase])> {
    markers.iter().filter_map(Marker::as_parametrize).collect()
}

fn parse_decorator(decorator: &ast::Expr, bindings: &Bindings, source: &str) -> Option<Marker> {
    let (path, call_args) = match decorator {
        ast::Expr::Attribute(_) | ast::Expr::Name(_) => {
            (bindings.canonical_path(decorator)?, None)
        }
        ast::Expr::Call(call) => {
            let path = bindings.canonical_path(&call.func)?;
            (path, Some(call))
        }
        _ => return None,
    };

    match path.as_slice() {
        [a, b] if a == "mark" && b == "parametrize" => {
            let call = call_args?;
            parse_parametrize(call, source)
        }
        [a, b] if a == "mark" && b == "skip" => Some(Marker::Skip {
            reason: call_args.and_then(|c| skip_reason_from_call(c)),
        }),
        [a, b] if a == "mark" && b == "xdist_group" => {
            let call = call_args?;
            xdist_group_from_call(call)
        }
        _ => Some(Marker::Unknown { attribute_path: path }),
    }
}

fn skip_reason_from_call(call: &ast::ExprCall) -> Option<String> {
    if let Some(first) = call.args.first() {
        if let Some(s) = string_literal(first) {
            return Some(s);
        }
    }
    for kw in &call.keywords {
        if kw.arg.as_deref() == Some("reason") {
            return string_literal(&kw.value);
        }
    }
    None
}

fn xdist_group_from_call(call: &ast::ExprCall) -> Option<Marker> {
    if let Some(first) = call.args.first() {
        if let Some(name) = string_literal(first) {
            return Some(Marker::XdistGroup { name });
        }
    }
    for kw in &call.keywords {
        if kw.arg.as_deref() == Some("name") {
            if let Some(name) = string_literal(&kw.value) {
                return Some(Marker::XdistGroup { name });
            }
        }
    }
    None
}

fn parse_parametrize(call: &ast::ExprCall, source: &str) -> Option<Marker> {
    let argnames_expr = call.args.first()?;
    let argnames = parse_argnames(argnames_expr)?;

    let cases_expr = call.args.get(1)?;
    let raw_cases = match cases_expr {
        ast::Expr::List(list) => list.elts.clone(),
        ast::Expr::Tuple(tuple) => tuple.elts.clone(),
        _ => return None,
    };

    let explicit_ids = call.keywords.iter().find_map(|kw| {
        if kw.arg.as_deref() == Some("ids") {
            string_list(&kw.value)
        } else {
            None
        }
    });

    let cases: Vec<ParameterCase> = raw_cases
        .iter()
        .enumerate()
        .map(|(i, case_expr)| {
            let values = if argnames.len() > 1 {
                match case_expr {
                    ast::Expr::Tuple(t) => t.elts.iter().map(|e| slice_source(e, source)).collect(),
                    _ => vec![slice_source(case_expr, source)],
                }
            } else {
                vec![slice_source(case_expr, source)]
            };
            let explicit_id = explicit_ids.as_ref().and_then(|ids| ids.get(i).cloned());
            ParameterCase { values, explicit_id }
        })
        .collect();

    Some(Marker::Parametrize { argnames, cases })
}

fn parse_argnames(expr: &ast::Expr) -> Option<Vec<String>> {
    match expr {
        ast::Expr::Constant(c) => match &c.value {
            ast::Constant::Str(s) => Some(
                s.split(',')
                    .map(|piece| piece.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
            _ => None,
        },
        ast::Expr::Tuple(t) => {
            let names: Vec<String> = t.elts.iter().filter_map(string_literal).collect();
            if names.len() == t.elts.len() {
                Some(names)
            } else {
                None
            }
        }
        ast::Expr::List(l) => {
            let names: Vec<String> = l.elts.iter().filter_map(string_literal).collect();
            if names.len() == l.elts.len() {
                Some(names)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn string_literal(expr: &ast::Expr) -> Option<String> {
    match expr {
        ast::Expr::Constant(c) => match &c.value {
            ast::Constant::Str(s) => Some(s.to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn string_list(expr: &ast::Expr) -> Option<Vec<String>> {
    match expr {
        ast::Expr::List(l) => Some(l.elts.iter().filter_map(string_literal).collect()),
        ast::Expr::Tuple(t) => Some(t.elts.iter().filter_map(string_literal).collect()),
        _ => None,
    }
}

fn slice_source(expr: &ast::Expr, source: &str) -> String {
    use rustpython_parser::text_size::Ranged;
    let range = expr.range();
    let start: usize = range.start().into();
    let end: usize = range.end().into();
    source.get(start..end).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Bindings;
    use rustpython_parser::Parse;

    fn parse(source: &str) -> Vec<Marker> {
        let suite = ast::Suite::parse(source, "<test>").unwrap();
        let bindings = Bindings::from_suite(&suite);
        for stmt in &suite {
            if let ast::Stmt::FunctionDef(func) = stmt {
                return extract_markers(&func.decorator_list, &bindings, source);
            }
        }
        vec![]
    }

    #[test]
    fn skip_no_args() {
        let markers = parse("@pytest.mark.skip\ndef test_foo():\n    pass\n");
        assert_eq!(markers.len(), 1);
        assert!(is_skipped(&markers));
        assert_eq!(skip_reason(&markers), Some(String::new()));
    }

    #[test]
    fn skip_with_reason() {
        let markers = parse("@pytest.mark.skip(reason=\"flaky\")\ndef test_foo():\n    pass\n");
        assert_eq!(skip_reason(&markers), Some("flaky".to_string()));
    }

    #[test]
    fn xdist_group_positional() {
        let markers = parse("@pytest.mark.xdist_group(\"db\")\ndef test_foo():\n    pass\n");
        assert_eq!(xdist_group(&markers), Some("db".to_string()));
    }

    #[test]
    fn parametrize_single_argname() {
        let markers = parse("@pytest.mark.parametrize(\"v\", [1, 2, 3])\ndef test_foo(v):\n    pass\n");
        let (names, cases) = markers[0].as_parametrize().unwrap();
        assert_eq!(names, &["v".to_string()]);
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].values, vec!["1".to_string()]);
    }

    #[test]
    fn parametrize_multi_argname_tuple_cases() {
        let markers = parse(
            "@pytest.mark.parametrize(\"a,b\", [(1, 2), (3, 4)])\ndef test_foo(a, b):\n    pass\n",
        );
        let (names, cases) = markers[0].as_parametrize().unwrap();
        assert_eq!(names, &["a".to_string(), "b".to_string()]);
        assert_eq!(cases[0].values, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(cases[1].values, vec!["3".to_string(), "4".to_string()]);
    }

    #[test]
    fn parametrize_explicit_ids() {
        let markers = parse(
            "@pytest.mark.parametrize(\"v\", [1, 2], ids=[\"one\", \"two\"])\ndef test_foo(v):\n    pass\n",
        );
        let (_, cases) = markers[0].as_parametrize().unwrap();
        assert_eq!(cases[0].explicit_id.as_deref(), Some("one"));
        assert_eq!(cases[1].explicit_id.as_deref(), Some("two"));
    }

    #[test]
    fn unknown_decorator_preserved() {
        let markers = parse("@some_custom_decorator\ndef test_foo():\n    pass\n");
        assert_eq!(
            markers[0],
            Marker::Unknown {
                attribute_path: vec!["some_custom_decorator".to_string()]
            }
        );
    }
}
