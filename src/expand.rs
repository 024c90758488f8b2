//! Expands a pre-expansion `TestItem` carrying zero or more stacked
//! `parametrize` markers into the cartesian product of `ExecutableItem`s.

use anyhow::{Result, bail};

use crate::item::{ExecutableItem, TestItem};
use crate::marker::{self, ParameterCase};

/// Expand one test item. Non-parametrized items expand to exactly one
/// `ExecutableItem` with no bracketed case suffix.
pub fn expand_item(item: &TestItem) -> Result<Vec<ExecutableItem>> {
    let stack = marker::parametrize_stack(&item.markers);
    let skip_reason = item.skip_reason();
    let xdist_group = item.xdist_group();

    if stack.is_empty() {
        return Ok(vec![ExecutableItem {
            nodeid: item.nodeid_stem(),
            source_file: item.source_file.clone(),
            class_name: item.class_name.clone(),
            function_name: item.function_name.clone(),
            skip_reason,
            xdist_group,
            param_bindings: Vec::new(),
            legacy_alias: item.legacy_alias,
        }]);
    }

    for (_, cases) in &stack {
        validate_ids_length(cases)?;
    }

    // Cartesian product, outer (first decorator in source order) varies
    // slowest: fold right-to-left so the innermost decorator is the fastest
    // moving index, matching `outer-...-inner` id ordering.
    let mut combos: Vec<(Vec<(String, String)>, String)> = vec![(Vec::new(), String::new())];

    for (argnames, cases) in stack.iter().rev() {
        let mut next = Vec::with_capacity(combos.len() * cases.len());
        for (bindings, id_suffix) in &combos {
            for (i, case) in cases.iter().enumerate() {
                let mut new_bindings = bindings.clone();
                for (name, value) in argnames.iter().zip(case.values.iter()) {
                    new_bindings.push((name.clone(), value.clone()));
                }
                let case_id = case_id_for(case, i);
                let new_id = if id_suffix.is_empty() {
                    case_id
                } else {
                    format!("{case_id}-{id_suffix}")
                };
                next.push((new_bindings, new_id));
            }
        }
        combos = next;
    }

    let mut items = Vec::with_capacity(combos.len());
    for (bindings, case_id) in combos {
        let stem = item.nodeid_stem();
        items.push(ExecutableItem {
            nodeid: format!("{stem}[{case_id}]"),
            source_file: item.source_file.clone(),
            class_name: item.class_name.clone(),
            function_name: item.function_name.clone(),
            skip_reason: skip_reason.clone(),
            xdist_group: xdist_group.clone(),
            param_bindings: bindings,
            legacy_alias: item.legacy_alias,
        });
    }

    Ok(items)
}

fn validate_ids_length(cases: &[ParameterCase]) -> Result<()> {
    let explicit_count = cases.iter().filter(|c| c.explicit_id.is_some()).count();
    if explicit_count != 0 && explicit_count != cases.len() {
        bail!("parametrize `ids` length does not match case count");
    }
    Ok(())
}

fn case_id_for(case: &ParameterCase, index: usize) -> String {
    case.explicit_id.clone().unwrap_or_else(|| index.to_string())
}

/// Expand a whole batch, collecting items in stable discovery order.
pub fn expand_all(items: &[TestItem]) -> Result<Vec<ExecutableItem>> {
    let mut out = Vec::new();
    for item in items {
        out.extend(expand_item(item)?);
    }
    Ok(out)
}
