//! The worker side of the driver/worker protocol.
//!
//! Invoked as a hidden subcommand of this same binary (standing in for the
//! `python -m <worker-module>` invocation an importable package would use).
//! Re-derives the exact `ExecutableItem`s for its assigned files — which
//! yields identical NodeIds to the driver's own discovery pass — then
//! delegates actual execution to a short-lived `python3` process per file,
//! since running untrusted test bodies is explicitly out of this crate's
//! scope.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::expand;
use crate::item::ExecutableItem;
use crate::{discovery, result::TestOutcome};

/// Executes the full set of test files assigned to this worker, appending
/// one JSON line per test to `out` as each result becomes available.
/// Returns `true` iff every outcome written was passed or skipped.
pub fn run(root: &Path, out: &Path, files: &[PathBuf]) -> Result<bool> {
    let out_file = std::fs::File::create(out)
        .with_context(|| format!("failed to create output file {}", out.display()))?;
    let mut writer = std::io::BufWriter::new(out_file);
    let mut all_ok = true;

    for file in files {
        let test_items = discovery::extract_tests_from_file(file)
            .with_context(|| format!("failed to scan {}", file.display()))?;
        let executable = expand::expand_all(&test_items)
            .with_context(|| format!("failed to expand parametrize cases in {}", file.display()))?;

        let (skipped, runnable): (Vec<_>, Vec<_>) =
            executable.into_iter().partition(|i| i.is_skipped());

        for item in &skipped {
            let outcome = TestOutcome::skipped(item.nodeid.clone(), item.skip_reason.clone());
            write_outcome(&mut writer, &outcome)?;
        }

        if runnable.is_empty() {
            continue;
        }

        match run_file_batch(root, file, &runnable) {
            Ok(outcomes) => {
                for outcome in outcomes {
                    if matches!(outcome.outcome, crate::result::Outcome::Failed | crate::result::Outcome::Error) {
                        all_ok = false;
                    }
                    write_outcome(&mut writer, &outcome)?;
                }
            }
            Err(e) => {
                all_ok = false;
                for item in &runnable {
                    let mut outcome = TestOutcome::crashed(item.nodeid.clone());
                    outcome.error.as_mut().unwrap().message = e.to_string();
                    write_outcome(&mut writer, &outcome)?;
                }
            }
        }
    }

    Ok(all_ok)
}

fn write_outcome(writer: &mut impl Write, outcome: &TestOutcome) -> Result<()> {
    let line = serde_json::to_string(outcome)?;
    writeln!(writer, "{line}")?;
    writer.flush()?;
    Ok(())
}

fn module_name_for(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let without_ext = rel.with_extension("");
    without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Deserialize)]
struct RawOutcome {
    id: usize,
    outcome: String,
    duration_ms: f64,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    error_type: Option<String>,
    error_message: Option<String>,
    error_traceback: Option<String>,
    skip_reason: Option<String>,
}

fn run_file_batch(root: &Path, file: &Path, items: &[ExecutableItem]) -> Result<Vec<TestOutcome>> {
    let module_name = module_name_for(root, file);
    let manifest = serde_json::json!({
        "file": file.canonicalize().unwrap_or_else(|_| file.to_path_buf()).to_string_lossy(),
        "module_name": module_name,
        "items": items
            .iter()
            .enumerate()
            .map(|(id, item)| serde_json::json!({
                "id": id,
                "function": item.function_name,
                "class": item.class_name,
                "bindings": item.param_bindings,
            }))
            .collect::<Vec<_>>(),
    });

    let mut child = Command::new("python3")
        .args(["-u", "-c", BATCH_RUNNER_SCRIPT])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn python3")?;

    {
        let mut stdin = child.stdin.take().expect("stdin not captured");
        writeln!(stdin, "{}", serde_json::to_string(&manifest)?)?;
    }

    let stdout = child.stdout.take().expect("stdout not captured");
    let reader = BufReader::new(stdout);

    let mut by_id: std::collections::HashMap<usize, RawOutcome> = std::collections::HashMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(raw) = serde_json::from_str::<RawOutcome>(&line) {
            by_id.insert(raw.id, raw);
        }
    }

    let status = child.wait().context("failed to wait on python3")?;

    let mut outcomes = Vec::with_capacity(items.len());
    for (id, item) in items.iter().enumerate() {
        let outcome = match by_id.remove(&id) {
            Some(raw) => raw_to_outcome(item.nodeid.clone(), raw),
            None => {
                let mut o = TestOutcome::crashed(item.nodeid.clone());
                if !status.success() {
                    o.error.as_mut().unwrap().message =
                        "worker crashed before running test".to_string();
                }
                o
            }
        };
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

fn raw_to_outcome(nodeid: String, raw: RawOutcome) -> TestOutcome {
    use crate::result::{Outcome, ResultError};

    let outcome = match raw.outcome.as_str() {
        "passed" => Outcome::Passed,
        "failed" => Outcome::Failed,
        "skipped" => Outcome::Skipped,
        _ => Outcome::Error,
    };

    let error = raw.error_type.as_ref().map(|kind| ResultError {
        kind: kind.clone(),
        message: raw.error_message.clone().unwrap_or_default(),
        traceback: raw.error_traceback.clone(),
        reason: raw.skip_reason.clone(),
    });

    TestOutcome {
        nodeid,
        outcome,
        duration_ms: raw.duration_ms,
        stdout: raw.stdout,
        stderr: raw.stderr,
        error,
        error_type: raw.error_type,
    }
}

/// Executes one file's worth of items in a single interpreter. Receives a
/// JSON manifest on stdin and writes one JSON result per line to stdout,
/// flushed immediately so a mid-batch crash still preserves prior results.
const BATCH_RUNNER_SCRIPT: &str = r#"
import sys
import json
import time
import traceback
import importlib.util
import inspect
import asyncio
import io
import contextlib
import os


def _run_maybe_async(callable_obj):
    result = callable_obj()
    if inspect.isawaitable(result):
        asyncio.run(result)


def run_item(module, spec):
    result = {
        "id": spec["id"],
        "outcome": "error",
        "duration_ms": 0.0,
        "stdout": "",
        "stderr": "",
        "error_type": None,
        "error_message": None,
        "error_traceback": None,
        "skip_reason": None,
    }

    out_buf = io.StringIO()
    err_buf = io.StringIO()
    start = time.perf_counter()

    try:
        kwargs = {name: eval(expr, module.__dict__) for name, expr in spec["bindings"]}

        with contextlib.redirect_stdout(out_buf), contextlib.redirect_stderr(err_buf):
            class_name = spec.get("class")
            if class_name:
                cls = getattr(module, class_name)
                instance = cls()
                try:
                    if hasattr(instance, "setUp"):
                        instance.setUp()
                    func = getattr(instance, spec["function"])
                    _run_maybe_async(lambda: func(**kwargs))
                finally:
                    if hasattr(instance, "tearDown"):
                        instance.tearDown()
            else:
                func = getattr(module, spec["function"])
                _run_maybe_async(lambda: func(**kwargs))

        result["outcome"] = "passed"
    except AssertionError as e:
        result["outcome"] = "failed"
        result["error_type"] = "AssertionError"
        result["error_message"] = str(e) or "assertion failed"
        result["error_traceback"] = traceback.format_exc()
    except Exception as e:
        if type(e).__name__ == "Skipped":
            result["outcome"] = "skipped"
            result["error_type"] = "Skipped"
            result["skip_reason"] = str(e)
        else:
            result["outcome"] = "error"
            result["error_type"] = type(e).__name__
            result["error_message"] = str(e)
            result["error_traceback"] = traceback.format_exc()
    finally:
        result["stdout"] = out_buf.getvalue()
        result["stderr"] = err_buf.getvalue()
        result["duration_ms"] = (time.perf_counter() - start) * 1000.0

    return result


def main():
    manifest = json.loads(sys.stdin.readline())
    file_path = manifest["file"]
    module_name = manifest["module_name"] or "worker_test_module"

    test_dir = os.path.dirname(os.path.abspath(file_path))
    if test_dir not in sys.path:
        sys.path.insert(0, test_dir)

    try:
        spec = importlib.util.spec_from_file_location(module_name, file_path)
        module = importlib.util.module_from_spec(spec)
        sys.modules[module_name] = module
        spec.loader.exec_module(module)
    except Exception as e:
        tb = traceback.format_exc()
        for item_spec in manifest["items"]:
            print(json.dumps({
                "id": item_spec["id"],
                "outcome": "error",
                "duration_ms": 0.0,
                "stdout": "",
                "stderr": "",
                "error_type": type(e).__name__,
                "error_message": f"failed to import {file_path}: {e}",
                "error_traceback": tb,
                "skip_reason": None,
            }), flush=True)
        return

    for item_spec in manifest["items"]:
        print(json.dumps(run_item(module, item_spec)), flush=True)


if __name__ == "__main__":
    main()
"#;
