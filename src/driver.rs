//! Spawns workers, multiplexes their JSONL output, and aggregates the run.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::item::{ExecutableItem, NodeId};
use crate::result::{Outcome, TestOutcome};
use crate::scheduler::{self, DistMode};
use crate::{discovery, expand};

const WORKER_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub error: usize,
    pub duration: Duration,
}

impl Summary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Error => self.error += 1,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && self.error == 0 { 0 } else { 1 }
    }
}

/// Run discovery and expansion only, without spawning workers.
///
/// Collection errors (e.g. a mismatched `ids` length) surface as warnings
/// and drop the offending stem from the result, matching the non-fatal
/// degrade-and-continue policy discovery already applies to parse errors.
pub fn collect(paths: &[PathBuf]) -> Result<Vec<NodeId>> {
    let files = discovery::find_test_files(paths)?;
    let test_items = discovery::extract_tests(&files);
    let items = expand_with_warnings(&test_items);
    Ok(items.into_iter().map(|i| i.nodeid).collect())
}

fn expand_with_warnings(test_items: &[crate::item::TestItem]) -> Vec<ExecutableItem> {
    let mut out = Vec::new();
    for item in test_items {
        match expand::expand_item(item) {
            Ok(expanded) => out.extend(expanded),
            Err(e) => eprintln!("warning: {} ({})", e, item.nodeid_stem()),
        }
    }
    out
}

/// Discover, schedule, execute, and aggregate a full run.
///
/// `on_result` is invoked once per test outcome, in the order results
/// become available across all workers (not a global execution order).
pub fn run(
    root: &Path,
    paths: &[PathBuf],
    num_workers: usize,
    mode: DistMode,
    mut on_result: impl FnMut(&TestOutcome),
) -> Result<Summary> {
    let start = Instant::now();

    let files = discovery::find_test_files(paths)?;
    let test_items = discovery::extract_tests(&files);
    let items = expand_with_warnings(&test_items);

    let mut notified_legacy = HashSet::new();
    for item in &items {
        if item.legacy_alias && notified_legacy.insert(item.nodeid.clone()) {
            eprintln!(
                "warning: {} uses the deprecated `pytest` alias; prefer the native marker module",
                item.nodeid
            );
        }
    }

    let mut summary = Summary::default();

    if items.is_empty() {
        summary.duration = start.elapsed();
        return Ok(summary);
    }

    let buckets = scheduler::schedule(&items, num_workers, mode);
    let expected: HashSet<NodeId> = items.iter().map(|i| i.nodeid.clone()).collect();

    let mut workers = Vec::new();
    for bucket in buckets.into_iter().filter(|b| !b.is_empty()) {
        workers.push(spawn_worker(root, &bucket)?);
    }

    let mut seen: HashSet<NodeId> = HashSet::new();
    poll_workers(&mut workers, &mut seen, &mut |outcome| {
        summary.record(outcome.outcome);
        on_result(outcome);
    })?;

    for missing in expected.difference(&seen) {
        let outcome = TestOutcome::crashed(missing.clone());
        summary.record(outcome.outcome);
        on_result(&outcome);
    }

    summary.duration = start.elapsed();
    Ok(summary)
}

struct WorkerHandle {
    child: Child,
    out_path: PathBuf,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.out_path);
    }
}

static WORKER_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

fn spawn_worker(root: &Path, bucket: &[ExecutableItem]) -> Result<WorkerHandle> {
    let mut files: Vec<PathBuf> = bucket.iter().map(|i| i.source_file.clone()).collect();
    files.sort();
    files.dedup();

    let seq = WORKER_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let out_path = std::env::temp_dir().join(format!("parrun-{}-{}.jsonl", std::process::id(), seq));
    std::fs::write(&out_path, b"").context("failed to create worker output file")?;

    let exe = std::env::current_exe().context("failed to resolve own executable path")?;
    let mut cmd = Command::new(exe);
    cmd.arg("worker")
        .arg("--root")
        .arg(root)
        .arg("--out")
        .arg(&out_path);
    for file in &files {
        cmd.arg(file);
    }

    let child = cmd.spawn().context("failed to spawn worker process")?;

    Ok(WorkerHandle { child, out_path })
}

/// Non-blocking, round-robin consumption of every worker's growing output
/// file so no single worker can starve another's results from reaching
/// `on_result`.
fn poll_workers(
    workers: &mut [WorkerHandle],
    seen: &mut HashSet<NodeId>,
    on_result: &mut impl FnMut(&TestOutcome),
) -> Result<()> {
    let mut readers: Vec<Option<BufReader<std::fs::File>>> = workers.iter().map(|_| None).collect();
    let mut offsets: Vec<u64> = vec![0; workers.len()];
    let mut finished = vec![false; workers.len()];

    loop {
        let mut progressed = false;

        for idx in 0..workers.len() {
            if finished[idx] {
                continue;
            }

            if readers[idx].is_none() {
                if let Ok(f) = std::fs::File::open(&workers[idx].out_path) {
                    readers[idx] = Some(BufReader::new(f));
                }
            }

            let mut exited = false;
            if let Some(reader) = readers[idx].as_mut() {
                reader.get_mut().seek(SeekFrom::Start(offsets[idx]))?;
                let mut buf = Vec::new();
                let mut consumed = 0u64;
                loop {
                    buf.clear();
                    let n = reader.read_until(b'\n', &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    if !buf.ends_with(b"\n") {
                        // partial line; wait for the rest to be flushed
                        break;
                    }
                    consumed += n as u64;
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    if let Ok(outcome) = serde_json::from_str::<TestOutcome>(line) {
                        if seen.insert(outcome.nodeid.clone()) {
                            on_result(&outcome);
                        }
                        progressed = true;
                    }
                }
                offsets[idx] += consumed;
            }

            match workers[idx].child.try_wait() {
                Ok(Some(_)) => exited = true,
                Ok(None) => {}
                Err(_) => exited = true,
            }

            if exited {
                finished[idx] = true;
                progressed = true;
            }
        }

        if finished.iter().all(|f| *f) {
            break;
        }

        if !progressed {
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    for worker in workers.iter_mut() {
        let _ = worker.child.wait();
    }

    Ok(())
}

/// Terminate any still-running workers, allowing `WORKER_GRACE_PERIOD` for a
/// clean exit before escalating. The driver never installs its own signal
/// handler — workers share the foreground process group, so a terminal
/// SIGINT already reaches them directly; this is the escalation path for
/// the cases where a worker outlives that signal.
pub fn terminate_workers(workers: &mut [Child]) {
    let deadline = Instant::now() + WORKER_GRACE_PERIOD;
    for child in workers.iter_mut() {
        let _ = child.kill();
    }
    while Instant::now() < deadline {
        if workers.iter_mut().all(|c| matches!(c.try_wait(), Ok(Some(_)))) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
