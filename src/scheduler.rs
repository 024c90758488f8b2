//! Group-aware work distribution.
//!
//! Partitions executable items into worker buckets using longest-processing-
//! time-first (LPT): largest groups placed first onto the least-loaded
//! worker. `xdist_group` affinity is an invariant, not a hint — every item
//! sharing a group name lands in the same bucket. Source-file affinity is a
//! second, always-on invariant: the worker re-derives its items by
//! re-scanning whole files, so two items from one file must never be split
//! across workers regardless of distribution mode.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::item::ExecutableItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistMode {
    Load,
    LoadGroup,
}

impl DistMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "load" => Some(Self::Load),
            "loadgroup" => Some(Self::LoadGroup),
            _ => None,
        }
    }
}

/// Assign items to `num_workers` buckets, preserving discovery order within
/// each group and group order within each worker's bucket.
pub fn schedule(
    items: &[ExecutableItem],
    num_workers: usize,
    mode: DistMode,
) -> Vec<Vec<ExecutableItem>> {
    let num_workers = num_workers.max(1);
    let mut buckets: Vec<Vec<ExecutableItem>> = vec![Vec::new(); num_workers];
    if items.is_empty() {
        return buckets;
    }

    let groups = partition_into_groups(items, mode);

    let mut ordered: Vec<(String, Vec<ExecutableItem>)> = groups.into_iter().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    // Min-heap of (current_load, worker_index); Reverse makes it a min-heap
    // on load with a lexicographic tiebreak on worker index.
    let mut heap: BinaryHeap<Reverse<(usize, usize)>> =
        (0..num_workers).map(|w| Reverse((0, w))).collect();

    for (_, group_items) in ordered {
        let Reverse((load, worker)) = heap.pop().expect("heap has num_workers entries");
        let new_load = load + group_items.len();
        buckets[worker].extend(group_items);
        heap.push(Reverse((new_load, worker)));
    }

    buckets
}

/// The worker re-derives its items by re-scanning whole files (see
/// [`crate::worker`]), so every item from a given source file must land in
/// the same bucket regardless of distribution mode — the file, not the
/// individual item, is the baseline scheduling unit. `loadgroup` mode
/// additionally merges together every file touched by a shared
/// `xdist_group`, satisfying the cross-file group-affinity invariant, even
/// when only some of a file's items carry that group name.
fn partition_into_groups(
    items: &[ExecutableItem],
    mode: DistMode,
) -> std::collections::HashMap<String, Vec<ExecutableItem>> {
    use std::collections::HashMap;
    use std::path::PathBuf;

    // Always start from whole-file clusters; nothing below ever moves a
    // single item out of its file's cluster.
    let mut file_order: Vec<PathBuf> = Vec::new();
    let mut file_index: HashMap<PathBuf, usize> = HashMap::new();
    let mut file_items: Vec<Vec<ExecutableItem>> = Vec::new();

    for item in items {
        let idx = *file_index.entry(item.source_file.clone()).or_insert_with(|| {
            file_order.push(item.source_file.clone());
            file_items.push(Vec::new());
            file_order.len() - 1
        });
        file_items[idx].push(item.clone());
    }

    let mut parent: Vec<usize> = (0..file_order.len()).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    fn union(parent: &mut [usize], a: usize, b: usize) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent[ra] = rb;
        }
    }

    if mode == DistMode::LoadGroup {
        // Any two files that share an xdist_group member merge into one
        // cluster; a file with no grouped item (or a unique group name)
        // stays its own cluster.
        let mut group_to_file: HashMap<String, usize> = HashMap::new();
        for (idx, file_items) in file_items.iter().enumerate() {
            for item in file_items {
                if let Some(group) = &item.xdist_group {
                    match group_to_file.get(group) {
                        Some(&other_idx) => union(&mut parent, idx, other_idx),
                        None => {
                            group_to_file.insert(group.clone(), idx);
                        }
                    }
                }
            }
        }
    }

    let mut clusters: HashMap<String, Vec<ExecutableItem>> = HashMap::new();
    for idx in 0..file_order.len() {
        let root = find(&mut parent, idx);
        let key = file_order[root].to_string_lossy().into_owned();
        clusters.entry(key).or_default().extend(file_items[idx].clone());
    }

    clusters
}
