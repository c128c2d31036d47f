//! Time-sync matching: pair files across two folders by capture-time
//! proximity.
//!
//! Pure over its inputs: recomputing from the same folder state yields the
//! same pairing set. Policy is nearest-neighbour within the tolerance
//! window, each file matched at most once, ties broken by smallest absolute
//! delta, then target filename, then control filename.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;

/// A file plus its extracted capture timestamp.
#[derive(Debug, Clone)]
pub struct FileStamp {
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

/// A proposed target/control pairing within the tolerance window.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedPair {
    pub target: PathBuf,
    pub control: PathBuf,
    pub delta_secs: f64,
}

/// Full matching outcome. Unmatched files on either side are reported,
/// never silently dropped.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub pairs: Vec<ProposedPair>,
    pub unmatched_target: Vec<PathBuf>,
    pub unmatched_control: Vec<PathBuf>,
}

fn file_name(path: &PathBuf) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Greedy nearest-neighbour matching over all candidate pairs inside the
/// window. Candidates are ranked by (delta, target name, control name) so
/// the selection order, and therefore the result, is deterministic.
pub fn match_by_time(
    target: &[FileStamp],
    control: &[FileStamp],
    tolerance_secs: f64,
) -> MatchReport {
    let tolerance_ms = (tolerance_secs * 1000.0) as i64;

    let mut candidates: Vec<(i64, usize, usize)> = Vec::new();
    for (ti, t) in target.iter().enumerate() {
        for (ci, c) in control.iter().enumerate() {
            let delta_ms = (t.taken_at - c.taken_at).num_milliseconds().abs();
            if delta_ms <= tolerance_ms {
                candidates.push((delta_ms, ti, ci));
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| file_name(&target[a.1].path).cmp(&file_name(&target[b.1].path)))
            .then_with(|| file_name(&control[a.2].path).cmp(&file_name(&control[b.2].path)))
    });

    let mut used_target: HashSet<usize> = HashSet::new();
    let mut used_control: HashSet<usize> = HashSet::new();
    let mut pairs = Vec::new();

    for (delta_ms, ti, ci) in candidates {
        if used_target.contains(&ti) || used_control.contains(&ci) {
            continue;
        }
        used_target.insert(ti);
        used_control.insert(ci);
        pairs.push(ProposedPair {
            target: target[ti].path.clone(),
            control: control[ci].path.clone(),
            delta_secs: delta_ms as f64 / 1000.0,
        });
    }

    // Report in target order rather than selection order.
    pairs.sort_by(|a, b| a.target.cmp(&b.target));

    let unmatched_target = target
        .iter()
        .enumerate()
        .filter(|(i, _)| !used_target.contains(i))
        .map(|(_, s)| s.path.clone())
        .collect();
    let unmatched_control = control
        .iter()
        .enumerate()
        .filter(|(i, _)| !used_control.contains(i))
        .map(|(_, s)| s.path.clone())
        .collect();

    MatchReport {
        pairs,
        unmatched_target,
        unmatched_control,
    }
}
