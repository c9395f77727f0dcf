//! Plan construction: arranging registered signals into execution waves.
//!
//! All four execution modes reduce to "a list of waves"; they differ only
//! in how waves are derived and how failures propagate between them.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::BuildError;
use crate::options::ExecutionMode;
use crate::signal::SignalDescriptor;

/// One dispatch unit: signals the scheduler launches together.
#[derive(Debug, Clone)]
pub(crate) struct Wave {
    /// Indexes into the registration list.
    pub(crate) signals: Vec<usize>,
    /// The stage index this wave represents (staged mode only).
    pub(crate) stage: Option<usize>,
}

/// The precomputed schedule for a signal population.
#[derive(Debug)]
pub(crate) struct Plan {
    pub(crate) mode: ExecutionMode,
    pub(crate) waves: Vec<Wave>,
    /// Direct prerequisite indexes per signal (dependency-aware mode).
    pub(crate) prerequisites: Vec<Vec<usize>>,
}

pub(crate) fn build_plan(
    signals: &[SignalDescriptor],
    mode: ExecutionMode,
) -> Result<Plan, BuildError> {
    let index_of = validate_names(signals)?;
    let prerequisites = resolve_prerequisites(signals, &index_of)?;

    let waves = match mode {
        ExecutionMode::Parallel => {
            if signals.is_empty() {
                Vec::new()
            } else {
                vec![Wave {
                    signals: (0..signals.len()).collect(),
                    stage: None,
                }]
            }
        }
        ExecutionMode::Sequential => (0..signals.len())
            .map(|index| Wave {
                signals: vec![index],
                stage: None,
            })
            .collect(),
        ExecutionMode::Staged => staged_waves(signals),
        ExecutionMode::DependencyAware => layered_waves(signals, &prerequisites)?,
    };

    Ok(Plan {
        mode,
        waves,
        prerequisites,
    })
}

fn validate_names(signals: &[SignalDescriptor]) -> Result<HashMap<String, usize>, BuildError> {
    let mut index_of = HashMap::with_capacity(signals.len());
    for (index, signal) in signals.iter().enumerate() {
        if signal.name().is_empty() {
            return Err(BuildError::EmptyName);
        }
        if signal.timeout().is_some_and(|t| t.is_zero()) {
            return Err(BuildError::ZeroTimeout {
                signal: signal.name().to_string(),
            });
        }
        if index_of.insert(signal.name().to_string(), index).is_some() {
            return Err(BuildError::DuplicateName(signal.name().to_string()));
        }
    }
    Ok(index_of)
}

fn resolve_prerequisites(
    signals: &[SignalDescriptor],
    index_of: &HashMap<String, usize>,
) -> Result<Vec<Vec<usize>>, BuildError> {
    signals
        .iter()
        .map(|signal| {
            signal
                .prerequisites()
                .iter()
                .map(|prerequisite| {
                    index_of.get(prerequisite).copied().ok_or_else(|| {
                        BuildError::UnknownPrerequisite {
                            signal: signal.name().to_string(),
                            prerequisite: prerequisite.clone(),
                        }
                    })
                })
                .collect()
        })
        .collect()
}

/// Waves partitioned by ascending stage index. Signals without a stage
/// default to stage 0; gaps between indices are legal and produce no wave.
fn staged_waves(signals: &[SignalDescriptor]) -> Vec<Wave> {
    let mut stages: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, signal) in signals.iter().enumerate() {
        stages
            .entry(signal.stage().unwrap_or(0))
            .or_default()
            .push(index);
    }
    stages
        .into_iter()
        .map(|(stage, members)| Wave {
            signals: members,
            stage: Some(stage),
        })
        .collect()
}

/// Kahn-style topological layering: each wave holds the signals whose
/// prerequisites have all been placed in earlier waves. Independent
/// subtrees land in the same wave and run in parallel.
fn layered_waves(
    signals: &[SignalDescriptor],
    prerequisites: &[Vec<usize>],
) -> Result<Vec<Wave>, BuildError> {
    let mut placed = vec![false; signals.len()];
    let mut remaining: Vec<usize> = (0..signals.len()).collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&index| prerequisites[index].iter().all(|&p| placed[p]))
            .collect();
        if ready.is_empty() {
            return Err(BuildError::CycleDetected {
                path: cycle_path(signals, prerequisites, &placed, remaining[0]),
            });
        }
        for &index in &ready {
            placed[index] = true;
        }
        remaining.retain(|index| !placed[*index]);
        waves.push(Wave {
            signals: ready,
            stage: None,
        });
    }

    Ok(waves)
}

/// Walks unplaced prerequisite edges from `start` until a node repeats,
/// producing a human-readable cycle path like `a -> b -> a`.
fn cycle_path(
    signals: &[SignalDescriptor],
    prerequisites: &[Vec<usize>],
    placed: &[bool],
    start: usize,
) -> Vec<String> {
    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut trail: Vec<usize> = Vec::new();
    let mut current = start;

    loop {
        if let Some(&first) = position.get(&current) {
            let mut path: Vec<String> = trail[first..]
                .iter()
                .map(|&index| signals[index].name().to_string())
                .collect();
            path.push(signals[current].name().to_string());
            return path;
        }
        position.insert(current, trail.len());
        trail.push(current);
        // Every unplaced node has at least one unplaced prerequisite,
        // otherwise it would have been ready.
        current = prerequisites[current]
            .iter()
            .copied()
            .find(|&p| !placed[p])
            .unwrap_or(current);
    }
}
