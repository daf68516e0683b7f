//! Cross-recording alignment from shared clapboard sequences
//!
//! Every recording of a take hears the same clapboard code. Matching decoded
//! codes across recordings yields sync points; a least-squares fit over all
//! sync points gives each recording's offset on a common timeline.

use crate::error::{ClapError, Result};
use crate::sequence::DecodedSequence;

/// Pivots below this make the offset system singular
const PIVOT_EPSILON: f64 = 1e-9;

/// Decoded sequences of one recording
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub name: String,
    /// Stream length in seconds
    pub length: f64,
    /// Sequences taking part in matching
    pub tags: Vec<DecodedSequence>,
    /// Cut markers, kept apart from matching
    pub cuts: Vec<DecodedSequence>,
}

impl Recording {
    pub fn new(name: impl Into<String>, sequences: Vec<DecodedSequence>, length: f64) -> Self {
        let (cuts, tags) = sequences.into_iter().partition(|s| s.is_cut_marker());
        Self {
            name: name.into(),
            length,
            tags,
            cuts,
        }
    }
}

/// A tag within a set of recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRef {
    pub recording: usize,
    pub tag: usize,
}

impl TagRef {
    pub fn sequence<'a>(&self, recordings: &'a [Recording]) -> &'a DecodedSequence {
        &recordings[self.recording].tags[self.tag]
    }
}

/// One clapboard code heard by one or more recordings
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPoint {
    /// The code the matching started from
    pub text: String,
    /// At most one tag per recording
    pub tags: Vec<TagRef>,
}

/// A code that matched several unclaimed tags in the same recording
#[derive(Debug, Clone, PartialEq)]
pub struct Ambiguity {
    pub text: String,
    pub recording: usize,
    /// Indices of the matching tags, in recording order
    pub candidates: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMatching {
    pub syncs: Vec<SyncPoint>,
    pub ambiguous: Vec<Ambiguity>,
}

/// Aligned times of one sync point's tags
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSpread {
    pub times: Vec<(TagRef, f64)>,
    pub mean: f64,
    pub deviation: f64,
}

impl SyncPoint {
    /// Mean and standard deviation of the tag times once `offsets` are applied
    pub fn spread(&self, recordings: &[Recording], offsets: &[f64]) -> Option<SyncSpread> {
        if self.tags.is_empty() {
            return None;
        }

        let times: Vec<(TagRef, f64)> = self
            .tags
            .iter()
            .map(|tag| (*tag, offsets[tag.recording] + tag.sequence(recordings).start_time))
            .collect();

        let count = times.len() as f64;
        let mean = times.iter().map(|(_, t)| t).sum::<f64>() / count;
        let mean_square = times.iter().map(|(_, t)| t * t).sum::<f64>() / count;

        Some(SyncSpread {
            times,
            mean,
            deviation: (mean_square - mean * mean).abs().sqrt(),
        })
    }
}

/// Group tags of all recordings into sync points
///
/// Codes are taken in order of fewest gap placeholders, so fully decoded
/// codes claim their partial copies before a partial code can. Within each
/// recording the unclaimed match with the fewest wildcards joins the sync
/// point; several matches in one recording are reported as ambiguous.
pub fn match_tags(recordings: &[Recording]) -> TagMatching {
    let mut claimed: Vec<Vec<bool>> = recordings
        .iter()
        .map(|recording| vec![false; recording.tags.len()])
        .collect();

    let mut unmatched: Vec<&DecodedSequence> = Vec::new();
    for tag in recordings.iter().flat_map(|recording| &recording.tags) {
        if !unmatched.iter().any(|u| u.symbols == tag.symbols) {
            unmatched.push(tag);
        }
    }

    let mut matching = TagMatching::default();

    while let Some(next) = fewest_wildcards(&unmatched) {
        let code = unmatched.remove(next);
        let mut sync = SyncPoint {
            text: code.symbols.clone(),
            tags: Vec::new(),
        };

        for (r, recording) in recordings.iter().enumerate() {
            let mut best: Option<(usize, usize)> = None;
            let mut candidates = Vec::new();

            for (t, tag) in recording.tags.iter().enumerate() {
                if claimed[r][t] {
                    continue;
                }
                let Some(wildcards) = code.match_wildcards(tag) else {
                    continue;
                };
                candidates.push(t);
                if !best.is_some_and(|(_, fewest)| wildcards >= fewest) {
                    best = Some((t, wildcards));
                }
            }

            if candidates.len() > 1 {
                log::warn!(
                    "{} tags in {} match {:?}",
                    candidates.len(),
                    recording.name,
                    code.symbols
                );
                matching.ambiguous.push(Ambiguity {
                    text: code.symbols.clone(),
                    recording: r,
                    candidates,
                });
            }

            if let Some((t, _)) = best {
                claimed[r][t] = true;
                sync.tags.push(TagRef { recording: r, tag: t });
                let text = &recording.tags[t].symbols;
                unmatched.retain(|u| &u.symbols != text);
            }
        }

        matching.syncs.push(sync);
    }

    matching
}

fn fewest_wildcards(codes: &[&DecodedSequence]) -> Option<usize> {
    codes
        .iter()
        .enumerate()
        .min_by_key(|(_, code)| code.wildcards())
        .map(|(index, _)| index)
}

/// Least-squares offset of every recording, in seconds
///
/// Each pair of tags in a sync point asks for `offset_a + time_a ==
/// offset_b + time_b`. The first recording anchors the system; the result is
/// shifted so the earliest recording starts at zero.
pub fn solve_offsets(recordings: &[Recording], syncs: &[SyncPoint]) -> Result<Vec<f64>> {
    if recordings.is_empty() {
        return Ok(Vec::new());
    }

    // Unknowns are the offsets of recordings 1.., recording 0 stays at zero
    let unknowns = recordings.len() - 1;
    let mut normal = vec![vec![0.0f64; unknowns]; unknowns];
    let mut rhs = vec![0.0f64; unknowns];

    for sync in syncs {
        for (i, a) in sync.tags.iter().enumerate() {
            for b in &sync.tags[i + 1..] {
                let target = b.sequence(recordings).start_time - a.sequence(recordings).start_time;
                let row: Vec<(usize, f64)> = [(a.recording, 1.0), (b.recording, -1.0)]
                    .into_iter()
                    .filter(|&(recording, _)| recording > 0)
                    .map(|(recording, coeff)| (recording - 1, coeff))
                    .collect();

                for &(j, cj) in &row {
                    for &(k, ck) in &row {
                        normal[j][k] += cj * ck;
                    }
                    rhs[j] += cj * target;
                }
            }
        }
    }

    let solution = solve_linear(normal, rhs)
        .map_err(|column| ClapError::Unaligned(recordings[column + 1].name.clone()))?;

    let mut offsets = Vec::with_capacity(recordings.len());
    offsets.push(0.0);
    offsets.extend(solution);

    let min = offsets.iter().copied().fold(f64::INFINITY, f64::min);
    for offset in &mut offsets {
        *offset -= min;
    }
    Ok(offsets)
}

/// Gaussian elimination with partial pivoting
///
/// Fails with the first column that has no usable pivot.
fn solve_linear(
    mut matrix: Vec<Vec<f64>>,
    mut rhs: Vec<f64>,
) -> std::result::Result<Vec<f64>, usize> {
    let n = rhs.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))
            .unwrap_or(col);
        if matrix[pivot][col].abs() < PIVOT_EPSILON {
            return Err(col);
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        let pivot_row = matrix[col].clone();
        let pivot_rhs = rhs[col];
        for row in col + 1..n {
            let factor = matrix[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                matrix[row][k] -= factor * pivot_row[k];
            }
            rhs[row] -= factor * pivot_rhs;
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Ok(x)
}
