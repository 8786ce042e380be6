//! Euclidean rhythm generation.
//!
//! Distributes `pulses` onsets as evenly as possible over `steps` positions
//! (Bjorklund's even-distribution idea, single grouping pass) and rotates the
//! result. Pure and deterministic: the same inputs always produce the same
//! [`Pattern`].

use serde::Serialize;
use std::fmt;

/// A fixed-length cyclic step pattern. `true` marks an onset.
///
/// Patterns are replaced wholesale on reconfiguration, never edited in place,
/// so there are no mutating accessors.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pattern {
    steps: Vec<bool>,
}

impl Pattern {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the pattern has no steps at all.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether `index` (taken cyclically) is an onset.
    pub fn is_onset(&self, index: usize) -> bool {
        if self.steps.is_empty() {
            return false;
        }
        self.steps[index % self.steps.len()]
    }

    /// Number of onsets.
    pub fn pulses(&self) -> usize {
        self.steps.iter().filter(|&&on| on).count()
    }

    /// The steps as a slice.
    pub fn as_slice(&self) -> &[bool] {
        &self.steps
    }

    /// Cyclic distances between consecutive onsets.
    ///
    /// Empty when there are no onsets; a single onset has one gap equal to
    /// the pattern length.
    pub fn onset_gaps(&self) -> Vec<usize> {
        let onsets: Vec<usize> = (0..self.len()).filter(|&i| self.steps[i]).collect();
        match onsets.len() {
            0 => Vec::new(),
            n => (0..n)
                .map(|i| {
                    let next = onsets[(i + 1) % n];
                    (next + self.len() - onsets[i] - 1) % self.len() + 1
                })
                .collect(),
        }
    }

    /// Left-rotate by `rotation` steps (Euclidean modulo, so negative values
    /// rotate right).
    pub fn rotated(&self, rotation: i32) -> Pattern {
        if self.steps.is_empty() {
            return self.clone();
        }
        let rot = (rotation as i64).rem_euclid(self.len() as i64) as usize;
        let mut steps = self.steps.clone();
        steps.rotate_left(rot);
        Pattern { steps }
    }
}

impl From<Vec<bool>> for Pattern {
    fn from(steps: Vec<bool>) -> Self {
        Self { steps }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &on in &self.steps {
            f.write_str(if on { "x" } else { "." })?;
        }
        Ok(())
    }
}

/// Generate a Euclidean rhythm of `steps` length with `pulses` onsets,
/// left-rotated by `rotation`.
///
/// `pulses` is clamped to `steps`. Zero steps yields an empty pattern.
pub fn generate(steps: u32, pulses: u32, rotation: i32) -> Pattern {
    let steps = steps as usize;
    let pulses = (pulses as usize).min(steps);

    if pulses == 0 {
        return Pattern::from(vec![false; steps]);
    }
    if pulses == steps {
        return Pattern::from(vec![true; steps]);
    }

    let rests = steps - pulses;

    // The smaller group anchors, the larger one is spread across it.
    let (anchor, anchor_count, filler_count) = if pulses < rests {
        (true, pulses, rests)
    } else {
        (false, rests, pulses)
    };
    let per_anchor = filler_count / anchor_count;
    let remainder = filler_count % anchor_count;

    let mut out = Vec::with_capacity(steps);
    for i in 0..anchor_count {
        out.push(anchor);
        let fill = if i < remainder { per_anchor + 1 } else { per_anchor };
        out.extend(std::iter::repeat(!anchor).take(fill));
    }
    out.truncate(steps);

    Pattern::from(out).rotated(rotation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_count_and_length() {
        for steps in 1..=16u32 {
            for pulses in 0..=steps {
                let pattern = generate(steps, pulses, 0);
                assert_eq!(pattern.len(), steps as usize, "length for E({pulses},{steps})");
                assert_eq!(pattern.pulses(), pulses as usize, "pulses for E({pulses},{steps})");
            }
        }
    }

    #[test]
    fn test_three_in_eight() {
        let pattern = generate(8, 3, 0);
        assert_eq!(
            pattern.as_slice(),
            &[true, false, false, true, false, false, true, false]
        );
        assert_eq!(pattern.to_string(), "x..x..x.");
    }

    #[test]
    fn test_onsets_are_maximally_spread() {
        for steps in 1..=16u32 {
            for pulses in 1..=steps {
                let gaps = generate(steps, pulses, 0).onset_gaps();
                let max = gaps.iter().max().copied().unwrap_or(0);
                let min = gaps.iter().min().copied().unwrap_or(0);
                assert!(max - min <= 1, "E({pulses},{steps}) gaps {gaps:?}");
            }
        }
    }

    #[test]
    fn test_rotation_matches_left_rotate() {
        for (steps, pulses) in [(8u32, 3u32), (12, 7), (4, 2), (3, 1)] {
            let base = generate(steps, pulses, 0);
            for rotation in 0..(2 * steps as i32) {
                let mut expected = base.as_slice().to_vec();
                expected.rotate_left(rotation as usize % steps as usize);
                assert_eq!(generate(steps, pulses, rotation).as_slice(), expected.as_slice());
            }
            assert_eq!(generate(steps, pulses, steps as i32), base);
        }
    }

    #[test]
    fn test_negative_rotation_wraps() {
        assert_eq!(generate(8, 3, -1), generate(8, 3, 7));
    }

    #[test]
    fn test_edge_cases() {
        assert!(generate(4, 0, 0).as_slice().iter().all(|&s| !s));
        assert!(generate(4, 4, 3).as_slice().iter().all(|&s| s));
        // Out-of-range pulses are clamped rather than rejected.
        assert_eq!(generate(3, 9, 0), generate(3, 3, 0));
        assert!(generate(0, 2, 1).is_empty());
    }

    #[test]
    fn test_rests_anchor_when_pulses_dominate() {
        assert_eq!(generate(8, 5, 0).to_string(), ".xx.xx.x");
        assert_eq!(generate(4, 2, 0).to_string(), ".x.x");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(generate(12, 7, 2), generate(12, 7, 2));
    }

    #[test]
    fn test_is_onset_wraps() {
        let pattern = generate(3, 1, 0);
        assert!(pattern.is_onset(0));
        assert!(pattern.is_onset(3));
        assert!(!pattern.is_onset(4));
    }
}
