//! Frame selector.
//!
//! Greedy selection by descending relevance score under a minimum timeline
//! spacing, capped at `max_selected`. Candidates are also bucketed into
//! relevant / non-relevant by a fixed threshold for archival; the buckets
//! play no part in the selection itself.

use std::cmp::Ordering;

use postlist_models::Frame;

/// Selection parameters.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Maximum number of frames to keep
    pub max_selected: usize,
    /// Minimum index distance between any two kept frames
    pub min_spacing: u64,
    /// Score at or above which a frame is archived as relevant
    pub relevance_threshold: f32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_selected: 30,
            min_spacing: 60,
            relevance_threshold: 0.5,
        }
    }
}

/// Result of a selection run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Kept frames in selection order (descending score)
    pub selected: Vec<Frame>,
    /// Candidates with `score >= relevance_threshold`, by ascending index
    pub relevant: Vec<Frame>,
    /// Remaining candidates, by ascending index
    pub non_relevant: Vec<Frame>,
}

/// Score descending, then index ascending.
fn rank(a: &Frame, b: &Frame) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.index.cmp(&b.index))
}

/// Select a spaced, high-scoring subset of `candidates`.
///
/// Deterministic: identical input always yields identical output.
pub fn select_frames(candidates: Vec<Frame>, config: &SelectorConfig) -> Selection {
    let mut ranked = candidates;
    ranked.sort_by(rank);

    let mut accepted: Vec<usize> = Vec::new();
    let mut taken = vec![false; ranked.len()];

    let spaced = |i: usize, accepted: &[usize]| {
        accepted
            .iter()
            .all(|&j| ranked[i].distance(&ranked[j]) >= config.min_spacing)
    };

    // First pass
    for i in 0..ranked.len() {
        if accepted.len() >= config.max_selected {
            break;
        }
        if spaced(i, &accepted) {
            accepted.push(i);
            taken[i] = true;
        }
    }

    // Top-up pass against the current accepted set; spacing is never relaxed
    if accepted.len() < config.max_selected {
        for i in 0..ranked.len() {
            if accepted.len() >= config.max_selected {
                break;
            }
            if taken[i] {
                continue;
            }
            if spaced(i, &accepted) {
                accepted.push(i);
                taken[i] = true;
            }
        }
    }

    for &i in &accepted {
        ranked[i].selected = true;
    }

    let selected: Vec<Frame> = accepted.iter().map(|&i| ranked[i].clone()).collect();

    let mut by_index = ranked;
    by_index.sort_by_key(|f| f.index);
    let (relevant, non_relevant): (Vec<Frame>, Vec<Frame>) = by_index
        .into_iter()
        .partition(|f| f.score >= config.relevance_threshold);

    Selection {
        selected,
        relevant,
        non_relevant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, score: f32) -> Frame {
        Frame::scored(index, score, format!("frame_{:06}.jpg", index)).unwrap()
    }

    fn indices(frames: &[Frame]) -> Vec<u64> {
        frames.iter().map(|f| f.index).collect()
    }

    fn assert_spaced(frames: &[Frame], min_spacing: u64) {
        for (i, a) in frames.iter().enumerate() {
            for b in &frames[i + 1..] {
                assert!(
                    a.distance(b) >= min_spacing,
                    "frames {} and {} are closer than {}",
                    a.index,
                    b.index,
                    min_spacing
                );
            }
        }
    }

    /// Small deterministic generator so the spacing test covers many shapes.
    fn pseudo_random(seed: &mut u64) -> u64 {
        *seed ^= *seed << 13;
        *seed ^= *seed >> 7;
        *seed ^= *seed << 17;
        *seed
    }

    #[test]
    fn test_selected_frames_respect_spacing() {
        let config = SelectorConfig::default();
        let mut seed = 0x9E37_79B9_7F4A_7C15;

        for _ in 0..50 {
            let n = (pseudo_random(&mut seed) % 400) as usize;
            let candidates: Vec<Frame> = (0..n)
                .map(|_| {
                    let index = pseudo_random(&mut seed) % 3000;
                    let score = (pseudo_random(&mut seed) % 1000) as f32 / 999.0;
                    frame(index, score)
                })
                .collect();

            let selection = select_frames(candidates, &config);
            assert!(selection.selected.len() <= config.max_selected);
            assert_spaced(&selection.selected, config.min_spacing);
            assert_eq!(selection.relevant.len() + selection.non_relevant.len(), n);
        }
    }

    #[test]
    fn test_well_spaced_candidates_pick_top_scores_in_order() {
        let config = SelectorConfig::default();
        // 40 candidates 60 apart, distinct scores, shuffled by index
        let candidates: Vec<Frame> = (0..40u64)
            .map(|k| frame(((k * 17) % 40) * 60, (k as f32 + 1.0) / 41.0))
            .collect();

        let mut expected = candidates.clone();
        expected.sort_by(|a, b| b.score.total_cmp(&a.score));
        expected.truncate(30);

        let selection = select_frames(candidates, &config);
        assert_eq!(indices(&selection.selected), indices(&expected));
        assert!(selection
            .selected
            .windows(2)
            .all(|w| w[0].score > w[1].score));
    }

    #[test]
    fn test_clustered_candidates_yield_single_frame() {
        let config = SelectorConfig::default();
        let candidates: Vec<Frame> = (0..20u64)
            .map(|k| frame(1000 + k * 3, 0.3 + k as f32 * 0.01))
            .collect();

        let selection = select_frames(candidates, &config);
        assert_eq!(indices(&selection.selected), vec![1057]);
    }

    #[test]
    fn test_selection_is_deterministic_with_ties() {
        let config = SelectorConfig::default();
        let candidates: Vec<Frame> = (0..100u64).map(|k| frame(k * 20, 0.5)).collect();

        let first = select_frames(candidates.clone(), &config);
        let mut reversed = candidates;
        reversed.reverse();
        let second = select_frames(reversed, &config);

        assert_eq!(first, second);
        // Equal scores: lowest index wins each tie
        assert_eq!(first.selected[0].index, 0);
        assert_eq!(first.selected[1].index, 60);
    }

    #[test]
    fn test_global_maximum_selected_first() {
        let config = SelectorConfig::default();
        // 1200-frame video sampled every 4 frames, low scores with a peak at 600
        let candidates: Vec<Frame> = (0..300u64)
            .map(|k| {
                let index = k * 4;
                let score = if index == 600 {
                    0.99
                } else {
                    0.05 + (index % 97) as f32 / 1000.0
                };
                frame(index, score)
            })
            .collect();

        let selection = select_frames(candidates.clone(), &config);
        assert_eq!(selection.selected[0].index, 600);
        assert_spaced(&selection.selected, config.min_spacing);

        // Every later pick is the best remaining candidate that fits
        let mut accepted: Vec<Frame> = vec![selection.selected[0].clone()];
        for picked in &selection.selected[1..] {
            let best = candidates
                .iter()
                .filter(|c| accepted.iter().all(|a| a.distance(c) >= config.min_spacing))
                .max_by(|a, b| a.score.total_cmp(&b.score).then(b.index.cmp(&a.index)))
                .unwrap();
            assert_eq!(picked.index, best.index);
            accepted.push(picked.clone());
        }
    }

    #[test]
    fn test_relevance_buckets_are_independent_of_selection() {
        let config = SelectorConfig::default();
        let candidates = vec![frame(0, 0.9), frame(10, 0.5), frame(20, 0.49), frame(200, 0.1)];

        let selection = select_frames(candidates, &config);
        assert_eq!(indices(&selection.relevant), vec![0, 10]);
        assert_eq!(indices(&selection.non_relevant), vec![20, 200]);
        // Frame 10 is relevant but too close to 0; frame 200 is irrelevant but kept
        assert_eq!(indices(&selection.selected), vec![0, 200]);
        assert!(selection.relevant[0].selected);
        assert!(!selection.relevant[1].selected);
    }

    #[test]
    fn test_empty_and_capped_inputs() {
        let selection = select_frames(Vec::new(), &SelectorConfig::default());
        assert!(selection.selected.is_empty());

        let config = SelectorConfig {
            max_selected: 3,
            ..Default::default()
        };
        let candidates: Vec<Frame> = (0..10u64).map(|k| frame(k * 100, 0.5)).collect();
        assert_eq!(select_frames(candidates, &config).selected.len(), 3);
    }
}
