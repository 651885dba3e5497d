//! Deterministic beam search over a [`CaptionModel`] decoder.
//!
//! Each step scores every live beam's next-token log-probabilities, keeps the
//! best `2 × num_beams` candidates, finalizes those that end in EOS, and
//! carries the best `num_beams` unfinished ones forward. Ties are broken by
//! beam index, then token id, so the same inputs always yield the same output.

use std::cmp::Ordering;

use super::model::{CaptionModel, EncoderOutput};
use crate::error::{CaptionError, CaptionResult};

/// Generation hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSearch {
    /// Maximum sequence length, counting the decoder start token
    pub max_length: usize,
    /// Number of beams kept alive per step (1 = greedy)
    pub num_beams: usize,
    /// Exponent on hypothesis length when ranking finished beams
    pub length_penalty: f32,
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    log_prob: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    beam: usize,
    token: u32,
    log_prob: f32,
}

/// Finished hypotheses, best first, capped at `num_beams`.
struct Hypotheses {
    capacity: usize,
    length_penalty: f32,
    /// (normalized score, tokens without start/eos)
    entries: Vec<(f32, Vec<u32>)>,
}

impl Hypotheses {
    fn new(capacity: usize, length_penalty: f32) -> Self {
        Self {
            capacity,
            length_penalty,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    fn score(&self, log_prob: f32, generated_len: usize) -> f32 {
        log_prob / (generated_len.max(1) as f32).powf(self.length_penalty)
    }

    fn add(&mut self, tokens: Vec<u32>, log_prob: f32, generated_len: usize) {
        let score = self.score(log_prob, generated_len);
        if self.entries.len() == self.capacity && score <= self.worst() {
            return;
        }
        // Insert after existing entries with an equal score so earlier
        // hypotheses win ties.
        let pos = self
            .entries
            .iter()
            .position(|(s, _)| score > *s)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, (score, tokens));
        self.entries.truncate(self.capacity);
    }

    fn worst(&self) -> f32 {
        self.entries
            .last()
            .map(|(s, _)| *s)
            .unwrap_or(f32::NEG_INFINITY)
    }

    /// No live beam at this length can still enter the list.
    fn is_done(&self, best_live_log_prob: f32, generated_len: usize) -> bool {
        self.entries.len() == self.capacity
            && self.score(best_live_log_prob, generated_len) <= self.worst()
    }

    fn best(self) -> Option<Vec<u32>> {
        self.entries.into_iter().next().map(|(_, tokens)| tokens)
    }
}

impl BeamSearch {
    /// Generate the single best token sequence for an encoded image.
    ///
    /// The returned ids exclude the decoder start token and EOS.
    pub fn run(
        &self,
        model: &dyn CaptionModel,
        encoder: &EncoderOutput,
    ) -> CaptionResult<Vec<u32>> {
        if self.num_beams == 0 {
            return Err(CaptionError::inference("num_beams must be > 0"));
        }

        let special = model.special_tokens();
        let width = self.num_beams;
        let mut finished = Hypotheses::new(width, self.length_penalty);
        let mut live = vec![Beam {
            tokens: vec![special.decoder_start],
            log_prob: 0.0,
        }];

        while live[0].tokens.len() < self.max_length {
            let sequences: Vec<Vec<u32>> = live.iter().map(|b| b.tokens.clone()).collect();
            let logits = model.next_token_logits(encoder, &sequences)?;
            if logits.len() != live.len() {
                return Err(CaptionError::inference(format!(
                    "Decoder returned {} rows for {} beams",
                    logits.len(),
                    live.len()
                )));
            }

            let mut candidates = Vec::with_capacity(live.len() * 2 * width);
            for (i, (beam, row)) in live.iter().zip(&logits).enumerate() {
                let log_probs = log_softmax(row);
                for (token, lp) in top_k(&log_probs, 2 * width) {
                    candidates.push(Candidate {
                        beam: i,
                        token,
                        log_prob: beam.log_prob + lp,
                    });
                }
            }
            candidates.sort_by(compare_candidates);
            candidates.truncate(2 * width);

            // Generated length once this step's token is appended.
            let generated_len = live[0].tokens.len();
            let mut next = Vec::with_capacity(width);
            for (rank, cand) in candidates.iter().enumerate() {
                let parent = &live[cand.beam].tokens;
                if cand.token == special.eos {
                    // Only EOS candidates ranked within the beam width count.
                    if rank < width {
                        finished.add(parent[1..].to_vec(), cand.log_prob, generated_len);
                    }
                    continue;
                }
                let mut tokens = Vec::with_capacity(parent.len() + 1);
                tokens.extend_from_slice(parent);
                tokens.push(cand.token);
                next.push(Beam {
                    tokens,
                    log_prob: cand.log_prob,
                });
                if next.len() == width {
                    break;
                }
            }

            if next.is_empty() || finished.is_done(next[0].log_prob, generated_len) {
                live = next;
                break;
            }
            live = next;
        }

        for beam in live {
            let generated_len = beam.tokens.len() - 1;
            finished.add(beam.tokens[1..].to_vec(), beam.log_prob, generated_len);
        }

        let mut best = finished
            .best()
            .ok_or_else(|| CaptionError::inference("Beam search produced no hypotheses"))?;
        if let Some(pad) = special.pad {
            if pad != special.eos {
                best.retain(|&t| t != pad);
            }
        }
        Ok(best)
    }
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.log_prob
        .total_cmp(&a.log_prob)
        .then(a.beam.cmp(&b.beam))
        .then(a.token.cmp(&b.token))
}

/// Numerically stable log-softmax.
pub(crate) fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; logits.len()];
    }
    let sum: f32 = logits.iter().map(|&l| (l - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|&l| l - log_sum).collect()
}

/// The `k` highest values with their indices, highest first, lower index on ties.
pub(crate) fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as u32, v))
        .collect();
    let k = k.min(indexed.len());
    if k == 0 {
        return Vec::new();
    }
    let by_score = |a: &(u32, f32), b: &(u32, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k - 1, by_score);
        indexed.truncate(k);
    }
    indexed.sort_by(by_score);
    indexed
}
