//! Benchmarks for the CPU-side parts of captioning.
//!
//! Run with: cargo bench -p glimpse-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glimpse_core::caption::{
    normalize_color, BeamSearch, CaptionModel, EncoderOutput, FeatureExtractor, SpecialTokens,
};
use glimpse_core::CaptionResult;
use image::DynamicImage;
use ndarray::{Array3, Array4};

/// Decoder over a GPT-2 sized vocabulary that ends after `length` tokens.
struct SyntheticModel {
    vocab: usize,
    length: usize,
}

impl CaptionModel for SyntheticModel {
    fn encode(&self, _pixel_values: &Array4<f32>) -> CaptionResult<EncoderOutput> {
        Ok(EncoderOutput {
            hidden_states: Array3::zeros((1, 197, 768)),
        })
    }

    fn next_token_logits(
        &self,
        _encoder: &EncoderOutput,
        sequences: &[Vec<u32>],
    ) -> CaptionResult<Vec<Vec<f32>>> {
        Ok(sequences
            .iter()
            .map(|seq| {
                let favored = if seq.len() > self.length { 1 } else { 2 + seq.len() };
                (0..self.vocab)
                    .map(|t| if t == favored { 8.0 } else { (t % 7) as f32 * 0.1 })
                    .collect()
            })
            .collect())
    }

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            decoder_start: 0,
            eos: 1,
            pad: None,
        }
    }
}

fn benchmark_preprocess(c: &mut Criterion) {
    let extractor = FeatureExtractor::default();
    let photo = DynamicImage::new_rgba8(1920, 1080);

    c.bench_function("normalize_and_extract_1080p", |b| {
        b.iter(|| {
            let rgb = normalize_color(black_box(&photo));
            extractor.extract(&rgb)
        })
    });
}

fn benchmark_beam_search(c: &mut Criterion) {
    let model = SyntheticModel {
        vocab: 50257,
        length: 10,
    };
    let encoder = EncoderOutput {
        hidden_states: Array3::zeros((1, 1, 1)),
    };

    let mut group = c.benchmark_group("beam_search");
    for num_beams in [1, 4, 8] {
        let search = BeamSearch {
            max_length: 16,
            num_beams,
            length_penalty: 1.0,
        };
        group.bench_with_input(BenchmarkId::from_parameter(num_beams), &search, |b, s| {
            b.iter(|| s.run(&model, black_box(&encoder)))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_preprocess, benchmark_beam_search);
criterion_main!(benches);
