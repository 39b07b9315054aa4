//! The training loop.
//!
//! Each iteration samples a fresh random batch from the record set, averages
//! per-sample MSE gradients over the batch, and applies one Adam step. The
//! per-step batch-mean loss is recorded; a configuration's fitness score is
//! the trailing average of the last [`TRAILING_WINDOW`] losses.

use std::fs;
use std::path::Path;

use rand::Rng;

use crate::{loss, Adam, Error, HyperConfig, Mlp, RecordSet, Result};

/// Number of trailing per-step losses averaged into the summary score.
pub const TRAILING_WINDOW: usize = 100;

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Mean of the last up-to-[`TRAILING_WINDOW`] per-step losses.
    pub trailing_loss: f64,
    /// Per-step batch-mean loss, one entry per iteration.
    pub losses: Vec<f32>,
    pub model: Mlp,
}

/// Train a fresh model described by `config` for `iterations` steps.
pub fn train<R: Rng + ?Sized>(
    records: &RecordSet,
    config: &HyperConfig,
    iterations: usize,
    rng: &mut R,
) -> Result<TrainOutcome> {
    if iterations == 0 {
        return Err(Error::InvalidConfig("iterations must be > 0".to_owned()));
    }

    let mut model = config.build_model(rng)?;
    let adam = Adam::new(config.learning_rate as f32)?;
    let mut state = adam.state(&model)?;

    let mut scratch = model.scratch();
    let mut sample_grads = model.gradients();
    let mut batch_grads = model.gradients();

    let batch_size = config.batch_size;
    let inv_batch = 1.0 / batch_size as f32;
    let mut losses = Vec::with_capacity(iterations);

    for _ in 0..iterations {
        let batch = records.sample_batch(rng, batch_size);

        batch_grads.zero();
        let mut step_loss = 0.0_f32;

        for i in 0..batch.len() {
            let input = batch.features(i);
            let target = batch.target(i);

            model.forward(input, &mut scratch);
            step_loss += loss::mse_backward(
                scratch.output(),
                target,
                sample_grads.d_output_mut(),
            );
            model.backward(input, &scratch, &mut sample_grads);
            batch_grads.add_scaled(&sample_grads, inv_batch);
        }

        state.step(&mut model, &mut batch_grads, &adam);
        losses.push(step_loss * inv_batch);
    }

    Ok(TrainOutcome {
        trailing_loss: trailing_average(&losses),
        losses,
        model,
    })
}

/// Mean of the last up-to-[`TRAILING_WINDOW`] losses.
pub fn trailing_average(losses: &[f32]) -> f64 {
    if losses.is_empty() {
        return 0.0;
    }
    let window = losses.len().min(TRAILING_WINDOW);
    let tail = &losses[losses.len() - window..];
    tail.iter().map(|&l| l as f64).sum::<f64>() / window as f64
}

/// Write the loss trace as newline-delimited values, one per step, with a
/// trailing newline (the layout the plotter consumes).
pub fn write_loss_trace<P: AsRef<Path>>(path: P, losses: &[f32]) -> Result<()> {
    let path = path.as_ref();
    let mut text = String::with_capacity(losses.len() * 12);
    for l in losses {
        text.push_str(&l.to_string());
        text.push('\n');
    }
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::RECORD_DIM;

    fn linear_records(n: usize) -> RecordSet {
        // Target is a fixed linear function of the features so a short run has
        // something learnable.
        let mut values = Vec::with_capacity(n * RECORD_DIM);
        for i in 0..n {
            let mut target = 0.0_f32;
            for j in 0..8 {
                let x = ((i * 7 + j * 3) % 13) as f32 / 13.0;
                values.push(x);
                target += 0.1 * x;
            }
            values.push(target);
        }
        RecordSet::from_flat(values).unwrap()
    }

    fn small_config() -> HyperConfig {
        HyperConfig {
            layer_params: vec![16, 16],
            learning_rate: 1e-3,
            batch_size: 8,
            loss: None,
        }
    }

    #[test]
    fn records_one_loss_per_iteration() {
        let records = linear_records(32);
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = train(&records, &small_config(), 20, &mut rng).unwrap();
        assert_eq!(outcome.losses.len(), 20);
        assert!(outcome.losses.iter().all(|l| l.is_finite()));
        assert!(outcome.trailing_loss.is_finite());
    }

    #[test]
    fn deterministic_under_a_fixed_seed() {
        let records = linear_records(32);

        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = train(&records, &small_config(), 10, &mut rng_a).unwrap();
        let b = train(&records, &small_config(), 10, &mut rng_b).unwrap();

        assert_eq!(a.losses, b.losses);
        assert_eq!(a.trailing_loss, b.trailing_loss);
    }

    #[test]
    fn rejects_zero_iterations() {
        let records = linear_records(16);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(train(&records, &small_config(), 0, &mut rng).is_err());
    }

    #[test]
    fn trailing_average_windows() {
        let short: Vec<f32> = vec![1.0, 2.0, 3.0];
        assert!((trailing_average(&short) - 2.0).abs() < 1e-9);

        // Beyond the window, early losses no longer contribute.
        let mut long = vec![1000.0_f32; 50];
        long.extend(std::iter::repeat(2.0_f32).take(TRAILING_WINDOW));
        assert!((trailing_average(&long) - 2.0).abs() < 1e-9);

        assert_eq!(trailing_average(&[]), 0.0);
    }
}
