//! Random architecture search.
//!
//! A configuration is a hyperparameter record: hidden layer widths, learning
//! rate, batch size, and (once evaluated) the trailing-average loss the brief
//! training run ended on. The driver samples configurations uniformly from
//! fixed ranges, trains each one briefly, and appends the evaluated records to
//! a persisted JSON results list.
//!
//! The results file is append-only across runs: read, extend, rewrite. There
//! is no locking; this is a single-process tool and concurrent writers can
//! lose records.

use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{train, Error, Mlp, RecordSet, Result, FEATURE_DIM};

/// Hidden layer count range (inclusive).
pub const LAYER_COUNT_RANGE: (usize, usize) = (2, 5);
/// Hidden layer width range (inclusive).
pub const LAYER_WIDTH_RANGE: (usize, usize) = (16, 64);
/// Batch size range (inclusive).
pub const BATCH_SIZE_RANGE: (usize, usize) = (16, 512);
/// Learning rate bounds. Sampling interpolates linearly between them, not
/// logarithmically; see DESIGN.md.
pub const LEARNING_RATE_RANGE: (f64, f64) = (1e-5, 1e-2);

/// A hyperparameter configuration, evaluated or not.
///
/// Serialized as one object of the persisted results array, key-compatible
/// with the historical `output.json` layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperConfig {
    /// Ordered hidden layer widths.
    pub layer_params: Vec<usize>,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Trailing-average loss, present once the config has been evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
}

impl HyperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.layer_params.is_empty() {
            return Err(Error::InvalidConfig(
                "layer_params must not be empty".to_owned(),
            ));
        }
        if self.layer_params.contains(&0) {
            return Err(Error::InvalidConfig(
                "all layer widths must be > 0".to_owned(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Build the regression network this configuration describes.
    pub fn build_model<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Mlp> {
        self.validate()?;
        Mlp::regression(FEATURE_DIM, &self.layer_params, 1, rng)
    }
}

/// Sample one configuration uniformly from the search ranges.
pub fn sample_config<R: Rng + ?Sized>(rng: &mut R) -> HyperConfig {
    let num_layers = rng.gen_range(LAYER_COUNT_RANGE.0..=LAYER_COUNT_RANGE.1);
    let mut layer_params = Vec::with_capacity(num_layers);
    for _ in 0..num_layers {
        layer_params.push(rng.gen_range(LAYER_WIDTH_RANGE.0..=LAYER_WIDTH_RANGE.1));
    }

    // Linear interpolation between the bounds of a uniform draw.
    let (lo, hi) = LEARNING_RATE_RANGE;
    let t = rng.gen::<f64>();
    let learning_rate = lo * (1.0 - t) + t * hi;

    let batch_size = rng.gen_range(BATCH_SIZE_RANGE.0..=BATCH_SIZE_RANGE.1);

    HyperConfig {
        layer_params,
        learning_rate,
        batch_size,
        loss: None,
    }
}

/// Load the persisted results list. A missing file reads as the empty list;
/// a malformed file is an error.
pub fn load_results<P: AsRef<Path>>(path: P) -> Result<Vec<HyperConfig>> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(path, e)),
    };

    serde_json::from_str(&text)
        .map_err(|e| Error::InvalidData(format!("{}: {e}", path.display())))
}

/// Overwrite the persisted results list.
pub fn save_results<P: AsRef<Path>>(path: P, results: &[HyperConfig]) -> Result<()> {
    let path = path.as_ref();
    let text = serde_json::to_string(results)
        .map_err(|e| Error::InvalidData(format!("failed to serialize results: {e}")))?;
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

/// The best evaluated configuration: minimum by `loss` across the full list,
/// first wins ties. Entries that were never evaluated are skipped.
pub fn best_config(results: &[HyperConfig]) -> Option<&HyperConfig> {
    let mut best: Option<(&HyperConfig, f64)> = None;
    for config in results {
        let Some(loss) = config.loss else { continue };
        match best {
            Some((_, best_loss)) if loss.total_cmp(&best_loss).is_lt() => {
                best = Some((config, loss));
            }
            None => best = Some((config, loss)),
            _ => {}
        }
    }
    best.map(|(config, _)| config)
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Number of independent configurations to evaluate.
    pub trials: usize,
    /// Training iterations per trial.
    pub iterations: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            trials: 100,
            iterations: 1000,
        }
    }
}

/// Run the random search: evaluate `opts.trials` fresh configurations and
/// append them to the results list at `results_path`.
///
/// Returns the full persisted list, previous runs included.
pub fn run_search<R: Rng + ?Sized>(
    records: &RecordSet,
    opts: SearchOptions,
    results_path: &Path,
    rng: &mut R,
) -> Result<Vec<HyperConfig>> {
    if opts.trials == 0 {
        return Err(Error::InvalidConfig("trials must be > 0".to_owned()));
    }

    let mut evaluated = Vec::with_capacity(opts.trials);
    let mut best_loss = f64::INFINITY;

    for trial in 0..opts.trials {
        let mut config = sample_config(rng);
        let outcome = train::train(records, &config, opts.iterations, rng)?;
        config.loss = Some(outcome.trailing_loss);

        if outcome.trailing_loss < best_loss {
            best_loss = outcome.trailing_loss;
        }
        info!(
            trial = trial + 1,
            total = opts.trials,
            layers = ?config.layer_params,
            lr = config.learning_rate,
            batch_size = config.batch_size,
            loss = outcome.trailing_loss,
            best = best_loss,
            "trial finished"
        );

        evaluated.push(config);
    }

    let mut results = load_results(results_path)?;
    results.extend(evaluated);
    save_results(results_path, &results)?;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sampled_configs_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..500 {
            let config = sample_config(&mut rng);
            assert!((2..=5).contains(&config.layer_params.len()));
            for &w in &config.layer_params {
                assert!((16..=64).contains(&w));
            }
            assert!((16..=512).contains(&config.batch_size));
            assert!(config.learning_rate >= 1e-5 && config.learning_rate <= 1e-2);
            assert!(config.loss.is_none());
        }
    }

    #[test]
    fn json_layout_matches_the_persisted_format() {
        let config = HyperConfig {
            layer_params: vec![32, 16],
            learning_rate: 1e-3,
            batch_size: 64,
            loss: Some(0.25),
        };

        let value = serde_json::to_value(&config).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        assert!(obj.contains_key("layer_params"));
        assert!(obj.contains_key("learning_rate"));
        assert!(obj.contains_key("batch_size"));
        assert!(obj.contains_key("loss"));

        // Unevaluated configs omit the loss key entirely.
        let fresh = HyperConfig {
            loss: None,
            ..config
        };
        let value = serde_json::to_value(&fresh).unwrap();
        assert!(value.as_object().unwrap().get("loss").is_none());
    }

    #[test]
    fn best_config_is_minimum_by_loss() {
        let mk = |widths: &[usize], loss: Option<f64>| HyperConfig {
            layer_params: widths.to_vec(),
            learning_rate: 1e-3,
            batch_size: 32,
            loss,
        };

        let results = vec![
            mk(&[16], Some(0.5)),
            mk(&[17], None),
            mk(&[18], Some(0.1)),
            mk(&[19], Some(0.1)),
            mk(&[20], Some(0.3)),
        ];

        let best = best_config(&results).unwrap();
        assert_eq!(best.layer_params, vec![18], "first of the tied minima wins");

        assert!(best_config(&[]).is_none());
        assert!(best_config(&[mk(&[16], None)]).is_none());
    }

    #[test]
    fn validate_rejects_bad_configs() {
        let good = HyperConfig {
            layer_params: vec![16, 16],
            learning_rate: 1e-3,
            batch_size: 32,
            loss: None,
        };
        assert!(good.validate().is_ok());

        let mut bad = good.clone();
        bad.layer_params.clear();
        assert!(bad.validate().is_err());

        let mut bad = good.clone();
        bad.layer_params = vec![16, 0];
        assert!(bad.validate().is_err());

        let mut bad = good.clone();
        bad.batch_size = 0;
        assert!(bad.validate().is_err());

        let mut bad = good;
        bad.learning_rate = -1.0;
        assert!(bad.validate().is_err());
    }
}
