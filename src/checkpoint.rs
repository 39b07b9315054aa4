//! Model checkpoints.
//!
//! Defines a versioned, stable on-disk JSON format for a trained network.
//!
//! Design notes:
//! - Internal `Mlp`/`Layer` structs are not serialized directly, to keep the
//!   file format stable even if the internal representation changes.
//! - Deserialization validates dimensions, dimension chaining between layers,
//!   parameter lengths, and that all parameters are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Layer, Mlp, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNet {
    pub format_version: u32,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: SerializedActivation,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedActivation {
    Relu,
    Tanh,
    Identity,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::ReLU => SerializedActivation::Relu,
            Activation::Tanh => SerializedActivation::Tanh,
            Activation::Identity => SerializedActivation::Identity,
        }
    }
}

impl SerializedActivation {
    fn into_activation(self) -> Activation {
        match self {
            SerializedActivation::Relu => Activation::ReLU,
            SerializedActivation::Tanh => Activation::Tanh,
            SerializedActivation::Identity => Activation::Identity,
        }
    }
}

impl SerializedNet {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                let prev_out = self.layers[i - 1].out_dim;
                if layer.in_dim != prev_out {
                    return Err(Error::InvalidData(format!(
                        "layer {i} in_dim {} does not match previous out_dim {prev_out}",
                        layer.in_dim
                    )));
                }
            }
        }

        Ok(())
    }
}

impl From<&Mlp> for SerializedNet {
    fn from(model: &Mlp) -> Self {
        let layers = model
            .layers()
            .iter()
            .map(|layer| SerializedLayer {
                in_dim: layer.in_dim(),
                out_dim: layer.out_dim(),
                activation: SerializedActivation::from(layer.activation()),
                weights: layer.weights().to_vec(),
                biases: layer.biases().to_vec(),
            })
            .collect();
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers,
        }
    }
}

impl TryFrom<SerializedNet> for Mlp {
    type Error = Error;

    fn try_from(value: SerializedNet) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let mut layers = Vec::with_capacity(value.layers.len());
        for (i, layer) in value.layers.into_iter().enumerate() {
            // Layer::from_parts performs shape validation and finiteness checks.
            let l = Layer::from_parts(
                layer.in_dim,
                layer.out_dim,
                layer.activation.into_activation(),
                layer.weights,
                layer.biases,
            )
            .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;
            layers.push(l);
        }

        Ok(Mlp::from_layers(layers))
    }
}

impl Mlp {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedNet::from(self);
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedNet = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the model checkpoint (pretty-printed JSON).
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s).map_err(|e| Error::io(p, e))
    }

    /// Load a model checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn round_trip_preserves_outputs() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = Mlp::regression(8, &[24, 16], 1, &mut rng).unwrap();

        let json = model.to_json_string_pretty().unwrap();
        let loaded = Mlp::from_json_str(&json).unwrap();

        let input = [0.1_f32, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        let mut scratch_a = model.scratch();
        let mut scratch_b = loaded.scratch();
        assert_eq!(
            model.forward(&input, &mut scratch_a),
            loaded.forward(&input, &mut scratch_b)
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"layers":[]}"#;
        let err = Mlp::from_json_str(bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_broken_dimension_chain() {
        let bad = SerializedNet {
            format_version: MODEL_FORMAT_VERSION,
            layers: vec![
                SerializedLayer {
                    in_dim: 2,
                    out_dim: 3,
                    activation: SerializedActivation::Relu,
                    weights: vec![0.0; 6],
                    biases: vec![0.0; 3],
                },
                SerializedLayer {
                    in_dim: 4,
                    out_dim: 1,
                    activation: SerializedActivation::Identity,
                    weights: vec![0.0; 4],
                    biases: vec![0.0; 1],
                },
            ],
        };
        assert!(Mlp::try_from(bad).is_err());
    }

    #[test]
    fn rejects_non_finite_parameters() {
        let bad = SerializedNet {
            format_version: MODEL_FORMAT_VERSION,
            layers: vec![SerializedLayer {
                in_dim: 1,
                out_dim: 1,
                activation: SerializedActivation::Identity,
                weights: vec![f32::INFINITY],
                biases: vec![0.0],
            }],
        };
        assert!(Mlp::try_from(bad).is_err());
    }
}
