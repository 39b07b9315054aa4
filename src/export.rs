//! Weight export.
//!
//! Writes each dense layer's weight matrix and bias vector to standalone
//! `.npy` files, in forward order and 1-indexed:
//! `layer_{n}_weight.npy` (shape `(out_dim, in_dim)`) and
//! `layer_{n}_bias.npy` (shape `(out_dim,)`). The downstream rasterizer
//! reads these back with `ndarray-npy`.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use ndarray_npy::write_npy;

use crate::{Error, Mlp, Result};

/// Export every layer of `model` into `dir`, creating the directory if
/// needed. Returns the number of layers written.
pub fn export_weights(model: &Mlp, dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    for (idx, layer) in model.layers().iter().enumerate() {
        let n = idx + 1;

        let weights = Array2::from_shape_vec(
            (layer.out_dim(), layer.in_dim()),
            layer.weights().to_vec(),
        )
        .map_err(|e| Error::InvalidData(format!("layer {n} weight shape: {e}")))?;
        let biases = Array1::from_vec(layer.biases().to_vec());

        let weight_path = dir.join(format!("layer_{n}_weight.npy"));
        write_npy(&weight_path, &weights)
            .map_err(|e| Error::Io(format!("{}: {e}", weight_path.display())))?;

        let bias_path = dir.join(format!("layer_{n}_bias.npy"));
        write_npy(&bias_path, &biases)
            .map_err(|e| Error::Io(format!("{}: {e}", bias_path.display())))?;
    }

    Ok(model.num_layers())
}
