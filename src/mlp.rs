use rand::Rng;

use crate::{Activation, Error, Layer, Result};

#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
}

/// Reusable buffers for `Mlp::forward`.
///
/// The output of the most recent forward pass lives inside `Scratch`.
#[derive(Debug, Clone)]
pub struct Scratch {
    layer_outputs: Vec<Vec<f32>>,
}

/// Parameter gradients for an `Mlp` (overwrite semantics).
///
/// Allocate once via `Mlp::gradients()` and reuse across training steps. For
/// batch training, keep a second `Gradients` as an accumulator and fold
/// per-sample gradients into it with `add_scaled`.
#[derive(Debug, Clone)]
pub struct Gradients {
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,

    // Backprop intermediate: gradient w.r.t each layer output. The final entry
    // doubles as the upstream-gradient buffer the loss writes into.
    d_layer_outputs: Vec<Vec<f32>>,

    d_input: Vec<f32>,
}

impl Mlp {
    /// Build a regression network: a stack of ReLU hidden layers followed by a
    /// linear output layer (no activation after the final layer).
    ///
    /// `hidden_units` gives the width of each hidden layer in order and must be
    /// non-empty.
    pub fn regression<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_units: &[usize],
        output_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(Error::InvalidConfig(
                "input_dim and output_dim must be > 0".to_owned(),
            ));
        }
        if hidden_units.is_empty() {
            return Err(Error::InvalidConfig(
                "hidden_units must not be empty".to_owned(),
            ));
        }
        if hidden_units.contains(&0) {
            return Err(Error::InvalidConfig(
                "all hidden layer widths must be > 0".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(hidden_units.len() + 1);
        let mut in_dim = input_dim;
        for &width in hidden_units {
            layers.push(Layer::new_with_rng(in_dim, width, Activation::ReLU, rng)?);
            in_dim = width;
        }
        layers.push(Layer::new_with_rng(
            in_dim,
            output_dim,
            Activation::Identity,
            rng,
        )?);

        Ok(Self { layers })
    }

    /// Assemble a model from pre-built layers.
    ///
    /// The caller is responsible for dimension chaining; the checkpoint loader
    /// validates it before calling this.
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        debug_assert!(!layers.is_empty());
        Self { layers }
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers
            .first()
            .expect("mlp must have at least one layer")
            .in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers
            .last()
            .expect("mlp must have at least one layer")
            .out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Forward pass for a single sample.
    ///
    /// Writes intermediate activations into `scratch` and returns the final output slice.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `scratch` must be built for this `Mlp` (same layer count and output sizes)
    pub fn forward<'a>(&self, input: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );

        for (idx, layer) in self.layers.iter().enumerate() {
            if idx == 0 {
                let out = &mut scratch.layer_outputs[0];
                debug_assert_eq!(out.len(), layer.out_dim());
                layer.forward(input, out);
            } else {
                // Borrow the previous output immutably and the current output mutably.
                let (left, right) = scratch.layer_outputs.split_at_mut(idx);
                let prev = &left[idx - 1];
                let out = &mut right[0];
                debug_assert_eq!(out.len(), layer.out_dim());
                layer.forward(prev, out);
            }
        }

        scratch.output()
    }

    /// Backward pass for a single sample.
    ///
    /// You must call `forward` first using the same `input` and `scratch`.
    /// Before calling this, write the upstream gradient `dL/d(output)` into
    /// `grads.d_output_mut()`.
    ///
    /// Overwrite semantics: `grads` is overwritten with gradients for this sample.
    ///
    /// Returns dL/d(input).
    pub fn backward<'a>(
        &self,
        input: &[f32],
        scratch: &Scratch,
        grads: &'a mut Gradients,
    ) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );
        assert_eq!(
            grads.d_weights.len(),
            self.layers.len(),
            "grads has {} d_weights entries, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];

            let layer_input: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.layer_outputs[idx - 1]
            };
            let layer_output: &[f32] = &scratch.layer_outputs[idx];
            debug_assert_eq!(layer_output.len(), layer.out_dim());

            if idx == 0 {
                let d_outputs = &grads.d_layer_outputs[0];
                layer.backward(
                    layer_input,
                    layer_output,
                    d_outputs,
                    &mut grads.d_input,
                    &mut grads.d_weights[0],
                    &mut grads.d_biases[0],
                );
            } else {
                // Two distinct gradient buffers: `d_outputs` of the current layer
                // (read-only) and `d_inputs`, which becomes the previous layer's
                // `d_outputs`.
                let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
                let d_inputs_prev = &mut left[idx - 1];
                let d_outputs = &right[0];
                layer.backward(
                    layer_input,
                    layer_output,
                    d_outputs,
                    d_inputs_prev,
                    &mut grads.d_weights[idx],
                    &mut grads.d_biases[idx],
                );
            }
        }

        &grads.d_input
    }

    /// Applies an SGD update to all layers.
    ///
    /// This is the primitive the optimizer drives: Adam rewrites `grads` into its
    /// update direction and then calls this.
    #[inline]
    pub fn sgd_step(&mut self, grads: &Gradients, lr: f32) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        assert_eq!(
            self.layers.len(),
            grads.d_weights.len(),
            "grads has {} d_weights entries, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );

        for i in 0..self.layers.len() {
            self.layers[i].sgd_step(&grads.d_weights[i], &grads.d_biases[i], lr);
        }
    }
}

impl Scratch {
    pub fn new(mlp: &Mlp) -> Self {
        let mut layer_outputs = Vec::with_capacity(mlp.layers.len());
        for layer in &mlp.layers {
            layer_outputs.push(vec![0.0; layer.out_dim()]);
        }
        Self { layer_outputs }
    }

    #[inline]
    pub fn output(&self) -> &[f32] {
        self.layer_outputs
            .last()
            .expect("scratch must have at least one layer output")
            .as_slice()
    }
}

impl Gradients {
    pub fn new(mlp: &Mlp) -> Self {
        let mut d_weights = Vec::with_capacity(mlp.layers.len());
        let mut d_biases = Vec::with_capacity(mlp.layers.len());
        let mut d_layer_outputs = Vec::with_capacity(mlp.layers.len());

        for layer in &mlp.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_biases.push(vec![0.0; layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; layer.out_dim()]);
        }

        let d_input = vec![0.0; mlp.input_dim()];

        Self {
            d_weights,
            d_biases,
            d_layer_outputs,
            d_input,
        }
    }

    /// Mutable view of the upstream gradient buffer for the final model output.
    ///
    /// Typical training flow:
    /// - `mlp.forward(input, &mut scratch)`
    /// - loss writes `dL/d(output)` into `grads.d_output_mut()`
    /// - `mlp.backward(input, &scratch, &mut grads)`
    #[inline]
    pub fn d_output_mut(&mut self) -> &mut [f32] {
        self.d_layer_outputs
            .last_mut()
            .expect("mlp must have at least one layer")
            .as_mut_slice()
    }

    #[inline]
    pub fn d_input(&self) -> &[f32] {
        &self.d_input
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }

    /// Zero the parameter gradients (the backprop intermediates are overwritten
    /// each pass and need no reset).
    pub fn zero(&mut self) {
        for dw in &mut self.d_weights {
            dw.fill(0.0);
        }
        for db in &mut self.d_biases {
            db.fill(0.0);
        }
    }

    /// Accumulate `other`'s parameter gradients, scaled: `self += scale * other`.
    ///
    /// Used to average per-sample gradients over a batch.
    pub fn add_scaled(&mut self, other: &Gradients, scale: f32) {
        assert_eq!(
            self.d_weights.len(),
            other.d_weights.len(),
            "gradient layer counts do not match: {} vs {}",
            self.d_weights.len(),
            other.d_weights.len()
        );

        for (acc, src) in self.d_weights.iter_mut().zip(&other.d_weights) {
            debug_assert_eq!(acc.len(), src.len());
            for (a, &g) in acc.iter_mut().zip(src) {
                *a = g.mul_add(scale, *a);
            }
        }
        for (acc, src) in self.d_biases.iter_mut().zip(&other.d_biases) {
            debug_assert_eq!(acc.len(), src.len());
            for (a, &g) in acc.iter_mut().zip(src) {
                *a = g.mul_add(scale, *a);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tanh_net() -> Mlp {
        // Tanh hidden layers keep the loss surface smooth for the numeric check.
        let mut rng = StdRng::seed_from_u64(0);
        let l1 = Layer::new_with_rng(2, 3, Activation::Tanh, &mut rng).unwrap();
        let l2 = Layer::new_with_rng(3, 1, Activation::Identity, &mut rng).unwrap();
        Mlp::from_layers(vec![l1, l2])
    }

    fn loss_for_mlp(mlp: &Mlp, input: &[f32], target: &[f32], scratch: &mut Scratch) -> f32 {
        mlp.forward(input, scratch);
        crate::loss::mse(scratch.output(), target)
    }

    fn assert_close(analytic: f32, numeric: f32, abs_tol: f32, rel_tol: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn regression_requires_non_empty_hidden_stack() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Mlp::regression(8, &[], 1, &mut rng).is_err());
        assert!(Mlp::regression(8, &[16, 0], 1, &mut rng).is_err());
        assert!(Mlp::regression(0, &[16], 1, &mut rng).is_err());
    }

    #[test]
    fn regression_layer_layout() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = Mlp::regression(8, &[32, 16], 1, &mut rng).unwrap();

        assert_eq!(net.num_layers(), 3);
        assert_eq!(net.input_dim(), 8);
        assert_eq!(net.output_dim(), 1);

        let acts: Vec<_> = net.layers().iter().map(|l| l.activation()).collect();
        assert_eq!(
            acts,
            vec![Activation::ReLU, Activation::ReLU, Activation::Identity]
        );
        assert_eq!(net.layer(1).unwrap().in_dim(), 32);
        assert_eq!(net.layer(1).unwrap().out_dim(), 16);
    }

    #[test]
    fn seeded_build_is_deterministic() {
        let mut rng_a = StdRng::seed_from_u64(123);
        let mut rng_b = StdRng::seed_from_u64(123);
        let a = Mlp::regression(8, &[16], 1, &mut rng_a).unwrap();
        let b = Mlp::regression(8, &[16], 1, &mut rng_b).unwrap();

        let mut scratch_a = a.scratch();
        let mut scratch_b = b.scratch();
        let input = [0.3_f32, -0.7, 0.1, 0.0, 0.5, -0.2, 0.9, 0.4];

        let out_a = a.forward(&input, &mut scratch_a).to_vec();
        let out_b = b.forward(&input, &mut scratch_b).to_vec();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut mlp = tanh_net();
        let mut scratch = mlp.scratch();
        let mut grads = mlp.gradients();

        let input = [0.3_f32, -0.7_f32];
        let target = [0.2_f32];

        mlp.forward(&input, &mut scratch);
        let _loss = crate::loss::mse_backward(scratch.output(), &target, grads.d_output_mut());
        let d_input = mlp.backward(&input, &scratch, &mut grads).to_vec();

        let eps = 1e-3_f32;
        let abs_tol = 1e-3_f32;
        let rel_tol = 1e-2_f32;

        let mut scratch_tmp = mlp.scratch();

        for layer_idx in 0..mlp.num_layers() {
            let w_len = mlp.layer(layer_idx).unwrap().weights().len();
            for p in 0..w_len {
                let orig = {
                    let w = mlp.layer_mut(layer_idx).unwrap().weights_mut();
                    let orig = w[p];
                    w[p] = orig + eps;
                    orig
                };
                let loss_plus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);

                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig - eps;
                let loss_minus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);

                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig;

                let numeric = (loss_plus - loss_minus) / (2.0 * eps);
                let analytic = grads.d_weights(layer_idx)[p];
                assert_close(analytic, numeric, abs_tol, rel_tol);
            }

            let b_len = mlp.layer(layer_idx).unwrap().biases().len();
            for p in 0..b_len {
                let orig = {
                    let b = mlp.layer_mut(layer_idx).unwrap().biases_mut();
                    let orig = b[p];
                    b[p] = orig + eps;
                    orig
                };
                let loss_plus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);

                mlp.layer_mut(layer_idx).unwrap().biases_mut()[p] = orig - eps;
                let loss_minus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);

                mlp.layer_mut(layer_idx).unwrap().biases_mut()[p] = orig;

                let numeric = (loss_plus - loss_minus) / (2.0 * eps);
                let analytic = grads.d_biases(layer_idx)[p];
                assert_close(analytic, numeric, abs_tol, rel_tol);
            }
        }

        // Inputs.
        let mut input_var = input;
        for i in 0..input_var.len() {
            let orig = input_var[i];

            input_var[i] = orig + eps;
            let loss_plus = loss_for_mlp(&mlp, &input_var, &target, &mut scratch_tmp);

            input_var[i] = orig - eps;
            let loss_minus = loss_for_mlp(&mlp, &input_var, &target, &mut scratch_tmp);

            input_var[i] = orig;

            let numeric = (loss_plus - loss_minus) / (2.0 * eps);
            assert_close(d_input[i], numeric, abs_tol, rel_tol);
        }
    }

    #[test]
    fn add_scaled_averages_gradients() {
        let mlp = tanh_net();
        let mut acc = mlp.gradients();
        let mut sample = mlp.gradients();

        sample.d_weights_mut(0)[0] = 2.0;
        sample.d_biases_mut(1)[0] = 4.0;

        acc.zero();
        acc.add_scaled(&sample, 0.5);
        acc.add_scaled(&sample, 0.5);

        assert!((acc.d_weights(0)[0] - 2.0).abs() < 1e-6);
        assert!((acc.d_biases(1)[0] - 4.0).abs() < 1e-6);
        assert_eq!(acc.d_weights(1)[0], 0.0);
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let mlp = tanh_net();
        let mut scratch = mlp.scratch();
        let input = [0.0_f32; 3];
        mlp.forward(&input, &mut scratch);
    }
}
