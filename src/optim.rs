//! Adam optimizer.
//!
//! Optimizer *state* (first/second moments) lives outside the model; the
//! training loop owns it and reuses it across steps. Each step rewrites the
//! provided `Gradients` into the bias-corrected Adam update direction and
//! applies it through `Mlp::sgd_step`.

use crate::{Error, Gradients, Mlp, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
/// Adam hyperparameters.
pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Adam {
    /// Construct an Adam optimizer with the usual defaults
    /// (beta1=0.9, beta2=0.999, eps=1e-8).
    pub fn new(lr: f32) -> Result<Self> {
        let adam = Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        };
        adam.validate()?;
        Ok(adam)
    }

    /// Validate optimizer hyperparameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                self.lr
            )));
        }
        if !(self.beta1.is_finite() && (0.0..1.0).contains(&self.beta1)) {
            return Err(Error::InvalidConfig(format!(
                "adam beta1 must be finite and in [0,1), got {}",
                self.beta1
            )));
        }
        if !(self.beta2.is_finite() && (0.0..1.0).contains(&self.beta2)) {
            return Err(Error::InvalidConfig(format!(
                "adam beta2 must be finite and in [0,1), got {}",
                self.beta2
            )));
        }
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "adam eps must be finite and > 0, got {}",
                self.eps
            )));
        }
        Ok(())
    }

    /// Allocate optimizer state for `model`.
    pub fn state(&self, model: &Mlp) -> Result<AdamState> {
        self.validate()?;
        let (mw, mb) = zeros_like_params(model);
        let (vw, vb) = zeros_like_params(model);
        Ok(AdamState {
            t: 0,
            beta1_pow: 1.0,
            beta2_pow: 1.0,
            m_weights: mw,
            m_biases: mb,
            v_weights: vw,
            v_biases: vb,
        })
    }
}

#[derive(Debug, Clone)]
/// Owned Adam moment buffers.
pub struct AdamState {
    t: u64,
    beta1_pow: f32,
    beta2_pow: f32,
    m_weights: Vec<Vec<f32>>,
    m_biases: Vec<Vec<f32>>,
    v_weights: Vec<Vec<f32>>,
    v_biases: Vec<Vec<f32>>,
}

impl AdamState {
    /// Apply one optimizer step.
    ///
    /// Overwrites `grads` with the Adam update direction and then reuses
    /// `sgd_step` to apply it.
    pub fn step(&mut self, model: &mut Mlp, grads: &mut Gradients, cfg: &Adam) {
        debug_assert_eq!(self.m_weights.len(), model.num_layers());

        self.t += 1;
        self.beta1_pow *= cfg.beta1;
        self.beta2_pow *= cfg.beta2;

        let one_minus_beta1 = 1.0 - cfg.beta1;
        let one_minus_beta2 = 1.0 - cfg.beta2;
        let corr1 = 1.0 - self.beta1_pow;
        let corr2 = 1.0 - self.beta2_pow;

        for layer_idx in 0..model.num_layers() {
            let mw = &mut self.m_weights[layer_idx];
            let mb = &mut self.m_biases[layer_idx];
            let vw = &mut self.v_weights[layer_idx];
            let vb = &mut self.v_biases[layer_idx];

            {
                let upd_w = grads.d_weights_mut(layer_idx);
                debug_assert_eq!(upd_w.len(), mw.len());
                for i in 0..upd_w.len() {
                    let g = upd_w[i];
                    mw[i] = cfg.beta1 * mw[i] + one_minus_beta1 * g;
                    vw[i] = cfg.beta2 * vw[i] + one_minus_beta2 * (g * g);

                    let m_hat = mw[i] / corr1;
                    let v_hat = vw[i] / corr2;
                    upd_w[i] = m_hat / (v_hat.sqrt() + cfg.eps);
                }
            }
            {
                let upd_b = grads.d_biases_mut(layer_idx);
                debug_assert_eq!(upd_b.len(), mb.len());
                for i in 0..upd_b.len() {
                    let g = upd_b[i];
                    mb[i] = cfg.beta1 * mb[i] + one_minus_beta1 * g;
                    vb[i] = cfg.beta2 * vb[i] + one_minus_beta2 * (g * g);

                    let m_hat = mb[i] / corr1;
                    let v_hat = vb[i] / corr2;
                    upd_b[i] = m_hat / (v_hat.sqrt() + cfg.eps);
                }
            }
        }

        model.sgd_step(grads, cfg.lr);
    }

    #[inline]
    pub fn steps(&self) -> u64 {
        self.t
    }
}

fn zeros_like_params(model: &Mlp) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let mut ws = Vec::with_capacity(model.num_layers());
    let mut bs = Vec::with_capacity(model.num_layers());
    for layer in model.layers() {
        ws.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
        bs.push(vec![0.0; layer.out_dim()]);
    }
    (ws, bs)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Activation, Layer};

    fn unit_model() -> Mlp {
        let layer =
            Layer::from_parts(1, 1, Activation::Identity, vec![1.0], vec![1.0]).unwrap();
        Mlp::from_layers(vec![layer])
    }

    #[test]
    fn validation_rejects_bad_hyperparams() {
        assert!(Adam::new(0.0).is_err());
        assert!(Adam::new(-1.0).is_err());
        assert!(Adam::new(f32::NAN).is_err());

        let mut bad = Adam::new(0.1).unwrap();
        bad.beta1 = 1.0;
        assert!(bad.validate().is_err());

        let mut bad = Adam::new(0.1).unwrap();
        bad.beta2 = 1.0;
        assert!(bad.validate().is_err());

        let mut bad = Adam::new(0.1).unwrap();
        bad.eps = 0.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn first_step_matches_expected_direction_for_unit_grad() {
        let mut model = unit_model();
        let mut grads = model.gradients();
        grads.d_weights_mut(0)[0] = 1.0;
        grads.d_biases_mut(0)[0] = 1.0;

        let mut cfg = Adam::new(0.1).unwrap();
        cfg.eps = 1.0;
        let mut state = cfg.state(&model).unwrap();
        state.step(&mut model, &mut grads, &cfg);

        // With eps=1.0 and unit grad, the first bias-corrected step has update ~= 1/(1+eps) = 0.5.
        let layer = model.layer(0).unwrap();
        assert!((layer.weights()[0] - (1.0 - 0.1 * 0.5)).abs() < 1e-6);
        assert!((layer.biases()[0] - (1.0 - 0.1 * 0.5)).abs() < 1e-6);
        assert_eq!(state.steps(), 1);
    }
}
