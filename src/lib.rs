//! Architecture search and training pipeline for curve distance-field networks.
//!
//! `distnet` trains small feed-forward regression networks that approximate
//! the distance field of a quadratic curve: each training record carries 8
//! input features (six control-point coordinates plus a query point) and 1
//! target field value. The crate covers the whole pipeline around that model:
//!
//! - [`RecordSet`]: loads the flat binary record file and samples random
//!   batches with replacement.
//! - [`Mlp`] and friends: a dense feed-forward core (ReLU hidden stack,
//!   linear regression head) with allocation-free forward/backward via
//!   reusable [`Scratch`] / [`Gradients`] buffers, MSE loss, and [`Adam`].
//! - [`train::train`]: the iteration-based training loop; a configuration's
//!   fitness is the trailing average of its last 100 per-step losses.
//! - [`search`]: random hyperparameter search over layer widths, learning
//!   rate, and batch size, persisting evaluated configurations to an
//!   append-only JSON results list.
//! - [`checkpoint`]: a versioned JSON checkpoint format for trained models.
//! - [`export`]: per-layer `.npy` weight export for the downstream
//!   rasterizer.
//! - [`video`] / [`plot`]: standalone utilities that compile numbered PNG
//!   frames into a video (via the external `ffmpeg` encoder) and render a
//!   loss-curve chart.
//!
//! # Panics vs `Result`
//!
//! The crate exposes two layers of API:
//!
//! - Low-level hot path (panics on misuse): [`Mlp::forward`],
//!   [`Mlp::backward`]. Shape mismatches are treated as programmer error.
//! - Everything touching configuration or the filesystem validates its inputs
//!   and returns [`Result`].
//!
//! # Data layout
//!
//! - Scalars are `f32`; hyperparameters and scores are `f64` in the persisted
//!   JSON.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//! - Records, batches, and exported arrays are contiguous row-major buffers.

pub mod activation;
pub mod checkpoint;
pub mod data;
pub mod error;
pub mod export;
pub mod layer;
pub mod loss;
pub mod mlp;
pub mod optim;
pub mod plot;
pub mod search;
pub mod train;
pub mod video;

pub use activation::Activation;
pub use checkpoint::{SerializedNet, MODEL_FORMAT_VERSION};
pub use data::{Batch, RecordSet, FEATURE_DIM, RECORD_DIM};
pub use error::{Error, Result};
pub use export::export_weights;
pub use layer::{Init, Layer};
pub use mlp::{Gradients, Mlp, Scratch};
pub use optim::{Adam, AdamState};
pub use plot::{read_losses, render_chart, ChartOptions};
pub use search::{
    best_config, load_results, run_search, sample_config, save_results, HyperConfig,
    SearchOptions,
};
pub use train::{trailing_average, write_loss_trace, TrainOutcome, TRAILING_WINDOW};
pub use video::{collect_frames, compile_video, VideoOptions};
