//! Frame-to-video compilation.
//!
//! Assembles numbered PNG frames into an intermediate MJPEG container and then
//! transcodes it to H.264/yuv420p MP4. Both encoding steps are delegated to
//! the external `ffmpeg` binary; this module only orders and validates frames.
//!
//! Frames are ordered numerically by filename stem ("10.png" sorts after
//! "9.png"). Frames that fail to decode are skipped with a warning; every
//! other failure is fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::GenericImageView;
use tracing::{info, warn};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct VideoOptions {
    /// Output frame rate.
    pub fps: u32,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

/// List the PNG frames in `dir`, ordered numerically by filename stem.
///
/// Non-PNG entries are ignored; a PNG with a non-numeric stem is an error.
pub fn collect_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut frames: Vec<(u64, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("png") {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let index: u64 = stem.parse().map_err(|_| {
            Error::InvalidData(format!(
                "frame {} has a non-numeric name",
                path.display()
            ))
        })?;
        frames.push((index, path));
    }

    frames.sort_by_key(|(index, _)| *index);
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// Compile the frames in `frames_dir` into `output`.
///
/// An empty frames directory logs a warning and produces nothing. The
/// intermediate container is left at `temp.avi`, as the encoder input.
pub fn compile_video(frames_dir: &Path, output: &Path, opts: VideoOptions) -> Result<()> {
    if opts.fps == 0 {
        return Err(Error::InvalidConfig("fps must be > 0".to_owned()));
    }

    let frames = collect_frames(frames_dir)?;
    if frames.is_empty() {
        warn!("no png frames found in {}", frames_dir.display());
        return Ok(());
    }

    // Validate decodability up front; the encoder only sees readable frames.
    let mut usable = Vec::with_capacity(frames.len());
    for path in frames {
        match image::open(&path) {
            Ok(img) => {
                if usable.is_empty() {
                    let (width, height) = img.dimensions();
                    info!(width, height, "frame size");
                }
                usable.push(path);
            }
            Err(e) => warn!("skipping frame {}: {e}", path.display()),
        }
    }
    if usable.is_empty() {
        return Err(Error::InvalidData(format!(
            "no readable frames in {}",
            frames_dir.display()
        )));
    }
    info!(frames = usable.len(), fps = opts.fps, "assembling video");

    let list_path = PathBuf::from("temp_frames.txt");
    let intermediate = PathBuf::from("temp.avi");

    let mut list = String::new();
    let frame_duration = 1.0 / opts.fps as f64;
    for path in &usable {
        let abs = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        list.push_str(&format!("file '{}'\n", abs.display()));
        list.push_str(&format!("duration {frame_duration}\n"));
    }
    fs::write(&list_path, list).map_err(|e| Error::io(&list_path, e))?;

    let fps = opts.fps.to_string();
    let assemble = run_encoder(Command::new("ffmpeg").args([
        "-y",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        "temp_frames.txt",
        "-c:v",
        "mjpeg",
        "-q:v",
        "3",
        "-r",
        fps.as_str(),
        "temp.avi",
    ]));
    let _ = fs::remove_file(&list_path);
    assemble?;

    run_encoder(Command::new("ffmpeg").args([
        "-y",
        "-i",
        intermediate.to_str().unwrap_or("temp.avi"),
        "-vcodec",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        output.to_str().ok_or_else(|| {
            Error::InvalidConfig(format!("output path {} is not valid UTF-8", output.display()))
        })?,
    ]))?;

    info!("video saved as {}", output.display());
    Ok(())
}

fn run_encoder(cmd: &mut Command) -> Result<()> {
    let status = cmd
        .status()
        .map_err(|e| Error::Encoder(format!("failed to launch ffmpeg: {e}")))?;
    if !status.success() {
        return Err(Error::Encoder(format!(
            "ffmpeg exited with status {status}"
        )));
    }
    Ok(())
}
