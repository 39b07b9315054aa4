//! Loss-curve plotting.
//!
//! Reads a newline-delimited list of loss values (one per training step, with
//! a trailing newline) and renders a line chart of loss vs. step to a PNG.
//! The chart is rastered directly into a pixel buffer: white background, axes
//! along the left and bottom margins, and the loss polyline scaled to the
//! observed range.

use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};

use crate::{Error, Result};

const MARGIN: u32 = 40;
const AXIS_COLOR: Rgb<u8> = Rgb([60, 60, 60]);
const LINE_COLOR: Rgb<u8> = Rgb([31, 119, 180]);

#[derive(Debug, Clone, Copy)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Parse a loss trace: newline-delimited floats, trailing blank line expected
/// and discarded. Malformed values are fatal.
pub fn read_losses<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let body = text.trim_end_matches('\n');
    if body.is_empty() {
        return Err(Error::InvalidData(format!(
            "{}: no loss values",
            path.display()
        )));
    }

    let mut losses = Vec::new();
    for (lineno, line) in body.split('\n').enumerate() {
        let value: f64 = line.trim().parse().map_err(|_| {
            Error::InvalidData(format!(
                "{}:{}: not a number: {line:?}",
                path.display(),
                lineno + 1
            ))
        })?;
        losses.push(value);
    }
    Ok(losses)
}

/// Render the loss curve to a PNG at `path`.
pub fn render_chart<P: AsRef<Path>>(losses: &[f64], path: P, opts: ChartOptions) -> Result<()> {
    if losses.is_empty() {
        return Err(Error::InvalidData("no loss values to plot".to_owned()));
    }
    if opts.width <= 2 * MARGIN || opts.height <= 2 * MARGIN {
        return Err(Error::InvalidConfig(format!(
            "chart size {}x{} leaves no room inside the margins",
            opts.width, opts.height
        )));
    }

    let mut img = RgbImage::from_pixel(opts.width, opts.height, Rgb([255, 255, 255]));

    // Axes: steps along the bottom, loss along the left.
    let x0 = MARGIN as i64;
    let y0 = (opts.height - MARGIN) as i64;
    let x1 = (opts.width - MARGIN) as i64;
    let y1 = MARGIN as i64;
    draw_line(&mut img, x0, y0, x1, y0, AXIS_COLOR);
    draw_line(&mut img, x0, y0, x0, y1, AXIS_COLOR);

    let min = losses.iter().copied().fold(f64::INFINITY, f64::min);
    let max = losses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    let plot_w = (x1 - x0) as f64;
    let plot_h = (y0 - y1) as f64;

    let point = |i: usize, v: f64| -> (i64, i64) {
        let fx = if losses.len() > 1 {
            i as f64 / (losses.len() - 1) as f64
        } else {
            0.0
        };
        // A flat trace sits mid-plot.
        let fy = if span > 0.0 { (v - min) / span } else { 0.5 };
        (x0 + (fx * plot_w) as i64, y0 - (fy * plot_h) as i64)
    };

    let (mut px, mut py) = point(0, losses[0]);
    if losses.len() == 1 {
        put_pixel_clipped(&mut img, px, py, LINE_COLOR);
    }
    for (i, &v) in losses.iter().enumerate().skip(1) {
        let (x, y) = point(i, v);
        draw_line(&mut img, px, py, x, y, LINE_COLOR);
        px = x;
        py = y;
    }

    let path = path.as_ref();
    img.save(path)
        .map_err(|e| Error::Io(format!("{}: {e}", path.display())))
}

#[inline]
fn put_pixel_clipped(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line between two points.
fn draw_line(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };

    let (mut x, mut y) = (x0, y0);
    let mut err = dx + dy;
    loop {
        put_pixel_clipped(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
