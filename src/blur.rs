//! Gaussian blur for the background pad, separable and row-parallel.

use image::RgbaImage;
use image::imageops::FilterType;
use rayon::prelude::*;

use crate::foundation::error::{ReelError, ReelResult};

/// Blur radius (in working pixels) above which frames are blurred on a downsampled copy.
const FULL_RES_MAX_RADIUS: u32 = 8;
const MAX_DOWNSAMPLE: u32 = 8;

/// Force a kernel size to be odd and at least 1.
pub fn normalize_kernel(kernel: u32) -> u32 {
    let k = kernel.max(1);
    if k.is_multiple_of(2) { k + 1 } else { k }
}

/// Gaussian sigma conventionally derived from an odd kernel size.
pub fn sigma_for_kernel(kernel: u32) -> f32 {
    let k = normalize_kernel(kernel) as f32;
    0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian-blur a whole frame with a square kernel of `kernel` pixels.
///
/// Large kernels run on a downsampled copy, then scale back; the result is visually
/// indistinguishable for the soft backgrounds this is used for.
pub fn blur_frame(frame: &RgbaImage, kernel: u32) -> ReelResult<RgbaImage> {
    let kernel = normalize_kernel(kernel);
    let radius = kernel / 2;
    if radius == 0 {
        return Ok(frame.clone());
    }
    let sigma = sigma_for_kernel(kernel);
    let (w, h) = frame.dimensions();

    let factor = (radius / FULL_RES_MAX_RADIUS).clamp(1, MAX_DOWNSAMPLE);
    if factor == 1 {
        let data = blur_rgba8(frame.as_raw(), w, h, radius, sigma)?;
        return RgbaImage::from_raw(w, h, data)
            .ok_or_else(|| ReelError::validation("blur output size mismatch"));
    }

    let (sw, sh) = ((w / factor).max(1), (h / factor).max(1));
    let small = image::imageops::resize(frame, sw, sh, FilterType::Triangle);
    let data = blur_rgba8(
        small.as_raw(),
        sw,
        sh,
        (radius / factor).max(1),
        sigma / factor as f32,
    )?;
    let small = RgbaImage::from_raw(sw, sh, data)
        .ok_or_else(|| ReelError::validation("blur output size mismatch"))?;
    Ok(image::imageops::resize(&small, w, h, FilterType::Triangle))
}

/// Separable Gaussian blur over tightly packed RGBA8, edge pixels clamped.
pub(crate) fn blur_rgba8(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> ReelResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| ReelError::validation("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(ReelError::validation(
            "blur_rgba8 expects src matching width*height*4",
        ));
    }
    if radius == 0 || expected_len == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    horizontal_pass(src, &mut tmp, width, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Ok(out)
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> ReelResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ReelError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(ReelError::validation("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Push rounding drift into the centre tap so the kernel sums to exactly 1.0 (Q16).
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }

    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let row_bytes = width as usize * 4;
    dst.par_chunks_mut(row_bytes)
        .zip(src.par_chunks(row_bytes))
        .for_each(|(dst_row, src_row)| {
            for x in 0..w {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                    let idx = sx as usize * 4;
                    for c in 0..4 {
                        acc[c] += u64::from(kw) * u64::from(src_row[idx + c]);
                    }
                }
                let out_idx = x as usize * 4;
                for c in 0..4 {
                    dst_row[out_idx + c] = q16_to_u8(acc[c]);
                }
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let h = height as i32;
    let row_bytes = width as usize * 4;
    dst.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let y = y as i32;
            for x in 0..row_bytes / 4 {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                    let idx = sy as usize * row_bytes + x * 4;
                    for c in 0..4 {
                        acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                    }
                }
                for c in 0..4 {
                    dst_row[x * 4 + c] = q16_to_u8(acc[c]);
                }
            }
        });
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

#[cfg(test)]
#[path = "../tests/unit/blur.rs"]
mod tests;
