//! Border-keyed background removal.
//!
//! The bundled [`Transform`] implementation. It assumes the subject sits
//! on a roughly uniform backdrop that touches the image border:
//!
//! 1. Decode the image (JPEG, PNG, WebP) to RGBA
//! 2. Estimate the backdrop colour as the mean of the border pixels
//! 3. Flood fill from the border through pixels within `tolerance` of
//!    that colour
//! 4. Make filled pixels transparent, optionally feathering the cut edge
//! 5. Encode as PNG
//!
//! Anything enclosed by the subject is kept, even if it matches the
//! backdrop colour.

use std::collections::VecDeque;

use image::{ImageEncoder, Rgba, RgbaImage};

use crate::config::MatteConfig;
use crate::types::MatteError;
use crate::workflow::{OutputFormat, Transform};

/// Alpha given to feathered edge pixels.
const FEATHER_ALPHA: u8 = 128;

/// Remove the border-connected backdrop from an encoded image.
///
/// Reports progress as `(step, total)` where `total` is the image height
/// plus three fixed steps (decode, fill, encode).
///
/// # Errors
///
/// Returns [`MatteError::EmptyInput`] if `bytes` is empty,
/// [`MatteError::InvalidConfig`] for an out-of-range tolerance,
/// [`MatteError::Decode`] if the image cannot be decoded, and
/// [`MatteError::Encode`] if the PNG cannot be written.
pub fn remove_background(
    bytes: &[u8],
    config: &MatteConfig,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<Vec<u8>, MatteError> {
    if bytes.is_empty() {
        return Err(MatteError::EmptyInput);
    }
    config.validate()?;

    let mut img = image::load_from_memory(bytes)
        .map_err(MatteError::Decode)?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let total = u64::from(height) + 3;
    progress(1, total);

    let backdrop = border_mean(&img);
    let background = flood_from_border(&img, backdrop, config.tolerance);
    progress(2, total);

    for y in 0..height {
        for x in 0..width {
            let idx = index(width, x, y);
            if background[idx] {
                img.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            } else if config.feather && touches_background(&background, width, height, x, y) {
                let px = img.get_pixel_mut(x, y);
                px[3] = px[3].min(FEATHER_ALPHA);
            }
        }
        progress(u64::from(y) + 3, total);
    }

    let png = encode_png(&img)?;
    progress(total, total);
    Ok(png)
}

/// [`Transform`] running [`remove_background`] on the calling thread.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BorderMatte {
    config: MatteConfig,
}

impl BorderMatte {
    /// A matte with the given settings.
    #[must_use]
    pub const fn new(config: MatteConfig) -> Self {
        Self { config }
    }
}

impl Transform for BorderMatte {
    type Error = MatteError;

    async fn run(
        &self,
        input: &[u8],
        output: OutputFormat,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Vec<u8>, MatteError> {
        match output {
            OutputFormat::Png => remove_background(input, &self.config, progress),
        }
    }
}

const fn index(width: u32, x: u32, y: u32) -> usize {
    (y as usize) * (width as usize) + (x as usize)
}

/// Visit every border pixel exactly once.
fn for_each_border(width: u32, height: u32, mut f: impl FnMut(u32, u32)) {
    if width == 0 || height == 0 {
        return;
    }
    for x in 0..width {
        f(x, 0);
        if height > 1 {
            f(x, height - 1);
        }
    }
    for y in 1..height.saturating_sub(1) {
        f(0, y);
        if width > 1 {
            f(width - 1, y);
        }
    }
}

/// Mean RGB of the border pixels.
#[allow(clippy::cast_precision_loss)] // channel sums stay far below f32's exact range
fn border_mean(img: &RgbaImage) -> [f32; 3] {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for_each_border(img.width(), img.height(), |x, y| {
        let px = img.get_pixel(x, y);
        for (acc, &c) in sum.iter_mut().zip(&px.0[..3]) {
            *acc += u64::from(c);
        }
        count += 1;
    });
    if count == 0 {
        return [0.0; 3];
    }
    sum.map(|s| s as f32 / count as f32)
}

fn color_distance(px: &Rgba<u8>, backdrop: [f32; 3]) -> f32 {
    px.0[..3]
        .iter()
        .zip(backdrop)
        .map(|(&c, b)| {
            let d = f32::from(c) - b;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Mark pixels reachable from the border through backdrop-coloured
/// pixels (4-connectivity). Fully transparent pixels always match.
fn flood_from_border(img: &RgbaImage, backdrop: [f32; 3], tolerance: f32) -> Vec<bool> {
    let (width, height) = img.dimensions();
    let matches = |x: u32, y: u32| {
        let px = img.get_pixel(x, y);
        px[3] == 0 || color_distance(px, backdrop) <= tolerance
    };

    let mut background = vec![false; (width as usize) * (height as usize)];
    let mut queue = VecDeque::new();
    for_each_border(width, height, |x, y| {
        let idx = index(width, x, y);
        if !background[idx] && matches(x, y) {
            background[idx] = true;
            queue.push_back((x, y));
        }
    });

    while let Some((x, y)) = queue.pop_front() {
        let neighbors = [
            x.checked_sub(1).map(|nx| (nx, y)),
            (x + 1 < width).then(|| (x + 1, y)),
            y.checked_sub(1).map(|ny| (x, ny)),
            (y + 1 < height).then(|| (x, y + 1)),
        ];
        for (nx, ny) in neighbors.into_iter().flatten() {
            let idx = index(width, nx, ny);
            if !background[idx] && matches(nx, ny) {
                background[idx] = true;
                queue.push_back((nx, ny));
            }
        }
    }
    background
}

fn touches_background(background: &[bool], width: u32, height: u32, x: u32, y: u32) -> bool {
    let left = x > 0 && background[index(width, x - 1, y)];
    let right = x + 1 < width && background[index(width, x + 1, y)];
    let up = y > 0 && background[index(width, x, y - 1)];
    let down = y + 1 < height && background[index(width, x, y + 1)];
    left || right || up || down
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, MatteError> {
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(MatteError::Encode)?;
    Ok(buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A white backdrop with a dark square in the middle, as PNG bytes.
    fn subject_on_white(size: u32, margin: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(size, size, |x, y| {
            let inside = (margin..size - margin).contains(&x) && (margin..size - margin).contains(&y);
            if inside {
                Rgba([20, 30, 40, 255])
            } else {
                Rgba([250, 250, 250, 255])
            }
        });
        encode_png(&img).unwrap()
    }

    fn decode(bytes: &[u8]) -> RgbaImage {
        image::load_from_memory(bytes).unwrap().to_rgba8()
    }

    #[test]
    fn empty_input() {
        let result = remove_background(&[], &MatteConfig::default(), &mut |_, _| {});
        assert!(matches!(result, Err(MatteError::EmptyInput)));
    }

    #[test]
    fn corrupt_input() {
        let result = remove_background(&[0xFF, 0x00, 0x12], &MatteConfig::default(), &mut |_, _| {});
        assert!(matches!(result, Err(MatteError::Decode(_))));
    }

    #[test]
    fn invalid_tolerance() {
        let config = MatteConfig {
            tolerance: -5.0,
            feather: false,
        };
        let result = remove_background(&subject_on_white(8, 2), &config, &mut |_, _| {});
        assert!(matches!(result, Err(MatteError::InvalidConfig(_))));
    }

    #[test]
    fn backdrop_becomes_transparent_and_subject_stays() {
        let config = MatteConfig {
            tolerance: 30.0,
            feather: false,
        };
        let out = decode(&remove_background(&subject_on_white(20, 5), &config, &mut |_, _| {}).unwrap());
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(19, 10)[3], 0);
        assert_eq!(*out.get_pixel(10, 10), Rgba([20, 30, 40, 255]));
        assert_eq!(out.get_pixel(5, 5)[3], 255);
    }

    #[test]
    fn feather_softens_the_cut_edge() {
        let config = MatteConfig {
            tolerance: 30.0,
            feather: true,
        };
        let out = decode(&remove_background(&subject_on_white(20, 5), &config, &mut |_, _| {}).unwrap());
        assert_eq!(out.get_pixel(5, 10)[3], FEATHER_ALPHA);
        assert_eq!(out.get_pixel(10, 10)[3], 255);
    }

    #[test]
    fn enclosed_backdrop_colour_is_kept() {
        // A dark ring with a white hole: the hole is not border-connected.
        let img = RgbaImage::from_fn(15, 15, |x, y| {
            let ring = (3..12).contains(&x) && (3..12).contains(&y);
            let hole = (6..9).contains(&x) && (6..9).contains(&y);
            if ring && !hole {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let config = MatteConfig {
            tolerance: 10.0,
            feather: false,
        };
        let out = decode(&remove_background(&encode_png(&img).unwrap(), &config, &mut |_, _| {}).unwrap());
        assert_eq!(out.get_pixel(7, 7)[3], 255, "hole must survive");
        assert_eq!(out.get_pixel(1, 1)[3], 0);
    }

    #[test]
    fn progress_is_monotonic_and_completes() {
        let mut reports = Vec::new();
        remove_background(&subject_on_white(10, 3), &MatteConfig::default(), &mut |c, t| {
            reports.push((c, t));
        })
        .unwrap();

        let total = 10 + 3;
        assert!(reports.iter().all(|&(_, t)| t == total));
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(reports.last(), Some(&(total, total)));
    }

    #[test]
    fn single_pixel_image() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([9, 9, 9, 255]));
        let out = decode(&remove_background(&encode_png(&img).unwrap(), &MatteConfig::default(), &mut |_, _| {}).unwrap());
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn border_visits_each_pixel_once() {
        for (w, h) in [(1, 1), (1, 5), (5, 1), (2, 2), (4, 3)] {
            let mut seen = std::collections::HashSet::new();
            for_each_border(w, h, |x, y| {
                assert!(seen.insert((x, y)), "({x}, {y}) visited twice in {w}x{h}");
            });
            let expected = if w <= 2 || h <= 2 { w * h } else { 2 * w + 2 * h - 4 };
            assert_eq!(seen.len() as u32, expected, "{w}x{h}");
        }
    }
}
