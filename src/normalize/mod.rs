pub mod align;
pub mod lighting;
pub mod reflection;

use image::{imageops::FilterType, DynamicImage, RgbImage};

use crate::{config::NormalizerConfig, error::InputError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// A before/after photograph pair. Construction rejects empty, undecodable and
/// zero-sized inputs; dimensions only match after [`Normalizer::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePair {
    pub before: RgbImage,
    pub after: RgbImage,
}

impl ImagePair {
    pub fn new(before: RgbImage, after: RgbImage) -> Result<Self, InputError> {
        check_dimensions("before", &before)?;
        check_dimensions("after", &after)?;
        Ok(Self { before, after })
    }

    pub fn from_bytes(before: &[u8], after: &[u8]) -> Result<Self, InputError> {
        Self::new(decode("before", before)?, decode("after", after)?)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.before.dimensions()
    }

    pub fn same_dimensions(&self) -> bool {
        self.before.dimensions() == self.after.dimensions()
    }
}

fn decode(side: &'static str, bytes: &[u8]) -> Result<RgbImage, InputError> {
    if bytes.is_empty() {
        return Err(InputError::Empty { side });
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|err| InputError::Undecodable {
            side,
            reason: err.to_string(),
        })
}

fn check_dimensions(side: &'static str, img: &RgbImage) -> Result<(), InputError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(InputError::ZeroDimension {
            side,
            width,
            height,
        });
    }
    Ok(())
}

/// Best-effort normalization. Each step that fails or lacks features passes
/// its input through unchanged.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, pair: ImagePair) -> ImagePair {
        let (width, height) = self.target_dimensions(&pair);
        let mut before = resize(pair.before, width, height);
        let mut after = resize(pair.after, width, height);

        if self.config.equalize_lighting {
            before = lighting::equalize(&before).unwrap_or(before);
            after = lighting::equalize(&after).unwrap_or(after);
        }

        if self.config.align {
            after = self.align(&before, after);
        }

        if self.config.remove_reflections {
            before = self.strip_reflections("before", before);
            after = self.strip_reflections("after", after);
        }

        ImagePair { before, after }
    }

    fn target_dimensions(&self, pair: &ImagePair) -> (u32, u32) {
        if self.config.target_width == 0 || self.config.target_height == 0 {
            log_warn!("normalizer target has a zero dimension, keeping before frame size");
            pair.before.dimensions()
        } else {
            (self.config.target_width, self.config.target_height)
        }
    }

    fn align(&self, before: &RgbImage, after: RgbImage) -> RgbImage {
        let before_luma = lighting::to_luma(before);
        let after_luma = lighting::to_luma(&after);

        match align::estimate_translation(&before_luma, &after_luma, &self.config) {
            Some(t) if t.dx == 0 && t.dy == 0 => after,
            Some(t) => {
                log_debug!(
                    "aligning after frame by ({}, {}) from {} matches",
                    t.dx,
                    t.dy,
                    t.matches
                );
                align::shift_into_frame(before, &after, t)
            }
            None => {
                log_debug!("not enough keypoint matches to align, using unaligned frame");
                after
            }
        }
    }

    fn strip_reflections(&self, side: &str, img: RgbImage) -> RgbImage {
        match reflection::remove_reflections(&img, &self.config) {
            Ok(Some(cleaned)) => cleaned,
            Ok(None) => img,
            Err(err) => {
                log_warn!("reflection removal skipped for {side} image: {err}");
                img
            }
        }
    }
}

fn resize(img: RgbImage, width: u32, height: u32) -> RgbImage {
    if img.dimensions() == (width, height) {
        return img;
    }
    DynamicImage::ImageRgb8(img)
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let good = png_bytes(&RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        let err = ImagePair::from_bytes(&[], &good).unwrap_err();
        assert!(matches!(err, InputError::Empty { side: "before" }));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let good = png_bytes(&RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        let err = ImagePair::from_bytes(&good, b"not an image").unwrap_err();
        assert!(matches!(err, InputError::Undecodable { side: "after", .. }));
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let err = ImagePair::new(RgbImage::new(0, 5), RgbImage::new(5, 5)).unwrap_err();
        assert!(matches!(err, InputError::ZeroDimension { width: 0, .. }));
    }

    #[test]
    fn mismatched_inputs_come_out_equal_sized() {
        let before = RgbImage::from_fn(300, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let after = RgbImage::from_fn(640, 480, |x, y| Rgb([(y % 256) as u8, (x % 256) as u8, 30]));
        let pair = ImagePair::new(before, after).unwrap();

        let normalized = Normalizer::default().normalize(pair);
        assert!(normalized.same_dimensions());
        assert_eq!(normalized.dimensions(), (1024, 768));
    }
}
