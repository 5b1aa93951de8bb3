use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};

use crate::{models::SignalKind, normalize::ImagePair};

use super::{ScoreOutcome, SignalReading, SignalScorer};

/// Perceptual distance from double-gradient hashes. Reported as twice the
/// fraction of differing bits, so anything past half the bits saturates the
/// damage contribution.
#[derive(Debug, Clone, Copy)]
pub struct PerceptualScorer {
    hash_size: u32,
}

impl PerceptualScorer {
    pub fn new(hash_size: u32) -> Self {
        Self { hash_size }
    }
}

impl Default for PerceptualScorer {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SignalScorer for PerceptualScorer {
    fn kind(&self) -> SignalKind {
        SignalKind::Perceptual
    }

    fn score(&self, pair: &ImagePair) -> ScoreOutcome {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(self.hash_size, self.hash_size)
            .to_hasher();

        let before = hasher.hash_image(&DynamicImage::ImageRgb8(pair.before.clone()));
        let after = hasher.hash_image(&DynamicImage::ImageRgb8(pair.after.clone()));

        let bits = before.as_bytes().len() * 8;
        if bits == 0 {
            return ScoreOutcome::unavailable("perceptual hash is empty");
        }

        let distance = f64::from(before.dist(&after)) / bits as f64 * 2.0;
        ScoreOutcome::Available(SignalReading::Distance(distance))
    }
}
