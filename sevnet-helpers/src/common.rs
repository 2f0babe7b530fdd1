use ndarray::Array2;

/// Represents a single training sample: a square grayscale pixel matrix paired
/// with the integer index of its class label.
///
/// The pixel matrix keeps the raw 8-bit intensities exactly as decoded;
/// normalization to [0, 1] is the trainer's job.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde_crate::Serialize, serde_crate::Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "serde_crate"))]
pub struct Sample {
    pub pixels: Array2<u8>,
    pub label: usize,
}

impl Sample {
    pub fn new(pixels: Array2<u8>, label: usize) -> Self {
        Sample { pixels, label }
    }

    /// Side length of the (square) pixel matrix.
    pub fn side(&self) -> usize {
        self.pixels.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_sample_side() {
        let sample = Sample::new(Array2::zeros((50, 50)), 2);
        assert_eq!(sample.side(), 50);
        assert_eq!(sample.label, 2);
    }
}
