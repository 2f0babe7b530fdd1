use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::Path;

use image::{GrayImage, Luma};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use sevnet_helpers::LabelSet;

/// Smallest deformity radius a generated image can carry.
pub const MIN_DEFORMITY_RADIUS: u32 = 1;

// Deformity-area ratios (circle area over image area) that bound each
// severity class.
const MAX_NONE_RATIO: f64 = 0.05;
const MAX_LOW_RATIO: f64 = 0.40;
const MAX_MEDIUM_RATIO: f64 = 0.60;

/// Errors that can occur while configuring or running the generator.
#[derive(Debug)]
pub enum GenerateError {
    /// Height and width must both be non-zero.
    InvalidDimensions { height: u32, width: u32 },
    /// The radius range must keep the deformity off the image border.
    RadiusOutOfRange { max_radius: u32, limit: u32 },
    /// Asked to generate zero images.
    NoImages,
    /// Filesystem failure while preparing the output tree.
    Io(io::Error),
    /// Failure while encoding an image file.
    Image(image::ImageError),
}

impl Display for GenerateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::InvalidDimensions { height, width } => {
                write!(f, "Image dimensions must be non-zero, got {}x{}", height, width)
            }
            GenerateError::RadiusOutOfRange { max_radius, limit } => write!(
                f,
                "Max radius {} too large, must be at most {} for these dimensions",
                max_radius, limit
            ),
            GenerateError::NoImages => write!(f, "Number of images to generate must be non-zero"),
            GenerateError::Io(e) => write!(f, "I/O error: {}", e),
            GenerateError::Image(e) => write!(f, "Failed to encode image: {}", e),
        }
    }
}

impl std::error::Error for GenerateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerateError::Io(e) => Some(e),
            GenerateError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GenerateError {
    fn from(e: io::Error) -> Self {
        GenerateError::Io(e)
    }
}

impl From<image::ImageError> for GenerateError {
    fn from(e: image::ImageError) -> Self {
        GenerateError::Image(e)
    }
}

/// Configuration for a [`BitmapGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub height: u32,
    pub width: u32,
    /// Number of images to generate.
    pub count: usize,
    /// Upper bound of the uniformly drawn deformity radius.
    pub max_radius: u32,
    /// Generation seed; `None` draws fresh entropy on every run.
    pub seed: Option<u64>,
}

impl GeneratorConfig {
    pub fn new(height: u32, width: u32, count: usize, max_radius: u32) -> Self {
        GeneratorConfig {
            height,
            width,
            count,
            max_radius,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Number of images generated for one severity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCount {
    pub name: String,
    pub images: usize,
}

/// Per-class totals for one generator run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerateSummary {
    pub per_label: Vec<GeneratedCount>,
}

impl GenerateSummary {
    /// Total number of images written.
    pub fn total(&self) -> usize {
        self.per_label.iter().map(|c| c.images).sum()
    }
}

/// Radius below which the deformity area stays under the given ratio of the
/// image area. The 0.01 slack keeps a radius sitting exactly on a boundary in
/// the lower class.
fn radius_boundary(height: u32, width: u32, ratio: f64) -> u32 {
    let area = f64::from(height) * f64::from(width);
    ((area * (ratio + 0.01)) / std::f64::consts::PI).sqrt() as u32
}

/// Severity class index of a deformity radius, by deformity-area ratio.
///
/// Indices follow [`LabelSet::severity`]: under 5% of the image area is
/// `None`, under 40% `Low`, under 60% `Medium`, anything larger `High`.
pub fn classify_radius(radius: u32, height: u32, width: u32) -> usize {
    let low = radius_boundary(height, width, MAX_NONE_RATIO);
    let medium = radius_boundary(height, width, MAX_LOW_RATIO);
    let high = radius_boundary(height, width, MAX_MEDIUM_RATIO);
    if radius < low {
        0
    } else if radius < medium {
        1
    } else if radius < high {
        2
    } else {
        3
    }
}

/// Renders a white image with one filled black circle.
///
/// A pixel belongs to the deformity when its squared distance to the center
/// is strictly below the squared radius.
fn render_deformity(
    height: u32,
    width: u32,
    center_row: u32,
    center_col: u32,
    radius: u32,
) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let dy = y.abs_diff(center_row);
        let dx = x.abs_diff(center_col);
        if dy * dy + dx * dx < radius * radius {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    })
}

/// Generates a synthetic training set of circular-deformity bitmaps.
///
/// Each image is a white `height x width` canvas with one randomly placed
/// filled black circle, kept fully inside the frame, and is written into the
/// severity subdirectory its area ratio classifies it into. The output tree
/// (`<out>/<label>/bitmapN.bmp`) is exactly the layout the dataset builder
/// scans, so `generate`, `build`, and `train` compose without external data.
#[derive(Debug, Clone)]
pub struct BitmapGenerator {
    config: GeneratorConfig,
    labels: LabelSet,
}

impl BitmapGenerator {
    /// Creates a generator for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::InvalidDimensions` for a zero height or width,
    /// `GenerateError::NoImages` for a zero count, and
    /// `GenerateError::RadiusOutOfRange` unless
    /// `MIN_DEFORMITY_RADIUS <= max_radius` and the largest deformity still
    /// fits strictly inside the frame (`2 * max_radius + 2 <= min(height,
    /// width)`).
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerateError> {
        if config.height == 0 || config.width == 0 {
            return Err(GenerateError::InvalidDimensions {
                height: config.height,
                width: config.width,
            });
        }
        if config.count == 0 {
            return Err(GenerateError::NoImages);
        }
        let shorter = config.height.min(config.width);
        let limit = (shorter.saturating_sub(2)) / 2;
        if config.max_radius < MIN_DEFORMITY_RADIUS || config.max_radius > limit {
            return Err(GenerateError::RadiusOutOfRange {
                max_radius: config.max_radius,
                limit,
            });
        }
        Ok(BitmapGenerator {
            config,
            labels: LabelSet::severity(),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates the configured number of images into `<out>/<label>/`.
    ///
    /// Uses the configured seed if one was set, fresh entropy otherwise. All
    /// severity subdirectories are created up front, so classes that receive
    /// no images still exist for the dataset builder.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::Io` or `GenerateError::Image` if the output
    /// tree cannot be written.
    pub fn generate(&self, out: impl AsRef<Path>) -> Result<GenerateSummary, GenerateError> {
        let mut rng = match self.config.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_rng(&mut rand::rng()),
        };
        self.generate_with_rng(out, &mut rng)
    }

    /// Generates with a caller-supplied RNG for reproducible runs.
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        out: impl AsRef<Path>,
        rng: &mut R,
    ) -> Result<GenerateSummary, GenerateError> {
        let out = out.as_ref();
        for name in self.labels.names() {
            fs::create_dir_all(out.join(name))?;
        }

        let (height, width) = (self.config.height, self.config.width);
        let mut images = vec![0usize; self.labels.len()];
        for n in 1..=self.config.count {
            let radius = rng.random_range(MIN_DEFORMITY_RADIUS..=self.config.max_radius);
            // The center range keeps the circle from touching the border and
            // depends on the radius, so it is drawn second.
            let center_col = rng.random_range(radius + 1..=width - radius - 1);
            let center_row = rng.random_range(radius + 1..=height - radius - 1);

            let image = render_deformity(height, width, center_row, center_col, radius);
            let class = classify_radius(radius, height, width);
            let name = &self.labels.names()[class];
            image.save(out.join(name).join(format!("bitmap{}.bmp", n)))?;
            images[class] += 1;
        }

        Ok(GenerateSummary {
            per_label: self
                .labels
                .names()
                .iter()
                .zip(images)
                .map(|(name, images)| GeneratedCount {
                    name: name.clone(),
                    images,
                })
                .collect(),
        })
    }
}
