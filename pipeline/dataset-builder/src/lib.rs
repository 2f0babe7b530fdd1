use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use ndarray::{Array1, Array2, Array4};
use ndarray_npy::{read_npy, write_npy, ReadNpyError, WriteNpyError};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use sevnet_helpers::{LabelSet, Sample};

/// Default target resolution (side length) for resized samples.
pub const DEFAULT_SIDE: usize = 50;

/// Errors that can occur while building or persisting a dataset.
///
/// Per-file decode failures are deliberately absent from this taxonomy: they
/// are absorbed by the scan loop (the file is skipped and counted in the
/// [`ScanSummary`]) and never abort a build.
#[derive(Debug)]
pub enum BuildError {
    /// The root directory or one of the label subdirectories does not exist.
    NotFound(PathBuf),
    /// The full scan yielded zero samples; training on nothing is meaningless.
    EmptyDataset,
    /// A label collected fewer samples than the configured minimum.
    TooFewSamples {
        label: String,
        found: usize,
        required: usize,
    },
    /// The loaded feature and label arrays disagree on the sample count.
    MismatchedPair { features: usize, labels: usize },
    /// The configured side length is zero.
    InvalidSide,
    /// Filesystem failure while scanning or committing output files.
    Io(io::Error),
    /// Failure while serializing an array to `.npy`.
    Write(WriteNpyError),
    /// Failure while deserializing an array from `.npy`.
    Read(ReadNpyError),
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::NotFound(path) => {
                write!(f, "Directory not found: {}", path.display())
            }
            BuildError::EmptyDataset => {
                write!(f, "No samples could be decoded from the input directory")
            }
            BuildError::TooFewSamples {
                label,
                found,
                required,
            } => write!(
                f,
                "Label {:?} has {} samples, but at least {} are required",
                label, found, required
            ),
            BuildError::MismatchedPair { features, labels } => write!(
                f,
                "Feature/label arrays are misaligned: {} feature rows vs {} labels",
                features, labels
            ),
            BuildError::InvalidSide => write!(f, "Target side length must be non-zero"),
            BuildError::Io(e) => write!(f, "I/O error: {}", e),
            BuildError::Write(e) => write!(f, "Failed to write array: {}", e),
            BuildError::Read(e) => write!(f, "Failed to read array: {}", e),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::Io(e) => Some(e),
            BuildError::Write(e) => Some(e),
            BuildError::Read(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BuildError {
    fn from(e: io::Error) -> Self {
        BuildError::Io(e)
    }
}

impl From<WriteNpyError> for BuildError {
    fn from(e: WriteNpyError) -> Self {
        BuildError::Write(e)
    }
}

impl From<ReadNpyError> for BuildError {
    fn from(e: ReadNpyError) -> Self {
        BuildError::Read(e)
    }
}

/// Configuration for a [`DatasetBuilder`].
///
/// The label enumeration is passed in explicitly so the name → index mapping
/// is fixed by configuration rather than inferred at call sites, and the
/// shuffle seed and target resolution are explicit rather than baked in.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Root directory; immediate subdirectories are named after the labels.
    pub root: PathBuf,
    /// Ordered class enumeration defining the integer labels.
    pub labels: LabelSet,
    /// Target side length every image is stretched to (default 50).
    pub side: usize,
    /// Shuffle seed; `None` draws fresh entropy on every build.
    pub seed: Option<u64>,
    /// Optional minimum number of decoded samples per label.
    pub min_per_label: Option<usize>,
}

impl BuilderConfig {
    pub fn new(root: impl Into<PathBuf>, labels: LabelSet) -> Self {
        BuilderConfig {
            root: root.into(),
            labels,
            side: DEFAULT_SIDE,
            seed: None,
            min_per_label: None,
        }
    }

    pub fn with_side(mut self, side: usize) -> Self {
        self.side = side;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_min_per_label(mut self, min: usize) -> Self {
        self.min_per_label = Some(min);
        self
    }
}

/// Per-label decode statistics collected during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCount {
    pub name: String,
    /// Files decoded into samples.
    pub decoded: usize,
    /// Files that failed to decode and were dropped.
    pub skipped: usize,
}

/// Summary of a full directory scan.
///
/// Dropped files never abort a build, but they are counted here so the lenient
/// decode policy stays observable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanSummary {
    pub per_label: Vec<LabelCount>,
}

impl ScanSummary {
    /// Total number of successfully decoded samples.
    pub fn decoded(&self) -> usize {
        self.per_label.iter().map(|c| c.decoded).sum()
    }

    /// Total number of files dropped because they failed to decode.
    pub fn skipped(&self) -> usize {
        self.per_label.iter().map(|c| c.skipped).sum()
    }
}

/// A built dataset: shuffled, index-aligned feature and label arrays.
///
/// Features have shape `(N, side, side, 1)` with raw 8-bit intensities;
/// labels hold the class index of the sample at the same position.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Array4<u8>,
    pub labels: Array1<u8>,
    pub summary: ScanSummary,
}

impl Dataset {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Persists the feature and label arrays as two `.npy` files.
    ///
    /// The two physical files form one logical unit: both arrays are written
    /// to temporary siblings first and only renamed into place once both
    /// writes succeeded. When the destination already holds a pair from an
    /// earlier build, that pair is moved aside before the renames and put
    /// back if the commit fails. A failed persist never leaves a truncated or
    /// mismatched pair behind.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Write` or `BuildError::Io` if serialization or
    /// the final commit fails.
    pub fn persist(&self, paths: &OutputPaths) -> Result<(), BuildError> {
        let tmp_features = tmp_sibling(&paths.features);
        let tmp_labels = tmp_sibling(&paths.labels);

        let result = self.commit(&tmp_features, &tmp_labels, paths);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_features);
            let _ = fs::remove_file(&tmp_labels);
        }
        result
    }

    fn commit(
        &self,
        tmp_features: &Path,
        tmp_labels: &Path,
        paths: &OutputPaths,
    ) -> Result<(), BuildError> {
        write_npy(tmp_features, &self.features)?;
        write_npy(tmp_labels, &self.labels)?;

        // Displace any previous pair so a failed overwrite can restore it.
        let prior_features = displace(&paths.features)?;
        let prior_labels = match displace(&paths.labels) {
            Ok(prior) => prior,
            Err(e) => {
                restore(prior_features.as_deref(), &paths.features);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(tmp_features, &paths.features) {
            restore(prior_features.as_deref(), &paths.features);
            restore(prior_labels.as_deref(), &paths.labels);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(tmp_labels, &paths.labels) {
            let _ = fs::remove_file(&paths.features);
            restore(prior_features.as_deref(), &paths.features);
            restore(prior_labels.as_deref(), &paths.labels);
            return Err(e.into());
        }

        if let Some(bak) = prior_features {
            let _ = fs::remove_file(bak);
        }
        if let Some(bak) = prior_labels {
            let _ = fs::remove_file(bak);
        }
        Ok(())
    }
}

/// The pair of well-known output paths a dataset is persisted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub features: PathBuf,
    pub labels: PathBuf,
}

impl OutputPaths {
    /// Conventional `features.npy` / `labels.npy` pair inside a directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        OutputPaths {
            features: dir.join("features.npy"),
            labels: dir.join("labels.npy"),
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn bak_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Moves an existing file aside to its `.bak` sibling, returning the backup
/// path; a missing file needs no displacement.
fn displace(path: &Path) -> Result<Option<PathBuf>, BuildError> {
    if !path.exists() {
        return Ok(None);
    }
    let bak = bak_sibling(path);
    fs::rename(path, &bak)?;
    Ok(Some(bak))
}

fn restore(bak: Option<&Path>, path: &Path) {
    if let Some(bak) = bak {
        let _ = fs::rename(bak, path);
    }
}

/// Loads a persisted feature/label pair back into memory.
///
/// The `.npy` format is self-describing, so values, shape, and dtype all
/// round-trip without side metadata.
///
/// # Errors
///
/// Returns `BuildError::Read` if either file is missing or malformed, and
/// `BuildError::MismatchedPair` if the two arrays disagree on the sample
/// count.
pub fn load(paths: &OutputPaths) -> Result<(Array4<u8>, Array1<u8>), BuildError> {
    let features: Array4<u8> = read_npy(&paths.features)?;
    let labels: Array1<u8> = read_npy(&paths.labels)?;
    if features.shape()[0] != labels.len() {
        return Err(BuildError::MismatchedPair {
            features: features.shape()[0],
            labels: labels.len(),
        });
    }
    Ok((features, labels))
}

/// Builds a shuffled, resolution-normalized dataset from a labeled directory
/// tree.
///
/// Expects the layout `<root>/<label>/<image files>` with one subdirectory per
/// name in the configured [`LabelSet`]. Files that fail to decode are skipped
/// and counted; a missing label directory is fatal.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    config: BuilderConfig,
}

impl DatasetBuilder {
    /// Creates a builder for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::InvalidSide` if the target side length is zero.
    pub fn new(config: BuilderConfig) -> Result<Self, BuildError> {
        if config.side == 0 {
            return Err(BuildError::InvalidSide);
        }
        Ok(DatasetBuilder { config })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Scans, shuffles, and assembles the dataset.
    ///
    /// Uses the configured seed if one was set, fresh entropy otherwise.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::NotFound` if a label directory is missing,
    /// `BuildError::EmptyDataset` if no file decoded at all, and
    /// `BuildError::TooFewSamples` if a configured per-label minimum is not
    /// met.
    pub fn build(&self) -> Result<Dataset, BuildError> {
        let mut rng = match self.config.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_rng(&mut rand::rng()),
        };
        self.build_with_rng(&mut rng)
    }

    /// Builds with a caller-supplied RNG for reproducible runs.
    pub fn build_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Dataset, BuildError> {
        let (mut samples, summary) = self.scan()?;

        if samples.is_empty() {
            return Err(BuildError::EmptyDataset);
        }
        if let Some(required) = self.config.min_per_label {
            for count in &summary.per_label {
                if count.decoded < required {
                    return Err(BuildError::TooFewSamples {
                        label: count.name.clone(),
                        found: count.decoded,
                        required,
                    });
                }
            }
        }

        // Uniform permutation over the full sample list.
        samples.shuffle(rng);

        let side = self.config.side;
        let n = samples.len();
        let mut flat = Vec::with_capacity(n * side * side);
        let mut labels = Vec::with_capacity(n);
        for sample in &samples {
            flat.extend(sample.pixels.iter().copied());
            labels.push(sample.label as u8);
        }

        // Structural reshape only: (N, side, side, 1), channel-last.
        let features = Array4::from_shape_vec((n, side, side, 1), flat)
            .expect("every sample holds exactly side * side pixels");

        Ok(Dataset {
            features,
            labels: Array1::from_vec(labels),
            summary,
        })
    }

    /// Walks every label directory in enumeration order, decoding files into
    /// samples and counting the ones that fail.
    fn scan(&self) -> Result<(Vec<Sample>, ScanSummary), BuildError> {
        let mut samples = Vec::new();
        let mut summary = ScanSummary::default();

        for (label, name) in self.config.labels.names().iter().enumerate() {
            let dir = self.config.root.join(name);
            if !dir.is_dir() {
                return Err(BuildError::NotFound(dir));
            }

            let mut files = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_file() {
                    files.push(path);
                }
            }
            // read_dir order is OS-defined; sort so a fixed shuffle seed
            // yields byte-identical output files.
            files.sort();

            let mut count = LabelCount {
                name: name.clone(),
                decoded: 0,
                skipped: 0,
            };
            for path in &files {
                match decode_resized(path, self.config.side) {
                    Ok(pixels) => {
                        samples.push(Sample::new(pixels, label));
                        count.decoded += 1;
                    }
                    // Lenient policy: an unreadable file is dropped, not
                    // fatal. The drop is still counted.
                    Err(_) => count.skipped += 1,
                }
            }
            summary.per_label.push(count);
        }

        Ok((samples, summary))
    }
}

/// Decodes one file as grayscale and stretches it to `side x side`.
///
/// Triangle (bilinear) filtering keeps the resize deterministic; aspect ratio
/// is intentionally not preserved.
fn decode_resized(path: &Path, side: usize) -> Result<Array2<u8>, image::ImageError> {
    let gray = image::open(path)?.to_luma8();
    let resized = image::imageops::resize(&gray, side as u32, side as u32, FilterType::Triangle);
    Ok(Array2::from_shape_vec((side, side), resized.into_raw())
        .expect("resized buffer holds exactly side * side pixels"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_gray_image(path: &Path, width: u32, height: u32, intensity: u8) {
        let img = image::GrayImage::from_pixel(width, height, image::Luma([intensity]));
        img.save(path).unwrap();
    }

    /// Creates `<root>/<label>/img_*.png` with one constant-intensity image
    /// per requested intensity value.
    fn severity_tree(per_label: &[(&str, &[u8])]) -> TempDir {
        let root = TempDir::new().unwrap();
        for (name, intensities) in per_label {
            let dir = root.path().join(name);
            fs::create_dir(&dir).unwrap();
            for (i, &intensity) in intensities.iter().enumerate() {
                write_gray_image(&dir.join(format!("img_{}.png", i)), 20, 20, intensity);
            }
        }
        root
    }

    fn severity_config(root: &TempDir) -> BuilderConfig {
        BuilderConfig::new(root.path(), LabelSet::severity())
            .with_side(8)
            .with_seed(42)
    }

    #[test]
    fn test_sample_count_excludes_undecodable_files() {
        let root = severity_tree(&[
            ("None", &[10, 20][..]),
            ("Low", &[][..]),
            ("Medium", &[30][..]),
            ("High", &[40, 50][..]),
        ]);
        // A corrupt file under Medium must be skipped, not fatal.
        fs::write(root.path().join("Medium/broken.png"), b"not an image").unwrap();

        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let dataset = builder.build().unwrap();

        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.features.shape(), &[5, 8, 8, 1]);
        assert_eq!(dataset.summary.decoded(), 5);
        assert_eq!(dataset.summary.skipped(), 1);
        assert_eq!(dataset.summary.per_label[1].decoded, 0); // empty "Low"
        assert_eq!(dataset.summary.per_label[2].skipped, 1);
    }

    #[test]
    fn test_features_and_labels_stay_aligned_after_shuffle() {
        // Encode the label into the pixel intensity so alignment survives
        // the shuffle observably: label i has constant intensity i * 10.
        let root = severity_tree(&[
            ("None", &[0, 0][..]),
            ("Low", &[10, 10, 10][..]),
            ("Medium", &[20][..]),
            ("High", &[30, 30][..]),
        ]);
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let dataset = builder.build().unwrap();

        assert_eq!(dataset.features.shape()[0], dataset.labels.len());
        for i in 0..dataset.len() {
            let expected = dataset.labels[i] * 10;
            assert_eq!(dataset.features[[i, 0, 0, 0]], expected);
            assert_eq!(dataset.features[[i, 7, 7, 0]], expected);
        }
    }

    #[test]
    fn test_shuffle_actually_permutes() {
        let root = severity_tree(&[
            ("None", &[0; 8][..]),
            ("Low", &[10; 8][..]),
            ("Medium", &[20; 8][..]),
            ("High", &[30; 8][..]),
        ]);
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let dataset = builder.build().unwrap();

        // Scan order would be eight 0s, then eight 1s, and so on.
        let scan_order: Vec<u8> = (0u8..4).flat_map(|l| std::iter::repeat_n(l, 8)).collect();
        let shuffled: Vec<u8> = dataset.labels.iter().copied().collect();
        assert_ne!(shuffled, scan_order);

        let mut sorted = shuffled.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, scan_order);
    }

    #[test]
    fn test_every_matrix_resized_to_side() {
        let root = TempDir::new().unwrap();
        for name in LabelSet::severity().names() {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        // Wildly different input dimensions all stretch to 8x8.
        write_gray_image(&root.path().join("None/a.png"), 100, 3, 7);
        write_gray_image(&root.path().join("Low/b.png"), 5, 200, 9);
        write_gray_image(&root.path().join("Medium/c.png"), 8, 8, 11);
        write_gray_image(&root.path().join("High/d.png"), 33, 17, 13);

        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let dataset = builder.build().unwrap();
        assert_eq!(dataset.features.shape(), &[4, 8, 8, 1]);
    }

    #[test]
    fn test_constant_image_survives_resize_unchanged() {
        let root = severity_tree(&[
            ("None", &[123][..]),
            ("Low", &[123][..]),
            ("Medium", &[123][..]),
            ("High", &[123][..]),
        ]);
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let dataset = builder.build().unwrap();
        // Bilinear interpolation of a constant field is that constant.
        assert!(dataset.features.iter().all(|&p| p == 123));
    }

    #[test]
    fn test_missing_label_directory_is_fatal() {
        let root = TempDir::new().unwrap();
        for name in ["None", "Low", "Medium"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        // "High" is missing entirely.
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let result = builder.build();
        assert!(
            matches!(result, Err(BuildError::NotFound(ref p)) if p.ends_with("High")),
            "expected NotFound, got {:?}",
            result
        );
    }

    #[test]
    fn test_all_empty_directories_is_empty_dataset() {
        let root = TempDir::new().unwrap();
        for name in LabelSet::severity().names() {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        assert!(matches!(builder.build(), Err(BuildError::EmptyDataset)));

        // Nothing may have been written for a failed build.
        let leftovers = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_file())
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_min_per_label_enforced() {
        let root = severity_tree(&[
            ("None", &[1, 2][..]),
            ("Low", &[3][..]),
            ("Medium", &[4, 5][..]),
            ("High", &[6, 7][..]),
        ]);
        let config = severity_config(&root).with_min_per_label(2);
        let builder = DatasetBuilder::new(config).unwrap();
        let result = builder.build();
        assert!(matches!(
            result,
            Err(BuildError::TooFewSamples {
                ref label,
                found: 1,
                required: 2,
            }) if label.as_str() == "Low"
        ));
    }

    #[test]
    fn test_zero_side_rejected() {
        let root = TempDir::new().unwrap();
        let config = BuilderConfig::new(root.path(), LabelSet::severity()).with_side(0);
        assert!(matches!(
            DatasetBuilder::new(config),
            Err(BuildError::InvalidSide)
        ));
    }

    #[test]
    fn test_fixed_seed_gives_byte_identical_outputs() {
        let root = severity_tree(&[
            ("None", &[1, 2, 3][..]),
            ("Low", &[4][..]),
            ("Medium", &[5, 6][..]),
            ("High", &[7, 8, 9][..]),
        ]);
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();

        let out_a = TempDir::new().unwrap();
        let out_b = TempDir::new().unwrap();
        let paths_a = OutputPaths::in_dir(out_a.path());
        let paths_b = OutputPaths::in_dir(out_b.path());

        builder.build().unwrap().persist(&paths_a).unwrap();
        builder.build().unwrap().persist(&paths_b).unwrap();

        assert_eq!(
            fs::read(&paths_a.features).unwrap(),
            fs::read(&paths_b.features).unwrap()
        );
        assert_eq!(
            fs::read(&paths_a.labels).unwrap(),
            fs::read(&paths_b.labels).unwrap()
        );
    }

    #[test]
    fn test_persist_load_round_trip() {
        let root = severity_tree(&[
            ("None", &[15, 25][..]),
            ("Low", &[35][..]),
            ("Medium", &[45][..]),
            ("High", &[55][..]),
        ]);
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let dataset = builder.build().unwrap();

        let out = TempDir::new().unwrap();
        let paths = OutputPaths::in_dir(out.path());
        dataset.persist(&paths).unwrap();

        let (features, labels) = load(&paths).unwrap();
        assert_eq!(features, dataset.features);
        assert_eq!(labels, dataset.labels);

        // The commit must not leave temporaries behind.
        let tmp_count = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "tmp"))
            .count();
        assert_eq!(tmp_count, 0);
    }

    #[test]
    fn test_persist_overwrites_previous_pair_cleanly() {
        let first_root = severity_tree(&[
            ("None", &[1][..]),
            ("Low", &[2][..]),
            ("Medium", &[3][..]),
            ("High", &[4][..]),
        ]);
        let second_root = severity_tree(&[
            ("None", &[5, 6][..]),
            ("Low", &[7][..]),
            ("Medium", &[8][..]),
            ("High", &[9, 10][..]),
        ]);
        let out = TempDir::new().unwrap();
        let paths = OutputPaths::in_dir(out.path());

        DatasetBuilder::new(severity_config(&first_root))
            .unwrap()
            .build()
            .unwrap()
            .persist(&paths)
            .unwrap();
        let replacement = DatasetBuilder::new(severity_config(&second_root))
            .unwrap()
            .build()
            .unwrap();
        replacement.persist(&paths).unwrap();

        // The new pair fully replaces the old one.
        let (features, labels) = load(&paths).unwrap();
        assert_eq!(features, replacement.features);
        assert_eq!(labels, replacement.labels);

        // No temporaries or displaced backups may survive the overwrite.
        let leftovers: Vec<_> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "tmp" || ext == "bak")
            })
            .collect();
        assert_eq!(leftovers, Vec::<PathBuf>::new());
    }

    #[test]
    fn test_displace_and_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("labels.npy");

        // Nothing to displace when the file is absent.
        assert!(displace(&target).unwrap().is_none());

        fs::write(&target, b"previous build").unwrap();
        let bak = displace(&target).unwrap().unwrap();
        assert!(!target.exists());
        assert_eq!(fs::read(&bak).unwrap(), b"previous build");

        restore(Some(&bak), &target);
        assert!(!bak.exists());
        assert_eq!(fs::read(&target).unwrap(), b"previous build");
    }

    #[test]
    fn test_load_rejects_mismatched_pair() {
        let root = severity_tree(&[
            ("None", &[1][..]),
            ("Low", &[2][..]),
            ("Medium", &[3][..]),
            ("High", &[4][..]),
        ]);
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();
        let dataset = builder.build().unwrap();

        let out = TempDir::new().unwrap();
        let paths = OutputPaths::in_dir(out.path());
        dataset.persist(&paths).unwrap();

        // Overwrite the label file with a shorter array.
        write_npy(&paths.labels, &Array1::<u8>::zeros(2)).unwrap();
        assert!(matches!(
            load(&paths),
            Err(BuildError::MismatchedPair {
                features: 4,
                labels: 2,
            })
        ));
    }

    #[test]
    fn test_build_with_rng_matches_seeded_build() {
        let root = severity_tree(&[
            ("None", &[1, 2][..]),
            ("Low", &[3, 4][..]),
            ("Medium", &[5][..]),
            ("High", &[6][..]),
        ]);
        let builder = DatasetBuilder::new(severity_config(&root)).unwrap();

        let via_config = builder.build().unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let via_rng = builder.build_with_rng(&mut rng).unwrap();

        assert_eq!(via_config.features, via_rng.features);
        assert_eq!(via_config.labels, via_rng.labels);
    }
}
