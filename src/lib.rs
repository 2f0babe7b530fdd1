//! sevnet: a grayscale severity classification pipeline.
//!
//! [`BitmapGenerator`] emits a synthetic labeled training set,
//! [`DatasetBuilder`] turns a labeled directory tree into a pair of aligned
//! `.npy` arrays, and [`ConvNet`] trains a small convolutional classifier on
//! them. The stages share nothing at runtime except the files on disk.

pub use bitmap_generator::{
    classify_radius, BitmapGenerator, GenerateError, GenerateSummary, GeneratedCount,
    GeneratorConfig, MIN_DEFORMITY_RADIUS,
};
pub use convnet::{
    normalize, to_categorical, to_samples, ConvNet, ConvNetError, EpochMetrics, NetworkConfig,
    TrainConfig, TrainHistory,
};
pub use dataset_builder::{
    load, BuildError, BuilderConfig, Dataset, DatasetBuilder, LabelCount, OutputPaths,
    ScanSummary, DEFAULT_SIDE,
};
pub use sevnet_helpers::{Float, LabelSet, LabelSetError, Sample};
