mod render;

use bitmap_generator::{BitmapGenerator, GeneratorConfig};
use clap::{Parser, Subcommand};
use convnet::{normalize, to_categorical, to_samples, ConvNet, NetworkConfig, TrainConfig};
use dataset_builder::{load, BuilderConfig, DatasetBuilder, OutputPaths};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use sevnet::LabelSet;
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sevnet", version, about = "Grayscale severity classification pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a synthetic deformity training set, one subdirectory per label
    Generate {
        /// Output directory for the labeled image tree
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 100)]
        height: u32,
        #[arg(long, default_value_t = 100)]
        width: u32,
        /// Number of images to generate
        #[arg(long, default_value_t = 200)]
        count: usize,
        /// Largest deformity radius; must keep the circle inside the frame
        #[arg(long, default_value_t = 45)]
        max_radius: u32,
        /// Generation seed; omitted means fresh entropy
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Build a shuffled feature/label dataset from a labeled directory tree
    Build {
        /// Root directory with one subdirectory per label
        #[arg(long)]
        root: PathBuf,
        /// Output directory for features.npy / labels.npy
        #[arg(long)]
        out: PathBuf,
        /// Target side length every image is stretched to
        #[arg(long, default_value_t = 50)]
        side: usize,
        /// Shuffle seed; omitted means fresh entropy
        #[arg(long)]
        seed: Option<u64>,
        /// Minimum decoded samples required per label
        #[arg(long)]
        min_per_label: Option<usize>,
        /// Comma-separated ordered label names (default: None,Low,Medium,High)
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,
    },
    /// Train the convolutional classifier on a built dataset
    Train {
        /// Directory containing features.npy / labels.npy
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value_t = 100)]
        epochs: usize,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long, default_value_t = 1e-3)]
        learning_rate: f32,
        #[arg(long, default_value_t = 0.1)]
        val_split: f32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Feature maps per convolution
        #[arg(long, default_value_t = 64)]
        filters: usize,
        /// Hidden dense layer width
        #[arg(long, default_value_t = 64)]
        hidden: usize,
        /// Number of sample predictions to render after training
        #[arg(long, default_value_t = 15)]
        preview: usize,
        /// Comma-separated ordered label names (default: None,Low,Medium,High)
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    match Cli::parse().command {
        Command::Generate {
            out,
            height,
            width,
            count,
            max_radius,
            seed,
        } => run_generate(out, height, width, count, max_radius, seed),
        Command::Build {
            root,
            out,
            side,
            seed,
            min_per_label,
            labels,
        } => run_build(root, out, side, seed, min_per_label, labels),
        Command::Train {
            data,
            epochs,
            batch_size,
            learning_rate,
            val_split,
            seed,
            filters,
            hidden,
            preview,
            labels,
        } => run_train(
            data,
            TrainConfig {
                epochs,
                batch_size,
                learning_rate,
                val_split,
                seed,
            },
            filters,
            hidden,
            preview,
            labels,
        ),
    }
}

fn label_set(names: Option<Vec<String>>) -> Result<LabelSet, Box<dyn Error>> {
    match names {
        Some(names) => Ok(LabelSet::new(names)?),
        None => Ok(LabelSet::severity()),
    }
}

fn run_generate(
    out: PathBuf,
    height: u32,
    width: u32,
    count: usize,
    max_radius: u32,
    seed: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let mut config = GeneratorConfig::new(height, width, count, max_radius);
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    let summary = BitmapGenerator::new(config)?.generate(&out)?;

    println!("Generated {} images ({}x{})", summary.total(), width, height);
    for count in &summary.per_label {
        println!("  {:<12} {:>5} images", count.name, count.images);
    }
    println!("Training set: {}", out.display());
    Ok(())
}

fn run_build(
    root: PathBuf,
    out: PathBuf,
    side: usize,
    seed: Option<u64>,
    min_per_label: Option<usize>,
    labels: Option<Vec<String>>,
) -> Result<(), Box<dyn Error>> {
    let mut config = BuilderConfig::new(root, label_set(labels)?).with_side(side);
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(min) = min_per_label {
        config = config.with_min_per_label(min);
    }

    let builder = DatasetBuilder::new(config)?;
    let dataset = builder.build()?;

    std::fs::create_dir_all(&out)?;
    let paths = OutputPaths::in_dir(&out);
    dataset.persist(&paths)?;

    println!(
        "Built {} samples ({} unreadable files skipped)",
        dataset.len(),
        dataset.summary.skipped()
    );
    for count in &dataset.summary.per_label {
        println!(
            "  {:<12} {:>5} decoded  {:>3} skipped",
            count.name, count.decoded, count.skipped
        );
    }
    println!("Features: {}", paths.features.display());
    println!("Labels:   {}", paths.labels.display());
    Ok(())
}

fn run_train(
    data: PathBuf,
    train: TrainConfig<f32>,
    filters: usize,
    hidden: usize,
    preview: usize,
    labels: Option<Vec<String>>,
) -> Result<(), Box<dyn Error>> {
    let labels = label_set(labels)?;
    let paths = OutputPaths::in_dir(&data);
    let (raw_features, raw_labels) = load(&paths)?;
    let side = raw_features.shape()[1];

    let features = normalize::<f32>(&raw_features);
    let inputs = to_samples(&features);
    let targets = to_categorical::<f32>(&raw_labels, labels.len())?;

    let network = NetworkConfig {
        filters,
        hidden,
        ..NetworkConfig::default()
    };
    let mut weight_rng = Xoshiro256PlusPlus::seed_from_u64(train.seed);
    let mut net = ConvNet::new_with_rng(side, labels.len(), &network, &mut weight_rng)?;

    println!(
        "Training on {} samples ({} classes, {}x{} inputs)",
        inputs.len(),
        labels.len(),
        side,
        side
    );
    let history = net.fit(&inputs, &targets, &train)?;

    for metrics in &history.epochs {
        println!(
            "epoch {:>3}  loss {:.4}  acc {:.4}  val_loss {}  val_acc {}",
            metrics.epoch + 1,
            metrics.train_loss,
            metrics.train_accuracy,
            render::optional(metrics.val_loss),
            render::optional(metrics.val_accuracy),
        );
    }
    render::curves(&history);

    let (loss, accuracy) = net.evaluate(&inputs, &targets)?;
    println!("\nFull dataset: loss {:.4}, accuracy {:.4}", loss, accuracy);

    for i in 0..preview.min(inputs.len()) {
        println!();
        render::ascii_image(&raw_features, i);
        let actual = labels.name_of(raw_labels[i] as usize).unwrap_or("?");
        let predicted = net.predict(&inputs[i]);
        println!(
            "Actual: {}   Predicted: {}",
            actual,
            labels.name_of(predicted).unwrap_or("?")
        );
        println!("{}", impact_phrase(labels.name_of(predicted)));
    }
    Ok(())
}

/// Human-readable severity interpretation of a predicted class.
fn impact_phrase(label: Option<&str>) -> String {
    match label {
        Some("None") => "This deformity will have no impact on fuel economy".to_string(),
        Some(name) => format!(
            "This deformity will have a {} impact on fuel economy",
            name.to_lowercase()
        ),
        None => "Predicted class is outside the label enumeration".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_phrase() {
        assert_eq!(
            impact_phrase(Some("None")),
            "This deformity will have no impact on fuel economy"
        );
        assert_eq!(
            impact_phrase(Some("High")),
            "This deformity will have a high impact on fuel economy"
        );
    }
}
