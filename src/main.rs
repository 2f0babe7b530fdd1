// This is a simple example showing how to configure the sevnet pipeline
use sevnet::{BuilderConfig, LabelSet, NetworkConfig};

fn main() {
    println!("sevnet pipeline example");

    // The ordered label enumeration defines the integer class indices
    let labels = LabelSet::severity();
    println!("Label enumeration: {:?}", labels.names());
    println!("Index of \"Medium\": {:?}", labels.index_of("Medium"));

    // Dataset builder configuration with an explicit seed and resolution
    let config = BuilderConfig::new("training_set", labels)
        .with_side(50)
        .with_seed(42);
    println!("Builder configuration: {:?}", config);

    // Default network: two 64-filter conv blocks and a 64-wide dense layer
    let network = NetworkConfig::default();
    println!("Network configuration: {:?}", network);
}
