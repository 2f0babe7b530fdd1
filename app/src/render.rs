//! Terminal rendering for training curves and sample images.

use convnet::TrainHistory;
use ndarray::Array4;

const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SHADES: &[u8] = b" .:-=+*#%@";

pub fn optional(value: Option<f32>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "   -  ".to_string(),
    }
}

/// Renders accuracy and loss curves as one-line sparklines, the terminal
/// stand-in for the accuracy/loss plots.
pub fn curves(history: &TrainHistory<f32>) {
    let train_acc: Vec<f32> = history.epochs.iter().map(|m| m.train_accuracy).collect();
    let train_loss: Vec<f32> = history.epochs.iter().map(|m| m.train_loss).collect();

    println!("\nModel Accuracy");
    println!("  train {}", sparkline(&train_acc));
    let val_acc: Vec<f32> = history
        .epochs
        .iter()
        .filter_map(|m| m.val_accuracy)
        .collect();
    if !val_acc.is_empty() {
        println!("  val   {}", sparkline(&val_acc));
    }

    println!("Model Loss");
    println!("  train {}", sparkline(&train_loss));
    let val_loss: Vec<f32> = history.epochs.iter().filter_map(|m| m.val_loss).collect();
    if !val_loss.is_empty() {
        println!("  val   {}", sparkline(&val_loss));
    }
}

fn sparkline(values: &[f32]) -> String {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    values
        .iter()
        .map(|&v| {
            if max > min {
                let t = (v - min) / (max - min);
                SPARK[((t * 7.0).round() as usize).min(7)]
            } else {
                SPARK[3]
            }
        })
        .collect()
}

/// Prints one sample from a `(N, side, side, 1)` feature array as ASCII art.
pub fn ascii_image(features: &Array4<u8>, index: usize) {
    let (_, h, w, _) = features.dim();
    for y in 0..h {
        let row: String = (0..w)
            .map(|x| {
                let intensity = features[[index, y, x, 0]] as usize;
                SHADES[intensity * (SHADES.len() - 1) / 255] as char
            })
            .collect();
        println!("{}", row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_spans_range() {
        let line = sparkline(&[0.0, 0.5, 1.0]);
        let chars: Vec<char> = line.chars().collect();
        assert_eq!(chars.len(), 3);
        assert_eq!(chars[0], SPARK[0]);
        assert_eq!(chars[2], SPARK[7]);
    }

    #[test]
    fn test_sparkline_flat_series() {
        let line = sparkline(&[0.7, 0.7, 0.7]);
        assert!(line.chars().all(|c| c == SPARK[3]));
    }

    #[test]
    fn test_optional_formatting() {
        assert_eq!(optional(Some(0.125)), "0.1250");
        assert_eq!(optional(None), "   -  ");
    }
}
