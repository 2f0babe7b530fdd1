use ndarray::{Array, Array1, Array2, Array3, Array4, ArrayView1, Dimension, Ix1, Ix2, Ix4};
use num_traits::AsPrimitive;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use sevnet_helpers::Float;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors that can occur when constructing or training a [`ConvNet`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConvNetError {
    /// Cannot train on an empty dataset.
    EmptyDataset,
    /// The input and target collections disagree on the sample count.
    MismatchedLengths { inputs: usize, targets: usize },
    /// A label index is outside the class enumeration.
    LabelOutOfRange { label: usize, n_classes: usize },
    /// Invalid architecture or training configuration.
    InvalidConfig(String),
}

impl Display for ConvNetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvNetError::EmptyDataset => write!(f, "Cannot train on an empty dataset"),
            ConvNetError::MismatchedLengths { inputs, targets } => write!(
                f,
                "Inputs and targets are misaligned: {} inputs vs {} targets",
                inputs, targets
            ),
            ConvNetError::LabelOutOfRange { label, n_classes } => write!(
                f,
                "Label {} is out of range for {} classes",
                label, n_classes
            ),
            ConvNetError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for ConvNetError {}

/// Scales raw 8-bit intensities into [0, 1] floats.
pub fn normalize<F: Float>(features: &Array4<u8>) -> Array4<F> {
    let scale = F::cast(255.0).unwrap();
    features.mapv(|p| F::cast(p).unwrap() / scale)
}

/// Splits a channel-last `(N, side, side, 1)` batch into per-sample
/// channel-first `(1, side, side)` arrays, the layout the network consumes.
pub fn to_samples<F: Float>(features: &Array4<F>) -> Vec<Array3<F>> {
    let (n, h, w, c) = features.dim();
    (0..n)
        .map(|i| Array3::from_shape_fn((c, h, w), |(ch, y, x)| features[[i, y, x, ch]]))
        .collect()
}

/// One-hot encodes integer labels into an `(N, n_classes)` target matrix.
///
/// # Errors
///
/// Returns `ConvNetError::LabelOutOfRange` if any label index is not below
/// `n_classes`.
pub fn to_categorical<F: Float>(
    labels: &Array1<u8>,
    n_classes: usize,
) -> Result<Array2<F>, ConvNetError> {
    let mut out = Array2::zeros((labels.len(), n_classes));
    for (i, &label) in labels.iter().enumerate() {
        let label = label as usize;
        if label >= n_classes {
            return Err(ConvNetError::LabelOutOfRange { label, n_classes });
        }
        out[[i, label]] = F::one();
    }
    Ok(out)
}

/// Architecture knobs for the two conv blocks and the hidden dense layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Feature maps produced by each convolution.
    pub filters: usize,
    /// Square kernel side length.
    pub kernel: usize,
    /// Width of the hidden dense layer.
    pub hidden: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            filters: 64,
            kernel: 3,
            hidden: 64,
        }
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig<F: Float> {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: F,
    /// Fraction of the (already shuffled) dataset held out from the tail as a
    /// frozen validation set, in [0, 1).
    pub val_split: F,
    pub seed: u64,
}

impl<F: Float> Default for TrainConfig<F> {
    fn default() -> Self {
        TrainConfig {
            epochs: 100,
            batch_size: 32,
            learning_rate: F::cast(1e-3).unwrap(),
            val_split: F::cast(0.1).unwrap(),
            seed: 42,
        }
    }
}

/// Loss and accuracy observed after one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics<F: Float> {
    pub epoch: usize,
    pub train_loss: F,
    pub train_accuracy: F,
    /// `None` when the validation holdout rounds to zero samples.
    pub val_loss: Option<F>,
    pub val_accuracy: Option<F>,
}

/// Per-epoch metrics for a full training run.
#[derive(Debug, Clone, Default)]
pub struct TrainHistory<F: Float> {
    pub epochs: Vec<EpochMetrics<F>>,
}

impl<F: Float> TrainHistory<F> {
    pub fn final_train_accuracy(&self) -> Option<F> {
        self.epochs.last().map(|m| m.train_accuracy)
    }

    pub fn final_val_accuracy(&self) -> Option<F> {
        self.epochs.last().and_then(|m| m.val_accuracy)
    }
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// Valid (no padding), stride-1 convolution over channel-first feature maps.
#[derive(Debug, Clone)]
struct Conv2d<F: Float> {
    /// Shape `(out_channels, in_channels, kernel, kernel)`.
    weights: Array4<F>,
    bias: Array1<F>,
}

impl<F: Float> Conv2d<F> {
    fn new<R: Rng + ?Sized>(in_c: usize, out_c: usize, kernel: usize, rng: &mut R) -> Self {
        // He-uniform initialization over the fan-in.
        let fan_in = F::cast(in_c * kernel * kernel).unwrap();
        let bound = (F::cast(6.0).unwrap() / fan_in).sqrt();
        let weights = Array4::from_shape_fn((out_c, in_c, kernel, kernel), |_| {
            rng.random_range(-bound..bound)
        });
        Conv2d {
            weights,
            bias: Array1::zeros(out_c),
        }
    }

    fn forward(&self, input: &Array3<F>) -> Array3<F> {
        let (in_c, h, w) = input.dim();
        let (out_c, _, k, _) = self.weights.dim();
        let (oh, ow) = (h - k + 1, w - k + 1);
        let mut out = Array3::zeros((out_c, oh, ow));
        for o in 0..out_c {
            for y in 0..oh {
                for x in 0..ow {
                    let mut acc = self.bias[o];
                    for c in 0..in_c {
                        for i in 0..k {
                            for j in 0..k {
                                acc += self.weights[[o, c, i, j]] * input[[c, y + i, x + j]];
                            }
                        }
                    }
                    out[[o, y, x]] = acc;
                }
            }
        }
        out
    }

    /// Returns `(grad_input, grad_weights, grad_bias)` for one sample.
    fn backward(
        &self,
        input: &Array3<F>,
        grad_out: &Array3<F>,
    ) -> (Array3<F>, Array4<F>, Array1<F>) {
        let (in_c, _, _) = input.dim();
        let (out_c, _, k, _) = self.weights.dim();
        let (_, oh, ow) = grad_out.dim();
        let mut grad_input = Array3::zeros(input.dim());
        let mut grad_weights = Array4::zeros(self.weights.dim());
        let mut grad_bias = Array1::zeros(out_c);

        for o in 0..out_c {
            for y in 0..oh {
                for x in 0..ow {
                    let g = grad_out[[o, y, x]];
                    grad_bias[o] += g;
                    for c in 0..in_c {
                        for i in 0..k {
                            for j in 0..k {
                                grad_weights[[o, c, i, j]] += g * input[[c, y + i, x + j]];
                                grad_input[[c, y + i, x + j]] += g * self.weights[[o, c, i, j]];
                            }
                        }
                    }
                }
            }
        }
        (grad_input, grad_weights, grad_bias)
    }
}

/// 2x2 max pooling with stride 2. Odd trailing rows/columns are dropped, as
/// in the usual floor-division pooling.
fn max_pool_forward<F: Float>(input: &Array3<F>) -> (Array3<F>, Array3<usize>) {
    let (c, h, w) = input.dim();
    let (oh, ow) = (h / 2, w / 2);
    let mut out = Array3::zeros((c, oh, ow));
    // Flat `y * w + x` index of each block's winner, for the backward pass.
    let mut argmax = Array3::zeros((c, oh, ow));
    for ch in 0..c {
        for y in 0..oh {
            for x in 0..ow {
                let mut best = input[[ch, 2 * y, 2 * x]];
                let mut best_at = 2 * y * w + 2 * x;
                for i in 0..2 {
                    for j in 0..2 {
                        let v = input[[ch, 2 * y + i, 2 * x + j]];
                        if v > best {
                            best = v;
                            best_at = (2 * y + i) * w + (2 * x + j);
                        }
                    }
                }
                out[[ch, y, x]] = best;
                argmax[[ch, y, x]] = best_at;
            }
        }
    }
    (out, argmax)
}

fn max_pool_backward<F: Float>(
    grad_out: &Array3<F>,
    argmax: &Array3<usize>,
    input_dim: (usize, usize, usize),
) -> Array3<F> {
    let (_, _, w) = input_dim;
    let mut grad_input = Array3::zeros(input_dim);
    for ((ch, y, x), &flat) in argmax.indexed_iter() {
        grad_input[[ch, flat / w, flat % w]] += grad_out[[ch, y, x]];
    }
    grad_input
}

/// Fully connected layer.
#[derive(Debug, Clone)]
struct Dense<F: Float> {
    /// Shape `(out, in)`.
    weights: Array2<F>,
    bias: Array1<F>,
}

impl<F: Float> Dense<F> {
    fn new<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        // Glorot-uniform initialization.
        let bound = (F::cast(6.0).unwrap() / F::cast(in_dim + out_dim).unwrap()).sqrt();
        let weights =
            Array2::from_shape_fn((out_dim, in_dim), |_| rng.random_range(-bound..bound));
        Dense {
            weights,
            bias: Array1::zeros(out_dim),
        }
    }

    fn forward(&self, input: &Array1<F>) -> Array1<F> {
        self.weights.dot(input) + &self.bias
    }

    /// Returns `(grad_input, grad_weights, grad_bias)` for one sample.
    fn backward(
        &self,
        input: &Array1<F>,
        grad_out: &Array1<F>,
    ) -> (Array1<F>, Array2<F>, Array1<F>) {
        let grad_input = self.weights.t().dot(grad_out);
        let grad_weights = outer(grad_out, input);
        (grad_input, grad_weights, grad_out.clone())
    }
}

fn outer<F: Float>(col: &Array1<F>, row: &Array1<F>) -> Array2<F> {
    Array2::from_shape_fn((col.len(), row.len()), |(i, j)| col[i] * row[j])
}

fn relu<F: Float, D: Dimension>(z: &Array<F, D>) -> Array<F, D> {
    z.mapv(|v| if v > F::zero() { v } else { F::zero() })
}

fn relu_mask<F: Float, D: Dimension>(z: &Array<F, D>) -> Array<F, D> {
    z.mapv(|v| if v > F::zero() { F::one() } else { F::zero() })
}

/// Numerically stable softmax.
fn softmax<F: Float>(logits: &Array1<F>) -> Array1<F> {
    let max = logits
        .iter()
        .copied()
        .fold(F::neg_infinity(), |a, b| if b > a { b } else { a });
    let exp = logits.mapv(|z| (z - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn cross_entropy<F: Float>(probs: &Array1<F>, target: ArrayView1<F>) -> F {
    let eps = F::cast(1e-12).unwrap();
    -target
        .iter()
        .zip(probs.iter())
        .map(|(&t, &p)| t * (p + eps).ln())
        .sum::<F>()
}

fn argmax<F: Float>(values: ArrayView1<F>) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Everything the backward pass needs from one forward pass.
struct ForwardCache<F: Float> {
    z1: Array3<F>,
    a1: Array3<F>,
    mask1: Array3<usize>,
    p1: Array3<F>,
    z2: Array3<F>,
    a2: Array3<F>,
    mask2: Array3<usize>,
    flat: Array1<F>,
    z3: Array1<F>,
    a3: Array1<F>,
    probs: Array1<F>,
}

/// Accumulated parameter gradients for one mini-batch.
struct Gradients<F: Float> {
    conv1_w: Array4<F>,
    conv1_b: Array1<F>,
    conv2_w: Array4<F>,
    conv2_b: Array1<F>,
    dense1_w: Array2<F>,
    dense1_b: Array1<F>,
    dense2_w: Array2<F>,
    dense2_b: Array1<F>,
}

impl<F: Float> Gradients<F> {
    fn zeros_like(net: &ConvNet<F>) -> Self {
        Gradients {
            conv1_w: Array4::zeros(net.conv1.weights.dim()),
            conv1_b: Array1::zeros(net.conv1.bias.len()),
            conv2_w: Array4::zeros(net.conv2.weights.dim()),
            conv2_b: Array1::zeros(net.conv2.bias.len()),
            dense1_w: Array2::zeros(net.dense1.weights.dim()),
            dense1_b: Array1::zeros(net.dense1.bias.len()),
            dense2_w: Array2::zeros(net.dense2.weights.dim()),
            dense2_b: Array1::zeros(net.dense2.bias.len()),
        }
    }

    fn scale(&mut self, factor: F) {
        self.conv1_w *= factor;
        self.conv1_b *= factor;
        self.conv2_w *= factor;
        self.conv2_b *= factor;
        self.dense1_w *= factor;
        self.dense1_b *= factor;
        self.dense2_w *= factor;
        self.dense2_b *= factor;
    }
}

/// The small convolutional classifier:
/// conv + ReLU -> pool -> conv + ReLU -> pool -> dense + ReLU -> dense ->
/// softmax, trained with categorical cross-entropy and Adam.
#[derive(Debug, Clone)]
pub struct ConvNet<F: Float> {
    conv1: Conv2d<F>,
    conv2: Conv2d<F>,
    dense1: Dense<F>,
    dense2: Dense<F>,
    side: usize,
    n_classes: usize,
    /// Spatial side length after the second pooling stage.
    pooled_side: usize,
}

impl<F: Float> ConvNet<F> {
    /// Creates a network for `side x side` single-channel inputs, initialized
    /// from fresh entropy.
    ///
    /// # Errors
    ///
    /// Returns `ConvNetError::InvalidConfig` if any knob is zero, fewer than
    /// two classes are requested, or `side` leaves no spatial cells after the
    /// two conv/pool stages.
    pub fn new(side: usize, n_classes: usize, config: &NetworkConfig) -> Result<Self, ConvNetError> {
        let mut rng = Xoshiro256PlusPlus::from_rng(&mut rand::rng());
        Self::new_with_rng(side, n_classes, config, &mut rng)
    }

    /// Creates a network with reproducible weight initialization.
    pub fn new_with_rng<R: Rng + ?Sized>(
        side: usize,
        n_classes: usize,
        config: &NetworkConfig,
        rng: &mut R,
    ) -> Result<Self, ConvNetError> {
        if config.filters == 0 || config.kernel == 0 || config.hidden == 0 {
            return Err(ConvNetError::InvalidConfig(
                "filters, kernel, and hidden width must all be non-zero".to_string(),
            ));
        }
        if n_classes < 2 {
            return Err(ConvNetError::InvalidConfig(
                "a classifier needs at least two classes".to_string(),
            ));
        }

        let c1 = side.saturating_sub(config.kernel - 1);
        let p1 = c1 / 2;
        let c2 = p1.saturating_sub(config.kernel - 1);
        let p2 = c2 / 2;
        if p2 == 0 {
            return Err(ConvNetError::InvalidConfig(format!(
                "input side {} leaves no spatial cells after two {}x{} conv + 2x2 pool stages",
                side, config.kernel, config.kernel
            )));
        }

        let flat_dim = config.filters * p2 * p2;
        Ok(ConvNet {
            conv1: Conv2d::new(1, config.filters, config.kernel, rng),
            conv2: Conv2d::new(config.filters, config.filters, config.kernel, rng),
            dense1: Dense::new(flat_dim, config.hidden, rng),
            dense2: Dense::new(config.hidden, n_classes, rng),
            side,
            n_classes,
            pooled_side: p2,
        })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn forward(&self, input: &Array3<F>) -> ForwardCache<F> {
        let z1 = self.conv1.forward(input);
        let a1 = relu(&z1);
        let (p1, mask1) = max_pool_forward(&a1);

        let z2 = self.conv2.forward(&p1);
        let a2 = relu(&z2);
        let (p2, mask2) = max_pool_forward(&a2);

        let flat = Array1::from_iter(p2.iter().copied());
        let z3 = self.dense1.forward(&flat);
        let a3 = relu(&z3);
        let logits = self.dense2.forward(&a3);
        let probs = softmax(&logits);

        ForwardCache {
            z1,
            a1,
            mask1,
            p1,
            z2,
            a2,
            mask2,
            flat,
            z3,
            a3,
            probs,
        }
    }

    /// Accumulates this sample's parameter gradients into `grads`.
    fn backward(
        &self,
        input: &Array3<F>,
        cache: &ForwardCache<F>,
        target: ArrayView1<F>,
        grads: &mut Gradients<F>,
    ) {
        // Softmax + cross-entropy collapse to probs - target at the logits.
        let delta = &cache.probs - &target;

        let (grad_a3, gw2, gb2) = self.dense2.backward(&cache.a3, &delta);
        grads.dense2_w += &gw2;
        grads.dense2_b += &gb2;

        let grad_z3 = &grad_a3 * &relu_mask(&cache.z3);
        let (grad_flat, gw1, gb1) = self.dense1.backward(&cache.flat, &grad_z3);
        grads.dense1_w += &gw1;
        grads.dense1_b += &gb1;

        let filters = self.conv2.bias.len();
        let grad_p2 = Array3::from_shape_vec(
            (filters, self.pooled_side, self.pooled_side),
            grad_flat.to_vec(),
        )
        .expect("flattened gradient matches pooled feature map shape");

        let grad_a2 = max_pool_backward(&grad_p2, &cache.mask2, cache.a2.dim());
        let grad_z2 = &grad_a2 * &relu_mask(&cache.z2);
        let (grad_p1, cw2, cb2) = self.conv2.backward(&cache.p1, &grad_z2);
        grads.conv2_w += &cw2;
        grads.conv2_b += &cb2;

        let grad_a1 = max_pool_backward(&grad_p1, &cache.mask1, cache.a1.dim());
        let grad_z1 = &grad_a1 * &relu_mask(&cache.z1);
        let (_, cw1, cb1) = self.conv1.backward(input, &grad_z1);
        grads.conv1_w += &cw1;
        grads.conv1_b += &cb1;
    }

    /// Class probabilities for one `(1, side, side)` input.
    pub fn predict_probs(&self, input: &Array3<F>) -> Array1<F> {
        self.forward(input).probs
    }

    /// Most likely class index for one input.
    pub fn predict(&self, input: &Array3<F>) -> usize {
        argmax(self.predict_probs(input).view())
    }

    /// Average cross-entropy loss and accuracy over a sample set.
    ///
    /// # Errors
    ///
    /// Returns `ConvNetError::EmptyDataset` or
    /// `ConvNetError::MismatchedLengths` for degenerate inputs.
    pub fn evaluate(
        &self,
        inputs: &[Array3<F>],
        targets: &Array2<F>,
    ) -> Result<(F, F), ConvNetError> {
        if inputs.is_empty() {
            return Err(ConvNetError::EmptyDataset);
        }
        if inputs.len() != targets.nrows() {
            return Err(ConvNetError::MismatchedLengths {
                inputs: inputs.len(),
                targets: targets.nrows(),
            });
        }
        Ok(self.evaluate_range(inputs, targets, 0, inputs.len()))
    }

    fn evaluate_range(
        &self,
        inputs: &[Array3<F>],
        targets: &Array2<F>,
        start: usize,
        end: usize,
    ) -> (F, F) {
        let mut loss_sum = F::zero();
        let mut correct = 0usize;
        for i in start..end {
            let probs = self.predict_probs(&inputs[i]);
            let target = targets.row(i);
            loss_sum += cross_entropy(&probs, target);
            if argmax(probs.view()) == argmax(target) {
                correct += 1;
            }
        }
        let count = F::cast(end - start).unwrap();
        (loss_sum / count, F::cast(correct).unwrap() / count)
    }

    /// Trains with the seed from `config`; see [`ConvNet::fit_with_rng`] to
    /// supply an RNG directly.
    ///
    /// # Errors
    ///
    /// Returns `ConvNetError::EmptyDataset`, `ConvNetError::MismatchedLengths`,
    /// or `ConvNetError::InvalidConfig` for degenerate inputs or settings.
    pub fn fit(
        &mut self,
        inputs: &[Array3<F>],
        targets: &Array2<F>,
        config: &TrainConfig<F>,
    ) -> Result<TrainHistory<F>, ConvNetError> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        self.fit_with_rng(inputs, targets, config, &mut rng)
    }

    /// Trains with a caller-supplied RNG.
    ///
    /// The validation holdout is taken from the tail once, before the first
    /// epoch, and never reshuffled; the training partition is reshuffled
    /// every epoch.
    pub fn fit_with_rng<R: Rng + ?Sized>(
        &mut self,
        inputs: &[Array3<F>],
        targets: &Array2<F>,
        config: &TrainConfig<F>,
        rng: &mut R,
    ) -> Result<TrainHistory<F>, ConvNetError> {
        if inputs.is_empty() {
            return Err(ConvNetError::EmptyDataset);
        }
        if inputs.len() != targets.nrows() {
            return Err(ConvNetError::MismatchedLengths {
                inputs: inputs.len(),
                targets: targets.nrows(),
            });
        }
        if targets.ncols() != self.n_classes {
            return Err(ConvNetError::InvalidConfig(format!(
                "targets have {} columns but the network has {} classes",
                targets.ncols(),
                self.n_classes
            )));
        }
        if config.batch_size == 0 {
            return Err(ConvNetError::InvalidConfig(
                "batch size must be non-zero".to_string(),
            ));
        }
        if config.val_split < F::zero() || config.val_split >= F::one() {
            return Err(ConvNetError::InvalidConfig(
                "validation split must lie in [0, 1)".to_string(),
            ));
        }

        let n = inputs.len();
        let n_val: usize = (F::cast(n).unwrap() * config.val_split).round().as_();
        // At least one sample must remain on the training side.
        let n_val = n_val.min(n - 1);
        let n_train = n - n_val;

        let mut optimizer = Adam::new(self, config.learning_rate);
        let mut order: Vec<usize> = (0..n_train).collect();
        let mut history = TrainHistory::default();

        for epoch in 0..config.epochs {
            order.shuffle(rng);

            for batch in order.chunks(config.batch_size) {
                let mut grads = Gradients::zeros_like(self);
                for &i in batch {
                    let cache = self.forward(&inputs[i]);
                    self.backward(&inputs[i], &cache, targets.row(i), &mut grads);
                }
                grads.scale(F::one() / F::cast(batch.len()).unwrap());
                optimizer.step(self, &grads);
            }

            let (train_loss, train_accuracy) = self.evaluate_range(inputs, targets, 0, n_train);
            let (val_loss, val_accuracy) = if n_val > 0 {
                let (l, a) = self.evaluate_range(inputs, targets, n_train, n);
                (Some(l), Some(a))
            } else {
                (None, None)
            };
            history.epochs.push(EpochMetrics {
                epoch,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
            });
        }

        Ok(history)
    }
}

// ---------------------------------------------------------------------------
// Adam optimizer
// ---------------------------------------------------------------------------

struct AdamState<F: Float, D: Dimension> {
    m: Array<F, D>,
    v: Array<F, D>,
}

impl<F: Float, D: Dimension> AdamState<F, D> {
    fn zeros_like(param: &Array<F, D>) -> Self {
        AdamState {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    fn update(&mut self, param: &mut Array<F, D>, grad: &Array<F, D>, lr: F, t: i32) {
        let b1 = F::cast(0.9).unwrap();
        let b2 = F::cast(0.999).unwrap();
        let eps = F::cast(1e-8).unwrap();

        self.m = &self.m * b1 + grad * (F::one() - b1);
        self.v = &self.v * b2 + &grad.mapv(|g| g * g) * (F::one() - b2);

        let m_hat = &self.m / (F::one() - b1.powi(t));
        let v_hat = &self.v / (F::one() - b2.powi(t));
        *param -= &(m_hat / (v_hat.mapv(F::sqrt) + eps) * lr);
    }
}

struct Adam<F: Float> {
    learning_rate: F,
    t: i32,
    conv1_w: AdamState<F, Ix4>,
    conv1_b: AdamState<F, Ix1>,
    conv2_w: AdamState<F, Ix4>,
    conv2_b: AdamState<F, Ix1>,
    dense1_w: AdamState<F, Ix2>,
    dense1_b: AdamState<F, Ix1>,
    dense2_w: AdamState<F, Ix2>,
    dense2_b: AdamState<F, Ix1>,
}

impl<F: Float> Adam<F> {
    fn new(net: &ConvNet<F>, learning_rate: F) -> Self {
        Adam {
            learning_rate,
            t: 0,
            conv1_w: AdamState::zeros_like(&net.conv1.weights),
            conv1_b: AdamState::zeros_like(&net.conv1.bias),
            conv2_w: AdamState::zeros_like(&net.conv2.weights),
            conv2_b: AdamState::zeros_like(&net.conv2.bias),
            dense1_w: AdamState::zeros_like(&net.dense1.weights),
            dense1_b: AdamState::zeros_like(&net.dense1.bias),
            dense2_w: AdamState::zeros_like(&net.dense2.weights),
            dense2_b: AdamState::zeros_like(&net.dense2.bias),
        }
    }

    fn step(&mut self, net: &mut ConvNet<F>, grads: &Gradients<F>) {
        self.t += 1;
        let lr = self.learning_rate;
        self.conv1_w
            .update(&mut net.conv1.weights, &grads.conv1_w, lr, self.t);
        self.conv1_b
            .update(&mut net.conv1.bias, &grads.conv1_b, lr, self.t);
        self.conv2_w
            .update(&mut net.conv2.weights, &grads.conv2_w, lr, self.t);
        self.conv2_b
            .update(&mut net.conv2.bias, &grads.conv2_b, lr, self.t);
        self.dense1_w
            .update(&mut net.dense1.weights, &grads.dense1_w, lr, self.t);
        self.dense1_b
            .update(&mut net.dense1.bias, &grads.dense1_b, lr, self.t);
        self.dense2_w
            .update(&mut net.dense2.weights, &grads.dense2_w, lr, self.t);
        self.dense2_b
            .update(&mut net.dense2.bias, &grads.dense2_b, lr, self.t);
    }
}
