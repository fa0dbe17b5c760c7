//! CNN Model Architecture for Chest X-ray Classification
//!
//! A compact convolutional backbone built with Burn. The network is split
//! into a feature extractor (a stack of conv blocks) and a head, so that any
//! block's output can serve as the Grad-CAM feature layer.
//!
//! The model is only ever run frozen: there is no dropout, and batch
//! normalization always applies the stored running statistics. Burn's own
//! `BatchNorm::forward` switches to batch statistics on autodiff backends,
//! which would make the gradient pass disagree with plain inference.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the ChestXrayClassifier CNN
#[derive(Config, Debug)]
pub struct ChestXrayClassifierConfig {
    /// Number of output classes
    #[config(default = "2")]
    pub num_classes: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters in the first block, doubled by every following block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Number of conv blocks; each halves the spatial size
    #[config(default = "4")]
    pub num_blocks: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "256")]
    pub hidden_units: usize,
}

impl ChestXrayClassifierConfig {
    /// Check a saved record against this architecture before loading it
    ///
    /// Burn panics when a record's block count differs from the module and
    /// silently accepts different layer widths, so both are checked here.
    pub fn check_record<B: Backend>(
        &self,
        record: &ChestXrayClassifierRecord<B>,
    ) -> Result<(), String> {
        if record.blocks.len() != self.num_blocks {
            return Err(format!(
                "record has {} conv blocks, architecture declares {}",
                record.blocks.len(),
                self.num_blocks
            ));
        }

        let mut in_channels = self.in_channels;
        for (i, block) in record.blocks.iter().enumerate() {
            let out_channels = self.base_filters << i;
            expect_dims(
                &block_name(i),
                block.conv.weight.val().dims(),
                [out_channels, in_channels, 3, 3],
            )?;
            expect_dims(
                &format!("{} batch norm", block_name(i)),
                block.bn.gamma.val().dims(),
                [out_channels],
            )?;
            in_channels = out_channels;
        }

        expect_dims(
            "fc1",
            record.fc1.weight.val().dims(),
            [in_channels, self.hidden_units],
        )?;
        expect_dims(
            "fc2",
            record.fc2.weight.val().dims(),
            [self.hidden_units, self.num_classes],
        )
    }
}

fn expect_dims<const D: usize>(
    layer: &str,
    actual: [usize; D],
    expected: [usize; D],
) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!(
            "{} weight has shape {:?}, architecture expects {:?}",
            layer, actual, expected
        ))
    }
}

/// Name of the conv block at `index` ("conv1", "conv2", ...)
pub fn block_name(index: usize) -> String {
    format!("conv{}", index + 1)
}

/// Conv2d, BatchNorm, ReLU, MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.frozen_batch_norm(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }

    /// Batch norm with the stored running statistics
    fn frozen_batch_norm(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [channels] = self.bn.gamma.val().dims();
        let shape = [1, channels, 1, 1];

        let mean = self.bn.running_mean.value().reshape(shape);
        let std = self
            .bn
            .running_var
            .value()
            .add_scalar(self.bn.epsilon)
            .sqrt()
            .reshape(shape);
        let gamma = self.bn.gamma.val().reshape(shape);
        let beta = self.bn.beta.val().reshape(shape);

        x.sub(mean).div(std).mul(gamma).add(beta)
    }
}

/// Binary chest X-ray classifier
///
/// Architecture:
/// - `num_blocks` conv blocks with doubling filter counts
/// - Global average pooling
/// - Linear -> ReLU -> Linear head producing `num_classes` logits
#[derive(Module, Debug)]
pub struct ChestXrayClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub activation: Relu,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ChestXrayClassifier<B> {
    pub fn new(config: &ChestXrayClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.num_blocks);
        let mut in_channels = config.in_channels;
        for i in 0..config.num_blocks {
            let out_channels = config.base_filters << i;
            blocks.push(ConvBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }

        Self {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(in_channels, config.hidden_units).init(device),
            activation: Relu::new(),
            fc2: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Index of the block called `name`, if any
    pub fn layer_index(&self, name: &str) -> Option<usize> {
        (0..self.blocks.len()).find(|&i| block_name(i) == name)
    }

    /// Names of all blocks usable as a feature layer
    pub fn layer_names(&self) -> Vec<String> {
        (0..self.blocks.len()).map(block_name).collect()
    }

    /// Run blocks `0..=layer`
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    pub fn features(&self, x: Tensor<B, 4>, layer: usize) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .take(layer + 1)
            .fold(x, |x, block| block.forward(x))
    }

    /// Run everything after block `layer`, returning logits [batch_size, num_classes]
    pub fn head(&self, features: Tensor<B, 4>, layer: usize) -> Tensor<B, 2> {
        let x = self
            .blocks
            .iter()
            .skip(layer + 1)
            .fold(features, |x, block| block.forward(x));

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        self.fc2.forward(x)
    }

    /// Full forward pass, returning logits
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let last = self.blocks.len().saturating_sub(1);
        let features = self.features(x, last);
        self.head(features, last)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> ChestXrayClassifierConfig {
        ChestXrayClassifierConfig::new()
            .with_base_filters(4)
            .with_num_blocks(3)
            .with_hidden_units(8)
    }

    #[test]
    fn test_classifier_output_shape() {
        let device = Default::default();
        let model = ChestXrayClassifier::<TestBackend>::new(&small_config(), &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 2]);
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn test_feature_layer_shapes() {
        let device = Default::default();
        let model = ChestXrayClassifier::<TestBackend>::new(&small_config(), &device);
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);

        // 32 -> 16 -> 8 -> 4, filters 4 -> 8 -> 16
        assert_eq!(model.features(input.clone(), 0).dims(), [1, 4, 16, 16]);
        assert_eq!(model.features(input, 2).dims(), [1, 16, 4, 4]);
    }

    #[test]
    fn test_split_forward_matches_full_forward() {
        let device = Default::default();
        let model = ChestXrayClassifier::<TestBackend>::new(&small_config(), &device);
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);

        let full: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();
        let split: Vec<f32> = model
            .head(model.features(input, 1), 1)
            .into_data()
            .to_vec()
            .unwrap();

        for (a, b) in full.iter().zip(split.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_record_check_accepts_own_architecture() {
        let device = Default::default();
        let config = small_config();
        let record = ChestXrayClassifier::<TestBackend>::new(&config, &device).into_record();

        assert!(config.check_record(&record).is_ok());
    }

    #[test]
    fn test_record_check_rejects_other_architectures() {
        let device = Default::default();
        let record = ChestXrayClassifier::<TestBackend>::new(&small_config(), &device).into_record();

        let deeper = small_config().with_num_blocks(4);
        assert!(deeper.check_record(&record).unwrap_err().contains("conv blocks"));

        let wider = small_config().with_base_filters(8);
        assert!(wider.check_record(&record).unwrap_err().starts_with("conv1"));

        let broader_head = small_config().with_hidden_units(16);
        assert!(broader_head.check_record(&record).unwrap_err().starts_with("fc1"));
    }

    #[test]
    fn test_layer_lookup() {
        let device = Default::default();
        let model = ChestXrayClassifier::<TestBackend>::new(&small_config(), &device);

        assert_eq!(model.layer_index("conv1"), Some(0));
        assert_eq!(model.layer_index("conv3"), Some(2));
        assert_eq!(model.layer_index("conv4"), None);
        assert_eq!(model.layer_names(), vec!["conv1", "conv2", "conv3"]);
    }
}
