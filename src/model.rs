use candle_core::{Device, Result, Tensor};
use candle_nn::{
    BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig,
    Module, ModuleT, VarBuilder, batch_norm, conv2d, conv2d_no_bias, conv_transpose2d,
};

/// Architecture hyperparameters. The defaults match the pretrained
/// checkpoints: single-channel 256x256 input, four output classes,
/// encoder widths 64 -> 128 -> 256 -> 512 with a 1024-channel bottleneck.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    pub base_width: usize,
    pub input_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            num_classes: 4,
            base_width: 64,
            input_size: 256,
        }
    }
}

/// Two 3x3 convolutions with batch normalization, plus a residual
/// shortcut. The shortcut is a 1x1 channel projection when the input and
/// output widths differ, identity otherwise.
#[derive(Debug)]
struct ResidualDoubleConv {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    shortcut: Option<Conv2d>,
}

impl ResidualDoubleConv {
    fn new(c_in: usize, c_out: usize, vb: VarBuilder) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        // tensor names mirror the checkpoint layout: conv.{0,1,3,4} + shortcut
        let conv1 = conv2d_no_bias(c_in, c_out, 3, conv_cfg, vb.pp("conv.0"))?;
        let bn1 = batch_norm(c_out, BatchNormConfig::default(), vb.pp("conv.1"))?;
        let conv2 = conv2d_no_bias(c_out, c_out, 3, conv_cfg, vb.pp("conv.3"))?;
        let bn2 = batch_norm(c_out, BatchNormConfig::default(), vb.pp("conv.4"))?;
        let shortcut = if c_in != c_out {
            Some(conv2d_no_bias(
                c_in,
                c_out,
                1,
                Conv2dConfig::default(),
                vb.pp("shortcut"),
            )?)
        } else {
            None
        };

        Ok(Self {
            conv1,
            bn1,
            conv2,
            bn2,
            shortcut,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // batch norm runs on stored running statistics only
        let main = self.conv1.forward(xs)?;
        let main = self.bn1.forward_t(&main, false)?.relu()?;
        let main = self.conv2.forward(&main)?;
        let main = self.bn2.forward_t(&main, false)?;

        let residual = match &self.shortcut {
            Some(projection) => projection.forward(xs)?,
            None => xs.clone(),
        };

        (main + residual)?.relu()
    }
}

/// Residual U-Net for 2D cardiac segmentation.
///
/// Four encoder stages with 2x2 max pooling, a bottleneck, and four
/// decoder stages that upsample with learned transposed convolutions and
/// concatenate the matching encoder output before each residual block.
/// The output head is a 1x1 convolution producing per-pixel class logits.
#[derive(Debug)]
pub struct ResUNet2d {
    config: ModelConfig,
    device: Device,
    d1: ResidualDoubleConv,
    d2: ResidualDoubleConv,
    d3: ResidualDoubleConv,
    d4: ResidualDoubleConv,
    bottleneck: ResidualDoubleConv,
    u4: ConvTranspose2d,
    c4: ResidualDoubleConv,
    u3: ConvTranspose2d,
    c3: ResidualDoubleConv,
    u2: ConvTranspose2d,
    c2: ResidualDoubleConv,
    u1: ConvTranspose2d,
    c1: ResidualDoubleConv,
    out: Conv2d,
}

impl ResUNet2d {
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        let base = config.base_width;
        let device = vb.device().clone();

        let d1 = ResidualDoubleConv::new(config.in_channels, base, vb.pp("d1"))?;
        let d2 = ResidualDoubleConv::new(base, base * 2, vb.pp("d2"))?;
        let d3 = ResidualDoubleConv::new(base * 2, base * 4, vb.pp("d3"))?;
        let d4 = ResidualDoubleConv::new(base * 4, base * 8, vb.pp("d4"))?;

        let bottleneck = ResidualDoubleConv::new(base * 8, base * 16, vb.pp("b"))?;

        let up_cfg = ConvTranspose2dConfig {
            stride: 2,
            ..Default::default()
        };
        let u4 = conv_transpose2d(base * 16, base * 8, 2, up_cfg, vb.pp("u4"))?;
        let c4 = ResidualDoubleConv::new(base * 16, base * 8, vb.pp("c4"))?;
        let u3 = conv_transpose2d(base * 8, base * 4, 2, up_cfg, vb.pp("u3"))?;
        let c3 = ResidualDoubleConv::new(base * 8, base * 4, vb.pp("c3"))?;
        let u2 = conv_transpose2d(base * 4, base * 2, 2, up_cfg, vb.pp("u2"))?;
        let c2 = ResidualDoubleConv::new(base * 4, base * 2, vb.pp("c2"))?;
        let u1 = conv_transpose2d(base * 2, base, 2, up_cfg, vb.pp("u1"))?;
        let c1 = ResidualDoubleConv::new(base * 2, base, vb.pp("c1"))?;

        let out = conv2d(
            base,
            config.num_classes,
            1,
            Conv2dConfig::default(),
            vb.pp("out"),
        )?;

        Ok(Self {
            config,
            device,
            d1,
            d2,
            d3,
            d4,
            bottleneck,
            u4,
            c4,
            u3,
            c3,
            u2,
            c2,
            u1,
            c1,
            out,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn input_size(&self) -> usize {
        self.config.input_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Map a (batch, in_channels, S, S) image to (batch, num_classes, S, S)
    /// logits. The spatial size must be divisible by 16 so the four
    /// pooling stages line up with the decoder's skip concatenations.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let d1 = self.d1.forward(xs)?;
        let x = d1.max_pool2d(2)?;
        let d2 = self.d2.forward(&x)?;
        let x = d2.max_pool2d(2)?;
        let d3 = self.d3.forward(&x)?;
        let x = d3.max_pool2d(2)?;
        let d4 = self.d4.forward(&x)?;
        let x = d4.max_pool2d(2)?;

        let x = self.bottleneck.forward(&x)?;

        let x = self.u4.forward(&x)?;
        let x = self.c4.forward(&Tensor::cat(&[&x, &d4], 1)?)?;
        let x = self.u3.forward(&x)?;
        let x = self.c3.forward(&Tensor::cat(&[&x, &d3], 1)?)?;
        let x = self.u2.forward(&x)?;
        let x = self.c2.forward(&Tensor::cat(&[&x, &d2], 1)?)?;
        let x = self.u1.forward(&x)?;
        let x = self.c1.forward(&Tensor::cat(&[&x, &d1], 1)?)?;

        self.out.forward(&x)
    }

    /// Every tensor name the architecture owns, in checkpoint order.
    /// Weight loading requires an exact match against this set.
    pub fn parameter_names(config: &ModelConfig) -> Vec<String> {
        let base = config.base_width;
        let mut names = Vec::new();

        let encoder = [
            ("d1", config.in_channels, base),
            ("d2", base, base * 2),
            ("d3", base * 2, base * 4),
            ("d4", base * 4, base * 8),
        ];
        for (prefix, c_in, c_out) in encoder {
            push_block_names(&mut names, prefix, c_in, c_out);
        }

        push_block_names(&mut names, "b", base * 8, base * 16);

        let decoder = [
            ("u4", "c4", base * 16, base * 8),
            ("u3", "c3", base * 8, base * 4),
            ("u2", "c2", base * 4, base * 2),
            ("u1", "c1", base * 2, base),
        ];
        for (up, block, c_in, c_out) in decoder {
            names.push(format!("{up}.weight"));
            names.push(format!("{up}.bias"));
            push_block_names(&mut names, block, c_in, c_out);
        }

        names.push("out.weight".to_string());
        names.push("out.bias".to_string());

        names
    }
}

fn push_block_names(names: &mut Vec<String>, prefix: &str, c_in: usize, c_out: usize) {
    names.push(format!("{prefix}.conv.0.weight"));
    for parameter in ["weight", "bias", "running_mean", "running_var"] {
        names.push(format!("{prefix}.conv.1.{parameter}"));
    }
    names.push(format!("{prefix}.conv.3.weight"));
    for parameter in ["weight", "bias", "running_mean", "running_var"] {
        names.push(format!("{prefix}.conv.4.{parameter}"));
    }
    if c_in != c_out {
        names.push(format!("{prefix}.shortcut.weight"));
    }
}
