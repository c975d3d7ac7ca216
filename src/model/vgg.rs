use tch::{
    Tensor,
    nn::{self, Conv2D, SequentialT},
};

pub const FEATURES_PREFIX: &str = "features.";
pub const FEATURE_DIM: i64 = 4096;

// VGG16 (configuration D): output channels per block, max-pool after each block.
fn layers_d() -> Vec<Vec<i64>> {
    vec![
        vec![64, 64],
        vec![128, 128],
        vec![256, 256, 256],
        vec![512, 512, 512],
        vec![512, 512, 512],
    ]
}

fn conv2d(p: nn::Path, c_in: i64, c_out: i64) -> Conv2D {
    let conv2d_cfg = nn::ConvConfig {
        stride: 1,
        padding: 1,
        ..Default::default()
    };
    nn::conv2d(p, c_in, c_out, 3, conv2d_cfg)
}

/// Builds VGG16 under torchvision's parameter names (`features.N.*`,
/// `classifier.{0,3,6}.*`) so that exported checkpoints load without remapping.
pub fn vgg16(p: &nn::Path, num_classes: i64) -> SequentialT {
    let f = p / "features";
    let c = p / "classifier";
    let mut seq = nn::seq_t();
    let mut c_in = 3;
    for channels in layers_d() {
        for c_out in channels {
            let l = seq.len();
            seq = seq.add(conv2d(&f / l.to_string(), c_in, c_out));
            seq = seq.add_fn(|xs| xs.relu());
            c_in = c_out;
        }
        seq = seq.add_fn(|xs| xs.max_pool2d_default(2));
    }
    seq.add_fn(|xs| xs.adaptive_avg_pool2d([7, 7]))
        .add_fn(|xs| xs.flat_view())
        .add(nn::linear(&c / "0", 512 * 7 * 7, FEATURE_DIM, Default::default()))
        .add_fn(|xs| xs.relu())
        .add_fn_t(|xs, train| xs.dropout(0.5, train))
        .add(nn::linear(&c / "3", FEATURE_DIM, FEATURE_DIM, Default::default()))
        .add_fn(|xs| xs.relu())
        .add_fn_t(|xs, train| xs.dropout(0.5, train))
        .add(nn::linear(&c / "6", FEATURE_DIM, num_classes, Default::default()))
}

/// Stops gradients for the convolutional feature extractor. Returns the
/// number of frozen tensors.
pub fn freeze_features(vs: &nn::VarStore) -> usize {
    let mut frozen = 0;
    for (name, var) in vs.variables() {
        if name.starts_with(FEATURES_PREFIX) {
            let _ = var.set_requires_grad(false);
            frozen += 1;
        }
    }
    frozen
}

pub fn is_trainable(var: &Tensor) -> bool {
    var.requires_grad()
}
