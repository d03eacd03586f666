use argh::FromArgs;
use std::path::PathBuf;

use kornia_style::{DeviceSelection, StyleTransfer, StyleTransferConfig};

#[derive(FromArgs)]
/// Render a content image in the style of another image with neural style transfer
struct Args {
    /// path to the content image
    #[argh(option, short = 'c')]
    content: Option<PathBuf>,

    /// path to the style image
    #[argh(option, short = 's')]
    style: Option<PathBuf>,

    /// path to a JSON configuration file, flags override its values
    #[argh(option)]
    config: Option<PathBuf>,

    /// side of the square resolution the images are resized to
    #[argh(option)]
    image_size: Option<usize>,

    /// number of optimization steps
    #[argh(option)]
    steps: Option<usize>,

    /// adam learning rate
    #[argh(option)]
    learning_rate: Option<f64>,

    /// weight of the content loss
    #[argh(option)]
    alpha: Option<f64>,

    /// weight of the style loss
    #[argh(option)]
    beta: Option<f64>,

    /// report progress and write a snapshot every this many steps
    #[argh(option)]
    snapshot_interval: Option<usize>,

    /// path of the snapshot image
    #[argh(option)]
    snapshot_path: Option<PathBuf>,

    /// path of the final safetensors output
    #[argh(option, short = 'o')]
    output_path: Option<PathBuf>,

    /// compute device: auto, cpu, cuda[:N] or metal[:N]
    #[argh(option)]
    device: Option<DeviceSelection>,

    /// path to local VGG19 safetensors weights
    #[argh(option)]
    weights: Option<PathBuf>,

    /// safetensors output of a previous run to resume from
    #[argh(option)]
    init: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => StyleTransferConfig::from_json_file(path)?,
        None => StyleTransferConfig::default(),
    };

    if let Some(content) = args.content {
        config.content_path = content;
    }
    if let Some(style) = args.style {
        config.style_path = style;
    }
    if let Some(image_size) = args.image_size {
        config.image_size = image_size;
    }
    if let Some(steps) = args.steps {
        config.total_steps = steps;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(beta) = args.beta {
        config.beta = beta;
    }
    if let Some(snapshot_interval) = args.snapshot_interval {
        config.snapshot_interval = snapshot_interval;
    }
    if let Some(snapshot_path) = args.snapshot_path {
        config.snapshot_path = snapshot_path;
    }
    if let Some(output_path) = args.output_path {
        config.output_path = output_path;
    }
    if let Some(device) = args.device {
        config.device = device;
    }
    if args.weights.is_some() {
        config.weights_path = args.weights;
    }
    if args.init.is_some() {
        config.init_path = args.init;
    }

    let mut transfer = StyleTransfer::new(config)?;
    println!("Using device: {:?}", transfer.device().location());

    let now = std::time::Instant::now();
    let output = transfer.run()?;

    if output.snapshot_failures > 0 {
        log::warn!("{} snapshots could not be written", output.snapshot_failures);
    }

    println!(
        "Finished {} steps in {:?}. Saved the generated image to {}",
        output.steps,
        now.elapsed(),
        transfer.config().output_path.display()
    );

    Ok(())
}
