use log::*;
use sift_flow::{
    FeatureSet, GrayFloatImage, Parameters, ScaleMapConfig, ScaleMapEstimator, SiftFlow,
    WeightFunction,
};
use sift_flow_cli::{read_features, read_parameters_path, write_flo_path};
use std::error::Error;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sift-flow",
    about = "Dense SIFT Flow correspondence between two images"
)]
struct Opt {
    /// Matched features of the first image, one 1-based `x y` pair per line.
    ///
    /// Without features the scale map of the image is uniform.
    #[structopt(long, parse(from_os_str))]
    features1: Option<PathBuf>,
    /// Matched features of the second image.
    #[structopt(long, parse(from_os_str))]
    features2: Option<PathBuf>,
    /// JSON object holding all nine solver parameters.
    ///
    /// If this is not provided the documented defaults are used. Partial
    /// records are rejected.
    #[structopt(short, long, parse(from_os_str))]
    params: Option<PathBuf>,
    /// Use the hard cutoff scale weighting instead of the smooth falloff.
    #[structopt(long)]
    hard_cutoff: bool,
    /// The Middlebury `.flo` file to write the flow to.
    #[structopt(short, long, parse(from_os_str))]
    output: PathBuf,
    /// The first image.
    #[structopt(parse(from_os_str))]
    image1: PathBuf,
    /// The second image.
    #[structopt(parse(from_os_str))]
    image2: PathBuf,
}

fn load_features(path: Option<&PathBuf>) -> Result<FeatureSet, Box<dyn Error>> {
    match path {
        Some(path) => {
            let features = read_features(path)?;
            info!("loaded {} features from {}", features.len(), path.display());
            Ok(features)
        }
        None => Ok(FeatureSet::default()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();

    let record = opt.params.as_deref().map(read_parameters_path).transpose()?;
    if record.is_some() {
        info!("loaded parameters");
    } else {
        info!("using default parameters");
    }
    let parameters = Parameters::resolve(record)?;

    let weight_function = if opt.hard_cutoff {
        WeightFunction::HardCutoff
    } else {
        WeightFunction::Smooth
    };
    let engine = SiftFlow {
        scale_maps: ScaleMapEstimator::new(ScaleMapConfig {
            weight_function,
            ..Default::default()
        })?,
        ..SiftFlow::new(parameters)
    };

    let features1 = load_features(opt.features1.as_ref())?;
    let features2 = load_features(opt.features2.as_ref())?;
    let image1 = GrayFloatImage::from_dynamic(&image::open(&opt.image1)?);
    let image2 = GrayFloatImage::from_dynamic(&image::open(&opt.image2)?);

    let flow = engine.compute(&image1, &image2, &features1, &features2)?;
    write_flo_path(&opt.output, &flow)?;
    info!(
        "wrote a {} x {} flow field to {}",
        flow.width(),
        flow.height(),
        opt.output.display()
    );
    Ok(())
}
