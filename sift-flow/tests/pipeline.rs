mod common;

use common::{quick_parameters, quick_record, shifted_pair, texture};
use log::*;
use sift_flow::{
    Error, FeatureSet, ImageIndex, ParameterRecord, Parameters, ScaleMapConfig,
    ScaleMapEstimator, SiftFlow, Stage, WeightFunction,
};

fn no_features() -> FeatureSet {
    FeatureSet::default()
}

#[test]
fn flow_has_the_input_shape() {
    let _ = pretty_env_logger::try_init_timed();
    let engine = SiftFlow::new(quick_parameters());
    for (width, height) in [(31, 17), (16, 16), (9, 24)] {
        let flow = engine
            .compute(
                &texture(width, height, 1),
                &texture(width, height, 2),
                &no_features(),
                &no_features(),
            )
            .unwrap();
        assert_eq!(flow.dimensions(), (width, height));
        assert_eq!(flow.vx.dim(), (height, width));
        assert_eq!(flow.vy.dim(), (height, width));
    }
}

#[test]
fn identity_gives_zero_flow() {
    let _ = pretty_env_logger::try_init_timed();
    let image = texture(40, 32, 3);
    let features = FeatureSet::from_one_based([(5.0, 5.0), (30.0, 12.0), (20.0, 28.0)]);
    let flow = SiftFlow::new(quick_parameters())
        .compute(&image, &image, &features, &features)
        .unwrap();
    let moving = flow.magnitude().iter().filter(|&&m| m > 0.0).count();
    info!("{} of {} pixels moved", moving, 40 * 32);
    assert_eq!(moving, 0);
}

#[test]
fn default_pipeline_recovers_large_translations() {
    let _ = pretty_env_logger::try_init_timed();
    let engine = SiftFlow::default();
    for (dx, dy) in [(7, 5), (11, 9), (13, 1)] {
        let (first, second) = shifted_pair(96, 80, dx, dy, 7);
        let flow = engine
            .compute(&first, &second, &no_features(), &no_features())
            .unwrap();
        let mut correct = 0;
        let mut total = 0;
        for y in 16..64 {
            for x in 16..80 {
                total += 1;
                if flow.get(x, y) == (dx as f32, dy as f32) {
                    correct += 1;
                }
            }
        }
        info!("({}, {}): {} of {} pixels", dx, dy, correct, total);
        assert!(correct * 4 >= total * 3, "({dx}, {dy}): {correct} of {total}");
    }
}

#[test]
fn recovers_a_shifted_texture() {
    let _ = pretty_env_logger::try_init_timed();
    let (first, second) = shifted_pair(48, 48, 2, 1, 9);
    let features1 = FeatureSet::from_one_based([(10.0, 10.0), (40.0, 12.0), (25.0, 38.0)]);
    let features2 = FeatureSet::from_one_based([(12.0, 11.0), (42.0, 13.0), (27.0, 39.0)]);
    let flow = SiftFlow::new(quick_parameters())
        .compute(&first, &second, &features1, &features2)
        .unwrap();
    let mut correct = 0;
    let mut total = 0;
    for y in 8..40 {
        for x in 8..40 {
            total += 1;
            if flow.get(x, y) == (2.0, 1.0) {
                correct += 1;
            }
        }
    }
    info!("{} of {} interior pixels correct", correct, total);
    assert!(correct * 10 >= total * 8, "{correct} of {total}");
}

#[test]
fn computation_is_deterministic() {
    let (first, second) = shifted_pair(30, 22, 1, -2, 5);
    let features = FeatureSet::from_one_based([(4.0, 4.0), (20.0, 15.0)]);
    let engine = SiftFlow::new(quick_parameters());
    let a = engine.compute(&first, &second, &features, &features).unwrap();
    let b = engine.compute(&first, &second, &features, &features).unwrap();
    assert_eq!(a, b);
}

#[test]
fn defaults_match_the_documented_record() {
    let explicit = Parameters::resolve(Some(ParameterRecord {
        alpha: 0.01,
        d: 1.0,
        gamma: 0.001,
        nlevels: 4,
        topwsize: 10,
        wsize: 5,
        n_top_iterations: 60,
        n_iterations: 40,
        n_hierarchy: 2,
    }))
    .unwrap();
    assert_eq!(explicit, Parameters::default());

    // Short schedules keep the end to end comparison cheap.
    let shortened = ParameterRecord {
        n_top_iterations: 2,
        n_iterations: 1,
        ..ParameterRecord::default()
    };
    let image1 = texture(36, 36, 7);
    let image2 = texture(36, 36, 8);
    let via_default = SiftFlow {
        parameters: Parameters::from_record(shortened).unwrap(),
        ..SiftFlow::default()
    };
    let via_resolve = SiftFlow::new(Parameters::resolve(Some(shortened)).unwrap());
    assert_eq!(
        via_default
            .compute(&image1, &image2, &no_features(), &no_features())
            .unwrap(),
        via_resolve
            .compute(&image1, &image2, &no_features(), &no_features())
            .unwrap()
    );
}

#[test]
fn empty_features_are_not_an_error() {
    let image = texture(20, 20, 2);
    let estimator = ScaleMapEstimator::default();
    let map = estimator.estimate(&image, &no_features());
    assert!(map.iter().all(|&s| s == ScaleMapConfig::default().default_scale));
    assert!(SiftFlow::new(quick_parameters())
        .compute(&image, &image, &no_features(), &no_features())
        .is_ok());
}

#[test]
fn dimension_mismatch_is_rejected_before_any_stage() {
    let mut stages = vec![];
    let result = SiftFlow::new(quick_parameters()).compute_with_progress(
        &texture(24, 18, 1),
        &texture(24, 19, 1),
        &no_features(),
        &no_features(),
        &mut |stage: Stage| stages.push(stage),
    );
    match result {
        Err(Error::InputDimensionMismatch { first, second }) => {
            assert_eq!(first, (24, 18));
            assert_eq!(second, (24, 19));
        }
        other => panic!("expected a dimension mismatch, got {other:?}"),
    }
    assert!(!stages.contains(&Stage::DescriptorField(ImageIndex::First)));
    assert!(stages.is_empty());
}

#[test]
fn iteration_count_does_not_change_the_shape() {
    let (first, second) = shifted_pair(26, 20, 1, 1, 4);
    for (top, fine) in [(0, 0), (1, 1), (12, 7)] {
        let parameters = Parameters::from_record(ParameterRecord {
            n_top_iterations: top,
            n_iterations: fine,
            ..quick_record()
        })
        .unwrap();
        let flow = SiftFlow::new(parameters)
            .compute(&first, &second, &no_features(), &no_features())
            .unwrap();
        assert_eq!(flow.dimensions(), (26, 20));
    }
}

#[test]
fn hard_cutoff_weighting_runs_end_to_end() {
    let (first, second) = shifted_pair(28, 28, 1, 0, 6);
    let features = FeatureSet::from_one_based([(8.0, 8.0), (20.0, 20.0)]);
    let engine = SiftFlow {
        scale_maps: ScaleMapEstimator::new(ScaleMapConfig {
            weight_function: WeightFunction::HardCutoff,
            ..Default::default()
        })
        .unwrap(),
        ..SiftFlow::new(quick_parameters())
    };
    let flow = engine.compute(&first, &second, &features, &features).unwrap();
    assert_eq!(flow.dimensions(), (28, 28));
}

#[test]
fn invalid_record_is_rejected_at_construction() {
    let record = ParameterRecord {
        n_iterations: -3,
        ..ParameterRecord::default()
    };
    assert!(matches!(
        Parameters::resolve(Some(record)),
        Err(Error::InvalidParameter {
            name: "nIterations",
            ..
        })
    ));
}
