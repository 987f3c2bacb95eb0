use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use ndarray::Array4;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use batch_trainer::data::{BatchLoader, ImageDataset, sample_subset};
use batch_trainer::model::{Layer, Sequential, WeightInit, squeezenet};
use batch_trainer::optimization::Adam;
use batch_trainer::training::Trainer;

const CLASSES: usize = 3;

/// Random images with labels cycling through the classes.
fn synthetic_dataset(len: usize, side: usize, seed: u64) -> ImageDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let images: Array4<f32> = Array4::random_using((len, 3, side, side), StandardNormal, &mut rng);
    let labels = (0..len).map(|i| (i % CLASSES) as u8).collect();
    ImageDataset::new(images, labels)
}

/// A scaled-down network exercising every layer kind.
fn small_model(dropout_rng: StdRng) -> Sequential {
    Sequential::new([
        Layer::conv("stem", 3, 8, 3, 1, 1, true, WeightInit::KaimingUniform),
        Layer::max_pool(3, 2),
        Layer::fire("block", 8, 4, 8, 8),
        Layer::dropout(0.5, dropout_rng),
        Layer::conv("head", 16, CLASSES, 1, 1, 0, true, WeightInit::Normal { std: 0.01 }),
        Layer::global_avg_pool(),
    ])
}

/// Builds a trainer the way the binary does, chaining every RNG off one
/// master seed.
fn seeded_trainer(seed: u64) -> (Trainer<Adam>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);

    let train_data = synthetic_dataset(24, 8, 1000);
    let test_data = synthetic_dataset(10, 8, 2000);

    let subset = sample_subset(&mut rng, train_data.len(), 16);
    let model = small_model(StdRng::from_rng(&mut rng));
    let params = model.init_params(&mut rng).unwrap();
    let pre = params.clone();

    let train_loader = BatchLoader::new(
        train_data,
        subset,
        NonZeroUsize::new(8).unwrap(),
        true,
        true,
        StdRng::from_rng(&mut rng),
    );
    let test_loader = BatchLoader::new(
        test_data,
        (0..10).collect(),
        NonZeroUsize::new(4).unwrap(),
        false,
        false,
        StdRng::from_rng(&mut rng),
    );

    let optimizer = Adam::new(params.len(), 0.001);
    let trainer = Trainer::new(model, params, optimizer, train_loader, test_loader).unwrap();
    (trainer, pre)
}

#[test]
fn update_keys_equal_trainable_tensor_names() {
    let (mut trainer, _) = seeded_trainer(1);
    let layout = small_model(StdRng::seed_from_u64(0)).layout();
    let report = trainer.run(2).unwrap();

    let expected: BTreeSet<&str> = layout.entries().iter().map(|e| e.name.as_str()).collect();
    let got: BTreeSet<&str> = report.update.names().collect();
    assert_eq!(got, expected);

    for entry in layout.entries() {
        let tensor = report.update.get(&entry.name).unwrap();
        assert_eq!(tensor.shape(), entry.shape.as_slice());
    }
}

#[test]
fn update_values_are_exactly_pre_minus_post() {
    let (mut trainer, pre) = seeded_trainer(2);
    let layout = small_model(StdRng::seed_from_u64(0)).layout();
    let report = trainer.run(3).unwrap();
    let post = trainer.params();

    for entry in layout.entries() {
        let tensor = report.update.get(&entry.name).unwrap();
        let flat: Vec<f32> = tensor.iter().copied().collect();
        let expected: Vec<f32> = pre[entry.range.clone()]
            .iter()
            .zip(&post[entry.range.clone()])
            .map(|(a, b)| a - b)
            .collect();
        assert_eq!(flat, expected, "mismatch in {}", entry.name);
    }

    // Three epochs of Adam steps moved something.
    assert!(report.update.l2_norm() > 0.0);
}

#[test]
fn identical_seeds_reproduce_the_whole_run() {
    let (mut a, pre_a) = seeded_trainer(7);
    let (mut b, pre_b) = seeded_trainer(7);
    assert_eq!(pre_a, pre_b);

    let report_a = a.run(3).unwrap();
    let report_b = b.run(3).unwrap();

    assert_eq!(report_a.metrics, report_b.metrics);
    assert_eq!(report_a.update.l2_norm(), report_b.update.l2_norm());
    assert_eq!(a.params(), b.params());

    // And a different seed diverges.
    let (mut c, _) = seeded_trainer(8);
    let report_c = c.run(3).unwrap();
    assert_ne!(report_a.metrics, report_c.metrics);
}

#[test]
fn test_loader_wraps_around_between_epochs() {
    // 10 test images at batch size 4: consecutive probes see 4, 4, 2, then a
    // fresh pass begins.
    let test_data = synthetic_dataset(10, 8, 3000);
    let mut loader = BatchLoader::new(
        test_data,
        (0..10).collect(),
        NonZeroUsize::new(4).unwrap(),
        false,
        false,
        StdRng::seed_from_u64(4),
    );

    let mut sizes = Vec::new();
    let mut seen = Vec::new();
    for _ in 0..6 {
        let batch = loader.next_batch_cyclic();
        sizes.push(batch.len());
        seen.extend(batch.labels.iter().copied());
    }
    assert_eq!(sizes, vec![4, 4, 2, 4, 4, 2]);

    // Each full pass visits every sample once.
    let mut first_pass: Vec<u8> = seen[..10].to_vec();
    let mut second_pass: Vec<u8> = seen[10..].to_vec();
    first_pass.sort_unstable();
    second_pass.sort_unstable();
    assert_eq!(first_pass, second_pass);
}

#[test]
fn full_squeezenet_trains_one_epoch_end_to_end() {
    let mut rng = StdRng::seed_from_u64(40);
    let train_data = {
        let images: Array4<f32> = Array4::random_using((8, 3, 32, 32), StandardNormal, &mut rng);
        let labels = (0..8).map(|i| (i % 10) as u8).collect();
        ImageDataset::new(images, labels)
    };
    let test_data = {
        let images: Array4<f32> = Array4::random_using((4, 3, 32, 32), StandardNormal, &mut rng);
        let labels = (0..4).map(|i| (i % 10) as u8).collect();
        ImageDataset::new(images, labels)
    };

    let model = squeezenet(10, StdRng::from_rng(&mut rng));
    let layout = model.layout();
    let params = model.init_params(&mut rng).unwrap();

    let train_loader = BatchLoader::new(
        train_data,
        (0..8).collect(),
        NonZeroUsize::new(4).unwrap(),
        true,
        true,
        StdRng::from_rng(&mut rng),
    );
    let test_loader = BatchLoader::new(
        test_data,
        (0..4).collect(),
        NonZeroUsize::new(4).unwrap(),
        false,
        false,
        StdRng::from_rng(&mut rng),
    );

    let optimizer = Adam::new(params.len(), 0.001);
    let mut trainer = Trainer::new(model, params, optimizer, train_loader, test_loader).unwrap();
    let report = trainer.run(1).unwrap();

    assert_eq!(report.metrics.len(), 1);
    assert!(report.metrics[0].train_loss.is_finite());
    assert_eq!(report.update.len(), 52);
    assert_eq!(report.update.num_elements(), 727_626);
    assert!(report.update.get("features.0.weight").is_some());
    assert!(report.update.get("classifier.1.bias").is_some());
    assert_eq!(layout.total_len(), report.update.num_elements());
}
