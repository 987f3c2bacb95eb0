use std::process;
use std::time::Instant;

use clap::Parser;
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use batch_trainer::config::{Config, TEST_BATCH_SIZE};
use batch_trainer::data::{BatchLoader, cifar, sample_subset};
use batch_trainer::error::Result;
use batch_trainer::model::{load_matching, squeezenet};
use batch_trainer::optimization::Adam;
use batch_trainer::training::Trainer;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    if let Err(e) = run(&config) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(config: &Config) -> Result<()> {
    // All randomness chains off this one RNG, so a fixed seed fixes the run.
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let data_dir = cifar::ensure_cifar10(&config.data_dir)?;
    let train = cifar::load_train(&data_dir)?;
    let test = cifar::load_test(&data_dir)?;
    info!("loaded CIFAR-10: {} train / {} test images", train.len(), test.len());

    let subset = sample_subset(&mut rng, train.len(), config.subset_len());
    info!(
        "training on a {}-image subset, batch size {}, for {} epochs",
        subset.len(),
        config.batch_size,
        config.epochs
    );

    let model = squeezenet(cifar::NUM_CLASSES, StdRng::from_rng(&mut rng));
    let mut params = model.init_params(&mut rng)?;
    info!("initialized SqueezeNet v1.1: {} parameters", params.len());

    if let Some(path) = &config.weights {
        load_matching(&mut params, &model.layout(), path)?;
    }

    let train_loader = BatchLoader::new(
        train,
        subset,
        config.batch_size,
        true,
        true,
        StdRng::from_rng(&mut rng),
    );
    let test_indices = (0..test.len()).collect();
    let test_loader = BatchLoader::new(
        test,
        test_indices,
        TEST_BATCH_SIZE,
        false,
        false,
        StdRng::from_rng(&mut rng),
    );

    let optimizer = Adam::new(params.len(), config.learning_rate);
    let mut trainer = Trainer::new(model, params, optimizer, train_loader, test_loader)?;

    let started = Instant::now();
    let report = trainer.run(config.epochs.get())?;
    info!("training finished in {:.2?}", started.elapsed());

    let update = &report.update;
    info!(
        "parameter update: {} tensors, {} values, l2 norm {:.6}",
        update.len(),
        update.num_elements(),
        update.l2_norm()
    );
    Ok(())
}
