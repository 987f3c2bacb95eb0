//! CIFAR-10 binary-format acquisition and loading.

use std::fs;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info};
use ndarray::prelude::*;

use super::dataset::ImageDataset;
use crate::error::{Error, Result};

/// Where the binary archive is fetched from when the cache is cold.
pub const CIFAR10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";

/// Directory the archive unpacks to, relative to the data directory.
pub const ARCHIVE_DIR: &str = "cifar-10-batches-bin";

pub const NUM_CLASSES: usize = 10;
pub const CHANNELS: usize = 3;
pub const HEIGHT: usize = 32;
pub const WIDTH: usize = 32;

/// Per-channel normalization statistics applied at load time.
pub const CHANNEL_MEANS: [f32; 3] = [0.491399689874, 0.482158419622, 0.446530924224];
pub const CHANNEL_STDS: [f32; 3] = [0.247032237587, 0.243485133253, 0.261587846975];

const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILES: [&str; 1] = ["test_batch.bin"];

const PLANE: usize = HEIGHT * WIDTH;
const RECORD_LEN: usize = 1 + CHANNELS * PLANE;

/// Returns the unpacked dataset directory, downloading the archive first if
/// it is not cached under `data_dir`. No retries: any network or unpack
/// failure propagates.
pub fn ensure_cifar10(data_dir: &Path) -> Result<PathBuf> {
    let dir = data_dir.join(ARCHIVE_DIR);
    if dir.is_dir() {
        debug!("dataset cache hit at {}", dir.display());
        return Ok(dir);
    }

    fs::create_dir_all(data_dir)?;

    info!("downloading {CIFAR10_URL}");
    let response = reqwest::blocking::get(CIFAR10_URL)
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Download {
            url: CIFAR10_URL.to_string(),
            detail: e.to_string(),
        })?;
    let bytes = response.bytes().map_err(|e| Error::Download {
        url: CIFAR10_URL.to_string(),
        detail: e.to_string(),
    })?;

    info!("unpacking {} bytes into {}", bytes.len(), data_dir.display());
    let mut archive = tar::Archive::new(GzDecoder::new(&bytes[..]));
    archive.unpack(data_dir).map_err(|e| Error::Archive {
        detail: e.to_string(),
    })?;

    if !dir.is_dir() {
        return Err(Error::Archive {
            detail: format!("archive did not contain {ARCHIVE_DIR}"),
        });
    }
    Ok(dir)
}

/// Loads the 50 000-image training split.
pub fn load_train(dir: &Path) -> Result<ImageDataset> {
    load_split(dir, &TRAIN_FILES)
}

/// Loads the 10 000-image test split.
pub fn load_test(dir: &Path) -> Result<ImageDataset> {
    load_split(dir, &TEST_FILES)
}

fn load_split(dir: &Path, files: &[&str]) -> Result<ImageDataset> {
    let mut images = Vec::new();
    let mut labels = Vec::new();

    for name in files {
        let raw = fs::read(dir.join(name))?;
        parse_records(&raw, name, &mut images, &mut labels)?;
    }

    let n = labels.len();
    let images = Array4::from_shape_vec((n, CHANNELS, HEIGHT, WIDTH), images).unwrap();
    Ok(ImageDataset::new(images, labels))
}

/// Parses a sequence of 3073-byte records (1 label byte, then three
/// 1024-byte channel planes), normalizing pixels as they are appended.
fn parse_records(
    raw: &[u8],
    file: &str,
    images: &mut Vec<f32>,
    labels: &mut Vec<u8>,
) -> Result<()> {
    if raw.is_empty() || raw.len() % RECORD_LEN != 0 {
        return Err(Error::DatasetFormat {
            file: file.to_string(),
            detail: format!(
                "length {} is not a positive multiple of {RECORD_LEN}",
                raw.len()
            ),
        });
    }

    images.reserve(raw.len() / RECORD_LEN * CHANNELS * PLANE);
    labels.reserve(raw.len() / RECORD_LEN);

    for record in raw.chunks_exact(RECORD_LEN) {
        let label = record[0];
        if label as usize >= NUM_CLASSES {
            return Err(Error::DatasetFormat {
                file: file.to_string(),
                detail: format!("label {label} out of range"),
            });
        }
        labels.push(label);

        let pixels = &record[1..];
        for c in 0..CHANNELS {
            let mean = CHANNEL_MEANS[c];
            let std = CHANNEL_STDS[c];
            for &p in &pixels[c * PLANE..(c + 1) * PLANE] {
                images.push((p as f32 / 255.0 - mean) / std);
            }
        }
    }
    Ok(())
}
