use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use safetensors::{Dtype, SafeTensors};

use super::layout::ParamLayout;
use crate::error::{Error, Result};

/// Copies tensors from a safetensors file into `params` wherever name, dtype
/// and shape all match the layout. Everything else keeps its current values,
/// so a partial checkpoint overlays a fresh initialization.
///
/// Returns the number of tensors adopted.
pub fn load_matching(params: &mut [f32], layout: &ParamLayout, path: &Path) -> Result<usize> {
    if params.len() != layout.total_len() {
        return Err(Error::LengthMismatch {
            what: "parameters",
            got: params.len(),
            expected: layout.total_len(),
        });
    }

    let raw = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&raw).map_err(|e| Error::WeightsFormat {
        file: path.display().to_string(),
        detail: e.to_string(),
    })?;

    let mut adopted = 0;
    for entry in layout.entries() {
        let Ok(tensor) = tensors.tensor(&entry.name) else {
            debug!("{} not present in weights file", entry.name);
            continue;
        };
        if tensor.dtype() != Dtype::F32 {
            warn!("skipping {}: dtype {:?} is not F32", entry.name, tensor.dtype());
            continue;
        }
        if tensor.shape() != entry.shape.as_slice() {
            warn!(
                "skipping {}: file shape {:?} does not match model shape {:?}",
                entry.name,
                tensor.shape(),
                entry.shape
            );
            continue;
        }

        let dst = &mut params[entry.range.clone()];
        for (value, bytes) in dst.iter_mut().zip(tensor.data().chunks_exact(4)) {
            *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        adopted += 1;
    }

    info!("adopted {adopted} of {} tensors from {}", layout.len(), path.display());
    Ok(adopted)
}
