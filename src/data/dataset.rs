use ndarray::prelude::*;

/// An in-memory labeled image collection.
///
/// Images are stored as one `[N, C, H, W]` tensor with preprocessing already
/// applied, so loaders only gather and (optionally) flip.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    images: Array4<f32>,
    labels: Vec<u8>,
}

impl ImageDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Panics
    /// - if the number of images and labels differ
    /// - if the dataset is empty
    pub fn new(images: Array4<f32>, labels: Vec<u8>) -> Self {
        assert_eq!(
            images.shape()[0],
            labels.len(),
            "images and labels must have same length"
        );
        assert!(!labels.is_empty(), "dataset must be non-empty");
        Self { images, labels }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Shape of a single image as `(channels, height, width)`.
    #[inline]
    pub fn image_dim(&self) -> (usize, usize, usize) {
        let s = self.images.shape();
        (s[1], s[2], s[3])
    }

    /// Returns the image at `idx` (panics if out of bounds).
    #[inline]
    pub fn image(&self, idx: usize) -> ArrayView3<'_, f32> {
        self.images.index_axis(Axis(0), idx)
    }

    /// Returns the label at `idx` (panics if out of bounds).
    #[inline]
    pub fn label(&self, idx: usize) -> u8 {
        self.labels[idx]
    }

    #[inline]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

/// An owned mini-batch of training data.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Vec<u8>,
}

impl Batch {
    /// # Panics
    /// - if the number of images and labels differ
    /// - if the batch is empty
    pub fn new(images: Array4<f32>, labels: Vec<u8>) -> Self {
        assert_eq!(
            images.shape()[0],
            labels.len(),
            "images and labels must have same length"
        );
        assert!(!labels.is_empty(), "batch must be non-empty");
        Self { images, labels }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_basic() {
        let images = Array4::from_shape_fn((2, 1, 2, 2), |(n, _, h, w)| (n * 4 + h * 2 + w) as f32);
        let ds = ImageDataset::new(images, vec![3, 7]);

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.image_dim(), (1, 2, 2));
        assert_eq!(ds.label(1), 7);
        assert_eq!(ds.image(1)[[0, 1, 0]], 6.0);
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn dataset_rejects_label_count_mismatch() {
        ImageDataset::new(Array4::zeros((2, 1, 2, 2)), vec![0]);
    }

    #[test]
    fn batch_basic() {
        let b = Batch::new(Array4::zeros((3, 1, 2, 2)), vec![0, 1, 2]);
        assert_eq!(b.len(), 3);
        assert!(!b.is_empty());
    }
}
