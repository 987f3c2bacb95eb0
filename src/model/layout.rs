use std::ops::Range;

/// One named tensor inside the flat parameter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub range: Range<usize>,
}

impl ParamEntry {
    /// Number of values the tensor holds.
    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Maps a flat parameter buffer into named tensors.
/// This is the core "offsets + shapes" mechanism: entries are appended in
/// declaration order and partition `0..total_len()` exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamLayout {
    entries: Vec<ParamEntry>,
    total_len: usize,
}

impl ParamLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named tensor; its range starts where the previous one ended.
    ///
    /// # Panics
    /// - if `shape` describes an empty tensor
    /// - if `name` is already present
    pub fn push(&mut self, name: impl Into<String>, shape: Vec<usize>) {
        let name = name.into();
        let len: usize = shape.iter().product();
        assert!(len > 0, "tensor {name} must not be empty");
        assert!(self.get(&name).is_none(), "duplicate tensor name {name}");

        let start = self.total_len;
        self.total_len += len;
        self.entries.push(ParamEntry {
            name,
            shape,
            range: start..self.total_len,
        });
    }

    #[inline]
    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    /// Number of named tensors.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of values across all tensors.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn get(&self, name: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Sanity check: entries must tile a buffer of `total_params` values
    /// exactly, each with a range matching its shape.
    pub fn validate(&self, total_params: usize) {
        assert_eq!(self.total_len, total_params, "layout does not fill buffer");

        let mut expected_start = 0;
        for entry in &self.entries {
            assert_eq!(entry.range.start, expected_start, "gap before {}", entry.name);
            assert_eq!(
                entry.len(),
                entry.shape.iter().product::<usize>(),
                "range of {} does not match its shape",
                entry.name
            );
            expected_start = entry.range.end;
        }
        assert_eq!(expected_start, total_params, "layout overruns buffer");
    }
}
