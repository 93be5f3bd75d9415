/// Upper bounds applied while validating a command line.
///
/// The bounds keep a terminal-oriented test tool from issuing unbounded
/// writes; they carry no other meaning. Both are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Exclusive upper bound for `COUNT` / `WCOUNT`.
    pub max_write_count: usize,
    /// Exclusive upper bound for `BUFSIZE`.
    pub max_buffer_size: usize,
}

impl Limits {
    /// Default exclusive bound for write counts.
    pub const DEFAULT_MAX_WRITE_COUNT: usize = 5000;
    /// Default exclusive bound for stream buffer sizes.
    pub const DEFAULT_MAX_BUFFER_SIZE: usize = 4096;
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_write_count: Self::DEFAULT_MAX_WRITE_COUNT,
            max_buffer_size: Self::DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}
