//! The immutable result of parsing an M4A container.

/// Audio encoding recorded in the container's sample description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// No `stsd` sample-description entry recognized yet.
    #[default]
    Unknown,
    /// Apple Lossless — the only encoding this client can stream.
    Alac,
    /// Advanced Audio Coding — recognized but not supported for
    /// streaming; this client only forwards ALAC samples as-is.
    Aac,
}

/// Outcome of a parse pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStatus {
    /// No warnings encountered.
    #[default]
    Ok,
    /// Parsing completed but at least one non-fatal irregularity was
    /// recorded (unknown box, redundant duration, `mp4a` alongside
    /// `alac`, a nonzero `stsz` uniform sample size, ...).
    ParsedWithWarnings,
    /// Parsing could not complete. `M4aFile::open` returns an error in
    /// this case, so no descriptor in `Error` status ever escapes the
    /// parser — the variant exists to document the design's three
    /// outcomes even though only two are publicly observable.
    Error,
}

/// Fields extracted from one pass over an M4A container.
///
/// Built up box-by-box by the parser, then frozen; the parser enforces
/// every field's invariants before returning one.
#[derive(Debug, Clone)]
pub struct M4aDescriptor {
    /// Units-per-second for sample timing, from `mvhd`/`mdhd`.
    pub timescale: u32,
    /// Total duration in `timescale` units.
    pub duration: u32,
    /// Number of audio samples, from `stsz`.
    pub sample_count: u32,
    /// Sum of all entries in the sample-size table.
    pub total_sample_size: u64,
    /// Largest single entry in the sample-size table.
    pub largest_sample_size: u32,
    /// Sample encoding; must be `Alac` for a successful parse.
    pub encoding: Encoding,
    /// Absolute byte offset of the `mdat` payload.
    pub data_offset: u64,
    /// Absolute byte offset of the first entry in the `stsz` size
    /// table (the table itself, not the `sample_size_for_all`/
    /// `sample_count` header fields that precede it).
    pub size_table_offset: u64,
    /// Outcome of the parse.
    pub status: ParseStatus,
}

impl M4aDescriptor {
    pub(crate) fn new() -> Self {
        Self {
            timescale: 0,
            duration: 0,
            sample_count: 0,
            total_sample_size: 0,
            largest_sample_size: 0,
            encoding: Encoding::Unknown,
            data_offset: 0,
            size_table_offset: 0,
            status: ParseStatus::Ok,
        }
    }

    /// Duration of the track in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            f64::from(self.duration) / f64::from(self.timescale)
        }
    }
}
