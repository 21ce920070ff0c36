//! A one-pass, recursive MP4 box walker.
//!
//! An MP4 box is `[4-byte size][4-byte type][payload]`, big-endian
//! throughout. Parsing never loads the whole file: each box header is
//! read, the handler for its type consumes exactly what it needs, and
//! the walker seeks to the next sibling regardless of how much the
//! handler actually read (a handler that reads less than its payload
//! just gets skipped over; one that reads more is a malformed file).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};

use super::descriptor::{Encoding, M4aDescriptor, ParseStatus};
use crate::error::RaopError;

const BOX_HEADER_LEN: u64 = 8;

struct ParserState {
    descriptor: M4aDescriptor,
    timescale_set: bool,
    duration_set: bool,
    mdat_candidate: Option<u64>,
}

impl ParserState {
    fn new() -> Self {
        Self {
            descriptor: M4aDescriptor::new(),
            timescale_set: false,
            duration_set: false,
            mdat_candidate: None,
        }
    }

    fn warn(&mut self, msg: impl std::fmt::Display) {
        tracing::warn!("m4a parser: {msg}");
        if self.descriptor.status == ParseStatus::Ok {
            self.descriptor.status = ParseStatus::ParsedWithWarnings;
        }
    }

    fn set_timescale(&mut self, value: u32) {
        if value == 0 || value == 0xFFFF_FFFF {
            return;
        }
        if !self.timescale_set {
            self.descriptor.timescale = value;
            self.timescale_set = true;
        } else if self.descriptor.timescale != value {
            self.warn(format!(
                "conflicting timescale {value} (already {})",
                self.descriptor.timescale
            ));
            self.descriptor.timescale = value;
        }
    }

    fn set_duration(&mut self, value: u32) {
        if value == 0 || value == 0xFFFF_FFFF {
            return;
        }
        if !self.duration_set {
            self.descriptor.duration = value;
            self.duration_set = true;
        } else if self.descriptor.duration != value {
            self.warn(format!(
                "conflicting duration {value} (already {})",
                self.descriptor.duration
            ));
            self.descriptor.duration = value;
        }
    }

    fn reconcile_mdat(&mut self, candidate: u64) {
        if self.descriptor.total_sample_size == 0 {
            self.mdat_candidate = Some(candidate);
            return;
        }
        if candidate != self.descriptor.total_sample_size {
            self.warn(format!(
                "mdat payload size {candidate} disagrees with stsz total {}; using the smaller",
                self.descriptor.total_sample_size
            ));
            self.descriptor.total_sample_size =
                self.descriptor.total_sample_size.min(candidate);
        }
    }
}

/// Parse `path` and return a frozen descriptor.
///
/// # Errors
/// Returns `RaopError::ContainerMalformed` on a short read, a box-size
/// mismatch, or a missing required field (non-ALAC encoding, zero
/// timescale, a size table that disagrees with `sample_count`).
pub fn parse(file: &mut File) -> Result<M4aDescriptor, RaopError> {
    let file_len = file.metadata()?.len();
    let mut state = ParserState::new();

    file.seek(SeekFrom::Start(0))?;
    walk(file, file_len, &mut state)?;

    if let Some(candidate) = state.mdat_candidate.take() {
        state.reconcile_mdat(candidate);
    }

    finish(file, file_len, state)
}

fn finish(file: &mut File, file_len: u64, mut state: ParserState) -> Result<M4aDescriptor, RaopError> {
    let d = &mut state.descriptor;

    if d.encoding != Encoding::Alac {
        return Err(RaopError::ContainerMalformed {
            reason: "no alac sample description found".to_string(),
            offset: 0,
        });
    }
    if d.timescale == 0 {
        return Err(RaopError::ContainerMalformed {
            reason: "timescale never set".to_string(),
            offset: 0,
        });
    }
    if d.data_offset == 0 || d.data_offset > file_len {
        return Err(RaopError::ContainerMalformed {
            reason: "mdat offset missing or out of range".to_string(),
            offset: d.data_offset,
        });
    }
    if d.size_table_offset == 0 || d.size_table_offset > file_len {
        return Err(RaopError::ContainerMalformed {
            reason: "stsz size-table offset missing or out of range".to_string(),
            offset: d.size_table_offset,
        });
    }
    let table_bytes = u64::from(d.sample_count) * 4;
    if d.size_table_offset + table_bytes > file_len {
        return Err(RaopError::ContainerMalformed {
            reason: "sample-size table runs past end of file".to_string(),
            offset: d.size_table_offset,
        });
    }

    // Post-parse fixup: position both cursors at their table bases.
    file.seek(SeekFrom::Start(d.data_offset))?;

    Ok(state.descriptor)
}

/// Walk `len` bytes of sibling boxes starting at the reader's current
/// position.
fn walk(file: &mut File, len: u64, state: &mut ParserState) -> Result<(), RaopError> {
    let start = file.stream_position()?;
    let end = start + len;

    while file.stream_position()? < end {
        let box_start = file.stream_position()?;
        if end - box_start < BOX_HEADER_LEN {
            return Err(RaopError::ContainerMalformed {
                reason: "truncated box header".to_string(),
                offset: box_start,
            });
        }

        let size = read_u32(file, box_start)? as u64;
        let mut kind = [0u8; 4];
        file.read_exact(&mut kind)
            .map_err(|e| short_read(box_start, e))?;

        if size < BOX_HEADER_LEN || box_start + size > end {
            return Err(RaopError::ContainerMalformed {
                reason: format!(
                    "box size {size} at offset {box_start} does not fit in its parent"
                ),
                offset: box_start,
            });
        }

        let payload_len = size - BOX_HEADER_LEN;
        let next = box_start + size;

        dispatch(file, &kind, payload_len, state)?;

        // Handlers may read less than their payload; always land on the
        // next sibling regardless.
        file.seek(SeekFrom::Start(next))?;
    }

    Ok(())
}

fn dispatch(
    file: &mut File,
    kind: &[u8; 4],
    payload_len: u64,
    state: &mut ParserState,
) -> Result<(), RaopError> {
    match kind {
        b"ftyp" => handle_ftyp(file, payload_len, state),
        b"moov" | b"trak" | b"udta" | b"mdia" | b"minf" | b"dinf" | b"stbl" => {
            walk(file, payload_len, state)
        }
        b"ilst" => handle_ilst(file, payload_len, state),
        b"mvhd" | b"mdhd" => handle_mvhd_mdhd(file, state),
        b"tkhd" => handle_tkhd(file, state),
        b"stsd" => handle_stsd(file, payload_len, state),
        b"alac" => handle_alac(file, state),
        b"mp4a" => handle_mp4a(file, state),
        b"stts" => handle_stts(file, state),
        b"stsz" => handle_stsz(file, state),
        b"mdat" => handle_mdat(file, payload_len, state),
        b"meta" => handle_meta(file, payload_len, state),
        b"free" | b"hdlr" | b"dref" | b"smhd" | b"stsc" | b"stco" => Ok(()),
        other => {
            state.warn(format!(
                "unknown box type {:?}",
                String::from_utf8_lossy(other)
            ));
            Ok(())
        }
    }
}

fn handle_ftyp(file: &mut File, payload_len: u64, state: &mut ParserState) -> Result<(), RaopError> {
    if payload_len < 8 {
        return Err(short_read_at(file, "ftyp too short"));
    }
    let mut major = [0u8; 4];
    file.read_exact(&mut major).map_err(|e| io_err(file, e))?;
    let minor = read_u32_here(file)?;
    if &major != b"M4A " || minor != 0 {
        state.warn(format!(
            "unexpected major brand {:?} / minor version {minor}",
            String::from_utf8_lossy(&major)
        ));
    }
    Ok(())
}

fn handle_mvhd_mdhd(file: &mut File, state: &mut ParserState) -> Result<(), RaopError> {
    let version = file.read_u8().map_err(|e| io_err(file, e))?;
    skip(file, 3)?; // flags
    if version == 1 {
        skip(file, 16)?; // creation + modification time (8 bytes each)
        let timescale = read_u32_here(file)?;
        let duration = file.read_u64::<BigEndian>().map_err(|e| io_err(file, e))?;
        state.set_timescale(timescale);
        #[allow(clippy::cast_possible_truncation)]
        state.set_duration(duration.min(u64::from(u32::MAX)) as u32);
    } else {
        skip(file, 8)?; // creation + modification time (4 bytes each)
        let timescale = read_u32_here(file)?;
        let duration = read_u32_here(file)?;
        state.set_timescale(timescale);
        state.set_duration(duration);
    }
    Ok(())
}

fn handle_tkhd(file: &mut File, state: &mut ParserState) -> Result<(), RaopError> {
    let version = file.read_u8().map_err(|e| io_err(file, e))?;
    skip(file, 3)?; // flags
    if version == 1 {
        skip(file, 16)?; // creation + modification
        skip(file, 4)?; // track id
        skip(file, 4)?; // reserved
        let duration = file.read_u64::<BigEndian>().map_err(|e| io_err(file, e))?;
        #[allow(clippy::cast_possible_truncation)]
        state.set_duration(duration.min(u64::from(u32::MAX)) as u32);
    } else {
        skip(file, 8)?;
        skip(file, 4)?;
        skip(file, 4)?;
        let duration = read_u32_here(file)?;
        state.set_duration(duration);
    }
    Ok(())
}

fn handle_stsd(file: &mut File, payload_len: u64, state: &mut ParserState) -> Result<(), RaopError> {
    if payload_len < 8 {
        return Err(short_read_at(file, "stsd too short"));
    }
    skip(file, 4)?; // version + flags
    skip(file, 4)?; // entry count
    walk(file, payload_len - 8, state)
}

fn handle_alac(file: &mut File, state: &mut ParserState) -> Result<(), RaopError> {
    if state.descriptor.encoding == Encoding::Aac {
        return Err(RaopError::ContainerMalformed {
            reason: "alac sample description conflicts with earlier mp4a".to_string(),
            offset: file.stream_position()?,
        });
    }
    state.descriptor.encoding = Encoding::Alac;
    Ok(())
}

fn handle_mp4a(file: &mut File, state: &mut ParserState) -> Result<(), RaopError> {
    let _ = file;
    if state.descriptor.encoding != Encoding::Alac {
        state.descriptor.encoding = Encoding::Aac;
    }
    state.warn("mp4a sample description present; this client only streams ALAC");
    Ok(())
}

fn handle_stts(file: &mut File, state: &mut ParserState) -> Result<(), RaopError> {
    skip(file, 4)?; // version + flags
    let count = read_u32_here(file)?;
    let mut total: u64 = 0;
    for _ in 0..count {
        let frame_count = u64::from(read_u32_here(file)?);
        let duration = u64::from(read_u32_here(file)?);
        total += frame_count * duration;
    }
    #[allow(clippy::cast_possible_truncation)]
    state.set_duration(total.min(u64::from(u32::MAX)) as u32);
    Ok(())
}

fn handle_stsz(file: &mut File, state: &mut ParserState) -> Result<(), RaopError> {
    skip(file, 4)?; // version + flags
    let sample_size_for_all = read_u32_here(file)?;
    if sample_size_for_all != 0 {
        state.warn(format!(
            "stsz declares a uniform sample size ({sample_size_for_all}); expected per-sample sizes"
        ));
    }
    let sample_count = read_u32_here(file)?;
    let table_offset = file.stream_position()?;

    let mut total: u64 = 0;
    let mut largest: u32 = 0;
    for _ in 0..sample_count {
        let entry = read_u32_here(file)?;
        total += u64::from(entry);
        largest = largest.max(entry);
    }

    state.descriptor.sample_count = sample_count;
    state.descriptor.size_table_offset = table_offset;
    state.descriptor.total_sample_size = total;
    state.descriptor.largest_sample_size = largest;
    Ok(())
}

fn handle_mdat(file: &mut File, payload_len: u64, state: &mut ParserState) -> Result<(), RaopError> {
    state.descriptor.data_offset = file.stream_position()?;
    state.reconcile_mdat(payload_len);
    Ok(())
}

fn handle_meta(file: &mut File, payload_len: u64, state: &mut ParserState) -> Result<(), RaopError> {
    if payload_len < 4 {
        return Err(short_read_at(file, "meta too short"));
    }
    skip(file, 4)?; // version + flags
    walk(file, payload_len - 4, state)
}

/// Every direct child of `ilst` is an "Apple annotation" box: a
/// container whose own children are `data`/`mean`/`name` sub-boxes (or,
/// for a `----` freeform tag, those same three nested one level
/// deeper). We don't surface metadata to callers — the data model has
/// no field for it — but we still have to walk the structure correctly
/// so unrelated boxes after it parse cleanly.
fn handle_ilst(file: &mut File, payload_len: u64, state: &mut ParserState) -> Result<(), RaopError> {
    let start = file.stream_position()?;
    let end = start + payload_len;

    while file.stream_position()? < end {
        let box_start = file.stream_position()?;
        if end - box_start < BOX_HEADER_LEN {
            return Err(RaopError::ContainerMalformed {
                reason: "truncated ilst child header".to_string(),
                offset: box_start,
            });
        }
        let size = read_u32(file, box_start)? as u64;
        let mut kind = [0u8; 4];
        file.read_exact(&mut kind).map_err(|e| io_err(file, e))?;
        if size < BOX_HEADER_LEN || box_start + size > end {
            return Err(RaopError::ContainerMalformed {
                reason: "ilst child box overruns its container".to_string(),
                offset: box_start,
            });
        }
        parse_apple_annotation(file, box_start + size, &kind, state)?;
        file.seek(SeekFrom::Start(box_start + size))?;
    }
    Ok(())
}

fn parse_apple_annotation(
    file: &mut File,
    annotation_end: u64,
    outer_tag: &[u8; 4],
    state: &mut ParserState,
) -> Result<(), RaopError> {
    while file.stream_position()? + BOX_HEADER_LEN <= annotation_end {
        let sub_start = file.stream_position()?;
        let sub_size = read_u32(file, sub_start)? as u64;
        let mut sub_kind = [0u8; 4];
        file.read_exact(&mut sub_kind).map_err(|e| io_err(file, e))?;
        if sub_size < BOX_HEADER_LEN || sub_start + sub_size > annotation_end {
            return Err(RaopError::ContainerMalformed {
                reason: "metadata sub-box overruns its annotation".to_string(),
                offset: sub_start,
            });
        }
        let sub_payload_len = sub_size - BOX_HEADER_LEN;

        match &sub_kind {
            b"data" if sub_payload_len >= 8 => {
                let flags = read_u32_here(file)?;
                skip(file, 4)?; // locale, always 0
                let metadata_type = flags & 0x1F;
                let value_len = sub_payload_len - 8;
                let reported_tag = if outer_tag == b"----" { &sub_kind } else { outer_tag };
                tracing::trace!(
                    tag = %String::from_utf8_lossy(reported_tag),
                    metadata_type,
                    value_len,
                    "m4a metadata annotation (ignored)"
                );
            }
            b"mean" | b"name" => {
                // Domain / key-name sub-boxes for `----` freeform tags;
                // not needed without a metadata consumer.
            }
            _ => {
                state.warn(format!(
                    "unrecognized metadata sub-box {:?}",
                    String::from_utf8_lossy(&sub_kind)
                ));
            }
        }

        file.seek(SeekFrom::Start(sub_start + sub_size))?;
    }
    Ok(())
}

fn read_u32(file: &mut File, offset: u64) -> Result<u32, RaopError> {
    file.read_u32::<BigEndian>()
        .map_err(|e| short_read(offset, e))
}

fn read_u32_here(file: &mut File) -> Result<u32, RaopError> {
    let offset = file.stream_position()?;
    read_u32(file, offset)
}

fn skip(file: &mut File, n: u64) -> Result<(), RaopError> {
    file.seek(SeekFrom::Current(n as i64))?;
    Ok(())
}

fn short_read(offset: u64, e: std::io::Error) -> RaopError {
    RaopError::ContainerMalformed {
        reason: format!("short read: {e}"),
        offset,
    }
}

fn io_err(file: &mut File, e: std::io::Error) -> RaopError {
    let offset = file.stream_position().unwrap_or(0);
    short_read(offset, e)
}

fn short_read_at(file: &mut File, reason: &str) -> RaopError {
    let offset = file.stream_position().unwrap_or(0);
    RaopError::ContainerMalformed {
        reason: reason.to_string(),
        offset,
    }
}
