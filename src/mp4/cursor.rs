//! Random-access sample cursor over a parsed M4A file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

use super::descriptor::M4aDescriptor;
use crate::error::RaopError;

const FRAMES_PER_SAMPLE: u64 = 4096;

/// Two independent read positions into the same file: one walking the
/// `stsz` size table, one walking the `mdat` payload. Two file handles
/// rather than one cursor juggling seeks, so a `next_sample` call never
/// has to seek between the two regions.
pub struct M4aCursor {
    size_table: File,
    data: File,
    descriptor: M4aDescriptor,
}

impl M4aCursor {
    pub(crate) fn open(path: &Path, descriptor: M4aDescriptor) -> Result<Self, RaopError> {
        let mut size_table = File::open(path)?;
        let mut data = File::open(path)?;
        size_table.seek(SeekFrom::Start(descriptor.size_table_offset))?;
        data.seek(SeekFrom::Start(descriptor.data_offset))?;
        Ok(Self {
            size_table,
            data,
            descriptor,
        })
    }

    /// Position both cursors at the sample nearest `t` seconds in.
    ///
    /// # Errors
    /// Returns `RaopError::SeekOutOfRange` if `t` is at or beyond the
    /// file's duration.
    pub fn seek_to_time(&mut self, t: f64) -> Result<(), RaopError> {
        let duration_secs = self.descriptor.duration_secs();
        if t < 0.0 || t >= duration_secs {
            return Err(RaopError::SeekOutOfRange {
                requested_secs: t,
                duration_secs,
            });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let k = ((f64::from(self.descriptor.timescale) * t) / FRAMES_PER_SAMPLE as f64) as u64;
        if k >= u64::from(self.descriptor.sample_count) {
            return Err(RaopError::SeekOutOfRange {
                requested_secs: t,
                duration_secs,
            });
        }

        self.size_table
            .seek(SeekFrom::Start(self.descriptor.size_table_offset))?;
        self.data.seek(SeekFrom::Start(self.descriptor.data_offset))?;

        let mut skip_bytes: u64 = 0;
        for _ in 0..k {
            skip_bytes += u64::from(self.size_table.read_u32::<BigEndian>()?);
        }
        self.data
            .seek(SeekFrom::Start(self.descriptor.data_offset + skip_bytes))?;

        Ok(())
    }

    /// Index of the next sample that `next_sample` will return.
    pub fn current_index(&mut self) -> Result<u32, RaopError> {
        let pos = self.size_table.stream_position()?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(((pos - self.descriptor.size_table_offset) / 4) as u32)
    }

    /// Whether any samples remain.
    pub fn has_more(&mut self) -> Result<bool, RaopError> {
        Ok(self.current_index()? < self.descriptor.sample_count)
    }

    /// Read the next sample into `out_buf`, resizing it to fit, and
    /// return its length in bytes.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` (file I/O) on a short read from
    /// either the size table or the data region.
    pub fn next_sample(&mut self, out_buf: &mut Vec<u8>) -> Result<u32, RaopError> {
        let size = self.size_table.read_u32::<BigEndian>()?;
        out_buf.resize(size as usize, 0);
        self.data.read_exact(out_buf)?;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::parser;
    use std::io::Write;

    fn be32(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    fn write_box(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) {
        let size = 8 + payload.len() as u32;
        out.extend_from_slice(&be32(size));
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
    }

    fn build_fixture(sample_count: u32, sample_bytes: u32, timescale: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let mut ftyp_payload = Vec::new();
        ftyp_payload.extend_from_slice(b"M4A ");
        ftyp_payload.extend_from_slice(&be32(0));
        write_box(&mut out, b"ftyp", &ftyp_payload);

        let mut mvhd = Vec::new();
        mvhd.push(0);
        mvhd.extend_from_slice(&[0, 0, 0]);
        mvhd.extend_from_slice(&be32(0));
        mvhd.extend_from_slice(&be32(0));
        mvhd.extend_from_slice(&be32(timescale));
        mvhd.extend_from_slice(&be32(sample_count * 4096));
        let mut mvhd_box = Vec::new();
        write_box(&mut mvhd_box, b"mvhd", &mvhd);

        let mut alac_box = Vec::new();
        write_box(&mut alac_box, b"alac", &[0u8; 4]);
        let mut stsd_payload = Vec::new();
        stsd_payload.extend_from_slice(&be32(0));
        stsd_payload.extend_from_slice(&be32(1));
        stsd_payload.extend_from_slice(&alac_box);
        let mut stsd_box = Vec::new();
        write_box(&mut stsd_box, b"stsd", &stsd_payload);

        let mut stsz_payload = Vec::new();
        stsz_payload.extend_from_slice(&be32(0));
        stsz_payload.extend_from_slice(&be32(0));
        stsz_payload.extend_from_slice(&be32(sample_count));
        for i in 0..sample_count {
            stsz_payload.extend_from_slice(&be32(sample_bytes + (i % 3)));
        }
        let mut stsz_box = Vec::new();
        write_box(&mut stsz_box, b"stsz", &stsz_payload);

        let mut stbl_payload = Vec::new();
        stbl_payload.extend_from_slice(&stsd_box);
        stbl_payload.extend_from_slice(&stsz_box);
        let mut stbl_box = Vec::new();
        write_box(&mut stbl_box, b"stbl", &stbl_payload);
        let mut minf_box = Vec::new();
        write_box(&mut minf_box, b"minf", &stbl_box);
        let mut mdia_box = Vec::new();
        write_box(&mut mdia_box, b"mdia", &minf_box);
        let mut trak_box = Vec::new();
        write_box(&mut trak_box, b"trak", &mdia_box);

        let mut moov_payload = Vec::new();
        moov_payload.extend_from_slice(&mvhd_box);
        moov_payload.extend_from_slice(&trak_box);
        let mut moov_box = Vec::new();
        write_box(&mut moov_box, b"moov", &moov_payload);
        out.extend_from_slice(&moov_box);

        let mut payload = Vec::new();
        for i in 0..sample_count {
            let len = sample_bytes + (i % 3);
            payload.extend((0..len).map(|b| (b % 256) as u8));
        }
        write_box(&mut out, b"mdat", &payload);
        out
    }

    fn fixture_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn iterates_every_sample_and_consumes_all_media_data() {
        let bytes = build_fixture(20, 256, 44100);
        let tmp = fixture_file(&bytes);
        let mut file = File::open(tmp.path()).unwrap();
        let descriptor = parser::parse(&mut file).unwrap();

        let mut cursor = M4aCursor::open(tmp.path(), descriptor.clone()).unwrap();
        let mut buf = Vec::new();
        let mut total = 0u64;
        let mut count = 0;
        while cursor.has_more().unwrap() {
            let n = cursor.next_sample(&mut buf).unwrap();
            total += u64::from(n);
            count += 1;
        }

        assert_eq!(count, descriptor.sample_count);
        assert_eq!(total, descriptor.total_sample_size);
        assert!(!cursor.has_more().unwrap());
    }

    #[test]
    fn seek_to_time_lands_on_expected_index() {
        let bytes = build_fixture(100, 100, 4096);
        let tmp = fixture_file(&bytes);
        let mut file = File::open(tmp.path()).unwrap();
        let descriptor = parser::parse(&mut file).unwrap();

        let mut cursor = M4aCursor::open(tmp.path(), descriptor).unwrap();
        // timescale == 4096 means one sample per second exactly.
        cursor.seek_to_time(10.0).unwrap();
        assert_eq!(cursor.current_index().unwrap(), 10);
    }

    #[test]
    fn seek_beyond_duration_fails_without_side_effects() {
        let bytes = build_fixture(10, 64, 4096);
        let tmp = fixture_file(&bytes);
        let mut file = File::open(tmp.path()).unwrap();
        let descriptor = parser::parse(&mut file).unwrap();

        let mut cursor = M4aCursor::open(tmp.path(), descriptor).unwrap();
        let before = cursor.current_index().unwrap();
        assert!(cursor.seek_to_time(1000.0).is_err());
        assert_eq!(cursor.current_index().unwrap(), before);
    }
}
