//! M4A container parsing: a recursive box walker plus a random-access
//! sample cursor over the result.

pub mod cursor;
pub mod descriptor;
pub mod parser;

use std::fs::File;
use std::path::{Path, PathBuf};

pub use cursor::M4aCursor;
pub use descriptor::{Encoding, M4aDescriptor, ParseStatus};

use crate::error::RaopError;

/// An M4A file that has been parsed once; the entry point for both
/// inspecting the track (duration, encoding) and opening a sample
/// cursor for playback.
pub struct M4aFile {
    path: PathBuf,
    descriptor: M4aDescriptor,
}

impl M4aFile {
    /// Parse `path` as an M4A/ALAC container.
    ///
    /// # Errors
    /// Returns `RaopError::ContainerMalformed` if the file cannot be
    /// opened or does not contain a valid ALAC track, and
    /// `RaopError::NetworkIo` on any underlying file I/O failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RaopError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let descriptor = parser::parse(&mut file)?;
        Ok(Self { path, descriptor })
    }

    /// The parsed descriptor (timescale, duration, sample table
    /// location, encoding, ...).
    #[must_use]
    pub fn descriptor(&self) -> &M4aDescriptor {
        &self.descriptor
    }

    /// Open a sample cursor over this file's media data.
    ///
    /// # Errors
    /// Returns `RaopError::NetworkIo` if the file cannot be reopened.
    pub fn cursor(&self) -> Result<M4aCursor, RaopError> {
        M4aCursor::open(&self.path, self.descriptor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn minimal_alac_file(sample_count: u32, sample_bytes: u32) -> Vec<u8> {
        let mut out = Vec::new();
        write_box(&mut out, b"ftyp", b"M4A \0\0\0\0");

        let mut mvhd = vec![0u8, 0, 0, 0];
        mvhd.extend_from_slice(&be32(0));
        mvhd.extend_from_slice(&be32(0));
        mvhd.extend_from_slice(&be32(44100));
        mvhd.extend_from_slice(&be32(sample_count * 4096));
        let mut mvhd_box = Vec::new();
        write_box(&mut mvhd_box, b"mvhd", &mvhd);

        let mut alac_box = Vec::new();
        write_box(&mut alac_box, b"alac", &[0u8; 4]);
        let mut stsd_payload = be32(0).to_vec();
        stsd_payload.extend_from_slice(&be32(1));
        stsd_payload.extend_from_slice(&alac_box);
        let mut stsd_box = Vec::new();
        write_box(&mut stsd_box, b"stsd", &stsd_payload);

        let mut stsz_payload = be32(0).to_vec();
        stsz_payload.extend_from_slice(&be32(0));
        stsz_payload.extend_from_slice(&be32(sample_count));
        for _ in 0..sample_count {
            stsz_payload.extend_from_slice(&be32(sample_bytes));
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

        let payload = vec![0xABu8; (sample_count * sample_bytes) as usize];
        write_box(&mut out, b"mdat", &payload);
        out
    }

    #[test]
    fn open_then_cursor_roundtrips() {
        let bytes = minimal_alac_file(5, 64);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&bytes).unwrap();
        tmp.flush().unwrap();

        let m4a = M4aFile::open(tmp.path()).unwrap();
        assert_eq!(m4a.descriptor().encoding, Encoding::Alac);
        assert!((m4a.descriptor().duration_secs() - (5.0 * 4096.0 / 44100.0)).abs() < 1e-9);

        let mut cursor = m4a.cursor().unwrap();
        let mut buf = Vec::new();
        let mut n = 0;
        while cursor.has_more().unwrap() {
            cursor.next_sample(&mut buf).unwrap();
            n += 1;
        }
        assert_eq!(n, 5);
    }
}
