//! A minimal, well-formed ALAC M4A byte stream, built by hand rather
//! than shipped as a binary test asset.

fn be32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

fn write_box(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) {
    let size = 8 + payload.len() as u32;
    out.extend_from_slice(&be32(size));
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
}

/// Build an M4A file containing one ALAC track with `sample_count`
/// samples, each `sample_bytes` long, at the given `timescale`.
#[must_use]
pub fn build_alac_fixture(sample_count: u32, sample_bytes: u32, timescale: u32) -> Vec<u8> {
    let mut out = Vec::new();
    write_box(&mut out, b"ftyp", b"M4A \0\0\0\0");

    let mut mvhd = vec![0u8, 0, 0, 0];
    mvhd.extend_from_slice(&be32(0));
    mvhd.extend_from_slice(&be32(0));
    mvhd.extend_from_slice(&be32(timescale));
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
