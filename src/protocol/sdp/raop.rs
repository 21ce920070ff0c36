//! The literal SDP body ANNOUNCE sends.

/// Build the ANNOUNCE SDP body for a stream at `timescale` Hz from
/// `local_ip` to `remote_ip`.
#[must_use]
pub fn announce_sdp(local_ip: &str, remote_ip: &str, timescale: u32) -> String {
    format!(
        "v=0\r\n\
         o=iTunes 1 O IN IP4 {local_ip}\r\n\
         s=iTunes\r\n\
         c=IN IP4 {remote_ip}\r\n\
         t=0 0\r\n\
         m=audio 0 RTP/AVP 96\r\n\
         a=rtpmap:96 AppleLossless\r\n\
         a=fmtp:96 4096 0 16 40 10 14 2 255 0 0 {timescale}\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_literal_template() {
        let sdp = announce_sdp("192.168.1.5", "192.168.1.10", 44100);
        assert_eq!(
            sdp,
            "v=0\r\n\
             o=iTunes 1 O IN IP4 192.168.1.5\r\n\
             s=iTunes\r\n\
             c=IN IP4 192.168.1.10\r\n\
             t=0 0\r\n\
             m=audio 0 RTP/AVP 96\r\n\
             a=rtpmap:96 AppleLossless\r\n\
             a=fmtp:96 4096 0 16 40 10 14 2 255 0 0 44100\r\n"
        );
    }
}
