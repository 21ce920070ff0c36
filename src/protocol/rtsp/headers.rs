//! Header name constants shared by the request builder and response
//! parser. Header *values* are never collected into a map — see
//! `response`'s module doc for why.

pub const CSEQ: &str = "CSeq";
pub const SESSION: &str = "Session";
pub const TRANSPORT: &str = "Transport";
pub const RANGE: &str = "Range";
pub const RTP_INFO: &str = "RTP-Info";
pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
