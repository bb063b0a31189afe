// src/varnish/response.rs
use super::error::VarnishError;

/// Unsolicited greeting sent on a fresh connection when auth is required.
pub const STATUS_AUTH: u16 = 107;
pub const STATUS_OK: u16 = 200;

const MAX_STATUS_DIGITS: usize = 3;
const MAX_LENGTH_DIGITS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// First line of the body, used for the auth challenge.
    pub fn first_line(&self) -> &str {
        self.body.lines().next().unwrap_or("")
    }
}

/// Header line in the `"%03d %8d\n"` layout.
pub fn encode_header(status: u16, length: usize) -> String {
    format!("{:03} {:8}\n", status, length)
}

/// Parses a header line into `(status, body_length)`.
///
/// Varnish pads the header with spaces, so any whitespace between and after
/// the two fields is accepted. Anything other than exactly two numeric fields
/// is rejected.
pub fn parse_header(line: &str) -> Result<(u16, usize), VarnishError> {
    let malformed = || VarnishError::MalformedHeader(line.trim_end().to_string());

    let mut fields = line.split_whitespace();
    let (status, length) = match (fields.next(), fields.next(), fields.next()) {
        (Some(status), Some(length), None) => (status, length),
        _ => return Err(malformed()),
    };

    if status.len() > MAX_STATUS_DIGITS || length.len() > MAX_LENGTH_DIGITS {
        return Err(malformed());
    }
    if !status.bytes().all(|b| b.is_ascii_digit()) || !length.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let status = status.parse().map_err(|_| malformed())?;
    let length = length.parse().map_err(|_| malformed())?;
    Ok((status, length))
}
