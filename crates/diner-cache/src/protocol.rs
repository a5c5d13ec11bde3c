//! Memcache text protocol codec.
//!
//! Only the three commands the coordinator needs are supported:
//!
//! ```text
//! get <key>\r\n                      -> VALUE <key> <flags> <bytes>\r\n<data>\r\nEND\r\n | END\r\n
//! set <key> <flags> <exptime> <n>\r\n<data>\r\n -> STORED\r\n | NOT_STORED\r\n
//! delete <key>\r\n                   -> DELETED\r\n | NOT_FOUND\r\n
//! ```

use bytes::Bytes;

/// Longest key memcached accepts
pub const MAX_KEY_LEN: usize = 250;

const CRLF: &[u8] = b"\r\n";

/// Protocol parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// More bytes are needed to complete the reply
    #[error("incomplete reply")]
    Incomplete,
    /// The bytes are not a valid reply
    #[error("invalid reply: {0}")]
    Invalid(String),
}

/// A parsed server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Result of a `get`: `Some` on hit, `None` on miss
    Value(Option<Bytes>),
    Stored,
    NotStored,
    Deleted,
    NotFound,
    /// `ERROR`, `CLIENT_ERROR …` or `SERVER_ERROR …`
    Error(String),
}

/// Check that `key` is a legal memcached key
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.bytes().all(|b| b.is_ascii_graphic())
}

/// Encodes a GET command
#[must_use]
pub fn encode_get(key: &str) -> Vec<u8> {
    format!("get {key}\r\n").into_bytes()
}

/// Encodes a SET command
#[must_use]
pub fn encode_set(key: &str, value: &[u8], flags: u32, exptime: u32) -> Vec<u8> {
    let mut buf = format!("set {key} {flags} {exptime} {}\r\n", value.len()).into_bytes();
    buf.reserve(value.len() + CRLF.len());
    buf.extend_from_slice(value);
    buf.extend_from_slice(CRLF);
    buf
}

/// Encodes a DELETE command
#[must_use]
pub fn encode_delete(key: &str) -> Vec<u8> {
    format!("delete {key}\r\n").into_bytes()
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(CRLF.len()).position(|w| w == CRLF)
}

fn invalid(msg: impl Into<String>) -> ParseError {
    ParseError::Invalid(msg.into())
}

/// Parse one reply from the front of `data`.
///
/// Returns the reply and the number of bytes it occupied.
///
/// # Errors
/// `ParseError::Incomplete` if `data` ends mid-reply, `ParseError::Invalid`
/// if it is not a reply this codec understands.
pub fn parse_reply(data: &[u8]) -> Result<(Reply, usize), ParseError> {
    let line_end = find_crlf(data).ok_or(ParseError::Incomplete)?;
    let line = std::str::from_utf8(&data[..line_end])
        .map_err(|_| invalid("reply line is not UTF-8"))?;
    let consumed = line_end + CRLF.len();

    let reply = match line {
        "END" => Reply::Value(None),
        "STORED" => Reply::Stored,
        "NOT_STORED" | "EXISTS" => Reply::NotStored,
        "DELETED" => Reply::Deleted,
        "NOT_FOUND" => Reply::NotFound,
        "ERROR" => Reply::Error(line.to_string()),
        _ if line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") => {
            Reply::Error(line.to_string())
        }
        _ if line.starts_with("VALUE ") => return parse_value(line, &data[consumed..], consumed),
        _ => return Err(invalid(format!("unexpected reply line: {line}"))),
    };
    Ok((reply, consumed))
}

/// Parse the data block and trailing `END` of a `VALUE` reply.
fn parse_value(header: &str, rest: &[u8], header_len: usize) -> Result<(Reply, usize), ParseError> {
    // VALUE <key> <flags> <bytes> [<cas unique>]
    let fields: Vec<&str> = header.split(' ').collect();
    if fields.len() < 4 {
        return Err(invalid(format!("malformed VALUE line: {header}")));
    }
    let len: usize = fields[3]
        .parse()
        .map_err(|_| invalid(format!("bad VALUE length: {}", fields[3])))?;

    let block_end = len + CRLF.len();
    if rest.len() < block_end {
        return Err(ParseError::Incomplete);
    }
    if &rest[len..block_end] != CRLF {
        return Err(invalid("VALUE data block not terminated by CRLF"));
    }

    let trailer = &rest[block_end..];
    const END: &[u8] = b"END\r\n";
    if trailer.len() < END.len() {
        return if END.starts_with(trailer) {
            Err(ParseError::Incomplete)
        } else {
            Err(invalid("expected END after VALUE"))
        };
    }
    if &trailer[..END.len()] != END {
        return Err(invalid("expected END after VALUE"));
    }

    let data = Bytes::copy_from_slice(&rest[..len]);
    Ok((Reply::Value(Some(data)), header_len + block_end + END.len()))
}
