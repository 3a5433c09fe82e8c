use bytes::{BufMut, BytesMut};

const TERMINATOR: &[u8] = b"\r\n";

/// Longest bulk string accepted, matching the store's own `proto-max-bulk-len`.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

#[derive(Debug, PartialEq, Clone)]
pub enum RespValue<'data> {
    SimpleString(&'data str),
    SimpleError(&'data str),
    Integer(i64),
    OwnedBulkString(String),
    BulkString(&'data str),
    NullBulkString,
    Array(Vec<RespValue<'data>>),
    NullArray,
    Null,
    Boolean(bool),
}

/// A decoded value and the bytes left over after it.
pub type Decoded<'data> = (RespValue<'data>, &'data [u8]);

impl<'data> RespValue<'data> {
    fn tag(&self) -> u8 {
        match self {
            RespValue::SimpleString(_) => b'+',
            RespValue::SimpleError(_) => b'-',
            RespValue::Integer(_) => b':',
            RespValue::OwnedBulkString(_) => b'$',
            RespValue::BulkString(_) => b'$',
            RespValue::NullBulkString => b'$',
            RespValue::Array(_) => b'*',
            RespValue::NullArray => b'*',
            RespValue::Null => b'_',
            RespValue::Boolean(_) => b'#',
        }
    }

    fn has_final_terminator(&self) -> bool {
        !matches!(self, RespValue::Array(_))
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tag());
        match self {
            RespValue::SimpleString(s) | RespValue::SimpleError(s) => {
                buf.put(s.as_bytes());
            }
            RespValue::Integer(n) => {
                buf.put(n.to_string().as_bytes());
            }
            RespValue::OwnedBulkString(s) => {
                buf.put(s.len().to_string().as_bytes());
                buf.put(TERMINATOR);
                buf.put(s.as_bytes());
            }
            RespValue::BulkString(s) => {
                buf.put(s.len().to_string().as_bytes());
                buf.put(TERMINATOR);
                buf.put(s.as_bytes());
            }
            RespValue::NullBulkString | RespValue::NullArray => {
                buf.put(&b"-1"[..]);
            }
            RespValue::Array(elements) => {
                buf.put(elements.len().to_string().as_bytes());
                buf.put(TERMINATOR);
                for e in elements.iter() {
                    e.serialize(buf);
                }
            }
            RespValue::Null => {}
            RespValue::Boolean(b) => {
                buf.put_u8(if *b { b't' } else { b'f' });
            }
        }
        if self.has_final_terminator() {
            buf.put(TERMINATOR);
        }
    }

    /// Decode one value from the front of `data`.
    ///
    /// Returns `Ok(None)` when `data` holds only the beginning of a frame, so the
    /// caller can read more bytes and try again.
    pub fn deserialize(data: &'data [u8]) -> anyhow::Result<Option<Decoded<'data>>> {
        if data.is_empty() {
            return Ok(None);
        }
        let Some(terminator_index) = find_terminator(data) else {
            return Ok(None);
        };
        let header = &data[1..terminator_index];
        let rest = &data[terminator_index + 2..];

        match data[0] {
            b'+' => {
                // Simple string: "+OK\r\n"
                Ok(Some((
                    RespValue::SimpleString(std::str::from_utf8(header)?),
                    rest,
                )))
            }
            b'-' => {
                // Simple error: "-ERR message\r\n"
                Ok(Some((
                    RespValue::SimpleError(std::str::from_utf8(header)?),
                    rest,
                )))
            }
            b':' => {
                // Integer: ":[<+|->]<value>\r\n"
                match std::str::from_utf8(header).ok().and_then(|s| s.parse::<i64>().ok()) {
                    Some(n) => Ok(Some((RespValue::Integer(n), rest))),
                    None => Err(anyhow::format_err!("invalid integer")),
                }
            }
            b'$' => {
                // Bulk string: "$<length>\r\n<data>\r\n"
                let digits_str = std::str::from_utf8(header)
                    .map_err(|_| anyhow::format_err!("invalid bulk string"))?;
                if digits_str == "-1" {
                    return Ok(Some((RespValue::NullBulkString, rest)));
                }
                let data_len = digits_str
                    .parse::<usize>()
                    .map_err(|_| anyhow::format_err!("invalid bulk string length"))?;
                if data_len > MAX_BULK_LEN {
                    return Err(anyhow::format_err!(
                        "bulk string length {} exceeds {}",
                        data_len,
                        MAX_BULK_LEN
                    ));
                }
                let frame_len = data_len + TERMINATOR.len();
                if rest.len() < frame_len {
                    return Ok(None);
                }
                if &rest[data_len..frame_len] != TERMINATOR {
                    return Err(anyhow::format_err!("unterminated bulk string"));
                }
                let string = std::str::from_utf8(&rest[..data_len])
                    .map_err(|_| anyhow::format_err!("invalid bulk string"))?;
                Ok(Some((RespValue::BulkString(string), &rest[frame_len..])))
            }
            b'*' => {
                // Array: "*<number-of-elements>\r\n<element-1>...<element-n>"
                let digits_str = std::str::from_utf8(header)
                    .map_err(|_| anyhow::format_err!("invalid array"))?;
                if digits_str == "-1" {
                    return Ok(Some((RespValue::NullArray, rest)));
                }
                let num_elements = digits_str
                    .parse::<usize>()
                    .map_err(|_| anyhow::format_err!("invalid array length"))?;
                let mut rest = rest;
                let mut elements = Vec::new();
                for _ in 0..num_elements {
                    match RespValue::deserialize(rest)? {
                        Some((element, remaining)) => {
                            elements.push(element);
                            rest = remaining;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((RespValue::Array(elements), rest)))
            }
            b'_' => {
                // Null: "_\r\n"
                if header.is_empty() {
                    Ok(Some((RespValue::Null, rest)))
                } else {
                    Err(anyhow::format_err!("non-empty null"))
                }
            }
            b'#' => {
                // Boolean: "#<t|f>\r\n"
                match header {
                    b"t" => Ok(Some((RespValue::Boolean(true), rest))),
                    b"f" => Ok(Some((RespValue::Boolean(false), rest))),
                    _ => Err(anyhow::format_err!("invalid boolean")),
                }
            }
            tag => Err(anyhow::format_err!("unsupported RESP tag {:?}", tag as char)),
        }
    }
}

/// Find `Some(index)` of the first occurence of b'\r\n' in the slice,
/// or `None` if the slice doesn't contain a terminator.
fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}
