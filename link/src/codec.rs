//! Text frame codec.
//!
//! Wire layout of one frame:
//!
//! ```text
//! COMMAND\n
//! key:value\n        (zero or more)
//! \n
//! <body>\0
//! ```
//!
//! A bare end-of-line between frames is a heartbeat. Header values are
//! escaped (`\\`, `\n`, `\r`, `\c`) on every command except CONNECT and
//! CONNECTED. When a `content-length` header is present the body is read by
//! length (and may contain NUL bytes); otherwise it runs to the first NUL.
//!
//! [`FrameDecoder`] buffers across transport messages, so a frame split over
//! two WebSocket messages, or several frames batched into one, decode the
//! same way.

use crate::error::{ParkLinkError, Result};
use crate::frame::{Command, Frame, HEADER_CONTENT_LENGTH};

/// Default upper bound for one buffered frame (headers + body).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 << 20;

const NUL: u8 = 0;

/// Encode a frame into its wire bytes.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    if frame.command() == Command::Heartbeat {
        return b"\n".to_vec();
    }

    let escape = frame.command().escapes_headers();
    let mut out = Vec::with_capacity(64 + frame.body_bytes().len());
    out.extend_from_slice(frame.command().as_str().as_bytes());
    out.push(b'\n');

    for (key, value) in frame.headers() {
        if escape {
            out.extend_from_slice(escape_header(key).as_bytes());
            out.push(b':');
            out.extend_from_slice(escape_header(value).as_bytes());
        } else {
            out.extend_from_slice(key.as_bytes());
            out.push(b':');
            out.extend_from_slice(value.as_bytes());
        }
        out.push(b'\n');
    }

    if frame.has_body() && frame.get_header(HEADER_CONTENT_LENGTH).is_none() {
        out.extend_from_slice(
            format!("{}:{}\n", HEADER_CONTENT_LENGTH, frame.body_bytes().len()).as_bytes(),
        );
    }

    out.push(b'\n');
    out.extend_from_slice(frame.body_bytes());
    out.push(NUL);
    out
}

/// Encode a frame for a text transport. Fails when the body is not UTF-8.
pub fn encode_text(frame: &Frame) -> Result<String> {
    String::from_utf8(encode_frame(frame)).map_err(|_| {
        ParkLinkError::SerializationError(format!(
            "{} frame body is not valid UTF-8",
            frame.command()
        ))
    })
}

/// Decode exactly one complete frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = decoder.push(bytes).into_iter();
    loop {
        match frames.next() {
            Some(Ok(frame)) if frame.command() == Command::Heartbeat => continue,
            Some(result) => return result,
            None => {
                return Err(ParkLinkError::ProtocolError(
                    "Incomplete frame: missing NUL terminator".to_string(),
                ))
            },
        }
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(ParkLinkError::ProtocolError(format!(
                    "Undefined header escape sequence '\\{}'",
                    other
                )))
            },
            None => {
                return Err(ParkLinkError::ProtocolError(
                    "Header ends with a dangling escape".to_string(),
                ))
            },
        }
    }
    Ok(out)
}

/// Returns `(end_of_headers, start_of_body)` for the first blank line.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some((i, i + 2));
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

fn parse_head(head: &[u8]) -> Result<(Command, Vec<(String, String)>)> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ParkLinkError::ProtocolError("Frame headers are not UTF-8".to_string()))?;

    let mut lines = text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
    let command_line = lines
        .next()
        .ok_or_else(|| ParkLinkError::ProtocolError("Frame without a command".to_string()))?;
    let command = Command::parse(command_line)?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| {
            ParkLinkError::ProtocolError(format!("Malformed header line '{}'", line))
        })?;
        if escaped {
            headers.push((unescape_header(key)?, unescape_header(value)?));
        } else {
            headers.push((key.to_string(), value.to_string()));
        }
    }
    Ok((command, headers))
}

/// Incremental decoder for a stream of frames and heartbeats.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_bytes: usize,
    /// Set after a malformed frame: discard input up to the next NUL.
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes: max_frame_bytes.max(1),
            discarding: false,
        }
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Feed raw bytes and return every frame (or heartbeat, or protocol
    /// error) that is now complete, in wire order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Frame>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(item) = self.next_frame() {
            out.push(item);
        }
        out
    }

    fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            if self.discarding {
                match self.buf.iter().position(|b| *b == NUL) {
                    Some(pos) => {
                        self.buf.drain(..=pos);
                        self.discarding = false;
                    },
                    None => {
                        self.buf.clear();
                        return None;
                    },
                }
            }

            match self.buf.first() {
                None => return None,
                Some(b'\n') => {
                    self.buf.drain(..1);
                    return Some(Ok(Frame::heartbeat()));
                },
                Some(b'\r') => {
                    if self.buf.len() < 2 {
                        return None;
                    }
                    if self.buf[1] == b'\n' {
                        self.buf.drain(..2);
                        return Some(Ok(Frame::heartbeat()));
                    }
                },
                Some(&NUL) => {
                    self.buf.drain(..1);
                    continue;
                },
                Some(_) => {},
            }

            let Some((head_end, body_start)) = find_header_end(&self.buf) else {
                return self.check_oversize();
            };

            let (command, headers) = match parse_head(&self.buf[..head_end]) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.discarding = true;
                    return Some(Err(e));
                },
            };

            let content_length = headers
                .iter()
                .find(|(k, _)| k == HEADER_CONTENT_LENGTH)
                .map(|(_, v)| v.trim().parse::<usize>());

            let (body_end, frame_end) = match content_length {
                Some(Ok(len)) => {
                    let body_end = match body_start.checked_add(len) {
                        Some(end) if len <= self.max_frame_bytes => end,
                        _ => {
                            self.discarding = true;
                            return Some(Err(ParkLinkError::ProtocolError(format!(
                                "{} frame content-length {} exceeds {} bytes",
                                command, len, self.max_frame_bytes
                            ))));
                        },
                    };
                    if self.buf.len() <= body_end {
                        return self.check_oversize();
                    }
                    if self.buf[body_end] != NUL {
                        self.discarding = true;
                        return Some(Err(ParkLinkError::ProtocolError(format!(
                            "{} frame body does not end at content-length {}",
                            command, len
                        ))));
                    }
                    (body_end, body_end + 1)
                },
                Some(Err(_)) => {
                    self.discarding = true;
                    return Some(Err(ParkLinkError::ProtocolError(format!(
                        "{} frame has an invalid content-length header",
                        command
                    ))));
                },
                None => match self.buf[body_start..].iter().position(|b| *b == NUL) {
                    Some(pos) => (body_start + pos, body_start + pos + 1),
                    None => return self.check_oversize(),
                },
            };

            let mut frame = Frame::new(command);
            for (k, v) in headers {
                frame = frame.header(k, v);
            }
            frame = frame.body(self.buf[body_start..body_end].to_vec());
            self.buf.drain(..frame_end);
            return Some(Ok(frame));
        }
    }

    fn check_oversize(&mut self) -> Option<Result<Frame>> {
        if self.buf.len() > self.max_frame_bytes {
            let len = self.buf.len();
            self.buf.clear();
            self.discarding = true;
            return Some(Err(ParkLinkError::ProtocolError(format!(
                "Frame exceeds {} bytes ({} buffered); discarded",
                self.max_frame_bytes, len
            ))));
        }
        None
    }
}
