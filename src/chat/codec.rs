// src/chat/codec.rs
//
// STOMP 1.2 frame codec.
//
// Protocol reference: https://stomp.github.io/stomp-specification-1.2.html
//
// The chat backend speaks STOMP over WebSocket text messages, one STOMP
// frame per WebSocket message:
//   COMMAND\n
//   header:value\n
//   ...\n
//   \n
//   <body>\0
// Heart-beats are bare EOLs and decode to `None`.

use super::error::ChatError;

/// One STOMP frame. Headers keep wire order; repeated header names are
/// allowed and the first occurrence wins on lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// First value for a header name, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// Frame Constructors
// ============================================================================

/// Client CONNECT frame. Heart-beats are disabled; the channel task polls
/// the socket and notices a dead peer through the read path instead.
pub fn connect(host: &str) -> Frame {
    Frame::new("CONNECT")
        .with_header("accept-version", "1.1,1.2")
        .with_header("host", host)
        .with_header("heart-beat", "0,0")
}

/// SUBSCRIBE to one topic with a client-chosen subscription id.
pub fn subscribe(id: &str, destination: &str) -> Frame {
    Frame::new("SUBSCRIBE")
        .with_header("id", id)
        .with_header("destination", destination)
        .with_header("ack", "auto")
}

/// UNSUBSCRIBE a previously issued subscription id.
pub fn unsubscribe(id: &str) -> Frame {
    Frame::new("UNSUBSCRIBE").with_header("id", id)
}

/// SEND a plain-text body to a destination.
pub fn send(destination: &str, body: &str) -> Frame {
    Frame::new("SEND")
        .with_header("destination", destination)
        .with_header("content-type", "text/plain;charset=utf-8")
        .with_body(body)
}

pub fn disconnect() -> Frame {
    Frame::new("DISCONNECT")
}

// ============================================================================
// Encoding
// ============================================================================

/// Header escaping applies to every frame except CONNECT/CONNECTED.
fn escapes_headers(command: &str) -> bool {
    !matches!(command, "CONNECT" | "CONNECTED")
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, ChatError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::protocol(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Encode a frame to its wire form. A `content-length` header is added for
/// non-empty bodies so NUL bytes in the body cannot truncate the frame.
pub fn encode(frame: &Frame) -> String {
    let mut out = String::with_capacity(frame.body.len() + 64);
    out.push_str(&frame.command);
    out.push('\n');

    let escape = escapes_headers(&frame.command);
    for (name, value) in &frame.headers {
        if escape {
            out.push_str(&escape_header(name));
            out.push(':');
            out.push_str(&escape_header(value));
        } else {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }
    if !frame.body.is_empty() && frame.header("content-length").is_none() {
        out.push_str("content-length:");
        out.push_str(&frame.body.len().to_string());
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&frame.body);
    out.push('\0');
    out
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode one WebSocket text message into a frame.
/// Returns Ok(None) for heart-beats (bare EOLs).
pub fn decode(input: &str) -> Result<Option<Frame>, ChatError> {
    if input.trim_matches(|c| c == '\n' || c == '\r').is_empty() {
        return Ok(None);
    }

    let bytes = input.as_bytes();
    let (head_end, body_start) = find_body_split(bytes).ok_or_else(|| {
        ChatError::protocol("frame has no header/body separator (missing blank line)")
    })?;

    // Header section is ASCII-structured; the input is already valid UTF-8.
    let head = &input[..head_end];
    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let command = lines.next().unwrap_or("").to_string();
    if command.is_empty() {
        return Err(ChatError::protocol("empty command line"));
    }

    let escape = escapes_headers(&command);
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ChatError::protocol(format!("header line without ':': '{}'", line)))?;
        if escape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let rest = &bytes[body_start..];
    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.parse::<usize>()
                .map_err(|_| ChatError::protocol(format!("bad content-length '{}'", v)))
        })
        .transpose()?;

    let body_bytes = match content_length {
        Some(len) => {
            if rest.len() < len {
                return Err(ChatError::protocol(format!(
                    "body shorter than content-length: {} < {}",
                    rest.len(),
                    len
                )));
            }
            &rest[..len]
        }
        // Without content-length the body runs to the NUL terminator.
        None => match rest.iter().position(|&b| b == 0) {
            Some(nul) => &rest[..nul],
            None => rest,
        },
    };

    let body = std::str::from_utf8(body_bytes)
        .map_err(|_| ChatError::protocol("content-length cuts the body mid-character"))?
        .to_string();

    Ok(Some(Frame {
        command,
        headers,
        body,
    }))
}

/// Locate the blank line separating headers from body.
/// Returns (end of header section, start of body).
fn find_body_split(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                return Some((i, i + 2));
            }
            if i + 2 < bytes.len() && bytes[i + 1] == b'\r' && bytes[i + 2] == b'\n' {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_connect() {
        let encoded = encode(&connect("localhost"));
        assert_eq!(
            encoded,
            "CONNECT\naccept-version:1.1,1.2\nhost:localhost\nheart-beat:0,0\n\n\0"
        );
    }

    #[test]
    fn test_encode_send_adds_content_length() {
        let encoded = encode(&send("/app/chat/42", "hello"));
        assert!(encoded.starts_with("SEND\ndestination:/app/chat/42\n"));
        assert!(encoded.contains("content-length:5\n"));
        assert!(encoded.ends_with("\n\nhello\0"));
    }

    #[test]
    fn test_content_length_counts_bytes_not_chars() {
        let encoded = encode(&send("/app/chat/1", "질문"));
        // Two Hangul syllables are six UTF-8 bytes
        assert!(encoded.contains("content-length:6\n"));
    }

    #[test]
    fn test_decode_message_frame() {
        let wire = "MESSAGE\ndestination:/topic/messages/42\nmessage-id:7\nsubscription:sub-0\ncontent-length:33\n\n{\"sender\":\"AI\",\"content\":\"hello\"}\0";
        let frame = decode(wire).unwrap().unwrap();
        assert_eq!(frame.command, "MESSAGE");
        assert_eq!(frame.header("destination"), Some("/topic/messages/42"));
        assert_eq!(frame.body, r#"{"sender":"AI","content":"hello"}"#);
    }

    #[test]
    fn test_decode_heartbeat_is_none() {
        assert_eq!(decode("\n").unwrap(), None);
        assert_eq!(decode("\r\n").unwrap(), None);
    }

    #[test]
    fn test_decode_crlf_lines() {
        let wire = "CONNECTED\r\nversion:1.2\r\n\r\n\0";
        let frame = decode(wire).unwrap().unwrap();
        assert_eq!(frame.command, "CONNECTED");
        assert_eq!(frame.header("version"), Some("1.2"));
        assert_eq!(frame.body, "");
    }

    #[test]
    fn test_decode_body_without_content_length_stops_at_nul() {
        let wire = "MESSAGE\nsubscription:sub-0\n\nplain body\0";
        let frame = decode(wire).unwrap().unwrap();
        assert_eq!(frame.body, "plain body");
    }

    #[test]
    fn test_roundtrip_escaped_headers() {
        let original = Frame::new("SEND")
            .with_header("destination", "/queue/a:b")
            .with_header("odd\nname", "line\\break");
        let decoded = decode(&encode(&original)).unwrap().unwrap();
        assert_eq!(decoded.header("destination"), Some("/queue/a:b"));
        assert_eq!(decoded.header("odd\nname"), Some("line\\break"));
    }

    #[test]
    fn test_connect_headers_are_not_unescaped() {
        // CONNECT/CONNECTED are exempt from escaping per the 1.2 spec
        let wire = "CONNECTED\nserver:broker\\c1.0\n\n\0";
        let frame = decode(wire).unwrap().unwrap();
        assert_eq!(frame.header("server"), Some("broker\\c1.0"));
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        assert!(decode("MESSAGE\nno-blank-line").is_err());
    }

    #[test]
    fn test_decode_rejects_header_without_colon() {
        assert!(decode("MESSAGE\nbroken header\n\n\0").is_err());
    }

    #[test]
    fn test_decode_rejects_bad_escape() {
        assert!(decode("MESSAGE\na:b\\x\n\n\0").is_err());
    }

    #[test]
    fn test_decode_rejects_short_body() {
        assert!(decode("MESSAGE\ncontent-length:10\n\nabc\0").is_err());
    }
}
