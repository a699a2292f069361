//! Wire format shared by the highlighting service and its clients.
//!
//! Frames are terminated by a single null byte and carry no length prefix:
//!
//! ```text
//! request  = LANGUAGE ":" CODE "\0"
//! response = (HTML | "error:" MESSAGE) "\0"
//! ```
//!
//! Requests carry no identifier. A connection answers its requests one at a
//! time in arrival order, so a client must match responses to requests by
//! position alone.

use thiserror::Error;

/// Terminates every request and response frame.
pub const DELIMITER: u8 = 0;

/// Separates the language from the code in a request frame.
pub const SEPARATOR: char = ':';

/// Marks a response frame as an error message rather than HTML.
pub const ERROR_PREFIX: &str = "error:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid request: no ':' found")]
    MissingSeparator,

    #[error("language {0:?} cannot be framed: it contains ':' or a null byte")]
    InvalidLanguage(String),

    #[error("code cannot be framed: it contains a null byte")]
    NullInCode,
}

/// Encode a request frame, including its terminating null byte.
pub fn encode_request(language: &str, code: &str) -> Result<Vec<u8>, ProtocolError> {
    if language.contains(SEPARATOR) || language.as_bytes().contains(&DELIMITER) {
        return Err(ProtocolError::InvalidLanguage(language.to_string()));
    }
    if code.as_bytes().contains(&DELIMITER) {
        return Err(ProtocolError::NullInCode);
    }

    let mut frame = Vec::with_capacity(language.len() + code.len() + 2);
    frame.extend_from_slice(language.as_bytes());
    frame.push(SEPARATOR as u8);
    frame.extend_from_slice(code.as_bytes());
    frame.push(DELIMITER);
    Ok(frame)
}

/// Split a request frame (without its terminator) into language and code.
///
/// Only the first `:` separates; the code may contain any number of them.
pub fn parse_request(frame: &str) -> Result<(&str, &str), ProtocolError> {
    frame
        .split_once(SEPARATOR)
        .ok_or(ProtocolError::MissingSeparator)
}

/// A single response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Html(String),
    Error(String),
}

impl Response {
    /// Encode the response, including its terminating null byte.
    ///
    /// Null bytes in the payload would end the frame early, so they are
    /// dropped.
    pub fn encode(&self) -> Vec<u8> {
        let (prefix, body) = match self {
            Response::Html(html) => ("", html.as_str()),
            Response::Error(message) => (ERROR_PREFIX, message.as_str()),
        };
        let mut frame = Vec::with_capacity(prefix.len() + body.len() + 1);
        frame.extend_from_slice(prefix.as_bytes());
        frame.extend(body.bytes().filter(|b| *b != DELIMITER));
        frame.push(DELIMITER);
        frame
    }

    /// Decode a response frame (without its terminator).
    pub fn decode(frame: &[u8]) -> Self {
        let text = String::from_utf8_lossy(frame);
        match text.strip_prefix(ERROR_PREFIX) {
            Some(message) => Response::Error(message.to_string()),
            None => Response::Html(text.into_owned()),
        }
    }

    pub fn into_result(self) -> Result<String, String> {
        match self {
            Response::Html(html) => Ok(html),
            Response::Error(message) => Err(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_layout() {
        let frame = encode_request("rust", "fn main() {}").unwrap();
        assert_eq!(frame, b"rust:fn main() {}\0");
    }

    #[test]
    fn rejects_unframeable_requests() {
        assert_eq!(
            encode_request("c:pp", "x"),
            Err(ProtocolError::InvalidLanguage("c:pp".into()))
        );
        assert_eq!(encode_request("c", "a\0b"), Err(ProtocolError::NullInCode));
    }

    #[test]
    fn parse_splits_on_first_separator() {
        assert_eq!(
            parse_request("python:d = {'a': 1}"),
            Ok(("python", "d = {'a': 1}"))
        );
        assert_eq!(parse_request(":"), Ok(("", "")));
        assert_eq!(parse_request("no separator"), Err(ProtocolError::MissingSeparator));
    }

    #[test]
    fn error_responses_carry_prefix() {
        let frame = Response::Error("\"cobol\": unsupported language".into()).encode();
        assert_eq!(frame, b"error:\"cobol\": unsupported language\0");

        let decoded = Response::decode(&frame[..frame.len() - 1]);
        assert_eq!(
            decoded,
            Response::Error("\"cobol\": unsupported language".into())
        );
    }

    #[test]
    fn html_response_is_passed_through() {
        let decoded = Response::decode(b"<span class=\"kw\">fn</span>");
        assert_eq!(
            decoded.into_result(),
            Ok("<span class=\"kw\">fn</span>".to_string())
        );
    }
}
