//! Operator response types

use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};
use memsync_core::VersionStamp;
use serde::Serialize;

/// An operator response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// +OK [message]
    Ok(Option<String>),

    /// -ERR <code> <message>
    Error { code: String, message: String },

    /// $<length>\r\n<data>
    Bulk(Vec<u8>),

    /// *<count>\r\n<items>
    Array(Vec<Response>),

    /// :<integer>
    Integer(i64),

    /// $-1
    Null,

    /// +PONG
    Pong,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(None)
    }

    pub fn ok_with_message(msg: impl Into<String>) -> Self {
        Response::Ok(Some(msg.into()))
    }

    /// Acknowledge a write with the stamp it was given
    pub fn stamped(stamp: VersionStamp) -> Self {
        Response::Ok(Some(stamp.to_string()))
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_command(msg: &str) -> Self {
        Response::error("INVALID_CMD", msg)
    }

    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Response::Bulk(data.into())
    }

    /// Bulk response carrying a JSON document
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(data) => Response::Bulk(data),
            Err(e) => Response::error("INTERNAL", e.to_string()),
        }
    }

    pub fn integer(n: i64) -> Self {
        Response::Integer(n)
    }

    pub fn pong() -> Self {
        Response::Pong
    }

    pub fn null() -> Self {
        Response::Null
    }

    pub fn array(items: Vec<Response>) -> Self {
        Response::Array(items)
    }

    /// Encode the response to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the response into an existing buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Response::Ok(None) => {
                buf.put_slice(b"+OK\r\n");
            }
            Response::Ok(Some(msg)) => {
                buf.put_slice(b"+OK ");
                buf.put_slice(msg.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Error { code, message } => {
                buf.put_slice(b"-ERR ");
                buf.put_slice(code.as_bytes());
                buf.put_slice(b" ");
                buf.put_slice(message.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Bulk(data) => {
                buf.put_slice(b"$");
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Response::Array(items) => {
                buf.put_slice(b"*");
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for item in items {
                    item.encode_into(buf);
                }
            }
            Response::Integer(n) => {
                buf.put_slice(b":");
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            Response::Pong => {
                buf.put_slice(b"+PONG\r\n");
            }
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Response::error(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memsync_core::ReplicaId;

    #[test]
    fn test_encode_ok() {
        assert_eq!(Response::ok().encode().as_ref(), b"+OK\r\n");
    }

    #[test]
    fn test_encode_stamped() {
        let stamp = VersionStamp::new(ReplicaId::from_u128(1), 7);
        let expected = format!("+OK {}\r\n", stamp);
        assert_eq!(Response::stamped(stamp).encode().as_ref(), expected.as_bytes());
    }

    #[test]
    fn test_encode_error() {
        let resp = Response::error("INVALID_KEY", "Key cannot be empty");
        assert_eq!(
            resp.encode().as_ref(),
            b"-ERR INVALID_KEY Key cannot be empty\r\n"
        );
    }

    #[test]
    fn test_error_from_protocol_error() {
        let resp: Response = ProtocolError::MissingArgument("key".into()).into();
        assert!(matches!(resp, Response::Error { ref code, .. } if code == "INVALID_ARG"));
    }

    #[test]
    fn test_encode_bulk_and_json() {
        assert_eq!(Response::bulk(b"hello".to_vec()).encode().as_ref(), b"$5\r\nhello\r\n");
        assert_eq!(Response::json(&[1, 2]).encode().as_ref(), b"$5\r\n[1,2]\r\n");
    }

    #[test]
    fn test_encode_integer_and_null() {
        assert_eq!(Response::integer(42).encode().as_ref(), b":42\r\n");
        assert_eq!(Response::null().encode().as_ref(), b"$-1\r\n");
    }

    #[test]
    fn test_encode_array() {
        let resp = Response::array(vec![Response::ok(), Response::integer(1)]);
        assert_eq!(resp.encode().as_ref(), b"*2\r\n+OK\r\n:1\r\n");
    }
}
