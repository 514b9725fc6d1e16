use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::{CodecError, CodecResult};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// miner -> server, ready for work
    Join,
    /// client -> server search request, also server -> miner work assignment
    Request,
    /// miner -> server partial result, also server -> client final answer
    Result,
}

/// One record on the wire. Every peer speaks the same schema, the meaning of
/// the fields depends on `kind`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub data: String,
    /// inclusive start of the nonce range
    #[serde(default)]
    pub lower: u64,
    /// exclusive end of the nonce range
    #[serde(default)]
    pub upper: u64,
    #[serde(default)]
    pub hash: u64,
    #[serde(default)]
    pub nonce: u64,
}

impl Message {
    pub fn join() -> Self {
        Self { kind: MessageType::Join, data: String::new(), lower: 0, upper: 0, hash: 0, nonce: 0 }
    }

    pub fn request(data: impl Into<String>, lower: u64, upper: u64) -> Self {
        Self { kind: MessageType::Request, data: data.into(), lower, upper, hash: 0, nonce: 0 }
    }

    pub fn result(hash: u64, nonce: u64) -> Self {
        Self { kind: MessageType::Result, data: String::new(), lower: 0, upper: 0, hash, nonce }
    }

    pub fn encode(&self) -> CodecResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes one frame. Request frames must carry `lower <= upper`.
    pub fn decode(frame: &[u8]) -> CodecResult<Self> {
        let msg: Message = serde_json::from_slice(frame)?;
        if msg.kind == MessageType::Request && msg.lower > msg.upper {
            return Err(CodecError::InvalidRange { lower: msg.lower, upper: msg.upper });
        }
        Ok(msg)
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MessageType::Join => write!(f, "[Join]"),
            MessageType::Request => {
                write!(f, "[Request {} {}..{}]", self.data, self.lower, self.upper)
            }
            MessageType::Result => write!(f, "[Result {} {}]", self.hash, self.nonce),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_request_frame() {
        let frame = br#"{"type":"Request","data":"hello","lower":0,"upper":25000}"#;
        let msg = Message::decode(frame).unwrap();
        assert_eq!(msg, Message::request("hello", 0, 25000));
    }

    #[test]
    fn join_frame_needs_only_type() {
        let msg = Message::decode(br#"{"type":"Join"}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Join);
    }

    #[test]
    fn encoded_result_keeps_full_u64() {
        let bytes = Message::result(u64::MAX, u64::MAX - 1).encode().unwrap();
        let msg = Message::decode(&bytes).unwrap();
        assert_eq!(msg.hash, u64::MAX);
        assert_eq!(msg.nonce, u64::MAX - 1);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(Message::decode(b"not json"), Err(CodecError::Malformed(_))));
        assert!(matches!(
            Message::decode(br#"{"type":"Shutdown"}"#),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn inverted_request_range_is_rejected() {
        let frame = br#"{"type":"Request","data":"x","lower":10,"upper":5}"#;
        assert!(matches!(
            Message::decode(frame),
            Err(CodecError::InvalidRange { lower: 10, upper: 5 })
        ));
    }
}
