//! Transcode wire format
//!
//! Requests and replies share one JSON shape:
//! `{"filename": str, "content": base64 str, "request_id": str}`.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Reply queues are named `video_queue{request_id}`.
pub const REPLY_QUEUE_PREFIX: &str = "video_queue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeMessage {
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    pub request_id: String,
}

impl TranscodeMessage {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

pub fn reply_queue_name(request_id: &str) -> String {
    format!("{}{}", REPLY_QUEUE_PREFIX, request_id)
}

/// Job filename: the request id followed by the original file's extension, if any.
pub fn job_filename(request_id: &str, original_name: &str) -> String {
    match Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) if !ext.is_empty() => format!("{}.{}", request_id, ext),
        _ => request_id.to_string(),
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let msg = TranscodeMessage {
            filename: "AbCdEfGhIjKlMnOp.mov".to_string(),
            content: b"hello".to_vec(),
            request_id: "AbCdEfGhIjKlMnOp".to_string(),
        };

        let value: serde_json::Value = serde_json::from_slice(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["content"], "aGVsbG8=");
        assert_eq!(value["request_id"], "AbCdEfGhIjKlMnOp");
        assert_eq!(value["filename"], "AbCdEfGhIjKlMnOp.mov");
    }

    #[test]
    fn test_rejects_bad_base64() {
        let body = br#"{"filename":"a.mp4","content":"***","request_id":"x"}"#;
        assert!(TranscodeMessage::from_json(body).is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(reply_queue_name("abc"), "video_queueabc");
        assert_eq!(job_filename("abc", "holiday.MOV"), "abc.MOV");
        assert_eq!(job_filename("abc", "archive.tar.gz"), "abc.gz");
        assert_eq!(job_filename("abc", "noext"), "abc");
    }
}
