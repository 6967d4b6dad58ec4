//! Typed decoding of channel response bodies.
//!
//! Channels wrap responses in a `{"success": .., "data": .., "message": ..}`
//! envelope. Every field is optional on the wire, so presence is checked
//! explicitly instead of trusting zero values.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ChannelError;
use crate::types::{ItemFailure, RemoteBatchState};

const BATCH_IN_PROGRESS: i64 = 1;
const BATCH_COMPLETE: i64 = 2;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: Option<bool>,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Returns the payload of a successful response.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Rejected`] when `success` is `false`, or
    /// [`ChannelError::MissingField`] when `success` or `data` is absent.
    pub fn into_data(self) -> Result<T, ChannelError> {
        match self.success {
            None => Err(ChannelError::MissingField("success")),
            Some(false) => Err(ChannelError::Rejected(
                self.message.unwrap_or_else(|| "no message".to_string()),
            )),
            Some(true) => self.data.ok_or(ChannelError::MissingField("data")),
        }
    }
}

/// Parses a JSON envelope and returns its payload.
///
/// # Errors
///
/// Returns [`ChannelError::MalformedPayload`] if `body` is not a valid
/// envelope, or any error from [`Envelope::into_data`].
pub fn decode_envelope<T: DeserializeOwned>(context: &str, body: &str) -> Result<T, ChannelError> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|source| ChannelError::MalformedPayload {
            context: context.to_string(),
            source,
        })?;
    envelope.into_data()
}

#[derive(Debug, Deserialize)]
pub struct RawItemResult {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Batch status body as served by the channel.
#[derive(Debug, Deserialize)]
pub struct RawBatchResult {
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default, rename = "failedCount")]
    pub failed_count: Option<u32>,
    #[serde(default, rename = "batchResult")]
    pub batch_result: Vec<RawItemResult>,
}

impl TryFrom<RawBatchResult> for RemoteBatchState {
    type Error = ChannelError;

    fn try_from(raw: RawBatchResult) -> Result<Self, Self::Error> {
        match raw.status {
            None => Err(ChannelError::MissingField("status")),
            Some(BATCH_IN_PROGRESS) => Ok(Self::InProgress),
            Some(BATCH_COMPLETE) => {
                let failures = raw
                    .batch_result
                    .into_iter()
                    .enumerate()
                    .filter_map(|(index, item)| {
                        let reason = item.reason?.trim().to_string();
                        (!reason.is_empty()).then_some(ItemFailure { index, reason })
                    })
                    .collect();
                Ok(Self::Complete {
                    failed_count: raw.failed_count.unwrap_or(0),
                    failures,
                })
            }
            Some(other) => Err(ChannelError::UnexpectedBatchStatus(other)),
        }
    }
}

/// Decodes a batch status response body.
///
/// # Errors
///
/// Returns a [`ChannelError`] if the body is malformed, rejected, or carries
/// an unknown status code.
pub fn decode_batch_status(body: &str) -> Result<RemoteBatchState, ChannelError> {
    decode_envelope::<RawBatchResult>("batch status", body)?.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_progress_status() {
        let body = r#"{"success":true,"data":{"status":1}}"#;
        assert_eq!(decode_batch_status(body).unwrap(), RemoteBatchState::InProgress);
    }

    #[test]
    fn complete_with_positional_failures() {
        let body = r#"{
            "success": true,
            "data": {
                "status": 2,
                "failedCount": 2,
                "batchResult": [
                    {"code": "B0", "reason": "missing image"},
                    {"code": "B1", "reason": ""},
                    {"code": "B2"},
                    {"code": "B3", "reason": "invalid category"},
                    {"code": "B4", "reason": "  "}
                ]
            }
        }"#;
        let state = decode_batch_status(body).unwrap();
        assert_eq!(
            state,
            RemoteBatchState::Complete {
                failed_count: 2,
                failures: vec![
                    ItemFailure {
                        index: 0,
                        reason: "missing image".to_string()
                    },
                    ItemFailure {
                        index: 3,
                        reason: "invalid category".to_string()
                    },
                ],
            }
        );
    }

    #[test]
    fn rejected_envelope_carries_message() {
        let body = r#"{"success":false,"message":"token expired"}"#;
        let err = decode_batch_status(body).unwrap_err();
        assert!(matches!(err, ChannelError::Rejected(ref m) if m == "token expired"));
    }

    #[test]
    fn missing_fields_are_reported() {
        assert!(matches!(
            decode_batch_status(r#"{"data":{"status":1}}"#),
            Err(ChannelError::MissingField("success"))
        ));
        assert!(matches!(
            decode_batch_status(r#"{"success":true}"#),
            Err(ChannelError::MissingField("data"))
        ));
        assert!(matches!(
            decode_batch_status(r#"{"success":true,"data":{}}"#),
            Err(ChannelError::MissingField("status"))
        ));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Token {
        value: String,
    }

    #[test]
    fn payload_types_need_not_implement_default() {
        let token: Token = decode_envelope("token", r#"{"success":true,"data":{"value":"t-1"}}"#).unwrap();
        assert_eq!(token.value, "t-1");
        assert!(matches!(
            decode_envelope::<Token>("token", r#"{"success":true,"message":null}"#),
            Err(ChannelError::MissingField("data"))
        ));
    }

    #[test]
    fn unknown_status_and_garbage_fail() {
        assert!(matches!(
            decode_batch_status(r#"{"success":true,"data":{"status":9}}"#),
            Err(ChannelError::UnexpectedBatchStatus(9))
        ));
        assert!(matches!(
            decode_batch_status("<html>"),
            Err(ChannelError::MalformedPayload { .. })
        ));
    }
}
