//! Parsing and validation of raw queue payloads.

use serde_json::Value;

use crate::messages::TransferMessage;

/// Keys every job message must carry, in the order they are checked.
const MANDATORY_KEYS: &[&[&str]] = &[
    &["source", "url"],
    &["source", "headers"],
    &["destination", "host"],
    &["destination", "path"],
    &["destination", "credentials"],
    &["outcome", "topic"],
];

/// Errors produced while decoding a job message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Not valid JSON: \"{0}\"")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Invalid transfer message: '{0}' is a mandatory key")]
    MissingKey(String),

    #[error("Invalid transfer message: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Parses and validates a raw job message.
pub fn parse_job_message(body: &[u8]) -> Result<TransferMessage, MessageError> {
    let value: Value = serde_json::from_slice(body).map_err(MessageError::InvalidJson)?;
    validate_mandatory_keys(&value)?;
    serde_json::from_value(value).map_err(MessageError::Malformed)
}

/// Reports the first missing mandatory key, naming the innermost absent segment.
fn validate_mandatory_keys(value: &Value) -> Result<(), MessageError> {
    for path in MANDATORY_KEYS {
        let mut node = value;
        for key in *path {
            match node.get(key) {
                Some(next) => node = next,
                None => return Err(MessageError::MissingKey((*key).to_string())),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "source": {"url": "http://url/bucket/file.mxf", "headers": {"host": "domain"}},
        "destination": {"host": "tst-server", "path": "/s3-transfer-test/file.mxf", "credentials": "vault-secret"},
        "outcome": {"topic": "topic"}
    }"#;

    fn without(pointer: &[&str]) -> Vec<u8> {
        let mut value: Value = serde_json::from_str(VALID).unwrap();
        let (last, parents) = pointer.split_last().unwrap();
        let mut node = &mut value;
        for key in parents {
            node = node.get_mut(*key).unwrap();
        }
        node.as_object_mut().unwrap().remove(*last);
        serde_json::to_vec(&value).unwrap()
    }

    fn missing_key(body: &[u8]) -> String {
        match parse_job_message(body) {
            Err(MessageError::MissingKey(key)) => key,
            other => panic!("expected missing key, got {other:?}"),
        }
    }

    #[test]
    fn valid_message_parses() {
        let msg = parse_job_message(VALID.as_bytes()).unwrap();
        assert_eq!(msg.destination.host, "tst-server");
        assert_eq!(msg.source.headers.get("host").map(String::as_str), Some("domain"));
    }

    #[test]
    fn invalid_json_rejected() {
        let err = parse_job_message(b"{not json").unwrap_err();
        assert!(matches!(err, MessageError::InvalidJson(_)));
        assert!(err.to_string().starts_with("Not valid JSON"));
    }

    #[test]
    fn empty_object_reports_source() {
        assert_eq!(missing_key(b"{}"), "source");
    }

    #[test]
    fn each_mandatory_key_reported() {
        assert_eq!(missing_key(&without(&["source"])), "source");
        assert_eq!(missing_key(&without(&["destination"])), "destination");
        assert_eq!(missing_key(&without(&["source", "url"])), "url");
        assert_eq!(missing_key(&without(&["source", "headers"])), "headers");
        assert_eq!(missing_key(&without(&["destination", "host"])), "host");
        assert_eq!(missing_key(&without(&["destination", "path"])), "path");
        assert_eq!(
            missing_key(&without(&["destination", "credentials"])),
            "credentials"
        );
        assert_eq!(missing_key(&without(&["outcome"])), "outcome");
    }

    #[test]
    fn missing_key_message_text() {
        let err = parse_job_message(&without(&["destination", "path"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transfer message: 'path' is a mandatory key"
        );
    }

    #[test]
    fn wrong_type_is_malformed() {
        let body = VALID.replace(
            r#""url": "http://url/bucket/file.mxf""#,
            r#""url": 42"#,
        );
        let err = parse_job_message(body.as_bytes()).unwrap_err();
        assert!(matches!(err, MessageError::Malformed(_)));
    }
}
