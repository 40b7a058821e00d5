// src/engine/record.rs
//
// Per-item result records as returned to the caller.

use crate::error::{Result, TranscodeError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally visible outcome for one item.
///
/// A record is either a success (metrics, dimensions, payloads) or an error
/// (`error` set, `processedSize == 0`, `percentageSaved == 0`, empty payload).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub original_name: String,
    pub original_size: u64,
    pub original_format: String,
    pub processed_size: u64,
    pub processed_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_data_url: Option<String>,
    pub processed_data_url: String,
    pub percentage_saved: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
}

/// Everything a success record is built from.
#[derive(Debug)]
pub struct SuccessParts<'a> {
    pub original_name: &'a str,
    pub original_bytes: &'a [u8],
    pub original_format: &'a str,
    pub processed_bytes: &'a [u8],
    pub processed_format: &'a str,
    pub width: u32,
    pub height: u32,
    pub include_original: bool,
}

impl ResultRecord {
    pub fn success(parts: SuccessParts<'_>) -> Result<Self> {
        let original_size = parts.original_bytes.len() as u64;
        let processed_size = parts.processed_bytes.len() as u64;
        let percentage_saved = percentage_saved(original_size, processed_size)?;

        Ok(Self {
            id: new_record_id(),
            original_name: parts.original_name.to_string(),
            original_size,
            original_format: parts.original_format.to_string(),
            processed_size,
            processed_format: parts.processed_format.to_string(),
            original_data_url: parts
                .include_original
                .then(|| data_url(parts.original_format, parts.original_bytes)),
            processed_data_url: data_url(parts.processed_format, parts.processed_bytes),
            percentage_saved,
            width: Some(parts.width),
            height: Some(parts.height),
            error: None,
            error_category: None,
        })
    }

    /// Error record: `original_size` is the size the transport declared.
    pub fn failure(
        original_name: &str,
        declared_size: u64,
        processed_format: &str,
        error: &TranscodeError,
    ) -> Self {
        Self {
            id: new_record_id(),
            original_name: original_name.to_string(),
            original_size: declared_size,
            original_format: "unknown".to_string(),
            processed_size: 0,
            processed_format: processed_format.to_string(),
            original_data_url: None,
            processed_data_url: String::new(),
            percentage_saved: 0,
            width: None,
            height: None,
            error: Some(error.to_string()),
            error_category: Some(error.category().as_str().to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Signed savings percentage, rounded half up (toward +inf).
///
/// A larger output yields a negative value; it is never clamped.
pub fn percentage_saved(original_size: u64, processed_size: u64) -> Result<i64> {
    if original_size == 0 {
        return Err(TranscodeError::empty_input());
    }
    let ratio = (original_size as f64 - processed_size as f64) / original_size as f64;
    Ok((ratio * 100.0 + 0.5).floor() as i64)
}

/// `data:image/<format>;base64,<payload>`
pub fn data_url(format: &str, bytes: &[u8]) -> String {
    format!("data:image/{format};base64,{}", STANDARD.encode(bytes))
}

fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts<'a>(original: &'a [u8], processed: &'a [u8]) -> SuccessParts<'a> {
        SuccessParts {
            original_name: "cat.png",
            original_bytes: original,
            original_format: "png",
            processed_bytes: processed,
            processed_format: "webp",
            width: 10,
            height: 20,
            include_original: true,
        }
    }

    #[test]
    fn test_percentage_examples() {
        assert_eq!(percentage_saved(1000, 400).unwrap(), 60);
        assert_eq!(percentage_saved(1000, 1200).unwrap(), -20);
        assert_eq!(percentage_saved(1000, 1000).unwrap(), 0);
        assert_eq!(percentage_saved(1000, 0).unwrap(), 100);
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 2.5 -> 3, -2.5 -> -2
        assert_eq!(percentage_saved(1000, 975).unwrap(), 3);
        assert_eq!(percentage_saved(1000, 1025).unwrap(), -2);
        assert_eq!(percentage_saved(3, 2).unwrap(), 33);
    }

    #[test]
    fn test_percentage_guards_zero_original() {
        assert!(matches!(
            percentage_saved(0, 10),
            Err(TranscodeError::EmptyInput)
        ));
    }

    #[test]
    fn test_success_record_fields() {
        let record = ResultRecord::success(parts(&[0u8; 10], &[1u8; 4])).unwrap();
        assert_eq!(record.original_size, 10);
        assert_eq!(record.processed_size, 4);
        assert_eq!(record.percentage_saved, 60);
        assert_eq!((record.width, record.height), (Some(10), Some(20)));
        assert!(record.processed_data_url.starts_with("data:image/webp;base64,"));
        assert!(record
            .original_data_url
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(!record.is_error());
        assert!(Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn test_original_payload_is_optional() {
        let mut p = parts(&[0u8; 10], &[1u8; 4]);
        p.include_original = false;
        let record = ResultRecord::success(p).unwrap();
        assert!(record.original_data_url.is_none());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("originalDataUrl").is_none());
    }

    #[test]
    fn test_failure_record_shape() {
        let err = TranscodeError::unsupported_extension(Some("bmp".into()));
        let record = ResultRecord::failure("x.bmp", 1234, "webp", &err);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["originalName"], "x.bmp");
        assert_eq!(json["originalSize"], 1234);
        assert_eq!(json["originalFormat"], "unknown");
        assert_eq!(json["processedSize"], 0);
        assert_eq!(json["processedFormat"], "webp");
        assert_eq!(json["processedDataUrl"], "");
        assert_eq!(json["percentageSaved"], 0);
        assert_eq!(json["error"], "Unsupported file format: bmp");
        assert_eq!(json["errorCategory"], "admission");
        assert!(json.get("width").is_none());
        assert!(json.get("originalDataUrl").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let err = TranscodeError::empty_input();
        let a = ResultRecord::failure("a", 0, "png", &err);
        let b = ResultRecord::failure("a", 0, "png", &err);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_data_url_encoding() {
        assert_eq!(data_url("gif", b"hi"), "data:image/gif;base64,aGk=");
    }
}
