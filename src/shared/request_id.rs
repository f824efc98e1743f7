//! Request ID generation and gRPC metadata helpers.

use tonic::metadata::MetadataMap;

/// Metadata key carrying the request id across services
pub const REQUEST_ID_HEADER: &str = "request-id";

/// Generate a short, mostly-unique request id.
///
/// Format: `req-<8 hex chars>-<microsecond fraction>`.
pub fn generate_request_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let micros = chrono::Utc::now().timestamp_subsec_micros() % 1_000_000;
    format!("req-{}-{}", &uuid[..8], micros)
}

/// Read the first value of a metadata key as text.
pub fn metadata_value<'a>(metadata: &'a MetadataMap, field: &str) -> Option<&'a str> {
    metadata.get(field).and_then(|v| v.to_str().ok())
}

/// Read the request id from metadata, `"unknown"` when absent.
pub fn request_id(metadata: &MetadataMap) -> String {
    metadata_value(metadata, REQUEST_ID_HEADER)
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    #[test]
    fn test_generate_request_id_format() {
        let id = generate_request_id();
        assert!(id.starts_with("req-"));
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 8);
        assert!(parts[2].parse::<u32>().is_ok());
    }

    #[test]
    fn test_generate_request_id_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[test]
    fn test_metadata_value() {
        let mut metadata = MetadataMap::new();
        metadata.insert("user-id", MetadataValue::from_static("42"));

        assert_eq!(metadata_value(&metadata, "user-id"), Some("42"));
        assert_eq!(metadata_value(&metadata, "missing"), None);
    }

    #[test]
    fn test_request_id_defaults_to_unknown() {
        let metadata = MetadataMap::new();
        assert_eq!(request_id(&metadata), "unknown");
    }
}
