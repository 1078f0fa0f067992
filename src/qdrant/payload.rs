//! Helpers for constructing and decoding Qdrant payloads.

use crate::processing::{Chunk, ChunkMetadata};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

const UNKNOWN_SOURCE_ID: &str = "unknown";

/// Build the payload object stored alongside each indexed chunk.
pub fn build_payload(chunk: &Chunk, chunk_hash: &str, ingested_at: &str) -> Value {
    let ChunkMetadata {
        position,
        source_id,
        length,
        title,
        url,
        published_at,
    } = &chunk.metadata;

    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(chunk.text.clone()));
    payload.insert("position".into(), Value::from(*position as u64));
    payload.insert("source_id".into(), Value::String(source_id.clone()));
    payload.insert("length".into(), Value::from(*length as u64));
    payload.insert("chunk_hash".into(), Value::String(chunk_hash.to_string()));
    payload.insert(
        "ingested_at".into(),
        Value::String(ingested_at.to_string()),
    );

    if let Some(title) = title.as_ref().filter(|value| !value.is_empty()) {
        payload.insert("title".into(), Value::String(title.clone()));
    }
    if let Some(url) = url.as_ref().filter(|value| !value.is_empty()) {
        payload.insert("url".into(), Value::String(url.clone()));
    }
    if let Some(published) = published_at.and_then(|value| value.format(&Rfc3339).ok()) {
        payload.insert("published_at".into(), Value::String(published));
    }

    Value::Object(payload)
}

/// Rebuild a chunk from a stored payload.
///
/// Returns `None` when the payload carries no text; missing metadata falls back to neutral
/// defaults so that points written by older ingestions stay readable.
pub fn chunk_from_payload(mut payload: Map<String, Value>) -> Option<Chunk> {
    let text = match payload.remove("text") {
        Some(Value::String(text)) => text,
        _ => return None,
    };

    let position = payload
        .get("position")
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        .unwrap_or(0);
    let source_id = take_string(&mut payload, "source_id")
        .unwrap_or_else(|| UNKNOWN_SOURCE_ID.to_string());
    let length = payload
        .get("length")
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        .unwrap_or_else(|| text.chars().count());
    let title = take_string(&mut payload, "title");
    let url = take_string(&mut payload, "url");
    let published_at = take_string(&mut payload, "published_at")
        .and_then(|value| OffsetDateTime::parse(&value, &Rfc3339).ok());

    Some(Chunk {
        text,
        metadata: ChunkMetadata {
            position,
            source_id,
            length,
            title,
            url,
            published_at,
        },
    })
}

fn take_string(payload: &mut Map<String, Value>, key: &str) -> Option<String> {
    match payload.remove(key) {
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

/// Derive the point identifier and content hash for a chunk.
///
/// The identifier is stable for a given `(source_id, position, text)` so re-ingesting the same
/// document overwrites its points instead of duplicating them.
pub fn point_identity(chunk: &Chunk) -> (String, String) {
    let mut hasher = Sha256::new();
    hasher.update(chunk.metadata.source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update((chunk.metadata.position as u64).to_le_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.text.as_bytes());
    let digest = hasher.finalize();

    let mut id_bytes = [0u8; 16];
    id_bytes.copy_from_slice(&digest[..16]);
    (Uuid::from_bytes(id_bytes).to_string(), hex::encode(digest))
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_chunk() -> Chunk {
        Chunk {
            text: "Alpha methods are fast.".into(),
            metadata: ChunkMetadata {
                position: 3,
                source_id: "arxiv:2401.00001".into(),
                length: 23,
                title: Some("Fast Alpha".into()),
                url: Some("https://arxiv.org/pdf/2401.00001".into()),
                published_at: Some(datetime!(2024-01-02 03:04:05 UTC)),
            },
        }
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn payload_carries_provenance_and_decodes_back() {
        let chunk = sample_chunk();
        let payload = build_payload(&chunk, "abc123", "2025-01-01T00:00:00Z");
        assert_eq!(payload["position"], 3);
        assert_eq!(payload["length"], 23);
        assert_eq!(payload["chunk_hash"], "abc123");
        assert_eq!(payload["published_at"], "2024-01-02T03:04:05Z");

        let map = payload.as_object().cloned().expect("object payload");
        let decoded = chunk_from_payload(map).expect("chunk");
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn payload_omits_absent_provenance() {
        let mut chunk = sample_chunk();
        chunk.metadata.title = None;
        chunk.metadata.url = None;
        chunk.metadata.published_at = None;
        let payload = build_payload(&chunk, "abc", "2025-01-01T00:00:00Z");
        let map = payload.as_object().expect("object payload");
        assert!(!map.contains_key("title"));
        assert!(!map.contains_key("url"));
        assert!(!map.contains_key("published_at"));
    }

    #[test]
    fn chunk_from_payload_requires_text_and_defaults_metadata() {
        let mut map = Map::new();
        assert!(chunk_from_payload(map.clone()).is_none());

        map.insert("text".into(), Value::String("héllo".into()));
        map.insert("published_at".into(), Value::String("not a date".into()));
        let chunk = chunk_from_payload(map).expect("chunk");
        assert_eq!(chunk.metadata.source_id, "unknown");
        assert_eq!(chunk.metadata.length, 5);
        assert!(chunk.metadata.published_at.is_none());
    }

    #[test]
    fn point_identity_is_stable_and_position_sensitive() {
        let chunk = sample_chunk();
        let (id_a, hash_a) = point_identity(&chunk);
        let (id_b, hash_b) = point_identity(&chunk);
        assert_eq!(id_a, id_b);
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 64);
        assert!(Uuid::parse_str(&id_a).is_ok());

        let mut moved = chunk.clone();
        moved.metadata.position = 4;
        assert_ne!(point_identity(&moved).0, id_a);
    }
}
