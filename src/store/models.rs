use crate::indexer::segmenter::UnitKind;
use serde::{Deserialize, Serialize};

/// The metadata record stored at one slot of the index.
///
/// Everything a search hit knows about its chunk comes from this record, so
/// it carries a full copy of the parent unit's facts plus the chunk position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_path: String,
    #[serde(rename = "type")]
    pub kind: UnitKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub docstring: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_symbols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_count: Option<usize>,
    pub chunk_index: usize,
    pub chunk_count: usize,
    /// Chunk text, when the index was built with content storage enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_record_deserializes() {
        let json = r#"{"file_path": "a.py", "type": "raw_text", "chunk_index": 0, "chunk_count": 1}"#;
        let meta: ChunkMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.kind, UnitKind::RawText);
        assert_eq!(meta.name, None);
        assert_eq!(meta.start_line, None);
        assert!(meta.imports.is_none());
        assert!(meta.content.is_none());
    }

    #[test]
    fn test_absent_enrichment_is_omitted() {
        let meta = ChunkMetadata {
            file_path: "a.py".into(),
            kind: UnitKind::Function,
            name: Some("f".into()),
            docstring: String::new(),
            members: vec![],
            bases: vec![],
            parameters: vec!["a".into()],
            start_line: Some(1),
            end_line: Some(2),
            imports: None,
            called_symbols: Some(vec![]),
            branch_count: Some(0),
            chunk_index: 0,
            chunk_count: 1,
            content: None,
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["type"], "function");
        assert!(value.get("imports").is_none());
        assert_eq!(value["called_symbols"], serde_json::json!([]));
        assert!(value.get("members").is_none());
    }
}
