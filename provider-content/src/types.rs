//! Content API response types

use bridge_traits::content::ContentMetadata;
use serde::Deserialize;

/// `GET /index` body. Older deployments return a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum IndexResponse {
    Wrapped { items: Vec<ContentMetadata> },
    Bare(Vec<ContentMetadata>),
}

impl IndexResponse {
    pub(crate) fn into_items(self) -> Vec<ContentMetadata> {
        match self {
            IndexResponse::Wrapped { items } | IndexResponse::Bare(items) => items,
        }
    }
}

/// Error body the API sends with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(alias = "error")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_accepts_both_shapes() {
        let wrapped: IndexResponse = serde_json::from_str(
            r#"{"items":[{"key":"go-basics","category":"go","version":1,"title":"Go Basics"}]}"#,
        )
        .unwrap();
        let bare: IndexResponse = serde_json::from_str(
            r#"[{"key":"go-basics","category":"go","version":1,"title":"Go Basics"}]"#,
        )
        .unwrap();
        assert_eq!(wrapped.into_items(), bare.into_items());
    }
}
