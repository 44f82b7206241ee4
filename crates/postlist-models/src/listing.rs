//! Listing and result document types.
//!
//! The listing schema is open: the generator may return any extra fields
//! and they are carried through untouched.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::request::RequestId;

/// Structured listing produced by the content generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Listing {
    /// Product name or title
    #[serde(default)]
    pub name: String,

    /// Long form description
    #[serde(default)]
    pub description: String,

    /// Key features, one per entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,

    /// Intended audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Search terms
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Technical details as key/value pairs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,

    /// Fields the generator returned that have no dedicated slot
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Listing {
    /// Whether the listing carries any content at all.
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
            && self.description.trim().is_empty()
            && self.features.is_empty()
            && self.keywords.is_empty()
            && self.details.is_empty()
            && self.extra.is_empty()
    }
}

/// Build the public reference for a stored image.
pub fn image_reference(request_id: &RequestId, file_name: &str) -> String {
    format!("/image/{}/{}", request_id, file_name)
}

/// Completed result of one request, as persisted and as replayed from cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultDocument {
    pub request_id: RequestId,

    pub listing: Listing,

    /// Ordered image references (`/image/<request_id>/<file>`)
    #[serde(default)]
    pub images: Vec<String>,

    /// When the cached artifacts expire
    pub expires_at: DateTime<Utc>,

    /// Whole seconds until expiry at the time the document was produced
    pub expires_in_seconds: u64,
}

impl ResultDocument {
    /// Create a document expiring `ttl_secs` from `now`.
    pub fn new(
        request_id: RequestId,
        listing: Listing,
        images: Vec<String>,
        now: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        let expires_at = now + chrono::Duration::seconds(ttl_secs as i64);
        Self {
            request_id,
            listing,
            images,
            expires_at,
            expires_in_seconds: ttl_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_keeps_unknown_fields() {
        let value = json!({
            "name": "Linen shirt",
            "description": "Breathable summer shirt",
            "features": ["100% linen", "relaxed fit"],
            "price": "49 EUR",
            "details": {"color": "sand"}
        });

        let listing: Listing = serde_json::from_value(value).unwrap();
        assert_eq!(listing.name, "Linen shirt");
        assert_eq!(listing.features.len(), 2);
        assert_eq!(listing.details.get("color").map(String::as_str), Some("sand"));
        assert_eq!(listing.extra.get("price"), Some(&json!("49 EUR")));

        let back = serde_json::to_value(&listing).unwrap();
        assert_eq!(back["price"], json!("49 EUR"));
    }

    #[test]
    fn test_empty_listing() {
        assert!(Listing::default().is_empty());
        let listing = Listing {
            name: "x".into(),
            ..Default::default()
        };
        assert!(!listing.is_empty());
    }

    #[test]
    fn test_image_reference() {
        let id = RequestId::from("req-1");
        assert_eq!(image_reference(&id, "00_a.jpg"), "/image/req-1/00_a.jpg");
    }

    #[test]
    fn test_result_document_expiry() {
        let now = Utc::now();
        let doc = ResultDocument::new(RequestId::from("r"), Listing::default(), vec![], now, 600);
        assert_eq!(doc.expires_in_seconds, 600);
        assert_eq!((doc.expires_at - now).num_seconds(), 600);
    }
}
