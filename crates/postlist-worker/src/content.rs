//! Listing text handling: the legacy sectioned format, the caption-based
//! fallback, and reading caption/transcript artifacts.

use std::collections::BTreeMap;
use std::path::Path;

use postlist_models::Listing;

/// Section separator of the legacy listing format.
pub const SECTION_SEPARATOR: &str = "----------";

/// Longest name taken from a caption line, in characters.
const MAX_FALLBACK_NAME_CHARS: usize = 120;

/// Strip a surrounding ```json fence if the model added one.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Parse the dash-separated five-section format:
/// title, features, description, technical details, search terms.
///
/// Returns `None` when fewer than five sections are present.
pub fn parse_sectioned_listing(text: &str) -> Option<Listing> {
    let sections: Vec<&str> = text.split(SECTION_SEPARATOR).collect();
    if sections.len() < 5 {
        return None;
    }

    let listing = Listing {
        name: sections[0].trim().to_string(),
        features: bullet_points(sections[1]),
        description: sections[2].trim().to_string(),
        details: technical_details(sections[3]),
        keywords: bullet_points(sections[4]),
        ..Listing::default()
    };
    (!listing.is_empty()).then_some(listing)
}

fn bullet_points(section: &str) -> Vec<String> {
    section
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('-'))
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn technical_details(section: &str) -> BTreeMap<String, String> {
    section
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('-'))
        .filter_map(|item| item.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Listing built from the raw caption and transcript when generation fails.
pub fn fallback_listing(caption: &str, transcript: &str) -> Listing {
    let name = caption
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(MAX_FALLBACK_NAME_CHARS).collect::<String>())
        .unwrap_or_else(|| "Untitled post".to_string());

    let description = [caption.trim(), transcript.trim()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n");

    Listing {
        name,
        description,
        keywords: hashtags(caption),
        ..Listing::default()
    }
}

/// Hashtags of a caption without the `#`, deduplicated in order.
pub fn hashtags(caption: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in caption.split_whitespace() {
        let Some(tag) = word.strip_prefix('#') else {
            continue;
        };
        let tag: String = tag
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
    }
    tags
}

/// Read a text artifact, treating a missing file as empty.
pub async fn read_text_or_empty(path: &Path) -> std::io::Result<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTIONED: &str = "Stainless Steel Blender
----------
- 1200 W motor
- 6 blades
----------
A powerful blender for smoothies.
----------
- Power: 1200 W
- Capacity: 1.5 L
- not a pair
----------
- blender
- kitchen appliance
";

    #[test]
    fn test_parse_sectioned_listing() {
        let listing = parse_sectioned_listing(SECTIONED).unwrap();
        assert_eq!(listing.name, "Stainless Steel Blender");
        assert_eq!(listing.features, vec!["1200 W motor", "6 blades"]);
        assert_eq!(listing.description, "A powerful blender for smoothies.");
        assert_eq!(listing.details.get("Power").map(String::as_str), Some("1200 W"));
        assert_eq!(listing.details.len(), 2);
        assert_eq!(listing.keywords, vec!["blender", "kitchen appliance"]);
    }

    #[test]
    fn test_sectioned_listing_needs_five_sections() {
        assert!(parse_sectioned_listing("Title\n----------\n- a").is_none());
        assert!(parse_sectioned_listing("{\"name\": \"x\"}").is_none());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_fallback_listing() {
        let caption = "\nNew drop: ceramic mug ☕\nHandmade in Lisbon #ceramics #Mug #ceramics #handmade!";
        let listing = fallback_listing(caption, "  it holds 350 ml  ");

        assert_eq!(listing.name, "New drop: ceramic mug ☕");
        assert!(listing.description.starts_with("New drop"));
        assert!(listing.description.ends_with("it holds 350 ml"));
        assert_eq!(listing.keywords, vec!["ceramics", "Mug", "handmade"]);
    }

    #[test]
    fn test_fallback_listing_empty_inputs() {
        let listing = fallback_listing("", "");
        assert_eq!(listing.name, "Untitled post");
        assert!(listing.description.is_empty());
        assert!(listing.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_text_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let text = read_text_or_empty(&dir.path().join("caption.txt")).await.unwrap();
        assert!(text.is_empty());
    }
}
