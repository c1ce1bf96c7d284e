//! Keyword fallback for records whose extractor could not read a category.
//!
//! Listing-card scrapes frequently miss the category breadcrumb; the URL and
//! product name usually carry enough signal to place the item. Applied at the
//! extract boundary only — the reconciler never invents field values.

const BOTTOM_WORDS: [&str; 4] = ["pant", "jogger", "short", "bottom"];
const TOP_WORDS: [&str; 8] = [
    "shirt", "tee", "tank", "polo", "top", "henley", "vneck", "sleeve",
];
const OUTERWEAR_WORDS: [&str; 8] = [
    "jacket", "hoodie", "vest", "fleece", "blazer", "cardigan", "sweater", "pullover",
];

/// Infers a category from the product URL and display name.
///
/// Returns `None` when nothing matches; callers then fall back to `"Other"`
/// or leave the field empty, their choice.
#[must_use]
pub fn infer_category(url: Option<&str>, name: Option<&str>) -> Option<&'static str> {
    let url = url.unwrap_or_default().to_lowercase();
    let name = name.unwrap_or_default().to_lowercase();
    let matches = |words: &[&str]| {
        words
            .iter()
            .any(|w| url.contains(w) || name.contains(w))
    };

    if matches(&BOTTOM_WORDS) {
        if url.contains("short") || name.contains("short") {
            return Some("Shorts");
        }
        return Some("Bottoms");
    }
    if matches(&TOP_WORDS) {
        return Some("Tops");
    }
    if matches(&OUTERWEAR_WORDS) {
        return Some("Outerwear");
    }
    if url.contains("bra") || name.contains("bra") {
        return Some("Sports Bras");
    }
    if url.contains("legging") || name.contains("legging") {
        return Some("Leggings");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorts_beat_the_generic_bottoms_bucket() {
        assert_eq!(
            infer_category(Some("https://x.com/products/mako-short-7in"), None),
            Some("Shorts")
        );
    }

    #[test]
    fn joggers_are_bottoms() {
        assert_eq!(
            infer_category(None, Some("Transit Jogger")),
            Some("Bottoms")
        );
    }

    #[test]
    fn tee_in_name_is_tops() {
        assert_eq!(infer_category(None, Some("Strato Tech Tee")), Some("Tops"));
    }

    #[test]
    fn hoodie_is_outerwear() {
        assert_eq!(
            infer_category(Some("https://x.com/products/summit-hoodie"), None),
            Some("Outerwear")
        );
    }

    #[test]
    fn leggings_and_bras_have_their_own_buckets() {
        assert_eq!(infer_category(None, Some("High-Rise Legging")), Some("Leggings"));
        assert_eq!(infer_category(None, Some("Motion Sports Bra")), Some("Sports Bras"));
    }

    #[test]
    fn no_signal_yields_none() {
        assert_eq!(infer_category(Some("https://x.com/products/gift-card"), None), None);
        assert_eq!(infer_category(None, None), None);
    }
}
