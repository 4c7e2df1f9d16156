// Reference resolution: raw scanned/typed strings to canonical asset tags
//
// A scanned value may be a full URL to a stored QR image, the bare image
// filename, a generic URL ending in the tag, or the tag itself. Resolution
// never fails; when nothing can be extracted the input is used verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Stored QR artifacts are named `qr_<TAG>_<epochMillis>.png`.
static ARTIFACT_FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"qr_([^_]+)_\d+\.png").expect("artifact filename pattern is valid")
});

/// Marker that identifies a bare asset tag.
const TAG_MARKER: &str = "ASSET";

/// Which resolution rule produced the canonical tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceForm {
    /// `qr_<TAG>_<digits>.png`, alone or inside a longer URL.
    ArtifactPath,
    /// Any string containing `/`; the last segment is the tag.
    UrlPath,
    /// A bare tag containing the `ASSET` marker.
    AssetTag,
    /// Nothing recognisable; the input is used as-is.
    Opaque,
}

/// Extracts the canonical asset tag from a raw reference.
///
/// Rules are tried in priority order, first match wins:
/// 1. stored-artifact filename `qr_<TAG>_<digits>.png` anywhere in the string
/// 2. text after the last `/`
/// 3. a string containing `ASSET` is already a tag
/// 4. anything else is returned unchanged
///
/// # Examples
/// ```
/// use assetlink_core::resolve_reference;
///
/// let url = "https://host/uploads/digital-assets/qr_ASSET555_1754296433008.png";
/// assert_eq!(resolve_reference(url), "ASSET555");
/// assert_eq!(resolve_reference("http://host/api/assets/ASSET777"), "ASSET777");
/// assert_eq!(resolve_reference("ASSET555"), "ASSET555");
/// ```
pub fn resolve_reference(raw: &str) -> String {
    resolve(raw).1.to_string()
}

/// Reports which rule [`resolve_reference`] applies to `raw`.
pub fn classify_reference(raw: &str) -> ReferenceForm {
    resolve(raw).0
}

fn resolve(raw: &str) -> (ReferenceForm, &str) {
    if let Some(tag) = ARTIFACT_FILE_PATTERN
        .captures(raw)
        .and_then(|caps| caps.get(1))
    {
        return (ReferenceForm::ArtifactPath, tag.as_str());
    }

    if let Some(idx) = raw.rfind('/') {
        return (ReferenceForm::UrlPath, &raw[idx + 1..]);
    }

    if raw.contains(TAG_MARKER) {
        return (ReferenceForm::AssetTag, raw);
    }

    (ReferenceForm::Opaque, raw)
}
