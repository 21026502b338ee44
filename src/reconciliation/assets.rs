//! Asset discovery in intention form data.
//!
//! Form data is an arbitrary JSON document. Uploaded images are referenced by
//! public URLs, which are mapped back to blob storage keys before deletion.

use serde_json::Value;
use url::Url;

const ASSET_PATH_MARKERS: [&str; 3] = ["/file/", "/temp/", "/r2/"];

fn looks_like_url(value: &str) -> bool {
    Url::parse(value).is_ok()
}

/// Collect asset URLs from a form data document, in document order.
///
/// A string field is collected when it parses as a URL and either its key
/// contains `preview` (any case) or its value contains an asset path marker.
/// Objects and arrays are walked recursively; strings directly inside arrays
/// are not collected since they have no key.
pub fn find_asset_urls(document: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_urls(document, &mut out);
    out
}

fn collect_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_urls(item, out)),
        Value::Object(fields) => {
            for (key, field) in fields {
                match field {
                    Value::String(s) => {
                        let is_candidate = key.to_lowercase().contains("preview")
                            || ASSET_PATH_MARKERS.iter().any(|m| s.contains(m));
                        if is_candidate && looks_like_url(s) {
                            out.push(s.clone());
                        }
                    }
                    Value::Object(_) | Value::Array(_) => collect_urls(field, out),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

/// Map a public URL (or bare key) to the storage key it was uploaded under.
///
/// ```
/// use intention_reaper::reconciliation::storage_key_from_public_url;
///
/// assert_eq!(
///     storage_key_from_public_url("https://cdn.example.com/file/temp/a/b.jpg").as_deref(),
///     Some("temp/a/b.jpg")
/// );
/// assert_eq!(storage_key_from_public_url("temp/a/b.jpg").as_deref(), Some("temp/a/b.jpg"));
/// ```
pub fn storage_key_from_public_url(public_url: &str) -> Option<String> {
    if !public_url.contains("://") && !public_url.starts_with('/') {
        return non_empty(public_url.to_string());
    }

    let url = Url::parse(public_url).ok()?;
    let path = url.path();

    let key = if let Some(idx) = path.find("/file/") {
        &path[idx + "/file/".len()..]
    } else if let Some(rest) = path.strip_prefix("/file") {
        rest.strip_prefix('/').unwrap_or(rest)
    } else {
        path.strip_prefix('/').unwrap_or(path)
    };

    non_empty(key.to_string())
}

fn non_empty(key: String) -> Option<String> {
    (!key.is_empty()).then_some(key)
}

/// Resolve every storage key an intention owns: the assets referenced from
/// `form_data` plus the QR code. Keys are normalised (no leading `/`) and
/// de-duplicated, keeping first-seen order.
pub fn collect_storage_keys(form_data: Option<&Value>, qr_code: Option<&str>) -> Vec<String> {
    let urls = form_data.map(find_asset_urls).unwrap_or_default();

    let mut keys: Vec<String> = Vec::new();
    for raw in urls.iter().map(String::as_str).chain(qr_code) {
        let Some(key) = storage_key_from_public_url(raw) else {
            continue;
        };
        let key = key.strip_prefix('/').map(str::to_string).unwrap_or(key);
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_preview_key_collected() {
        let doc = json!({"previewImg": "https://host/x.png", "note": "hello"});
        assert_eq!(find_asset_urls(&doc), vec!["https://host/x.png"]);
    }

    #[test]
    fn test_preview_key_is_case_insensitive() {
        let doc = json!({"coverPREVIEW": "https://host/cover.png"});
        assert_eq!(find_asset_urls(&doc), vec!["https://host/cover.png"]);
    }

    #[test]
    fn test_path_markers_collected() {
        let doc = json!({
            "a": "https://cdn.example.com/file/temp/a.jpg",
            "b": "https://cdn.example.com/temp/b.jpg",
            "c": "https://cdn.example.com/r2/c.jpg",
            "d": "https://cdn.example.com/other/d.jpg",
        });
        let mut urls = find_asset_urls(&doc);
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/file/temp/a.jpg",
                "https://cdn.example.com/r2/c.jpg",
                "https://cdn.example.com/temp/b.jpg",
            ]
        );
    }

    #[test]
    fn test_nested_objects_and_arrays_recursed() {
        let doc = json!({
            "pages": [
                {"photo": {"previewUrl": "https://host/p1.png"}},
                {"photos": [{"src": "https://host/file/p2.png"}]},
            ]
        });
        let mut urls = find_asset_urls(&doc);
        urls.sort();
        assert_eq!(urls, vec!["https://host/file/p2.png", "https://host/p1.png"]);
    }

    #[test]
    fn test_non_urls_and_non_strings_ignored() {
        let doc = json!({
            "preview": "not a url",
            "path": "/file/relative.png",
            "previewCount": 3,
            "previewFlag": true,
            "previewNothing": null,
        });
        assert!(find_asset_urls(&doc).is_empty());
    }

    #[test]
    fn test_strings_directly_in_arrays_ignored() {
        let doc = json!({"gallery": ["https://host/file/a.png", "https://host/file/b.png"]});
        assert!(find_asset_urls(&doc).is_empty());
    }

    #[test]
    fn test_scalar_document_has_no_assets() {
        assert!(find_asset_urls(&json!("https://host/file/a.png")).is_empty());
        assert!(find_asset_urls(&Value::Null).is_empty());
    }

    #[rstest]
    #[case("https://host/file/temp/a/b.jpg", Some("temp/a/b.jpg"))]
    #[case("https://host/prefix/file/temp/a.jpg", Some("temp/a.jpg"))]
    #[case("https://host/file", None)]
    #[case("https://host/fileset/a.jpg", Some("set/a.jpg"))]
    #[case("https://host/temp/a.jpg", Some("temp/a.jpg"))]
    #[case("https://host/", None)]
    #[case("temp/a/b.jpg", Some("temp/a/b.jpg"))]
    #[case("/temp/a.jpg", None)]
    #[case("https://", None)]
    #[case("", None)]
    fn test_storage_key_from_public_url(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(storage_key_from_public_url(input).as_deref(), expected);
    }

    #[test]
    fn test_collect_keys_includes_qr_and_dedupes() {
        let doc = json!({
            "previewImg": "https://cdn.example.com/file/temp/a.jpg",
            "again": {"previewImg": "https://cdn.example.com/file/temp/a.jpg"},
        });
        let keys = collect_storage_keys(
            Some(&doc),
            Some("https://cdn.example.com/file/qr/i1.png"),
        );
        assert_eq!(keys, vec!["temp/a.jpg", "qr/i1.png"]);
    }

    #[test]
    fn test_collect_keys_qr_already_present() {
        let doc = json!({"previewQr": "https://cdn.example.com/file/qr/i1.png"});
        let keys = collect_storage_keys(Some(&doc), Some("qr/i1.png"));
        assert_eq!(keys, vec!["qr/i1.png"]);
    }

    #[test]
    fn test_collect_keys_without_inputs() {
        assert!(collect_storage_keys(None, None).is_empty());
    }
}
