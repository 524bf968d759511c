//! OpenAPI / Swagger document detection and parsing.
//!
//! Documents arrive as JSON or YAML text. The format is chosen from the file
//! name when it has a `.yaml`/`.yml` extension, otherwise JSON is tried first
//! and YAML is the fallback.

use serde_json::Value;

use crate::error::CoreError;

/// Error text for a document with neither `swagger` nor `openapi` key.
pub const MISSING_VERSION_KEY: &str =
    "Invalid OpenAPI/Swagger spec: missing \"swagger\" or \"openapi\" property";

/// Prefix of every structural validation error.
pub const VALIDATION_FAILED: &str = "Schema validation failed";

/// Error text for content that is neither JSON nor a YAML mapping.
pub const UNPARSEABLE: &str = "Invalid file format: could not parse as JSON or YAML";

/// URL substrings that mark a link as a likely spec or docs location.
const SPEC_URL_MARKERS: [&str; 3] = ["swagger", "openapi", "api-docs"];

/// Suffixes that mark a link as a likely spec document.
const SPEC_URL_SUFFIXES: [&str; 2] = [".json", ".yaml"];

fn is_yaml_name(name: &str) -> bool {
    name.ends_with(".yaml") || name.ends_with(".yml")
}

fn parse_yaml_mapping(content: &str) -> Option<Value> {
    serde_yaml::from_str::<Value>(content)
        .ok()
        .filter(Value::is_object)
}

/// Parse document text as JSON or YAML.
///
/// `name` is a file name or URL path used only for format detection.
pub fn parse_document(content: &str, name: &str) -> Result<Value, CoreError> {
    let yaml_first = is_yaml_name(name);

    if yaml_first {
        if let Some(value) = parse_yaml_mapping(content) {
            return Ok(value);
        }
    }

    match serde_json::from_str::<Value>(content) {
        Ok(value) => Ok(value),
        Err(_) if !yaml_first => {
            parse_yaml_mapping(content).ok_or_else(|| CoreError::Validation(UNPARSEABLE.into()))
        }
        Err(_) => Err(CoreError::Validation(UNPARSEABLE.into())),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

/// Whether a parsed document declares a `swagger` or `openapi` version.
pub fn is_openapi_document(doc: &Value) -> bool {
    ["swagger", "openapi"]
        .iter()
        .any(|key| doc.get(key).is_some_and(is_truthy))
}

/// Parse, check the version key, and validate the document's structure.
pub fn parse_openapi_document(content: &str, name: &str) -> Result<Value, CoreError> {
    let doc = parse_document(content, name)?;
    if !is_openapi_document(&doc) {
        return Err(CoreError::Validation(MISSING_VERSION_KEY.into()));
    }
    validate_openapi_document(&doc)?;
    Ok(doc)
}

/// Check a document's structure against the version it declares.
///
/// Every version must carry the required top-level fields. OpenAPI 3.0
/// documents are additionally deserialized into the typed `openapiv3` model,
/// which rejects malformed objects anywhere in the tree. The error message
/// is `Schema validation failed: <first problem>`.
pub fn validate_openapi_document(doc: &Value) -> Result<(), CoreError> {
    let invalid = |reason: String| CoreError::Validation(format!("{VALIDATION_FAILED}: {reason}"));

    let version = required_fields(doc).map_err(invalid)?;
    if version.starts_with("3.0") {
        serde_json::from_value::<openapiv3::OpenAPI>(doc.clone())
            .map_err(|e| invalid(e.to_string()))?;
    }
    Ok(())
}

/// Returns the declared version on success.
fn required_fields(doc: &Value) -> Result<&str, String> {
    let (key, version) = match (doc.get("openapi"), doc.get("swagger")) {
        (Some(v), _) => ("openapi", v),
        (None, Some(v)) => ("swagger", v),
        (None, None) => return Err("must have required property 'openapi'".into()),
    };
    let version = version
        .as_str()
        .ok_or_else(|| format!("/{key} must be string"))?;

    let info = doc
        .get("info")
        .ok_or("must have required property 'info'")?;
    if !info.is_object() {
        return Err("/info must be object".into());
    }
    for field in ["title", "version"] {
        match info.get(field) {
            None => return Err(format!("/info must have required property '{field}'")),
            Some(v) if !v.is_string() => return Err(format!("/info/{field} must be string")),
            Some(_) => {}
        }
    }

    // 3.1 relaxed `paths` to one of three top-level containers.
    if version.starts_with("3.1") {
        if !["paths", "components", "webhooks"]
            .iter()
            .any(|k| doc.get(k).is_some())
        {
            return Err("must have required property 'paths'".into());
        }
    } else if doc.get("paths").is_none() {
        return Err("must have required property 'paths'".into());
    }
    if doc.get("paths").is_some_and(|p| !p.is_object()) {
        return Err("/paths must be object".into());
    }
    Ok(version)
}

/// The document's `info.title`, if present.
pub fn document_title(doc: &Value) -> Option<&str> {
    doc.get("info")?.get("title")?.as_str()
}

/// Whether a link looks like it points at a spec or API docs page.
pub fn looks_like_spec_url(url: &str) -> bool {
    SPEC_URL_MARKERS.iter().any(|m| url.contains(m))
        || SPEC_URL_SUFFIXES.iter().any(|s| url.ends_with(s))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const YAML_DOC: &str = "openapi: 3.0.0\ninfo:\n  title: Pets\n  version: '1'\npaths: {}\n";

    // -- Parsing -------------------------------------------------------------

    #[test]
    fn parses_json_by_default() {
        let doc = parse_document(r#"{"swagger": "2.0"}"#, "spec.json").unwrap();
        assert_eq!(doc["swagger"], "2.0");
    }

    #[test]
    fn yaml_extension_prefers_yaml() {
        let doc = parse_document(YAML_DOC, "pets.yml").unwrap();
        assert_eq!(doc["openapi"], "3.0.0");
        assert_eq!(document_title(&doc), Some("Pets"));
    }

    #[test]
    fn json_name_falls_back_to_yaml() {
        let doc = parse_document(YAML_DOC, "paste.json").unwrap();
        assert_eq!(doc["info"]["title"], "Pets");
    }

    #[test]
    fn yaml_name_falls_back_to_json() {
        // A bare JSON string is valid YAML but not a mapping, so JSON wins.
        let doc = parse_document(r#""just text""#, "x.yaml").unwrap();
        assert_eq!(doc, Value::String("just text".into()));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_document("{not: [valid", "paste.json").unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg == UNPARSEABLE);
    }

    #[test]
    fn plain_scalar_text_is_not_a_document() {
        assert!(parse_document("hello world", "notes.txt").is_err());
    }

    // -- Validation ----------------------------------------------------------

    #[test]
    fn missing_version_key_is_rejected() {
        let err = parse_openapi_document(r#"{"info": {"title": "x"}}"#, "a.json").unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg == MISSING_VERSION_KEY);
    }

    fn validation_error(doc: Value) -> String {
        match validate_openapi_document(&doc) {
            Err(CoreError::Validation(msg)) => msg,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn well_formed_documents_pass() {
        assert!(parse_openapi_document(YAML_DOC, "pets.yaml").is_ok());
        let swagger = serde_json::json!({
            "swagger": "2.0",
            "info": {"title": "Legacy", "version": "1"},
            "paths": {}
        });
        assert!(validate_openapi_document(&swagger).is_ok());
        let webhooks_only = serde_json::json!({
            "openapi": "3.1.0",
            "info": {"title": "Hooks", "version": "1"},
            "webhooks": {}
        });
        assert!(validate_openapi_document(&webhooks_only).is_ok());
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let no_paths = serde_json::json!({
            "openapi": "3.0.3",
            "info": {"title": "x", "version": "1"}
        });
        assert_eq!(
            validation_error(no_paths),
            "Schema validation failed: must have required property 'paths'"
        );

        let no_title = serde_json::json!({
            "swagger": "2.0",
            "info": {"version": "1"},
            "paths": {}
        });
        assert_eq!(
            validation_error(no_title),
            "Schema validation failed: /info must have required property 'title'"
        );
    }

    #[test]
    fn numeric_version_is_rejected() {
        let err = validation_error(serde_json::json!({"openapi": 3, "paths": {}}));
        assert_eq!(err, "Schema validation failed: /openapi must be string");
    }

    #[test]
    fn malformed_nested_object_fails_typed_model() {
        let doc = serde_json::json!({
            "openapi": "3.0.0",
            "info": {"title": "x", "version": "1"},
            "paths": {"/pets": {"get": {"responses": "nope"}}}
        });
        let err = validation_error(doc);
        assert!(err.starts_with("Schema validation failed: "), "{err}");
    }

    #[test]
    fn parse_surfaces_validation_errors() {
        let err = parse_openapi_document(r#"{"openapi": "3.0.0", "paths": {}}"#, "a.json")
            .unwrap_err();
        assert_matches!(
            err,
            CoreError::Validation(msg)
                if msg == "Schema validation failed: must have required property 'info'"
        );
    }

    #[test]
    fn empty_version_is_not_a_document() {
        assert!(!is_openapi_document(&serde_json::json!({"openapi": ""})));
        assert!(!is_openapi_document(&serde_json::json!({"swagger": null})));
        assert!(is_openapi_document(&serde_json::json!({"openapi": "3.1.0"})));
    }

    #[test]
    fn arrays_are_not_documents() {
        assert!(!is_openapi_document(&serde_json::json!(["openapi"])));
    }

    // -- URL heuristics ------------------------------------------------------

    #[test]
    fn spec_like_urls() {
        assert!(looks_like_spec_url("https://x/swagger-ui/"));
        assert!(looks_like_spec_url("https://x/v2/api-docs"));
        assert!(looks_like_spec_url("https://x/files/petstore.yaml"));
        assert!(looks_like_spec_url("https://x/data.json"));
        assert!(!looks_like_spec_url("https://x/about"));
        assert!(!looks_like_spec_url("https://x/spec.yml"));
    }
}
