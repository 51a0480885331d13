//! App manifest (`plugin.json`) loading and config scaffolding
//!
//! The manifest declares the app's name and its configurable fields. Each
//! field says which surfaces it applies to; the dev server turns the
//! applicable fields into a flat `key -> default` mapping that is handed to
//! the app's `inject` entry point.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Fixed manifest filename, relative to the project directory.
pub const MANIFEST_FILENAME: &str = "plugin.json";

/// Prefix of the browser local-storage entry holding edited site config.
pub const STORAGE_KEY_PREFIX: &str = "siteConfig-";

/// Error while loading a manifest
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// The file could not be read
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON, but not a manifest object
    #[error("{0}")]
    Shape(String),
}

/// Rendering context a config field or script applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    /// Page-embedded script (`web.ts`), toolbar or overlay style
    Web,
    /// Full-page script (`site.ts`) with live reload and a config editor
    Site,
}

impl Surface {
    /// Manifest flag that marks a config field as applicable.
    pub fn flag(self) -> &'static str {
        match self {
            Surface::Web => "web",
            Surface::Site => "site",
        }
    }

    /// Default source file for this surface.
    pub fn default_source(self) -> &'static str {
        match self {
            Surface::Web => "web.ts",
            Surface::Site => "site.ts",
        }
    }

    /// Tracking client option that opts the page out of every other app.
    pub fn opt_out_option(self) -> &'static str {
        match self {
            Surface::Web => "opt_in_web_app_injection",
            Surface::Site => "opt_in_site_apps",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

/// A declared config field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigField {
    pub key: String,
    /// Missing defaults are `null`
    #[serde(default)]
    pub default: Value,
    /// Applies to the page-embedded surface
    #[serde(default, deserialize_with = "truthy")]
    pub web: bool,
    /// Applies to the full-page surface
    #[serde(default, deserialize_with = "truthy")]
    pub site: bool,
}

/// Read a surface flag the way the manifest's JavaScript consumers do:
/// `null`, `false`, `0` and `""` are off, anything else is on.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(is_truthy(&Value::deserialize(deserializer)?))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl ConfigField {
    /// Whether this field is part of the config for `surface`.
    pub fn applies_to(&self, surface: Surface) -> bool {
        match surface {
            Surface::Web => self.web,
            Surface::Site => self.site,
        }
    }
}

#[derive(Deserialize)]
struct ManifestDoc {
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    config: Option<Vec<ConfigField>>,
}

/// A parsed `plugin.json`.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: Option<String>,
    pub config: Vec<ConfigField>,
    /// The document as written, used for display and the storage key
    pub raw: Value,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse manifest JSON text.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let raw: Value = serde_json::from_str(text)?;
        if !raw.is_object() {
            return Err(ManifestError::Shape("expected a JSON object at the top level".into()));
        }
        let doc: ManifestDoc = serde_json::from_value(raw.clone())?;
        // A name that is not a non-empty string counts as missing
        let name = match doc.name {
            Some(Value::String(name)) if !name.is_empty() => Some(name),
            _ => None,
        };
        Ok(Self { name, config: doc.config.unwrap_or_default(), raw })
    }

    /// Defaults of the fields applicable to `surface`, in manifest order.
    pub fn config_mapping(&self, surface: Surface) -> ConfigMapping {
        let mut mapping = ConfigMapping::default();
        for field in self.config.iter().filter(|f| f.applies_to(surface)) {
            mapping.insert(field.key.clone(), field.default.clone());
        }
        mapping
    }

    /// Local-storage key for browser-side config overrides.
    ///
    /// Derived from the declared config fields as written, so editing the
    /// declarations orphans previously stored overrides.
    pub fn storage_key(&self) -> String {
        let declared = self.raw.get("config").unwrap_or(&Value::Null);
        let digest = md5::compute(declared.to_string().as_bytes());
        format!("{}{:x}", STORAGE_KEY_PREFIX, digest)
    }

    /// Name to show in page titles, or `fallback`.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => fallback,
        }
    }
}

/// Load the manifest at `path` and derive the config for `surface`.
pub fn load_config(path: &Path, surface: Surface) -> Result<ConfigMapping, ManifestError> {
    Ok(Manifest::load(path)?.config_mapping(surface))
}

/// Ordered `key -> default` mapping handed to the app.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMapping(Map<String, Value>);

impl ConfigMapping {
    /// Insert a default; a repeated key keeps its first position.
    pub fn insert(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in manifest order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The mapping as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const DEMO: &str = r#"{
        "name": "Demo",
        "config": [
            {"key": "greeting", "default": "hi", "site": true},
            {"key": "color", "default": "red", "web": true},
            {"key": "both", "default": 3, "site": true, "web": true},
            {"key": "neither", "default": false}
        ]
    }"#;

    #[test]
    fn test_config_mapping_filters_by_surface() {
        let manifest = Manifest::parse(DEMO).unwrap();

        let site = manifest.config_mapping(Surface::Site);
        assert_eq!(site.len(), 2);
        assert_eq!(site.get("greeting"), Some(&json!("hi")));
        assert_eq!(site.get("both"), Some(&json!(3)));
        assert!(site.get("color").is_none());

        let web = manifest.config_mapping(Surface::Web);
        assert_eq!(web.len(), 2);
        assert_eq!(web.get("color"), Some(&json!("red")));
        assert!(web.get("neither").is_none());
    }

    #[test]
    fn test_config_mapping_preserves_manifest_order() {
        let manifest = Manifest::parse(
            r#"{"config": [
                {"key": "z", "default": 1, "site": true},
                {"key": "a", "default": 2, "site": true},
                {"key": "m", "default": 3, "site": true}
            ]}"#,
        )
        .unwrap();
        let keys: Vec<_> = manifest.config_mapping(Surface::Site).keys().map(String::from).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_missing_config_and_default() {
        let manifest = Manifest::parse(r#"{"name": "Empty"}"#).unwrap();
        assert!(manifest.config.is_empty());
        assert!(manifest.config_mapping(Surface::Site).is_empty());

        let manifest =
            Manifest::parse(r#"{"config": [{"key": "k", "web": true}]}"#).unwrap();
        assert_eq!(manifest.config_mapping(Surface::Web).get("k"), Some(&Value::Null));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Manifest::parse("{not json"), Err(ManifestError::Json(_))));
        assert!(matches!(Manifest::parse("[1, 2]"), Err(ManifestError::Shape(_))));
        assert!(matches!(
            Manifest::parse(r#"{"config": [{"default": 1}]}"#),
            Err(ManifestError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Manifest::load(&temp.path().join(MANIFEST_FILENAME));
        assert!(matches!(result, Err(ManifestError::Io(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(MANIFEST_FILENAME);
        std::fs::write(&path, DEMO).unwrap();

        let mapping = load_config(&path, Surface::Site).unwrap();
        assert_eq!(mapping.to_value(), json!({"greeting": "hi", "both": 3}));
    }

    #[test]
    fn test_storage_key_tracks_config_shape() {
        let a = Manifest::parse(r#"{"name": "A", "config": [{"key": "x", "default": 1}]}"#)
            .unwrap();
        let b = Manifest::parse(r#"{"name": "B", "config": [{"key": "x", "default": 1}]}"#)
            .unwrap();
        let c = Manifest::parse(r#"{"name": "A", "config": [{"key": "y", "default": 1}]}"#)
            .unwrap();

        assert_eq!(a.storage_key(), b.storage_key());
        assert_ne!(a.storage_key(), c.storage_key());
        assert!(a.storage_key().starts_with(STORAGE_KEY_PREFIX));
        // md5 hex digest
        assert_eq!(a.storage_key().len(), STORAGE_KEY_PREFIX.len() + 32);
    }

    #[test]
    fn test_storage_key_matches_compact_json_digest() {
        let manifest = Manifest::parse(r#"{"config": [ {"key": "x",  "default": 1} ]}"#).unwrap();
        let expected = format!("{:x}", md5::compute(br#"[{"key":"x","default":1}]"#));
        assert_eq!(manifest.storage_key(), format!("siteConfig-{}", expected));
    }

    #[test]
    fn test_surface_flags_follow_truthiness() {
        let manifest = Manifest::parse(
            r#"{"config": [
                {"key": "one", "default": 1, "site": 1},
                {"key": "null", "default": 2, "site": null},
                {"key": "text", "default": 3, "site": "true"},
                {"key": "empty", "default": 4, "site": ""},
                {"key": "zero", "default": 5, "site": 0, "web": [1]},
                {"key": "obj", "default": 6, "site": {}}
            ]}"#,
        )
        .unwrap();

        let keys: Vec<_> = manifest.config_mapping(Surface::Site).keys().map(String::from).collect();
        assert_eq!(keys, vec!["one", "text", "obj"]);
        let keys: Vec<_> = manifest.config_mapping(Surface::Web).keys().map(String::from).collect();
        assert_eq!(keys, vec!["zero"]);
    }

    #[test]
    fn test_non_string_name_counts_as_missing() {
        for text in [r#"{"name": 42}"#, r#"{"name": null}"#, r#"{"name": ""}"#, r#"{"name": ["a"]}"#] {
            let manifest = Manifest::parse(text).unwrap();
            assert_eq!(manifest.name, None, "{}", text);
            assert_eq!(manifest.display_name("PostHog App"), "PostHog App");
        }
    }

    #[test]
    fn test_display_name_fallback() {
        let named = Manifest::parse(r#"{"name": "Demo"}"#).unwrap();
        let unnamed = Manifest::parse(r#"{}"#).unwrap();
        assert_eq!(named.display_name("PostHog App"), "Demo");
        assert_eq!(unnamed.display_name("PostHog App"), "PostHog App");
    }

    #[test]
    fn test_surface_names() {
        assert_eq!(Surface::Site.flag(), "site");
        assert_eq!(Surface::Web.default_source(), "web.ts");
        assert_eq!(Surface::Site.opt_out_option(), "opt_in_site_apps");
        assert_eq!(Surface::Web.to_string(), "web");
    }
}
