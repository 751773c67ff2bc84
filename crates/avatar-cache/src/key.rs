//! Cache key derivation
//!
//! A [`RequestDescriptor`] is sanitized (uploaded skin bytes replaced by their
//! content hash), canonically serialized with sorted object keys, and hashed
//! into a fixed-length hex [`CacheKey`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a hex-encoded SHA-256 digest
pub const KEY_LEN: usize = 64;

/// How the source skin texture is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Mojang,
    Website,
    Upload,
    Url,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::Mojang => "mojang",
            RetrievalMethod::Website => "website",
            RetrievalMethod::Upload => "upload",
            RetrievalMethod::Url => "url",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the skin a render starts from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkinSource {
    pub username: Option<String>,
    pub website: Option<String>,
    pub url: Option<String>,
    /// Raw bytes of an uploaded skin. Never enters a key directly.
    pub upload: Option<Vec<u8>>,
}

impl SkinSource {
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn website(website: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            website: Some(website.into()),
            ..Self::default()
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn upload(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            upload: Some(bytes.into()),
            ..Self::default()
        }
    }
}

/// Everything that determines the bytes of a rendered avatar
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: RetrievalMethod,
    pub skin: SkinSource,
    /// Render style, e.g. `minimal`, `vintage`, `side`
    pub model_type: String,
    pub generate_options: Value,
    pub background_options: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(method: RetrievalMethod, skin: SkinSource, model_type: impl Into<String>) -> Self {
        Self {
            method,
            skin,
            model_type: model_type.into(),
            generate_options: Value::Object(Default::default()),
            background_options: None,
        }
    }

    pub fn with_generate_options(mut self, options: Value) -> Self {
        self.generate_options = options;
        self
    }

    pub fn with_background_options(mut self, options: Value) -> Self {
        self.background_options = Some(options);
        self
    }

    /// Background options as they affect the output: absent, `null` and `{}`
    /// all render without a background.
    pub fn effective_background(&self) -> Option<&Value> {
        match &self.background_options {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(other) => Some(other),
        }
    }

    /// Derive the cache key for this descriptor
    pub fn cache_key(&self) -> CacheKey {
        derive_key(self)
    }
}

/// Hex-encoded SHA-256 fingerprint of a sanitized descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Accepts exactly 64 lowercase hex characters
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == KEY_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| CacheKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(digest: &[u8]) -> Self {
        CacheKey(hex::encode(digest))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CacheKey::parse(&value).ok_or_else(|| format!("invalid cache key: {}", value))
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Hash uploaded skin bytes so equal content yields equal keys
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Map a descriptor to its cache key.
///
/// Pure and deterministic across processes: object keys inside the option
/// blobs are sorted before hashing, and upload bytes are replaced by their
/// content hash.
pub fn derive_key(descriptor: &RequestDescriptor) -> CacheKey {
    let canonical = canonicalize(&sanitize(descriptor)).to_string();
    CacheKey::from_digest(&Sha256::digest(canonical.as_bytes()))
}

fn sanitize(descriptor: &RequestDescriptor) -> Value {
    let skin = &descriptor.skin;
    json!({
        "method": descriptor.method.as_str(),
        "skinData": {
            "username": skin.username,
            "website": skin.website,
            "skinUrl": skin.url,
            "skinBufferHash": skin.upload.as_deref().map(content_hash),
        },
        "modelType": descriptor.model_type,
        "generateOptions": descriptor.generate_options,
        "backgroundOptions": descriptor.effective_background(),
    })
}

/// Rebuild `value` with every object's keys in sorted order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
