use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// Object storage notification payload (`{"Records": [...]}`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketRef,
    pub object: ObjectKeyRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectKeyRef {
    /// URL-encoded key, `+` stands for a space
    pub key: String,
}

impl EventRecord {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::from_encoded(&self.s3.bucket.name, &self.s3.object.key)
    }
}

/// A decoded bucket/key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Decode a notification key: `+` becomes a space, then `%XX` escapes are resolved
    pub fn from_encoded(bucket: &str, encoded_key: &str) -> Self {
        let spaced = encoded_key.replace('+', " ");
        let key = percent_decode_str(&spaced).decode_utf8_lossy().into_owned();
        Self::new(bucket, key)
    }

    /// Keys mentioning `view` belong to view templates and never start an ingestion
    pub fn is_view_template(&self) -> bool {
        self.key.contains("view")
    }

    /// Parent path of the key, empty for keys at the bucket root
    pub fn directory(&self) -> &str {
        match self.key.rfind('/') {
            Some(idx) => &self.key[..idx],
            None => "",
        }
    }

    pub fn file_name(&self) -> &str {
        match self.key.rfind('/') {
            Some(idx) => &self.key[idx + 1..],
            None => &self.key,
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
