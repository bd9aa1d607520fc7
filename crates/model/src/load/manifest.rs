use serde::{Deserialize, Serialize};

/// Fully qualified object URL for `key` in `bucket`.
pub fn object_url(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    /// A missing mandatory file fails the load instead of being skipped.
    pub mandatory: bool,
}

/// The manifest document the bulk-load statement reads its file list from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// One mandatory entry per key, in the order given.
    pub fn for_keys<'a>(bucket: &str, keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            entries: keys
                .into_iter()
                .map(|key| ManifestEntry {
                    url: object_url(bucket, key),
                    mandatory: true,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a staged manifest lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRef {
    pub bucket: String,
    pub key: String,
    pub entries: usize,
}

impl ManifestRef {
    pub fn url(&self) -> String {
        object_url(&self.bucket, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_document_shape() {
        let manifest = Manifest::for_keys("bucket", ["a.txt", "b.txt"]);
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "entries": [
                    {"url": "s3://bucket/a.txt", "mandatory": true},
                    {"url": "s3://bucket/b.txt", "mandatory": true}
                ]
            })
        );
    }
}
