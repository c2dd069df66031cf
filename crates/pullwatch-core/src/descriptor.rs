//! Content descriptors announced by the fetch machinery.
//!
//! A descriptor is the minimum the discovery callback sees for each content
//! item: its digest, media type and expected size.

use std::fmt;

pub const MEDIA_TYPE_DOCKER_SCHEMA1_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const MEDIA_TYPE_DOCKER_SCHEMA2_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_DOCKER_LAYER_GZIP: &str =
    "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

/// Content-addressed identifier, e.g. `sha256:9f86d0…`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Algorithm prefix plus the first 12 hex characters (`sha256:9f86d081884c`).
    pub fn short(&self) -> &str {
        let hex_start = self.0.find(':').map(|i| i + 1).unwrap_or(0);
        let end = self
            .0
            .char_indices()
            .nth(hex_start + 12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Digest {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What kind of object a media type names; drives the display name of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Index,
    Manifest,
    Config,
    Layer,
    Unknown,
}

impl ContentKind {
    pub fn from_media_type(media_type: &str) -> Self {
        match media_type {
            MEDIA_TYPE_DOCKER_MANIFEST_LIST | MEDIA_TYPE_OCI_INDEX => ContentKind::Index,
            MEDIA_TYPE_DOCKER_SCHEMA1_MANIFEST
            | MEDIA_TYPE_DOCKER_SCHEMA2_MANIFEST
            | MEDIA_TYPE_OCI_MANIFEST => ContentKind::Manifest,
            MEDIA_TYPE_DOCKER_CONFIG | MEDIA_TYPE_OCI_CONFIG => ContentKind::Config,
            mt if mt.starts_with(MEDIA_TYPE_DOCKER_LAYER_GZIP)
                || mt.starts_with(MEDIA_TYPE_OCI_LAYER)
                || mt.starts_with("application/vnd.docker.image.rootfs.") =>
            {
                ContentKind::Layer
            }
            _ => ContentKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Index => "index",
            ContentKind::Manifest => "manifest",
            ContentKind::Config => "config",
            ContentKind::Layer => "layer",
            ContentKind::Unknown => "unknown",
        }
    }
}

/// One content item as seen by the discovery callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub digest: Digest,
    pub media_type: String,
    pub size: u64,
}

impl Descriptor {
    pub fn new(digest: impl Into<Digest>, media_type: impl Into<String>, size: u64) -> Self {
        Self {
            digest: digest.into(),
            media_type: media_type.into(),
            size,
        }
    }

    pub fn kind(&self) -> ContentKind {
        ContentKind::from_media_type(&self.media_type)
    }

    /// Schema-1 manifests are converted by the puller and never land in the
    /// store under their own digest, so they are not tracked.
    pub fn is_trackable(&self) -> bool {
        self.media_type != MEDIA_TYPE_DOCKER_SCHEMA1_MANIFEST
    }

    /// Display name: `<kind>-<digest>`.
    pub fn ref_key(&self) -> String {
        format!("{}-{}", self.kind().as_str(), self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_digest_keeps_algorithm_and_twelve_hex_chars() {
        let d = Digest::new("sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08");
        assert_eq!(d.short(), "sha256:9f86d081884c");
        assert_eq!(Digest::new("sha256:abc").short(), "sha256:abc");
        assert_eq!(Digest::new("abcdef0123456789").short(), "abcdef012345");
    }

    #[test]
    fn kind_from_media_type() {
        assert_eq!(
            ContentKind::from_media_type(MEDIA_TYPE_OCI_INDEX),
            ContentKind::Index
        );
        assert_eq!(
            ContentKind::from_media_type(MEDIA_TYPE_DOCKER_SCHEMA2_MANIFEST),
            ContentKind::Manifest
        );
        assert_eq!(
            ContentKind::from_media_type(MEDIA_TYPE_OCI_CONFIG),
            ContentKind::Config
        );
        assert_eq!(
            ContentKind::from_media_type("application/vnd.oci.image.layer.v1.tar+gzip"),
            ContentKind::Layer
        );
        assert_eq!(
            ContentKind::from_media_type("application/octet-stream"),
            ContentKind::Unknown
        );
    }

    #[test]
    fn ref_key_prefixes_kind() {
        let desc = Descriptor::new("sha256:aaa", MEDIA_TYPE_DOCKER_LAYER_GZIP, 10);
        assert_eq!(desc.ref_key(), "layer-sha256:aaa");
    }

    #[test]
    fn schema1_manifest_is_not_trackable() {
        let desc = Descriptor::new("sha256:aaa", MEDIA_TYPE_DOCKER_SCHEMA1_MANIFEST, 10);
        assert!(!desc.is_trackable());
        let desc = Descriptor::new("sha256:bbb", MEDIA_TYPE_OCI_MANIFEST, 10);
        assert!(desc.is_trackable());
    }
}
