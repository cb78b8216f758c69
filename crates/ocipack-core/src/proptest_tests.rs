//! Property-based tests for ocipack-core.
//!
//! These tests use proptest to verify digest invariants across many randomly
//! generated manifests.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use crate::digest::{canonicalize, Digest};
use crate::manifest::{build_package_manifest, PackageMetadata, StagedArchive};
use crate::oci::{Descriptor, ImageManifest, MediaType, OciManifest};
use crate::version::PackageVersion;

/// Strategy for generating sha256 hex strings.
fn hex_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{64}"
}

/// Strategy for generating annotation maps as ordered key/value lists.
fn annotation_pairs_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map("[a-z][a-z.]{0,20}", "[ -~]{0,30}", 0..8)
        .prop_map(|map| map.into_iter().collect())
}

/// Strategy for generating repository names.
fn repository_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{1,15}/[a-z][a-z0-9._-]{1,20}"
}

/// Strategy for generating semantic versions.
fn version_strategy() -> impl Strategy<Value = String> {
    (0u64..1000, 0u64..1000, 0u64..1000, prop::option::of("[a-z]{1,5}(\\.[0-9]{1,3})?"))
        .prop_map(|(major, minor, patch, pre)| match pre {
            Some(pre) => format!("{major}.{minor}.{patch}-{pre}"),
            None => format!("{major}.{minor}.{patch}"),
        })
}

fn manifest_with(pairs: &[(String, String)], layer_hex: &str) -> ImageManifest {
    let layer = Descriptor::new(
        MediaType::new(MediaType::PACKAGE_TAR_LAYER),
        Digest::from_hex(layer_hex).unwrap(),
        42,
    );
    let mut manifest = ImageManifest::new(vec![layer]);
    for (k, v) in pairs {
        manifest = manifest.with_annotation(k, v);
    }
    manifest
}

proptest! {
    /// Manifests built with annotations inserted in different orders digest identically.
    #[test]
    fn manifest_digest_ignores_construction_order(
        pairs in annotation_pairs_strategy(),
        layer_hex in hex_strategy(),
    ) {
        let forward = manifest_with(&pairs, &layer_hex);
        let reversed: Vec<_> = pairs.iter().rev().cloned().collect();
        let backward = manifest_with(&reversed, &layer_hex);

        let a = forward.encode().unwrap();
        let b = backward.encode().unwrap();
        prop_assert_eq!(a.digest, b.digest);
        prop_assert_eq!(a.bytes, b.bytes);
    }

    /// Canonical bytes are a fixed point: re-parsing and re-encoding changes nothing.
    #[test]
    fn canonical_bytes_are_stable(
        pairs in annotation_pairs_strategy(),
        layer_hex in hex_strategy(),
    ) {
        let bytes = canonicalize(&manifest_with(&pairs, &layer_hex)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(canonicalize(&value).unwrap(), bytes);
    }

    /// Independently built package manifests with equal inputs digest identically.
    #[test]
    fn package_manifest_digest_is_deterministic(
        tar_hex in hex_strategy(),
        zip_hex in hex_strategy(),
        tar_size in 1u64..u64::from(u32::MAX),
        zip_size in 1u64..u64::from(u32::MAX),
        repository in repository_strategy(),
        version in version_strategy(),
        secs in 0i64..4_000_000_000,
    ) {
        let created = Utc.timestamp_opt(secs, 0).unwrap();
        let metadata = PackageMetadata {
            repository,
            repository_id: "1".to_string(),
            owner_id: "2".to_string(),
            commit_sha: "c0ffee".to_string(),
            version,
        };
        let tar = StagedArchive::new("a.tar.gz", tar_hex, tar_size);
        let zip = StagedArchive::new("a.zip", zip_hex, zip_size);

        let first = build_package_manifest(&tar, &zip, &metadata, &created).unwrap();
        let second = build_package_manifest(&tar.clone(), &zip.clone(), &metadata.clone(), &created)
            .unwrap();
        prop_assert_eq!(first.encode().unwrap().digest, second.encode().unwrap().digest);
    }

    /// The referrer tag is the hex digest prefixed with `sha256-` and contains no colon.
    #[test]
    fn referrer_tag_derivation(hex in hex_strategy()) {
        let digest = Digest::from_hex(&hex).unwrap();
        let tag = digest.referrer_tag();
        prop_assert_eq!(&tag, &format!("sha256-{hex}"));
        prop_assert!(!tag.contains(':'));
    }

    /// Parsing a digest string returns the same digest.
    #[test]
    fn digest_parse_matches_display(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let digest = Digest::of(&bytes);
        prop_assert_eq!(Digest::parse(digest.as_str()).unwrap(), digest);
    }

    /// Valid versions parse with or without the `v` prefix to the same tag.
    #[test]
    fn version_tag_strips_prefix(version in version_strategy()) {
        let bare = PackageVersion::parse(&version).unwrap();
        let prefixed = PackageVersion::from_ref(&format!("refs/tags/v{version}")).unwrap();
        prop_assert_eq!(bare.tag(), version);
        prop_assert_eq!(bare, prefixed);
    }
}
