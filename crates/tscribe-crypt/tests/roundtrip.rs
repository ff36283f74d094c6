//! Directory transform tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use proptest::prelude::*;
use tempfile::TempDir;
use tscribe_crypt::{
    decrypt_database, detect_encryption_state, encrypt_database, CategoryState, CryptError,
    EncryptionKey,
};

fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                files.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    files
}

fn write(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

fn sample_location(root: &Path) {
    write(root, "transcripts_20260101T000000000000_aaaa0001.parquet", b"PAR1 data one PAR1");
    write(root, "transcripts_20260101T000001000000_aaaa0002.parquet", b"PAR1 data two PAR1");
    write(root, "_index/index_20260101T000000000000_bbbb0001.idx", b"PAR1 index PAR1");
    write(root, "_index/_manifest_20260101T000002000000_bbbb0002.idx", b"PAR1 manifest PAR1");
    write(root, "README.md", b"notes stay readable");
    write(root, "extra/nested/blob.bin", &[0, 1, 2, 3, 255]);
}

#[test]
fn roundtrip_restores_exact_bytes_for_every_key_size() {
    for len in [16, 24, 32] {
        let key = EncryptionKey::new(vec![9u8; len]).unwrap();
        let tmp = TempDir::new().unwrap();
        let plain = tmp.path().join("plain");
        let enc = tmp.path().join("enc");
        let back = tmp.path().join("back");
        sample_location(&plain);

        let report = encrypt_database(&plain, &enc, &key, false).unwrap();
        assert_eq!(report.files_transformed, 4);
        assert_eq!(report.files_copied, 2);

        let encrypted = snapshot(&enc);
        assert!(encrypted.contains_key("transcripts_20260101T000000000000_aaaa0001.enc.parquet"));
        assert!(encrypted.contains_key("_index/_manifest_20260101T000002000000_bbbb0002.enc.idx"));
        assert_eq!(encrypted["README.md"], b"notes stay readable");
        let state = detect_encryption_state(&enc).unwrap();
        assert_eq!(state.index, CategoryState::Encrypted);
        assert_eq!(state.data, CategoryState::Encrypted);

        decrypt_database(&enc, &back, &key, false).unwrap();
        assert_eq!(snapshot(&back), snapshot(&plain), "key length {len}");
    }
}

#[test]
fn refuses_non_empty_destination_without_overwrite() {
    let key = EncryptionKey::new([1u8; 32]).unwrap();
    let tmp = TempDir::new().unwrap();
    let plain = tmp.path().join("plain");
    let out = tmp.path().join("out");
    sample_location(&plain);
    write(&out, "stale.txt", b"old");

    match encrypt_database(&plain, &out, &key, false) {
        Err(CryptError::DestinationExists { path }) => assert_eq!(path, out),
        other => panic!("expected DestinationExists, got {other:?}"),
    }
    assert!(out.join("stale.txt").exists());

    encrypt_database(&plain, &out, &key, true).unwrap();
    assert!(!out.join("stale.txt").exists());
    assert!(out.join("README.md").exists());
}

#[test]
fn empty_existing_destination_is_accepted() {
    let key = EncryptionKey::new([1u8; 16]).unwrap();
    let tmp = TempDir::new().unwrap();
    let plain = tmp.path().join("plain");
    let out = tmp.path().join("out");
    sample_location(&plain);
    fs::create_dir_all(&out).unwrap();
    encrypt_database(&plain, &out, &key, false).unwrap();
}

#[test]
fn wrong_key_leaves_no_partial_output() {
    let key = EncryptionKey::new([1u8; 16]).unwrap();
    let other = EncryptionKey::new([2u8; 16]).unwrap();
    let tmp = TempDir::new().unwrap();
    let plain = tmp.path().join("plain");
    let enc = tmp.path().join("enc");
    let back = tmp.path().join("back");
    sample_location(&plain);
    encrypt_database(&plain, &enc, &key, false).unwrap();

    assert!(matches!(
        decrypt_database(&enc, &back, &other, false),
        Err(CryptError::DecryptionFailed)
    ));
    assert!(!back.exists());
}

#[test]
fn encrypting_an_encrypted_location_fails() {
    let key = EncryptionKey::new([1u8; 24]).unwrap();
    let tmp = TempDir::new().unwrap();
    let plain = tmp.path().join("plain");
    let enc = tmp.path().join("enc");
    sample_location(&plain);
    encrypt_database(&plain, &enc, &key, false).unwrap();

    assert!(matches!(
        encrypt_database(&enc, &tmp.path().join("twice"), &key, false),
        Err(CryptError::AlreadyInState { .. })
    ));
}

#[test]
fn mixed_source_is_rejected_before_writing() {
    let key = EncryptionKey::new([1u8; 32]).unwrap();
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write(&src, "a.parquet", b"plain");
    write(&src, "b.enc.parquet", b"cipher");

    assert!(matches!(
        encrypt_database(&src, &dst, &key, false),
        Err(CryptError::MixedEncryption { category: "data", .. })
    ));
    assert!(!dst.exists());
}

#[test]
fn destination_inside_source_is_rejected() {
    let key = EncryptionKey::new([1u8; 32]).unwrap();
    let tmp = TempDir::new().unwrap();
    sample_location(tmp.path());
    assert!(matches!(
        encrypt_database(tmp.path(), &tmp.path().join("out"), &key, true),
        Err(CryptError::DestinationInsideSource { .. })
    ));
    assert!(matches!(
        encrypt_database(tmp.path(), tmp.path(), &key, true),
        Err(CryptError::DestinationInsideSource { .. })
    ));
    assert!(tmp.path().join("README.md").exists());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn arbitrary_trees_roundtrip(
        files in prop::collection::btree_map(
            "(_index/)?[a-z]{1,6}\\.(parquet|idx|txt)",
            prop::collection::vec(any::<u8>(), 0..256),
            1..8,
        ),
        key_len in prop::sample::select(vec![16usize, 24, 32]),
    ) {
        let key = EncryptionKey::new(vec![3u8; key_len]).unwrap();
        let tmp = TempDir::new().unwrap();
        let plain = tmp.path().join("plain");
        fs::create_dir_all(&plain).unwrap();
        for (rel, bytes) in &files {
            write(&plain, rel, bytes);
        }
        encrypt_database(&plain, &tmp.path().join("enc"), &key, false).unwrap();
        decrypt_database(&tmp.path().join("enc"), &tmp.path().join("back"), &key, false).unwrap();
        prop_assert_eq!(snapshot(&tmp.path().join("back")), snapshot(&plain));
    }
}
