// SPDX-License-Identifier: AGPL-3.0-or-later
//! Checksum algorithms
//!
//! Algorithms are looked up by name in a [`ChecksumRegistry`]. Names are
//! matched case-insensitively with `-` and `_` ignored, so `sha-256`,
//! `SHA256` and `Sha_256` are the same algorithm. Digests are rendered as
//! lower-case hex.

use parking_lot::RwLock;
use sha2::Digest;
use std::collections::BTreeMap;
use std::io::Read;

use crate::error::{VfaError, VfaResult};

/// Incremental digest fed by the stream layer
pub trait StreamDigest: Send {
    fn update(&mut self, data: &[u8]);

    /// Consume the state and render the digest as lower-case hex.
    fn finish(self: Box<Self>) -> String;
}

/// Constructor for a fresh digest state
pub type DigestFactory = fn() -> Box<dyn StreamDigest>;

struct CryptoDigest<D>(D);

impl<D: Digest + Send> StreamDigest for CryptoDigest<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finish(self: Box<Self>) -> String {
        hex::encode(self.0.finalize())
    }
}

struct Crc32(crc32fast::Hasher);

impl StreamDigest for Crc32 {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finish(self: Box<Self>) -> String {
        format!("{:08x}", self.0.finalize())
    }
}

struct Adler32(adler2::Adler32);

impl StreamDigest for Adler32 {
    fn update(&mut self, data: &[u8]) {
        self.0.write_slice(data);
    }

    fn finish(self: Box<Self>) -> String {
        format!("{:08x}", self.0.checksum())
    }
}

struct Blake3(blake3::Hasher);

impl StreamDigest for Blake3 {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finish(self: Box<Self>) -> String {
        self.0.finalize().to_hex().to_string()
    }
}

fn new_md5() -> Box<dyn StreamDigest> {
    Box::new(CryptoDigest(md5::Md5::new()))
}

fn new_sha1() -> Box<dyn StreamDigest> {
    Box::new(CryptoDigest(sha1::Sha1::new()))
}

fn new_sha256() -> Box<dyn StreamDigest> {
    Box::new(CryptoDigest(sha2::Sha256::new()))
}

fn new_sha384() -> Box<dyn StreamDigest> {
    Box::new(CryptoDigest(sha2::Sha384::new()))
}

fn new_sha512() -> Box<dyn StreamDigest> {
    Box::new(CryptoDigest(sha2::Sha512::new()))
}

fn new_crc32() -> Box<dyn StreamDigest> {
    Box::new(Crc32(crc32fast::Hasher::new()))
}

fn new_adler32() -> Box<dyn StreamDigest> {
    Box::new(Adler32(adler2::Adler32::new()))
}

fn new_blake3() -> Box<dyn StreamDigest> {
    Box::new(Blake3(blake3::Hasher::new()))
}

const BUILTIN: [(&str, DigestFactory); 8] = [
    ("MD5", new_md5),
    ("SHA-1", new_sha1),
    ("SHA-256", new_sha256),
    ("SHA-384", new_sha384),
    ("SHA-512", new_sha512),
    ("CRC32", new_crc32),
    ("Adler32", new_adler32),
    ("BLAKE3", new_blake3),
];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Named checksum algorithms
pub struct ChecksumRegistry {
    // normalized name -> (display name, factory)
    algorithms: RwLock<BTreeMap<String, (String, DigestFactory)>>,
}

impl ChecksumRegistry {
    /// Registry without any algorithm.
    pub fn empty() -> Self {
        Self { algorithms: RwLock::new(BTreeMap::new()) }
    }

    /// Registry with the built-in algorithms.
    pub fn new() -> Self {
        let registry = Self::empty();
        for (name, factory) in BUILTIN {
            registry.register(name, factory);
        }
        registry
    }

    pub fn register(&self, name: &str, factory: DigestFactory) {
        self.algorithms
            .write()
            .insert(normalize(name), (name.to_string(), factory));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.algorithms.write().remove(&normalize(name)).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.algorithms.read().contains_key(&normalize(name))
    }

    /// Display names of every registered algorithm.
    pub fn names(&self) -> Vec<String> {
        self.algorithms.read().values().map(|(n, _)| n.clone()).collect()
    }

    /// Fresh digest state for `name`.
    pub fn digest(&self, name: &str) -> VfaResult<Box<dyn StreamDigest>> {
        self.algorithms
            .read()
            .get(&normalize(name))
            .map(|(_, factory)| factory())
            .ok_or_else(|| VfaError::UnknownAlgorithm(name.to_string()))
    }

    /// Digest everything `reader` yields.
    pub fn checksum_reader(&self, name: &str, reader: &mut dyn Read) -> VfaResult<String> {
        let mut digest = self.digest(name)?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            digest.update(&buf[..n]);
        }
        Ok(digest.finish())
    }

    pub fn checksum_bytes(&self, name: &str, data: &[u8]) -> VfaResult<String> {
        let mut digest = self.digest(name)?;
        digest.update(data);
        Ok(digest.finish())
    }
}

impl Default for ChecksumRegistry {
    fn default() -> Self {
        Self::new()
    }
}
