//! Content digests used to verify fetched artifacts

use crate::error::{Error, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Hex digest of everything `reader` yields
    pub fn digest_reader(self, reader: impl Read) -> io::Result<String> {
        match self {
            Self::Md5 => digest::<Md5>(reader),
            Self::Sha1 => digest::<Sha1>(reader),
            Self::Sha256 => digest::<Sha256>(reader),
            Self::Sha512 => digest::<Sha512>(reader),
        }
    }

    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(bytes)),
            Self::Sha1 => hex::encode(Sha1::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }

    pub fn digest_file(self, path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        self.digest_reader(file).map_err(|e| Error::io(path, e))
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(Error::UnknownHashType(s.to_string())),
        }
    }
}

fn digest<D: Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// An expected digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub hash_type: HashType,
    /// Lowercase hex
    pub hash: String,
}

impl Checksum {
    /// Validate and normalize a declared hash
    pub fn new(hash_type: HashType, hash: &str) -> Result<Self> {
        let hash = hash.trim().to_ascii_lowercase();
        if hash.len() != hash_type.hex_len() || hex::decode(&hash).is_err() {
            return Err(Error::InvalidHash {
                hash_type: hash_type.to_string(),
                hash,
            });
        }
        Ok(Self { hash_type, hash })
    }

    pub fn matches_file(&self, path: &Path) -> Result<bool> {
        Ok(self.hash_type.digest_file(path)? == self.hash)
    }

    /// Fail with [`Error::ChecksumMismatch`] unless `path` matches
    pub fn verify_file(&self, path: &Path) -> Result<()> {
        let actual = self.hash_type.digest_file(path)?;
        if actual == self.hash {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: self.hash.clone(),
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_digests() {
        assert_eq!(HashType::Md5.digest_bytes(b"hello"), HELLO_MD5);
        assert_eq!(HashType::Sha1.digest_bytes(b"hello"), HELLO_SHA1);
        assert_eq!(HashType::Sha256.digest_bytes(b"hello"), HELLO_SHA256);
        assert_eq!(
            HashType::Sha512.digest_reader(&b"hello"[..]).unwrap(),
            HashType::Sha512.digest_bytes(b"hello")
        );
    }

    #[test]
    fn test_parse_hash_type() {
        assert_eq!("SHA256".parse::<HashType>().unwrap(), HashType::Sha256);
        assert!("crc32".parse::<HashType>().is_err());
    }

    #[test]
    fn test_checksum_validation() {
        assert!(Checksum::new(HashType::Md5, HELLO_MD5).is_ok());
        assert!(Checksum::new(HashType::Md5, "abc").is_err());
        assert!(Checksum::new(HashType::Md5, &"z".repeat(32)).is_err());
        let upper = Checksum::new(HashType::Md5, &HELLO_MD5.to_uppercase()).unwrap();
        assert_eq!(upper.hash, HELLO_MD5);
    }

    #[test]
    fn test_verify_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "hello").unwrap();

        let good = Checksum::new(HashType::Md5, HELLO_MD5).unwrap();
        assert!(good.matches_file(&path).unwrap());
        good.verify_file(&path).unwrap();

        let bad = Checksum::new(HashType::Sha1, &"0".repeat(40)).unwrap();
        assert!(matches!(
            bad.verify_file(&path),
            Err(Error::ChecksumMismatch { .. })
        ));
    }
}
