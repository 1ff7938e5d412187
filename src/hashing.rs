//! FNV-1a content hashing for change detection.
//!
//! Non-cryptographic by design: the cache only needs a cheap, stable
//! fingerprint of a file's bytes, and collisions are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Hash value reserved to mean "the file could not be read".
///
/// Callers must treat it as a guaranteed mismatch (rebuild) or as
/// "skip this check" for dependency files that may be absent.
pub const UNREADABLE: u64 = 0;

/// FNV-1a 64-bit over a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Computes the FNV-1a 64-bit hash of a file's contents.
///
/// Reads in 8 KiB blocks. Returns [`UNREADABLE`] (`0`) if the file cannot
/// be opened or a read fails partway through.
pub fn hash_file_content(path: &Path) -> u64 {
    let Ok(mut file) = File::open(path) else {
        return UNREADABLE;
    };

    let mut hash = FNV_OFFSET_BASIS;
    let mut buffer = [0u8; 8192];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                for &byte in &buffer[..n] {
                    hash ^= u64::from(byte);
                    hash = hash.wrapping_mul(FNV_PRIME);
                }
            }
            Err(_) => return UNREADABLE,
        }
    }

    hash
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_known_vectors() {
        // Canonical FNV-1a 64-bit test vectors.
        assert_eq!(hash_bytes(b""), 0xcbf29ce484222325);
        assert_eq!(hash_bytes(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(hash_bytes(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_file_hash_matches_byte_hash() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("test.c");
        let content = b"int main(void) { return 0; }\n";
        fs::write(&file, content).unwrap();

        assert_eq!(hash_file_content(&file), hash_bytes(content));
    }

    #[test]
    fn test_empty_file_is_not_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("empty.h");
        fs::write(&file, "").unwrap();

        let hash = hash_file_content(&file);
        assert_eq!(hash, 0xcbf29ce484222325);
        assert_ne!(hash, UNREADABLE);
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        assert_eq!(
            hash_file_content(Path::new("/nonexistent/file.c")),
            UNREADABLE
        );
    }

    #[test]
    fn test_change_detection() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("test.c");

        fs::write(&file, "int x = 1;\n").unwrap();
        let before = hash_file_content(&file);

        fs::write(&file, "int x = 2;\n").unwrap();
        let after = hash_file_content(&file);

        assert_ne!(before, after);
    }
}
