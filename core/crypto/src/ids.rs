//! Random identifiers for vaults, blobs and directories.

use rand::Rng;

/// Length of generated identifiers, in characters.
pub const ID_LENGTH: usize = 32;

const ALPHABET: &[u8; 16] = b"0123456789abcdef";

/// Generate a random lowercase-hex identifier.
///
/// 128 bits of randomness make collisions within one device negligible.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Check that `id` looks like something [`generate_id`] produced.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && lifechest_common::types::is_lower_hex(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_hex() {
        for _ in 0..100 {
            let id = generate_id();
            assert!(is_valid_id(&id), "{}", id);
        }
    }

    #[test]
    fn test_generated_ids_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_is_valid_id() {
        assert!(!is_valid_id("abc"));
        assert!(!is_valid_id(&"G".repeat(ID_LENGTH)));
        assert!(is_valid_id(&"0".repeat(ID_LENGTH)));
    }
}
