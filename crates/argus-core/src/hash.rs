/// Computes BLAKE3 over `input` and returns the lowercase hex digest.
pub fn blake3_hex(input: &[u8]) -> String {
    hex::encode(blake3::hash(input).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::blake3_hex;

    #[test]
    fn hash_is_deterministic() {
        let input = b"argus";
        assert_eq!(blake3_hex(input), blake3_hex(input));
    }

    #[test]
    fn hash_is_256_bit_hex() {
        let digest = blake3_hex(b"1818|2a63:notify,read;");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_changes_when_input_changes() {
        assert_ne!(blake3_hex(b"argus-a"), blake3_hex(b"argus-b"));
    }
}
