//! Name normalization.

/// Canonical key for fuzzy name comparison: lower-cased, with every
/// character that is not ASCII alphanumeric removed.
pub fn normalize(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Manifest_ID"), "manifestid");
        assert_eq!(normalize("manifest-id"), "manifestid");
        assert_eq!(normalize("  crack type "), "cracktype");
        assert_eq!(normalize("MD5"), "md5");
        assert_eq!(normalize("année"), "anne");
        assert_eq!(normalize("___"), "");
    }

    #[test]
    fn test_spellings_share_a_key() {
        assert_eq!(normalize("ManifestID"), normalize("manifest_id"));
        assert_eq!(normalize("crackType"), normalize("crack_type"));
        assert_ne!(normalize("md5"), normalize("md5sum"));
    }
}
