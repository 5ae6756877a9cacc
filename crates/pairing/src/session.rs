//! Session descriptors handed back to the paired account
//!
//! Once the credential file is uploaded, the storage service answers with a
//! URL. The part after the storage URL prefix is the reference the user
//! later needs to restore the session; it is sent to them as
//! `MARKER~<reference>`. Every descriptor also carries a freshly generated
//! message identifier used for the message that delivers it.

use rand::RngExt;

use crate::constants::{
    SESSION_ID_ALPHABET, SESSION_ID_LEN, SESSION_ID_PREFIX, SESSION_SEPARATOR,
};
use crate::error::{Error, Result};

/// Generate a session identifier: `3EB` followed by 19 characters drawn
/// from `[A-Z0-9]`.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let mut id = String::with_capacity(SESSION_ID_LEN);
    id.push_str(SESSION_ID_PREFIX);
    for _ in SESSION_ID_PREFIX.len()..SESSION_ID_LEN {
        let idx = rng.random_range(0..SESSION_ID_ALPHABET.len());
        id.push(SESSION_ID_ALPHABET[idx] as char);
    }
    id
}

/// Strip `prefix` from an upload URL and return the storage reference.
///
/// Fails when the URL does not start with the prefix or nothing follows it.
pub fn extract_reference(url: &str, prefix: &str) -> Result<String> {
    let reference = url
        .trim()
        .strip_prefix(prefix)
        .ok_or_else(|| Error::UploadUrl(format!("{url} does not start with {prefix}")))?;
    if reference.is_empty() {
        return Err(Error::UploadUrl(format!("{url} carries no storage reference")));
    }
    Ok(reference.to_string())
}

/// Derived at success time; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// Message identifier for the message carrying the session string
    pub message_id: String,
    /// Storage reference extracted from the upload URL
    pub reference: String,
}

impl SessionDescriptor {
    /// Build a descriptor from the URL returned by the upload service.
    pub fn from_upload_url(url: &str, prefix: &str) -> Result<Self> {
        Ok(Self {
            message_id: generate_session_id(),
            reference: extract_reference(url, prefix)?,
        })
    }

    /// The string the user pastes to restore the session.
    pub fn session_string(&self, marker: &str) -> String {
        format!("{marker}{SESSION_SEPARATOR}{}", self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_SESSION_MARKER, DEFAULT_UPLOAD_URL_PREFIX};

    fn assert_session_id_shape(id: &str) {
        assert_eq!(id.len(), 22, "id {id} must be 22 characters");
        assert!(id.starts_with("3EB"), "id {id} must start with 3EB");
        assert!(
            id[3..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            "id {id} must only contain A-Z and 0-9 after the prefix"
        );
    }

    #[test]
    fn generated_ids_match_expected_shape() {
        for _ in 0..500 {
            assert_session_id_shape(&generate_session_id());
        }
    }

    #[test]
    fn generated_ids_are_not_constant() {
        let a = generate_session_id();
        let b = generate_session_id();
        let c = generate_session_id();
        assert!(a != b || b != c, "three identical ids in a row: {a}");
    }

    #[test]
    fn extracts_reference_after_prefix() {
        let reference =
            extract_reference("https://mega.nz/file/abc123", DEFAULT_UPLOAD_URL_PREFIX).unwrap();
        assert_eq!(reference, "abc123");
    }

    #[test]
    fn keeps_key_fragment_in_reference() {
        let reference = extract_reference(
            "https://mega.nz/file/abc123#k3y-Fr4g",
            DEFAULT_UPLOAD_URL_PREFIX,
        )
        .unwrap();
        assert_eq!(reference, "abc123#k3y-Fr4g");
    }

    #[test]
    fn rejects_foreign_url() {
        let err = extract_reference("https://example.com/abc123", DEFAULT_UPLOAD_URL_PREFIX)
            .unwrap_err();
        assert!(matches!(err, Error::UploadUrl(_)));
    }

    #[test]
    fn rejects_bare_prefix() {
        assert!(extract_reference("https://mega.nz/file/", DEFAULT_UPLOAD_URL_PREFIX).is_err());
    }

    #[test]
    fn descriptor_composes_session_string() {
        let descriptor =
            SessionDescriptor::from_upload_url("https://mega.nz/file/abc123", DEFAULT_UPLOAD_URL_PREFIX)
                .unwrap();
        assert_eq!(descriptor.reference, "abc123");
        assert_eq!(descriptor.session_string(DEFAULT_SESSION_MARKER), "BRAVO~abc123");
        assert_session_id_shape(&descriptor.message_id);
    }
}
