//! Fixed values shared by the provisioning workflow

/// File inside the attempt directory holding the finalized credentials
pub const CREDS_FILE: &str = "creds.json";

/// Disconnect status reported by the protocol client when the account
/// rejected the session. Closes with this status are never retried.
pub const AUTH_FAILURE_STATUS: u16 = 401;

/// Prefix of every generated session identifier
pub const SESSION_ID_PREFIX: &str = "3EB";

/// Total length of a generated session identifier, prefix included
pub const SESSION_ID_LEN: usize = 22;

/// Characters drawn for the random part of a session identifier
pub const SESSION_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Marker placed before the storage reference in the session string
pub const DEFAULT_SESSION_MARKER: &str = "BRAVO";

/// Separator between the marker and the storage reference
pub const SESSION_SEPARATOR: char = '~';

/// URL prefix stripped from upload results to obtain the storage reference
pub const DEFAULT_UPLOAD_URL_PREFIX: &str = "https://mega.nz/file/";

/// Placeholder returned to the HTTP caller when no code could be issued
pub const SERVICE_UNAVAILABLE: &str = "❗ Service Unavailable";

/// Placeholder returned when the supplied number cannot be paired
pub const INVALID_NUMBER: &str = "❗ Invalid Number";

/// Accepted digit count range for a normalized phone number (E.164 limits)
pub const MIN_NUMBER_DIGITS: usize = 7;
pub const MAX_NUMBER_DIGITS: usize = 15;
