//! Stateless signed-payload authentication.
//!
//! Every inbound request carries an opaque credential produced by the
//! upstream client platform: a query-string-encoded set of fields signed
//! with a shared secret. Verifying the signature lets the service trust
//! the embedded identity on every request without server-side sessions.
//!
//! Verification is a pure function of the payload, the secret and the
//! clock; it performs no I/O and keeps no state.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Fixed label used as the HMAC key when deriving the signing key from
/// the shared secret. Note the direction: the label is the key, the
/// secret is the message.
const SIGNING_KEY_LABEL: &[u8] = b"WebAppData";

/// How long a signed payload stays acceptable after its `auth_date`.
/// Bounds replay of captured payloads.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors produced by payload verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
	/// The payload is not a well-formed field set, or a required field
	/// (`hash`, `auth_date`, `user`) is missing or unreadable.
	#[error("malformed payload: {0}")]
	Malformed(&'static str),
	/// The claimed signature does not match the payload.
	#[error("signature mismatch")]
	BadSignature,
	/// The payload is older than the validity window.
	#[error("payload expired")]
	Expired,
	/// The signature is valid but the identity blob is not usable.
	#[error("identity field is not valid JSON: {0}")]
	BadIdentityEncoding(String),
}

/// Identity asserted by the client platform, extracted from a payload
/// whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifiedIdentity {
	/// Stable numeric id of the external identity. Always present.
	#[serde(rename = "id")]
	pub external_id: i64,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub first_name: Option<String>,
	#[serde(default)]
	pub last_name: Option<String>,
}

/// Verifier for signed request payloads.
///
/// Constructed once per process with the shared secret and handed to the
/// request layer; the secret is never exposed through `Debug` or logs.
pub struct PayloadVerifier {
	secret: String,
	max_age: Duration,
}

impl fmt::Debug for PayloadVerifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PayloadVerifier")
			.field("secret", &"<redacted>")
			.field("max_age", &self.max_age)
			.finish()
	}
}

impl PayloadVerifier {
	pub fn new(secret: impl Into<String>, max_age: Duration) -> Self {
		Self {
			secret: secret.into(),
			max_age,
		}
	}

	/// Verifies `raw` against the shared secret and the current time.
	pub fn verify(&self, raw: &str) -> Result<VerifiedIdentity, AuthError> {
		let now = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_secs();
		self.verify_at(raw, now)
	}

	/// Verifies `raw` as of `now` (Unix seconds).
	///
	/// Checks run in a fixed sequence: field shape, signature, freshness,
	/// identity decoding. Freshness is only judged on payloads whose
	/// signature already checked out, so an attacker learns nothing about
	/// the clock from a forged payload.
	pub fn verify_at(&self, raw: &str, now: u64) -> Result<VerifiedIdentity, AuthError> {
		let mut fields: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
			.map(|(k, v)| (k.into_owned(), v.into_owned()))
			.collect();
		if fields.is_empty() {
			return Err(AuthError::Malformed("empty field set"));
		}

		let claimed_hash = take_field(&mut fields, "hash")
			.ok_or(AuthError::Malformed("missing hash field"))?;
		let auth_date = fields
			.iter()
			.find(|(k, _)| k == "auth_date")
			.map(|(_, v)| v.clone())
			.ok_or(AuthError::Malformed("missing auth_date field"))?;
		let user = fields
			.iter()
			.find(|(k, _)| k == "user")
			.map(|(_, v)| v.clone())
			.ok_or(AuthError::Malformed("missing user field"))?;

		self.check_signature(&mut fields, &claimed_hash)?;

		let auth_date: u64 = auth_date
			.parse()
			.map_err(|_| AuthError::Malformed("auth_date is not a unix timestamp"))?;
		if now.saturating_sub(auth_date) > self.max_age.as_secs() {
			return Err(AuthError::Expired);
		}

		serde_json::from_str(&user).map_err(|e| AuthError::BadIdentityEncoding(e.to_string()))
	}

	/// Recomputes the payload signature and compares it to the claimed
	/// one in constant time.
	fn check_signature(
		&self,
		fields: &mut Vec<(String, String)>,
		claimed_hash: &str,
	) -> Result<(), AuthError> {
		// Hex decoding the claim before comparison keeps the comparison
		// itself constant-time via the Mac verifier.
		let claimed = hex::decode(claimed_hash).map_err(|_| AuthError::BadSignature)?;

		fields.sort();
		let check_string = fields
			.iter()
			.map(|(k, v)| format!("{}={}", k, v))
			.collect::<Vec<_>>()
			.join("\n");

		let mut mac = signing_mac(&self.secret);
		mac.update(check_string.as_bytes());
		mac.verify_slice(&claimed).map_err(|_| AuthError::BadSignature)
	}
}

fn take_field(fields: &mut Vec<(String, String)>, name: &str) -> Option<String> {
	let idx = fields.iter().position(|(k, _)| k == name)?;
	Some(fields.remove(idx).1)
}

/// Builds the HMAC used to sign check strings: the signing key is the
/// HMAC-SHA256 of the secret under the fixed label.
fn signing_mac(secret: &str) -> HmacSha256 {
	let mut key_mac =
		HmacSha256::new_from_slice(SIGNING_KEY_LABEL).expect("hmac accepts any key length");
	key_mac.update(secret.as_bytes());
	let signing_key = key_mac.finalize().into_bytes();

	HmacSha256::new_from_slice(&signing_key).expect("hmac accepts any key length")
}
