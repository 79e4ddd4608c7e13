//! Digest signing backends.
//!
//! A [`DigestSigner`] signs 32-byte digests and reports the addresses it
//! signs for. Two backends exist:
//!
//! - [`KeyBackedSigner`] holds a secp256k1 key in process and signs with
//!   RFC 6979 deterministic nonces, so the same digest always yields the same
//!   signature.
//! - [`CallbackSigner`] forwards the digest to caller-supplied code, for
//!   example a remote key-management service. Its latency, failure modes and
//!   determinism are whatever that code provides.
//!
//! Callers depend only on [`DigestSigner::sign`] and
//! [`DigestSigner::addresses`]. Digests and signatures are never logged.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, Signature};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use futures_util::future::BoxFuture;

use crate::signature::parse_signature;

/// Boxed error returned by signing callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased signing callback: receives a digest, returns 65 raw signature bytes.
pub type SignCallback =
    Arc<dyn Fn(B256) -> BoxFuture<'static, Result<Bytes, BoxError>> + Send + Sync>;

/// Signing failed or no signer is configured.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    /// Neither a key nor a callback was configured.
    #[error("no signer configured")]
    NotConfigured,
    /// A callback signer was built without any address.
    #[error("callback signer has no address")]
    NoAddress,
    /// The backend refused or failed to sign.
    #[error("signing backend failed: {0}")]
    Backend(String),
    /// The callback returned bytes that are not a usable signature.
    #[error("signing callback returned a malformed signature: {0}")]
    MalformedSignature(String),
}

/// Signs with a private key held in memory.
pub struct KeyBackedSigner {
    key: PrivateKeySigner,
    address: Address,
}

impl KeyBackedSigner {
    /// Wraps an existing local signer.
    #[must_use]
    pub fn new(key: PrivateKeySigner) -> Self {
        let address = key.address();
        Self { key, address }
    }

    /// Parses a hex private key, with or without `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] when the input is not a valid
    /// secp256k1 scalar. The key text is never included in the error.
    pub fn from_hex(key: &str) -> Result<Self, SigningError> {
        let key = PrivateKeySigner::from_str(key.trim())
            .map_err(|_| SigningError::InvalidKey("expected 32 bytes of hex".to_owned()))?;
        Ok(Self::new(key))
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random())
    }

    /// The address derived from the key.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Signs `digest` deterministically.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Backend`] if the ECDSA implementation fails.
    pub fn sign_digest(&self, digest: &B256) -> Result<Signature, SigningError> {
        self.key
            .sign_hash_sync(digest)
            .map_err(|e| SigningError::Backend(e.to_string()))
    }
}

impl fmt::Debug for KeyBackedSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBackedSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Signs by delegating to caller-supplied code.
pub struct CallbackSigner {
    callback: SignCallback,
    addresses: Vec<Address>,
}

impl CallbackSigner {
    /// Creates a callback signer for `addresses`.
    ///
    /// The callback must return a 65-byte `r || s || v` signature with `v`
    /// in either `{0, 1}` or `{27, 28}`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::NoAddress`] when `addresses` is empty.
    pub fn new<F, Fut>(addresses: Vec<Address>, callback: F) -> Result<Self, SigningError>
    where
        F: Fn(B256) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, BoxError>> + Send + 'static,
    {
        if addresses.is_empty() {
            return Err(SigningError::NoAddress);
        }
        let callback: SignCallback = Arc::new(move |digest| Box::pin(callback(digest)));
        Ok(Self {
            callback,
            addresses,
        })
    }

    /// The addresses this callback signs for, in priority order.
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Forwards `digest` to the callback and normalizes its answer.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Backend`] when the callback fails and
    /// [`SigningError::MalformedSignature`] when its output cannot be parsed.
    pub async fn sign_digest(&self, digest: &B256) -> Result<Signature, SigningError> {
        let raw = (self.callback)(*digest)
            .await
            .map_err(|e| SigningError::Backend(e.to_string()))?;
        parse_signature(&raw).map_err(|e| SigningError::MalformedSignature(e.to_string()))
    }
}

impl fmt::Debug for CallbackSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSigner")
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

/// Signs 32-byte digests for one or more addresses.
#[derive(Debug)]
pub enum DigestSigner {
    /// In-process private key.
    KeyBacked(KeyBackedSigner),
    /// External signing callback.
    CallbackBacked(CallbackSigner),
}

impl DigestSigner {
    /// Picks a backend. A callback takes precedence over a private key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::NotConfigured`] when neither is provided, or
    /// [`SigningError::InvalidKey`] when the key cannot be parsed.
    pub fn select(
        callback: Option<CallbackSigner>,
        private_key: Option<&str>,
    ) -> Result<Self, SigningError> {
        if let Some(callback) = callback {
            return Ok(Self::CallbackBacked(callback));
        }
        match private_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => KeyBackedSigner::from_hex(key).map(Self::KeyBacked),
            None => Err(SigningError::NotConfigured),
        }
    }

    /// Signs `digest`.
    ///
    /// Key-backed signing is synchronous and cheap. Callback-backed signing
    /// may perform I/O.
    ///
    /// # Errors
    ///
    /// Returns a [`SigningError`] when the backend fails.
    pub async fn sign(&self, digest: &B256) -> Result<Signature, SigningError> {
        match self {
            Self::KeyBacked(signer) => signer.sign_digest(digest),
            Self::CallbackBacked(signer) => signer.sign_digest(digest).await,
        }
    }

    /// The addresses this signer signs for, in priority order. Never empty.
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        match self {
            Self::KeyBacked(signer) => std::slice::from_ref(&signer.address),
            Self::CallbackBacked(signer) => signer.addresses(),
        }
    }

    /// The primary signing address.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::NoAddress`] if no address is configured.
    pub fn address(&self) -> Result<Address, SigningError> {
        self.addresses()
            .first()
            .copied()
            .ok_or(SigningError::NoAddress)
    }
}

impl From<KeyBackedSigner> for DigestSigner {
    fn from(signer: KeyBackedSigner) -> Self {
        Self::KeyBacked(signer)
    }
}

impl From<CallbackSigner> for DigestSigner {
    fn from(signer: CallbackSigner) -> Self {
        Self::CallbackBacked(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::recover_signer;
    use alloy_primitives::keccak256;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[tokio::test]
    async fn test_key_backed_is_deterministic() {
        let signer = DigestSigner::from(KeyBackedSigner::from_hex(TEST_KEY).unwrap());
        let digest = keccak256(b"payload");
        let a = signer.sign(&digest).await.unwrap();
        let b = signer.sign(&digest).await.unwrap();
        assert_eq!(a, b);
        let recovered = recover_signer(&digest, &a.as_bytes()).unwrap();
        assert_eq!(recovered, signer.address().unwrap());
    }

    #[test]
    fn test_key_without_prefix_parses() {
        let with = KeyBackedSigner::from_hex(TEST_KEY).unwrap();
        let without = KeyBackedSigner::from_hex(TEST_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(with.address(), without.address());
    }

    #[test]
    fn test_invalid_key_hides_input() {
        let err = KeyBackedSigner::from_hex("0xnot-a-key").unwrap_err();
        assert!(matches!(err, SigningError::InvalidKey(_)));
        assert!(!err.to_string().contains("not-a-key"));
    }

    #[test]
    fn test_debug_omits_key_material() {
        let signer = KeyBackedSigner::from_hex(TEST_KEY).unwrap();
        let debug = format!("{signer:?}");
        assert!(debug.contains("address"));
        assert!(!debug.contains(TEST_KEY.trim_start_matches("0x")));
    }

    #[tokio::test]
    async fn test_callback_output_is_normalized() {
        let key = Arc::new(KeyBackedSigner::random());
        let address = key.address();
        let inner = Arc::clone(&key);
        // Returns v in {0, 1} to exercise normalization.
        let callback = CallbackSigner::new(vec![address], move |digest| {
            let inner = Arc::clone(&inner);
            async move {
                let sig = inner.sign_digest(&digest)?;
                let mut raw = sig.as_bytes();
                raw[64] -= 27;
                Ok::<_, BoxError>(Bytes::copy_from_slice(&raw))
            }
        })
        .unwrap();
        let signer = DigestSigner::from(callback);
        let digest = keccak256(b"remote");
        let sig = signer.sign(&digest).await.unwrap();
        assert_eq!(sig, key.sign_digest(&digest).unwrap());
        assert_eq!(signer.addresses(), &[address]);
    }

    #[tokio::test]
    async fn test_callback_failure_is_signing_error() {
        let callback = CallbackSigner::new(vec![Address::repeat_byte(1)], |_| async {
            Err::<Bytes, BoxError>("kms unavailable".into())
        })
        .unwrap();
        let err = DigestSigner::from(callback)
            .sign(&B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::Backend(msg) if msg.contains("kms unavailable")));
    }

    #[tokio::test]
    async fn test_callback_short_signature_is_rejected() {
        let callback = CallbackSigner::new(vec![Address::repeat_byte(1)], |_| async {
            Ok::<_, BoxError>(Bytes::from_static(&[1, 2, 3]))
        })
        .unwrap();
        let err = DigestSigner::from(callback)
            .sign(&B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::MalformedSignature(_)));
    }

    #[test]
    fn test_callback_requires_address() {
        let err = CallbackSigner::new(Vec::new(), |_| async {
            Ok::<_, BoxError>(Bytes::new())
        })
        .unwrap_err();
        assert!(matches!(err, SigningError::NoAddress));
    }

    #[test]
    fn test_select_prefers_callback() {
        let remote = Address::repeat_byte(9);
        let callback = CallbackSigner::new(vec![remote], |_| async {
            Ok::<_, BoxError>(Bytes::new())
        })
        .unwrap();
        let signer = DigestSigner::select(Some(callback), Some(TEST_KEY)).unwrap();
        assert_eq!(signer.address().unwrap(), remote);

        let keyed = DigestSigner::select(None, Some(TEST_KEY)).unwrap();
        assert!(matches!(keyed, DigestSigner::KeyBacked(_)));

        assert!(matches!(
            DigestSigner::select(None, Some("  ")),
            Err(SigningError::NotConfigured)
        ));
    }
}
