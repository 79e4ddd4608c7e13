//! Signature recovery and verification.
//!
//! Plain ECDSA signatures are checked by recovering the signer from the
//! digest. Contract wallets cannot be recovered; for them
//! [`OnChainValidation`] asks the wallet itself through EIP-1271
//! `isValidSignature`. [`SignatureVerifier`] runs the strategies in order,
//! cheapest first, and only pays for RPC when the expected signer has code.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, Signature, U256, hex};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

use crate::chain::contract::{EIP1271_MAGIC_VALUE, IERC1271};
use crate::chain::{ChainClient, ChainError, RpcErrorKind};
use crate::eip712::{EncodingError, TypedData};

/// A signature that cannot be parsed or recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSignatureError {
    /// Signatures are exactly 65 bytes: `r || s || v`.
    #[error("signature must be 65 bytes, got {0}")]
    Length(usize),
    /// `v` is not one of 0, 1, 27 or 28.
    #[error("invalid recovery id {0}")]
    RecoveryId(u8),
    /// No public key recovers from this signature and digest.
    #[error("signature recovery failed: {0}")]
    Recovery(String),
    /// The signature text is not hex.
    #[error("signature is not valid hex: {0}")]
    Hex(String),
}

/// The recovered signer differs from the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("signature recovers to {recovered}, expected {expected}")]
pub struct AddressMismatchError {
    /// The address the signature should belong to.
    pub expected: Address,
    /// The address actually recovered.
    pub recovered: Address,
}

/// Errors raised while verifying a signature.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The typed data could not be hashed.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The signature is malformed.
    #[error(transparent)]
    InvalidSignature(#[from] InvalidSignatureError),
    /// The signature is valid but for someone else.
    #[error(transparent)]
    AddressMismatch(#[from] AddressMismatchError),
    /// The on-chain check could not be performed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Parses a 65-byte `r || s || v` signature, accepting `v` in {0, 1, 27, 28}.
///
/// # Errors
///
/// Returns [`InvalidSignatureError::Length`] or
/// [`InvalidSignatureError::RecoveryId`].
pub fn parse_signature(bytes: &[u8]) -> Result<Signature, InvalidSignatureError> {
    let bytes: &[u8; 65] = bytes
        .try_into()
        .map_err(|_| InvalidSignatureError::Length(bytes.len()))?;
    let y_parity = match bytes[64] {
        0 | 27 => false,
        1 | 28 => true,
        v => return Err(InvalidSignatureError::RecoveryId(v)),
    };
    Ok(Signature::new(
        U256::from_be_slice(&bytes[..32]),
        U256::from_be_slice(&bytes[32..64]),
        y_parity,
    ))
}

/// Parses a hex signature, with or without `0x`.
///
/// # Errors
///
/// Returns [`InvalidSignatureError::Hex`] for non-hex input, otherwise see
/// [`parse_signature`].
pub fn parse_signature_hex(text: &str) -> Result<Signature, InvalidSignatureError> {
    let bytes = hex::decode(text).map_err(|e| InvalidSignatureError::Hex(e.to_string()))?;
    parse_signature(&bytes)
}

/// Recovers the address that signed `digest`.
///
/// # Errors
///
/// Returns an [`InvalidSignatureError`] when the signature is malformed or
/// no key recovers from it.
pub fn recover_signer(digest: &B256, signature: &[u8]) -> Result<Address, InvalidSignatureError> {
    parse_signature(signature)?
        .recover_address_from_prehash(digest)
        .map_err(|e| InvalidSignatureError::Recovery(e.to_string()))
}

/// Recovers the signer of `digest` and requires it to be `expected`.
///
/// # Errors
///
/// Returns [`VerificationError::AddressMismatch`] for a different signer and
/// [`VerificationError::InvalidSignature`] for a malformed signature.
pub fn assert_signer(
    digest: &B256,
    signature: &[u8],
    expected: Address,
) -> Result<Address, VerificationError> {
    let recovered = recover_signer(digest, signature)?;
    if recovered == expected {
        Ok(recovered)
    } else {
        Err(AddressMismatchError {
            expected,
            recovered,
        }
        .into())
    }
}

/// Whether `signature` over the digest of `typed` recovers to `expected`.
///
/// # Errors
///
/// Returns [`VerificationError::Encoding`] when the typed data cannot be
/// hashed and [`VerificationError::InvalidSignature`] when the signature is
/// malformed.
pub fn verify_typed_data(
    typed: &TypedData,
    signature: &[u8],
    expected: Address,
) -> Result<bool, VerificationError> {
    let digest = typed.digest()?;
    Ok(recover_signer(&digest, signature)? == expected)
}

/// One way of deciding whether a signature belongs to an address.
#[async_trait]
pub trait ValidationStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// `Some(valid)` when the strategy applies to `expected`, `None` when it
    /// has nothing to say.
    async fn validate(
        &self,
        digest: &B256,
        signature: &[u8],
        expected: Address,
    ) -> Result<Option<bool>, VerificationError>;
}

/// ECDSA recovery for externally owned accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct EoaRecovery;

#[async_trait]
impl ValidationStrategy for EoaRecovery {
    fn name(&self) -> &'static str {
        "eoa_recovery"
    }

    async fn validate(
        &self,
        digest: &B256,
        signature: &[u8],
        expected: Address,
    ) -> Result<Option<bool>, VerificationError> {
        Ok(Some(recover_signer(digest, signature)? == expected))
    }
}

/// EIP-1271 `isValidSignature` on the expected signer, when it has code.
#[derive(Debug, Clone)]
pub struct OnChainValidation {
    client: Arc<ChainClient>,
}

impl OnChainValidation {
    /// Validates through `client`.
    #[must_use]
    pub const fn new(client: Arc<ChainClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ValidationStrategy for OnChainValidation {
    fn name(&self) -> &'static str {
        "on_chain_validation"
    }

    async fn validate(
        &self,
        digest: &B256,
        signature: &[u8],
        expected: Address,
    ) -> Result<Option<bool>, VerificationError> {
        let code = self.client.get_code(expected).await?;
        if code.is_empty() {
            return Ok(None);
        }
        let call = IERC1271::isValidSignatureCall {
            hash: *digest,
            signature: Bytes::copy_from_slice(signature),
        };
        let output = match self.client.call(expected, call.abi_encode().into()).await {
            Ok(output) => output,
            Err(ChainError::Rpc(e)) if e.kind() == RpcErrorKind::Reverted => {
                return Ok(Some(false));
            }
            Err(e) => return Err(e.into()),
        };
        let valid = IERC1271::isValidSignatureCall::abi_decode_returns(&output)
            .is_ok_and(|magic| magic == EIP1271_MAGIC_VALUE);
        Ok(Some(valid))
    }
}

/// Runs [`ValidationStrategy`]s in order until one accepts the signature.
#[derive(Debug)]
pub struct SignatureVerifier {
    strategies: Vec<Box<dyn ValidationStrategy>>,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::eoa_only()
    }
}

impl SignatureVerifier {
    /// ECDSA recovery only. Never touches the network.
    #[must_use]
    pub fn eoa_only() -> Self {
        Self {
            strategies: vec![Box::new(EoaRecovery)],
        }
    }

    /// ECDSA recovery, then EIP-1271 through `client` for contract wallets.
    #[must_use]
    pub fn with_on_chain(client: Arc<ChainClient>) -> Self {
        Self::eoa_only().with_strategy(OnChainValidation::new(client))
    }

    /// Appends a strategy tried after the existing ones.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl ValidationStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Whether `signature` over `digest` belongs to `expected`.
    ///
    /// Any strategy accepting wins. A chain failure in a strategy that could
    /// have accepted is returned rather than read as a rejection. Otherwise a
    /// strategy that rejected makes the answer `false`, and if none applied
    /// the first error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Chain`] when no strategy accepted and an
    /// on-chain check failed, otherwise the first strategy error when no
    /// strategy reached a verdict.
    pub async fn verify(
        &self,
        digest: &B256,
        signature: &[u8],
        expected: Address,
    ) -> Result<bool, VerificationError> {
        let mut rejected = false;
        let mut chain_error = None;
        let mut first_error = None;
        for strategy in &self.strategies {
            match strategy.validate(digest, signature, expected).await {
                Ok(Some(true)) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(strategy = strategy.name(), %expected, "Signature accepted");
                    return Ok(true);
                }
                Ok(Some(false)) => rejected = true,
                Ok(None) => {}
                Err(VerificationError::Chain(e)) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(strategy = strategy.name(), error = %e, "Chain check failed");
                    chain_error.get_or_insert(e);
                }
                Err(e) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(strategy = strategy.name(), error = %e, "Strategy failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = chain_error {
            return Err(e.into());
        }
        match first_error {
            Some(e) if !rejected => Err(e),
            _ => Ok(false),
        }
    }

    /// Hashes `typed` and verifies `signature` against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Encoding`] when hashing fails, otherwise
    /// see [`verify`](Self::verify).
    pub async fn verify_typed_data(
        &self,
        typed: &TypedData,
        signature: &[u8],
        expected: Address,
    ) -> Result<bool, VerificationError> {
        let digest = typed.digest()?;
        self.verify(&digest, signature, expected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eip712::{TypeField, TypedDataDomain, Types};
    use crate::signer::KeyBackedSigner;
    use crate::testing::MockRpc;
    use alloy_primitives::{address, keccak256};
    use serde_json::json;

    fn message_typed_data(content: &str) -> TypedData {
        let mut types = Types::new();
        types.insert(
            "Message".to_owned(),
            vec![TypeField::new("content", "string")],
        );
        TypedData {
            types,
            primary_type: "Message".to_owned(),
            domain: TypedDataDomain::default()
                .with_name("Test")
                .with_version("1")
                .with_chain_id(1)
                .with_verifying_contract(address!("0000000000000000000000000000000000000001")),
            message: json!({ "content": content }),
        }
    }

    fn raw(signature: &Signature) -> Vec<u8> {
        signature.as_bytes().to_vec()
    }

    #[test]
    fn test_signed_typed_data_verifies() {
        let signer = KeyBackedSigner::random();
        let typed = message_typed_data("hi");
        let signature = signer.sign_digest(&typed.digest().unwrap()).unwrap();

        assert!(verify_typed_data(&typed, &raw(&signature), signer.address()).unwrap());
        let tampered = message_typed_data("hj");
        assert!(!verify_typed_data(&tampered, &raw(&signature), signer.address()).unwrap());
    }

    #[test]
    fn test_recovery_id_normalized() {
        let signer = KeyBackedSigner::random();
        let digest = keccak256(b"normalize");
        let mut bytes = raw(&signer.sign_digest(&digest).unwrap());
        let expected = signer.address();
        assert_eq!(recover_signer(&digest, &bytes).unwrap(), expected);

        // Flip between the {27, 28} and {0, 1} conventions.
        bytes[64] = if bytes[64] >= 27 { bytes[64] - 27 } else { bytes[64] + 27 };
        assert_eq!(recover_signer(&digest, &bytes).unwrap(), expected);

        bytes[64] = 5;
        assert_eq!(
            recover_signer(&digest, &bytes),
            Err(InvalidSignatureError::RecoveryId(5))
        );
    }

    #[test]
    fn test_malformed_signatures_rejected() {
        let digest = keccak256(b"malformed");
        assert_eq!(
            recover_signer(&digest, &[0u8; 64]),
            Err(InvalidSignatureError::Length(64))
        );
        assert_eq!(
            recover_signer(&digest, &[0u8; 66]),
            Err(InvalidSignatureError::Length(66))
        );
        assert!(matches!(
            recover_signer(&digest, &[0u8; 65]),
            Err(InvalidSignatureError::Recovery(_))
        ));
        assert!(matches!(
            parse_signature_hex("0xzz"),
            Err(InvalidSignatureError::Hex(_))
        ));
    }

    #[test]
    fn test_parse_signature_hex_accepts_prefix() {
        let signer = KeyBackedSigner::random();
        let digest = keccak256(b"hex");
        let signature = signer.sign_digest(&digest).unwrap();
        let text = hex::encode(signature.as_bytes());
        assert_eq!(parse_signature_hex(&text).unwrap(), signature);
        assert_eq!(parse_signature_hex(&format!("0x{text}")).unwrap(), signature);
    }

    #[test]
    fn test_assert_signer_reports_mismatch() {
        let signer = KeyBackedSigner::random();
        let digest = keccak256(b"assert");
        let bytes = raw(&signer.sign_digest(&digest).unwrap());
        assert_eq!(
            assert_signer(&digest, &bytes, signer.address()).unwrap(),
            signer.address()
        );
        let other = Address::repeat_byte(0x99);
        match assert_signer(&digest, &bytes, other) {
            Err(VerificationError::AddressMismatch(e)) => {
                assert_eq!(e.expected, other);
                assert_eq!(e.recovered, signer.address());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eoa_only_verifier() {
        let verifier = SignatureVerifier::default();
        let signer = KeyBackedSigner::random();
        let typed = message_typed_data("hi");
        let signature = raw(&signer.sign_digest(&typed.digest().unwrap()).unwrap());
        assert!(
            verifier
                .verify_typed_data(&typed, &signature, signer.address())
                .await
                .unwrap()
        );
        assert!(
            !verifier
                .verify_typed_data(&typed, &signature, Address::repeat_byte(1))
                .await
                .unwrap()
        );
        assert!(matches!(
            verifier
                .verify(&typed.digest().unwrap(), &[1, 2, 3], signer.address())
                .await,
            Err(VerificationError::InvalidSignature(
                InvalidSignatureError::Length(3)
            ))
        ));
    }

    #[tokio::test]
    async fn test_contract_wallet_accepted_on_chain() {
        let wallet = address!("00000000000000000000000000000000000000aa");
        let mock = MockRpc::start(1).await;
        mock.set_code(wallet, Bytes::from_static(&[0x60, 0x80]));
        let mut magic = [0u8; 32];
        magic[..4].copy_from_slice(EIP1271_MAGIC_VALUE.as_slice());
        mock.set_call_result(IERC1271::isValidSignatureCall::SELECTOR, magic.to_vec());
        let client = Arc::new(ChainClient::connect(mock.config()).await.unwrap());
        let verifier = SignatureVerifier::with_on_chain(client);

        let digest = keccak256(b"wallet");
        // Any owner signature: the wallet contract decides.
        let signature = raw(&KeyBackedSigner::random().sign_digest(&digest).unwrap());
        assert!(verifier.verify(&digest, &signature, wallet).await.unwrap());
        // Non-ECDSA blobs are fine for contract wallets too.
        assert!(verifier.verify(&digest, &[0xde, 0xad], wallet).await.unwrap());
        assert_eq!(mock.calls("eth_call"), 2);
    }

    #[tokio::test]
    async fn test_contract_wallet_rejection() {
        let wallet = address!("00000000000000000000000000000000000000bb");
        let mock = MockRpc::start(1).await;
        mock.set_code(wallet, Bytes::from_static(&[0x60, 0x80]));
        mock.revert_calls("invalid signature");
        let client = Arc::new(ChainClient::connect(mock.config()).await.unwrap());
        let verifier = SignatureVerifier::with_on_chain(client);
        let digest = keccak256(b"wallet");
        assert!(!verifier.verify(&digest, &[0xde, 0xad], wallet).await.unwrap());
    }

    #[tokio::test]
    async fn test_eoa_match_skips_rpc() {
        let mock = MockRpc::start(1).await;
        let client = Arc::new(ChainClient::connect(mock.config()).await.unwrap());
        let verifier = SignatureVerifier::with_on_chain(client);
        let signer = KeyBackedSigner::random();
        let digest = keccak256(b"cheap path");
        let signature = raw(&signer.sign_digest(&digest).unwrap());
        assert!(verifier.verify(&digest, &signature, signer.address()).await.unwrap());
        assert_eq!(mock.calls("eth_getCode"), 0);

        // No code at the expected address: the on-chain check does not apply.
        let stranger = Address::repeat_byte(0x77);
        assert!(!verifier.verify(&digest, &signature, stranger).await.unwrap());
        assert_eq!(mock.calls("eth_getCode"), 1);
        assert_eq!(mock.calls("eth_call"), 0);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_not_a_rejection() {
        use wiremock::matchers::{body_string_contains, method};
        use wiremock::{Mock, MockServer, Request, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("eth_chainId"))
            .respond_with(|request: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jsonrpc": "2.0", "id": body["id"], "result": "0x1" }))
            })
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let config = crate::config::ChainClientConfig::new(server.uri().parse().unwrap());
        let client = Arc::new(ChainClient::connect(config).await.unwrap());
        let verifier = SignatureVerifier::with_on_chain(client);

        let digest = keccak256(b"outage");
        let signature = raw(&KeyBackedSigner::random().sign_digest(&digest).unwrap());
        let wallet = Address::repeat_byte(0xcc);
        match verifier.verify(&digest, &signature, wallet).await {
            Err(VerificationError::Chain(ChainError::Rpc(e))) => assert!(e.retryable()),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
