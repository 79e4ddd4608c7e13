//! Payload types for the exact scheme on EVM.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes, U256};
use s402_proto::UnixTimestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::json;

use crate::eip712::{TypeField, TypedData, TypedDataDomain, Types};

/// Primary type name of an ERC-3009 authorization.
pub const TRANSFER_WITH_AUTHORIZATION: &str = "TransferWithAuthorization";

/// A token amount in the smallest unit.
///
/// Serialized as a decimal string so 256-bit values survive JSON. A plain
/// JSON number is also accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    /// The raw value.
    #[must_use]
    pub const fn value(self) -> U256 {
        self.0
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

/// A token amount that is not a non-negative decimal integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid token amount `{0}`")]
pub struct InvalidTokenAmount(String);

impl FromStr for TokenAmount {
    type Err = InvalidTokenAmount;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidTokenAmount(s.to_owned()));
        }
        U256::from_str_radix(trimmed, 10)
            .map(Self)
            .map_err(|_| InvalidTokenAmount(s.to_owned()))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Number(n) => Ok(n.into()),
            RawAmount::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// The signed ERC-3009 `TransferWithAuthorization` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// Token owner authorizing the transfer.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Amount to transfer.
    pub value: TokenAmount,
    /// Not valid before this time.
    pub valid_after: UnixTimestamp,
    /// Not valid at or after this time.
    pub valid_before: UnixTimestamp,
    /// Unique 32-byte nonce.
    pub nonce: B256,
}

impl Eip3009Authorization {
    /// The typed-data document the payer signed under `domain`.
    #[must_use]
    pub fn typed_data(&self, domain: TypedDataDomain) -> TypedData {
        TypedData {
            types: transfer_with_authorization_types(),
            primary_type: TRANSFER_WITH_AUTHORIZATION.to_owned(),
            domain,
            message: json!({
                "from": self.from,
                "to": self.to,
                "value": self.value,
                "validAfter": self.valid_after,
                "validBefore": self.valid_before,
                "nonce": self.nonce,
            }),
        }
    }
}

/// `payload` of an exact-scheme [`PaymentPayload`](s402_proto::PaymentPayload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactEvmPayload {
    /// Signature over the authorization's EIP-712 digest. 65 bytes for EOAs,
    /// arbitrary for contract wallets.
    pub signature: Bytes,
    /// What was signed.
    pub authorization: Eip3009Authorization,
}

/// Type declarations for `TransferWithAuthorization`.
#[must_use]
pub fn transfer_with_authorization_types() -> Types {
    let mut types = Types::new();
    types.insert(
        TRANSFER_WITH_AUTHORIZATION.to_owned(),
        vec![
            TypeField::new("from", "address"),
            TypeField::new("to", "address"),
            TypeField::new("value", "uint256"),
            TypeField::new("validAfter", "uint256"),
            TypeField::new("validBefore", "uint256"),
            TypeField::new("nonce", "bytes32"),
        ],
    );
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::{SolStruct, eip712_domain, sol};

    sol! {
        struct TransferWithAuthorization {
            address from;
            address to;
            uint256 value;
            uint256 validAfter;
            uint256 validBefore;
            bytes32 nonce;
        }
    }

    #[test]
    fn test_token_amount_parsing() {
        assert_eq!("1000000".parse::<TokenAmount>().unwrap(), 1_000_000u64.into());
        assert!("-1".parse::<TokenAmount>().is_err());
        assert!("1e6".parse::<TokenAmount>().is_err());
        assert!("".parse::<TokenAmount>().is_err());
        let big = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(big.parse::<TokenAmount>().unwrap().value(), U256::MAX);

        let from_number: TokenAmount = serde_json::from_str("42").unwrap();
        let from_text: TokenAmount = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"42\"");
    }

    #[test]
    fn test_payload_wire_format() {
        let payload: ExactEvmPayload = serde_json::from_value(json!({
            "signature": "0x1234",
            "authorization": {
                "from": "0x857b06519E91e3A54538791bDbb0E22373e36b66",
                "to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "value": "10000",
                "validAfter": "1740672089",
                "validBefore": 1740672154,
                "nonce": "0xf3746613c2d920b5fdabc0856f2aeb2d4f88ee6037b8cc5d04a71a4462f13480"
            }
        }))
        .unwrap();
        assert_eq!(payload.signature.len(), 2);
        assert_eq!(payload.authorization.value, 10_000u64.into());
        assert_eq!(payload.authorization.valid_before.as_secs(), 1_740_672_154);
    }

    #[test]
    fn test_digest_matches_token_contract_hashing() {
        let token = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");
        let authorization = Eip3009Authorization {
            from: address!("857b06519E91e3A54538791bDbb0E22373e36b66"),
            to: address!("209693Bc6afc0C5328bA36FaF03C514EF312287C"),
            value: 10_000u64.into(),
            valid_after: UnixTimestamp::from_secs(1_740_672_089),
            valid_before: UnixTimestamp::from_secs(1_740_672_154),
            nonce: B256::repeat_byte(0xf3),
        };
        let domain = TypedDataDomain::default()
            .with_name("USDC")
            .with_version("2")
            .with_chain_id(84532)
            .with_verifying_contract(token);
        let ours = authorization.typed_data(domain).digest().unwrap();

        let expected = TransferWithAuthorization {
            from: authorization.from,
            to: authorization.to,
            value: U256::from(10_000u64),
            validAfter: U256::from(1_740_672_089u64),
            validBefore: U256::from(1_740_672_154u64),
            nonce: authorization.nonce,
        }
        .eip712_signing_hash(&eip712_domain! {
            name: "USDC",
            version: "2",
            chain_id: 84532,
            verifying_contract: token,
        });
        assert_eq!(ours, expected);
    }
}
