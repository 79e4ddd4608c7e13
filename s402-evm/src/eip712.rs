//! EIP-712 typed structured data hashing.
//!
//! Turns a JSON typed-data document (`types`, `domain`, `primaryType`,
//! `message`) into the 32-byte digest a wallet signs. Every function here is
//! pure, so the encoder needs no synchronization and may be called from any
//! number of tasks at once.
//!
//! Type resolution, value coercion and hashing are done by
//! [`alloy_dyn_abi::eip712`]. On top of it this module:
//!
//! - reports absent or `null` message fields by struct and field name,
//! - treats empty domain strings as absent and accepts `chainId` as a number,
//!   a decimal string or a `0x`-hex string,
//! - rejects every struct cycle, self-references included,
//! - ignores a caller-supplied `EIP712Domain` entry in `types`; the domain
//!   type is always derived from the fields present.
//!
//! ```
//! use s402_evm::eip712::TypedData;
//!
//! let typed: TypedData = serde_json::from_value(serde_json::json!({
//!     "types": { "Message": [{ "name": "content", "type": "string" }] },
//!     "primaryType": "Message",
//!     "domain": { "name": "Test", "version": "1", "chainId": 1 },
//!     "message": { "content": "hi" }
//! }))?;
//! let digest = typed.digest()?;
//! assert_eq!(digest.len(), 32);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::str::FromStr;

use alloy_dyn_abi::eip712::{PropertyDef, Resolver, TypeDef};
use alloy_dyn_abi::{DynSolType, Eip712Domain};
use alloy_primitives::{Address, B256, U256, keccak256};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name of the domain pseudo-type.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// One field of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    /// Field name.
    pub name: String,
    /// Declared Solidity type, e.g. `uint256`, `Person[]` or `bytes32`.
    #[serde(rename = "type")]
    pub ty: String,
}

impl TypeField {
    /// Creates a field declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Struct declarations keyed by type name. Field order is significant.
pub type Types = BTreeMap<String, Vec<TypeField>>;

/// The signing domain.
///
/// Any subset of fields may be present. Only the present fields take part in
/// the domain type and its hash. Empty strings in JSON input count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    /// Human-readable signing domain name.
    #[serde(
        default,
        deserialize_with = "deserialize_non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    /// Current major version of the signing domain.
    #[serde(
        default,
        deserialize_with = "deserialize_non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    /// EIP-155 chain id.
    #[serde(
        default,
        deserialize_with = "deserialize_chain_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<U256>,
    /// Address of the contract that will verify the signature.
    #[serde(
        default,
        deserialize_with = "deserialize_non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub verifying_contract: Option<Address>,
    /// Disambiguating salt.
    #[serde(
        default,
        deserialize_with = "deserialize_non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub salt: Option<B256>,
}

impl TypedDataDomain {
    /// Sets the domain name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the domain version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the chain id.
    #[must_use]
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(U256::from(chain_id));
        self
    }

    /// Sets the verifying contract.
    #[must_use]
    pub const fn with_verifying_contract(mut self, contract: Address) -> Self {
        self.verifying_contract = Some(contract);
        self
    }

    /// Sets the salt.
    #[must_use]
    pub const fn with_salt(mut self, salt: B256) -> Self {
        self.salt = Some(salt);
        self
    }

    /// Returns the canonical domain type string for the present fields.
    #[must_use]
    pub fn encode_type(&self) -> String {
        self.to_eip712_domain().encode_type()
    }

    /// The same domain as an [`Eip712Domain`].
    #[must_use]
    pub fn to_eip712_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            self.name.clone().map(Cow::Owned),
            self.version.clone().map(Cow::Owned),
            self.chain_id,
            self.verifying_contract,
            self.salt,
        )
    }
}

/// A complete typed-data document as exchanged on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// Struct declarations. A user-supplied `EIP712Domain` entry is ignored.
    pub types: Types,
    /// Name of the struct type `message` is an instance of.
    pub primary_type: String,
    /// Signing domain.
    #[serde(default)]
    pub domain: TypedDataDomain,
    /// The value tree to hash.
    pub message: Value,
}

impl TypedData {
    /// Computes the signing digest of this document.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] when a type cannot be resolved or the
    /// message does not match its declared types.
    pub fn digest(&self) -> Result<B256, EncodingError> {
        digest(&self.domain, &self.primary_type, &self.types, &self.message)
    }
}

/// Malformed or unresolvable typed-data input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// A field references a type that is neither built in nor declared.
    #[error("unknown type `{0}`")]
    UnknownType(String),
    /// A declared field is absent (or null) in the message.
    #[error("missing field `{field}` in `{struct_name}`")]
    MissingField {
        /// The struct being encoded.
        struct_name: String,
        /// The absent field.
        field: String,
    },
    /// A value cannot be encoded as its declared type.
    #[error("invalid `{ty}` value: {reason}")]
    InvalidValue {
        /// The declared type.
        ty: String,
        /// What is wrong with the value.
        reason: String,
    },
    /// Struct references form a cycle.
    #[error("struct type cycle through `{0}`")]
    TypeCycle(String),
    /// A struct value is not a JSON object.
    #[error("value for struct `{0}` is not an object")]
    NotAnObject(String),
    /// Any other failure reported by the ABI encoder.
    #[error("typed data encoding failed: {0}")]
    Encoder(String),
}

impl From<alloy_dyn_abi::Error> for EncodingError {
    fn from(err: alloy_dyn_abi::Error) -> Self {
        use alloy_dyn_abi::Error;
        match err {
            Error::MissingType(name) | Error::InvalidPropertyDefinition(name) => {
                Self::UnknownType(name)
            }
            Error::TypeParser(e) => Self::UnknownType(e.to_string()),
            Error::CircularDependency(name) => Self::TypeCycle(name),
            Error::TypeMismatch { expected, actual } => Self::InvalidValue {
                ty: expected,
                reason: format!("cannot encode {actual}"),
            },
            other => Self::Encoder(other.to_string()),
        }
    }
}

/// Builds a resolver over every declared struct except `EIP712Domain`.
fn resolver(types: &Types) -> Result<Resolver, EncodingError> {
    let mut resolver = Resolver::default();
    for (name, fields) in types.iter().filter(|(name, _)| name.as_str() != DOMAIN_TYPE) {
        let props = fields
            .iter()
            .map(|f| PropertyDef::new(f.ty.as_str(), f.name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        resolver.ingest(TypeDef::new(name.as_str(), props)?);
    }
    Ok(resolver)
}

/// Resolves `name` as a struct. Fails on any cycle, self-references included.
fn resolve_struct(resolver: &Resolver, name: &str) -> Result<DynSolType, EncodingError> {
    if name == DOMAIN_TYPE || !resolver.contains_type_name(name) {
        return Err(EncodingError::UnknownType(name.to_owned()));
    }
    Ok(resolver.resolve(name)?)
}

/// Walks `value` as an instance of `ty` and reports the first absent field.
fn check_fields(ty: &str, value: &Value, types: &Types) -> Result<(), EncodingError> {
    if let Some(head) = ty.strip_suffix(']') {
        let element = head.rfind('[').map_or(head, |open| &head[..open]);
        if let Some(items) = value.as_array() {
            for item in items {
                check_fields(element, item, types)?;
            }
        }
        return Ok(());
    }
    let Some(fields) = types.get(ty).filter(|_| ty != DOMAIN_TYPE) else {
        return Ok(());
    };
    let object = value
        .as_object()
        .ok_or_else(|| EncodingError::NotAnObject(ty.to_owned()))?;
    for field in fields {
        let value = object
            .get(&field.name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| EncodingError::MissingField {
                struct_name: ty.to_owned(),
                field: field.name.clone(),
            })?;
        check_fields(&field.ty, value, types)?;
    }
    Ok(())
}

/// Returns the canonical type string of `primary_type`.
///
/// The primary type comes first, followed by every struct type it
/// transitively references, in lexicographic order and without duplicates.
///
/// # Errors
///
/// Returns [`EncodingError::UnknownType`] for undeclared or malformed types
/// and [`EncodingError::TypeCycle`] when struct references loop.
pub fn encode_type(primary_type: &str, types: &Types) -> Result<String, EncodingError> {
    let resolver = resolver(types)?;
    resolve_struct(&resolver, primary_type)?;
    Ok(resolver.encode_type(primary_type)?)
}

/// Returns `keccak256(encode_type(primary_type))`.
///
/// # Errors
///
/// See [`encode_type`].
pub fn type_hash(primary_type: &str, types: &Types) -> Result<B256, EncodingError> {
    encode_type(primary_type, types).map(keccak256)
}

/// Returns `keccak256(typeHash || encodeValue(field) for each field)`.
///
/// # Errors
///
/// Returns an [`EncodingError`] when `data` is not an object, a declared field
/// is missing, or any field value fails to encode.
pub fn hash_struct(name: &str, data: &Value, types: &Types) -> Result<B256, EncodingError> {
    let resolver = resolver(types)?;
    let ty = resolve_struct(&resolver, name)?;
    check_fields(name, data, types)?;
    Ok(resolver.eip712_data_word(&ty.coerce_json(data)?)?)
}

/// Encodes a single value of `field_type` into its 32-byte word.
///
/// Atomic values are packed into the word. Strings, bytes and arrays are
/// hashed, and structs contribute their struct hash.
///
/// # Errors
///
/// Returns an [`EncodingError`] when the type is unknown or the value does
/// not fit it.
pub fn encode_value(field_type: &str, value: &Value, types: &Types) -> Result<B256, EncodingError> {
    let resolver = resolver(types)?;
    let ty = resolver.resolve(field_type)?;
    check_fields(field_type, value, types)?;
    Ok(resolver.eip712_data_word(&ty.coerce_json(value)?)?)
}

/// Returns the domain separator, hashing only the fields that are present.
#[must_use]
pub fn hash_domain(domain: &TypedDataDomain) -> B256 {
    domain.to_eip712_domain().separator()
}

/// Returns `keccak256(0x19 || 0x01 || domainSeparator || hashStruct(message))`.
///
/// When `primary_type` is `EIP712Domain` the struct hash is omitted and only
/// the domain separator is signed.
///
/// # Errors
///
/// Returns an [`EncodingError`] when the message cannot be encoded.
pub fn digest(
    domain: &TypedDataDomain,
    primary_type: &str,
    types: &Types,
    message: &Value,
) -> Result<B256, EncodingError> {
    let resolver = resolver(types)?;
    if primary_type != DOMAIN_TYPE {
        resolve_struct(&resolver, primary_type)?;
        check_fields(primary_type, message, types)?;
    }
    let typed = alloy_dyn_abi::TypedData {
        domain: domain.to_eip712_domain(),
        resolver,
        primary_type: primary_type.to_owned(),
        message: message.clone(),
    };
    Ok(typed.eip712_signing_hash()?)
}

fn deserialize_non_empty<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(D::Error::custom),
    }
}

fn deserialize_chain_id<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|id| Some(U256::from(id)))
            .ok_or_else(|| D::Error::custom("chainId must be a non-negative integer")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => U256::from_str(s.trim())
            .map(Some)
            .map_err(|_| D::Error::custom(format!("malformed chainId `{s}`"))),
        Some(other) => Err(D::Error::custom(format!("unexpected chainId {other}"))),
    }
}
