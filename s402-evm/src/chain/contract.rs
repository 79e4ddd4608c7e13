//! Solidity interface definitions for on-chain interactions.
//!
//! - [`IERC20`] - balance queries for token balances
//! - [`IERC1271`] - contract-wallet signature validation
//! - [`IEIP3009`] - `transferWithAuthorization` for USDC-style tokens

use alloy_primitives::{FixedBytes, fixed_bytes};
use alloy_sol_types::sol;

/// Value `isValidSignature` returns for a valid signature.
pub const EIP1271_MAGIC_VALUE: FixedBytes<4> = fixed_bytes!("1626ba7e");

sol! {
    /// Minimal ERC-20 interface.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    /// ERC-1271 standard signature validation for contract accounts.
    ///
    /// Reference: <https://eips.ethereum.org/EIPS/eip-1271>
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC1271 {
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);
    }
}

sol! {
    /// ERC-3009 subset for USDC-style tokens.
    ///
    /// Overload order matters: the bytes-signature variant is `_0`, the
    /// `(v, r, s)` variant is `_1`.
    ///
    /// Reference: <https://eips.ethereum.org/EIPS/eip-3009>
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    interface IEIP3009 {
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external;
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}
