//! Routing contract ABI bindings.
//!
//! The routing contract's well-known read functions are generated with
//! `alloy-sol-types`'s `sol!` macro so the Signer and Relayer Dispatcher call
//! them with typed arguments; dynamic calldata decoding (arbitrary swap
//! functions, whose exact signature varies per deployment) still goes
//! through the runtime-loaded [`alloy_json_abi::JsonAbi`] in [`crate::rpc`].

use alloy_sol_types::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IRoutingContract {
        function processedTransactions(bytes32 originalTxHash) external view returns (uint8);
        function paused() external view returns (bool);
        function getHashPacked(
            address newAddress,
            uint256 transitTokenAmount,
            bytes32 originalTxHash,
            uint256 sourceBlockchainId
        ) external view returns (bytes32);
        function existingOtherBlockchain(uint256 blockchainId) external view returns (bool);
        function blockchainCryptoFee(uint256 blockchainId) external view returns (uint256);
        function minConfirmationBlocks() external view returns (uint256);
        function blockchainRouter(uint256 blockchainId) external view returns (address);
        function feeAmountOfBlockchain(uint256 blockchainId) external view returns (uint256);

        event TransferTokensToOtherBlockchainUser(uint256 RBCAmountIn, uint256 amountSpent);
        event TransferCryptoToOtherBlockchainUser(uint256 RBCAmountIn, uint256 amountSpent);
    }
}

/// Processed-transaction states returned by `processedTransactions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessedState {
    NotProcessed,
    Processed,
    Reverted,
}

impl From<u8> for ProcessedState {
    fn from(value: u8) -> Self {
        match value {
            1 => ProcessedState::Processed,
            2 => ProcessedState::Reverted,
            _ => ProcessedState::NotProcessed,
        }
    }
}

/// The two event names the scanner subscribes to, in the fixed order spec.md
/// lists them.
pub const SUBSCRIBED_EVENTS: [&str; 2] = [
    "TransferTokensToOtherBlockchainUser",
    "TransferCryptoToOtherBlockchainUser",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_state_decodes_known_values() {
        assert_eq!(ProcessedState::from(0), ProcessedState::NotProcessed);
        assert_eq!(ProcessedState::from(1), ProcessedState::Processed);
        assert_eq!(ProcessedState::from(2), ProcessedState::Reverted);
    }
}
