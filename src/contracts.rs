//! Centralized Contract Definitions
//!
//! Solidity interfaces the workers talk to, defined with alloy's `sol!` macro.
//! Calls are encoded/decoded by hand (`SolCall`) and sent through the
//! failover client rather than through `#[sol(rpc)]` instances, so every
//! read goes through the same endpoint pool.
//!
//! Created: 2026-10-19

use alloy::primitives::{b256, B256};
use alloy::sol;

// ── Executor (flash-arbitrage entry point) ───────────────────────────

sol! {
    interface IApexExecutor {
        function executeFlashArbitrage(address tokenA, address tokenOut, uint256 amount);
    }
}

// ── Chainlink aggregator (price reference) ───────────────────────────

sol! {
    interface IAggregatorV3 {
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
    }
}

// ── OP-stack GasPriceOracle (L1 data fee) ────────────────────────────

sol! {
    interface IGasPriceOracle {
        function getL1Fee(bytes _data) external view returns (uint256);
    }
}

// ── Swap event ───────────────────────────────────────────────────────

/// keccak256("Swap(address,uint256,uint256,uint256,uint256,address)")
pub const SWAP_EVENT_TOPIC: B256 =
    b256!("d78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822");

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, Address, U256};
    use alloy::sol_types::SolCall;

    #[test]
    fn test_swap_topic_matches_signature() {
        assert_eq!(
            keccak256("Swap(address,uint256,uint256,uint256,uint256,address)"),
            SWAP_EVENT_TOPIC
        );
    }

    #[test]
    fn test_flash_arbitrage_encoding_layout() {
        let call = IApexExecutor::executeFlashArbitrageCall {
            tokenA: Address::repeat_byte(0x11),
            tokenOut: Address::repeat_byte(0x22),
            amount: U256::ZERO,
        };
        let data = call.abi_encode();
        // selector + 3 static words
        assert_eq!(data.len(), 4 + 3 * 32);
        assert_eq!(&data[..4], IApexExecutor::executeFlashArbitrageCall::SELECTOR.as_slice());
    }
}
