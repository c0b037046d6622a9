//! Profit gate: cost estimate, safety-margined threshold, bribe tier.
//!
//! All amounts are wei. The gate is strict: gross must be greater than
//! cost × multiplier / 100, equality does not clear.

use crate::config::ExecutionSettings;
use crate::rpc::FeeData;
use crate::types::Advice;
use alloy::primitives::U256;
use anyhow::Result;

/// Required margin over cost (percent) for a given advisory stance
pub fn margin_percent(advice: Advice) -> u64 {
    match advice {
        Advice::Buy => 110,
        Advice::Sell => 150,
        Advice::Hold => 120,
    }
}

/// gasLimit × (maxFeePerGas or gasPrice) + L1 data fee
pub fn estimate_cost(gas_limit: u64, fees: &FeeData, l1_fee: U256) -> U256 {
    U256::from(gas_limit)
        .saturating_mul(U256::from(fees.effective_gas_price()))
        .saturating_add(l1_fee)
}

/// priority × (100 + bribe) / 100
pub fn boost_priority_fee(priority_fee: u128, bribe_percent: u64) -> u128 {
    priority_fee.saturating_mul(100 + bribe_percent as u128) / 100
}

/// A cleared gate, with the numbers that cleared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub gross: U256,
    pub cost: U256,
    pub threshold: U256,
    pub net: U256,
    pub bribe_percent: u64,
}

#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    base_bribe_percent: u64,
    max_bribe_percent: u64,
    /// Net profit strictly above this escalates the bribe
    escalation_cutoff: U256,
}

impl SafetyPolicy {
    pub fn new(base_bribe_percent: u64, max_bribe_percent: u64, escalation_cutoff: U256) -> Self {
        Self {
            base_bribe_percent,
            max_bribe_percent,
            escalation_cutoff,
        }
    }

    pub fn from_settings(settings: &ExecutionSettings) -> Result<Self> {
        Ok(Self::new(
            settings.priority_bribe_percent,
            settings.max_bribe_percent,
            settings.escalation_cutoff_wei()?,
        ))
    }

    pub fn threshold(&self, cost: U256, advice: Advice) -> U256 {
        cost.saturating_mul(U256::from(margin_percent(advice))) / U256::from(100u64)
    }

    pub fn bribe_percent(&self, net: U256) -> u64 {
        if net > self.escalation_cutoff {
            self.max_bribe_percent
        } else {
            self.base_bribe_percent
        }
    }

    /// None when the opportunity does not clear the margin.
    pub fn evaluate(&self, gross: U256, cost: U256, advice: Advice) -> Option<GateDecision> {
        let threshold = self.threshold(cost, advice);
        if gross <= threshold {
            return None;
        }

        let net = gross.saturating_sub(cost);
        Some(GateDecision {
            gross,
            cost,
            threshold,
            net,
            bribe_percent: self.bribe_percent(net),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::utils::parse_ether;

    fn policy() -> SafetyPolicy {
        SafetyPolicy::from_settings(&ExecutionSettings::default()).unwrap()
    }

    fn wei(eth: &str) -> U256 {
        parse_ether(eth).unwrap()
    }

    #[test]
    fn test_margin_per_advice() {
        assert_eq!(margin_percent(Advice::Buy), 110);
        assert_eq!(margin_percent(Advice::Sell), 150);
        assert_eq!(margin_percent(Advice::Hold), 120);
    }

    #[test]
    fn test_gate_is_strict_at_threshold() {
        let p = policy();
        let cost = U256::from(1_000u64);

        // HOLD: threshold 1200
        assert!(p.evaluate(U256::from(1_200u64), cost, Advice::Hold).is_none());
        assert!(p.evaluate(U256::from(1_201u64), cost, Advice::Hold).is_some());

        // BUY: threshold 1100
        assert!(p.evaluate(U256::from(1_100u64), cost, Advice::Buy).is_none());
        assert!(p.evaluate(U256::from(1_101u64), cost, Advice::Buy).is_some());

        // SELL: threshold 1500
        assert!(p.evaluate(U256::from(1_500u64), cost, Advice::Sell).is_none());
        assert!(p.evaluate(U256::from(1_501u64), cost, Advice::Sell).is_some());
    }

    #[test]
    fn test_bribe_cutoff_both_sides() {
        let p = policy();

        // net exactly 0.1 stays on the baseline tier
        let d = p.evaluate(wei("0.11"), wei("0.01"), Advice::Hold).unwrap();
        assert_eq!(d.net, wei("0.1"));
        assert_eq!(d.bribe_percent, 25);

        let d = p.evaluate(wei("0.110000000000000001"), wei("0.01"), Advice::Hold).unwrap();
        assert_eq!(d.bribe_percent, 99);
    }

    #[test]
    fn test_zero_cost_still_needs_positive_gross() {
        let p = policy();
        assert!(p.evaluate(U256::ZERO, U256::ZERO, Advice::Buy).is_none());
        assert!(p.evaluate(U256::from(1u64), U256::ZERO, Advice::Buy).is_some());
    }

    #[test]
    fn test_cost_includes_l1_fee() {
        let fees = FeeData {
            gas_price: 5,
            max_fee_per_gas: Some(10),
            max_priority_fee_per_gas: Some(1),
        };
        assert_eq!(estimate_cost(1_400_000, &fees, U256::ZERO), U256::from(14_000_000u64));
        assert_eq!(estimate_cost(1_400_000, &fees, U256::from(7u64)), U256::from(14_000_007u64));

        let legacy = FeeData { gas_price: 5, ..Default::default() };
        assert_eq!(estimate_cost(100, &legacy, U256::ZERO), U256::from(500u64));
    }

    #[test]
    fn test_priority_boost() {
        assert_eq!(boost_priority_fee(1_000_000_000, 25), 1_250_000_000);
        assert_eq!(boost_priority_fee(1_000_000_000, 99), 1_990_000_000);
        assert_eq!(boost_priority_fee(0, 99), 0);
    }
}
