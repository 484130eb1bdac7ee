//! Synthetic option chain generator
//!
//! Last-resort data source: produces a plausible chain for any symbol and
//! length so a fetch never comes back empty. Shape is deterministic (strike
//! grid around a fixed base price), magnitudes are random.
//!
//! Invariants of every generated chain:
//! - exactly `length` rows with strictly increasing strikes
//! - premiums `>= 0.05` with at most 2 decimal places
//! - call premiums non-increasing and put premiums non-decreasing in strike,
//!   in-the-money premiums never below intrinsic value
//! - volume in `1_000..=50_000`, open interest in `10_000..=500_000`

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{OptionChainRow, Symbol};

/// Minimum premium tick
pub const MIN_PREMIUM: Decimal = dec!(0.05);

const VOLUME_RANGE: std::ops::RangeInclusive<u64> = 1_000..=50_000;
const OPEN_INTEREST_RANGE: std::ops::RangeInclusive<u64> = 10_000..=500_000;

/// Base price and strike spacing for an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexProfile {
    pub base_price: Decimal,
    pub strike_interval: Decimal,
}

/// Fixed lookup table. Unknown symbols get the NIFTY base on the wide grid.
pub fn index_profile(symbol: &str) -> IndexProfile {
    let (base_price, strike_interval) = match symbol {
        "NIFTY" => (dec!(19500), dec!(50)),
        "BANKNIFTY" => (dec!(45000), dec!(100)),
        "FINNIFTY" => (dec!(19000), dec!(100)),
        "MIDCPNIFTY" => (dec!(9500), dec!(100)),
        _ => (dec!(19500), dec!(100)),
    };
    IndexProfile {
        base_price,
        strike_interval,
    }
}

/// Generated chain together with the underlying price it was built around
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticChain {
    pub underlying_price: Decimal,
    pub rows: Vec<OptionChainRow>,
}

#[derive(Debug)]
pub struct SyntheticChainGenerator {
    rng: StdRng,
}

impl Default for SyntheticChainGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticChainGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible generator for tests and benchmarks
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, symbol: &Symbol, length: u32) -> SyntheticChain {
        let profile = index_profile(symbol.as_str());
        let base = profile.base_price;
        let interval = profile.strike_interval;
        let start_strike = base - Decimal::from(length / 2) * interval;

        let strikes: Vec<Decimal> = (0..length)
            .map(|i| start_strike + Decimal::from(i) * interval)
            .collect();

        let mut calls: Vec<Decimal> = strikes
            .iter()
            .map(|&strike| {
                if strike < base {
                    self.in_the_money(base - strike)
                } else {
                    self.out_of_the_money(strike - base)
                }
            })
            .collect();

        let mut puts: Vec<Decimal> = strikes
            .iter()
            .map(|&strike| {
                if strike > base {
                    self.in_the_money(strike - base)
                } else {
                    self.out_of_the_money(base - strike)
                }
            })
            .collect();

        // Calls lose value as strike rises, puts gain
        for i in 1..calls.len() {
            calls[i] = calls[i].min(calls[i - 1]);
        }
        for i in (0..puts.len().saturating_sub(1)).rev() {
            puts[i] = puts[i].min(puts[i + 1]);
        }

        let rows = strikes
            .into_iter()
            .zip(calls.into_iter().zip(puts))
            .map(|(strike, (call, put))| OptionChainRow {
                strike,
                call_ltp: finalize_premium(call),
                call_volume: self.rng.gen_range(VOLUME_RANGE),
                call_oi: self.rng.gen_range(OPEN_INTEREST_RANGE),
                put_ltp: finalize_premium(put),
                put_volume: self.rng.gen_range(VOLUME_RANGE),
                put_oi: self.rng.gen_range(OPEN_INTEREST_RANGE),
            })
            .collect();

        SyntheticChain {
            underlying_price: base,
            rows,
        }
    }

    /// Intrinsic value plus a non-negative time value
    fn in_the_money(&mut self, intrinsic: Decimal) -> Decimal {
        intrinsic + Decimal::from(self.rng.gen_range(0..=50))
    }

    /// Time value decaying with distance from the underlying
    fn out_of_the_money(&mut self, distance: Decimal) -> Decimal {
        dec!(50) - distance / dec!(10) + Decimal::from(self.rng.gen_range(-15..=15))
    }
}

fn finalize_premium(raw: Decimal) -> Decimal {
    raw.max(MIN_PREMIUM).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_CHAIN_LENGTH;
    use itertools::Itertools;

    fn nifty() -> Symbol {
        Symbol::new("NIFTY")
    }

    #[test]
    fn test_nifty_four_strikes() {
        let chain = SyntheticChainGenerator::with_seed(7).generate(&nifty(), 4);
        let strikes: Vec<Decimal> = chain.rows.iter().map(|r| r.strike).collect();
        assert_eq!(
            strikes,
            vec![dec!(19400), dec!(19450), dec!(19500), dec!(19550)]
        );
        assert_eq!(chain.underlying_price, dec!(19500));
    }

    #[test]
    fn test_wide_grid_for_other_indices() {
        let chain = SyntheticChainGenerator::with_seed(1).generate(&Symbol::new("BANKNIFTY"), 5);
        assert_eq!(chain.rows[0].strike, dec!(44800));
        for (a, b) in chain.rows.iter().tuple_windows() {
            assert_eq!(b.strike - a.strike, dec!(100));
        }

        let unknown = SyntheticChainGenerator::with_seed(1).generate(&Symbol::new("XYZ"), 2);
        assert_eq!(unknown.underlying_price, dec!(19500));
        assert_eq!(unknown.rows[1].strike - unknown.rows[0].strike, dec!(100));
    }

    #[test]
    fn test_length_and_ordering_hold_for_many_sizes() {
        let mut generator = SyntheticChainGenerator::with_seed(42);
        for symbol in ["NIFTY", "BANKNIFTY", "FINNIFTY", "MIDCPNIFTY"] {
            for length in [1u32, 2, 3, 10, 21, 60] {
                let chain = generator.generate(&Symbol::new(symbol), length);
                assert_eq!(chain.rows.len(), length as usize);
                assert!(chain
                    .rows
                    .iter()
                    .tuple_windows()
                    .all(|(a, b)| a.strike < b.strike));
            }
        }
    }

    #[test]
    fn test_longest_allowed_chain_keeps_strikes_positive() {
        let mut generator = SyntheticChainGenerator::with_seed(8);
        for symbol in ["NIFTY", "BANKNIFTY", "FINNIFTY", "MIDCPNIFTY", "XYZ"] {
            let chain = generator.generate(&Symbol::new(symbol), MAX_CHAIN_LENGTH);
            assert_eq!(chain.rows.len(), MAX_CHAIN_LENGTH as usize);
            assert!(chain.rows[0].strike > Decimal::ZERO, "{symbol}");
        }
    }

    #[test]
    fn test_premium_floor_and_rounding() {
        let mut generator = SyntheticChainGenerator::with_seed(3);
        for seed_round in 0..20 {
            let chain = generator.generate(&nifty(), 40 + seed_round);
            for row in &chain.rows {
                assert!(row.call_ltp >= MIN_PREMIUM);
                assert!(row.put_ltp >= MIN_PREMIUM);
                assert!(row.call_ltp.scale() <= 2);
                assert!(row.put_ltp.scale() <= 2);
                assert_eq!(row.call_ltp, row.call_ltp.round_dp(2));
            }
        }
    }

    #[test]
    fn test_intrinsic_value_direction() {
        let mut generator = SyntheticChainGenerator::with_seed(11);
        let chain = generator.generate(&nifty(), 30);
        let base = chain.underlying_price;

        for row in &chain.rows {
            if row.strike < base {
                assert!(row.call_ltp >= base - row.strike);
            }
            if row.strike > base {
                assert!(row.put_ltp >= row.strike - base);
            }
        }
        for (a, b) in chain.rows.iter().tuple_windows() {
            assert!(a.call_ltp >= b.call_ltp);
            assert!(a.put_ltp <= b.put_ltp);
        }
    }

    #[test]
    fn test_volume_and_open_interest_ranges() {
        let chain = SyntheticChainGenerator::with_seed(5).generate(&nifty(), 50);
        for row in &chain.rows {
            assert!(VOLUME_RANGE.contains(&row.call_volume));
            assert!(VOLUME_RANGE.contains(&row.put_volume));
            assert!(OPEN_INTEREST_RANGE.contains(&row.call_oi));
            assert!(OPEN_INTEREST_RANGE.contains(&row.put_oi));
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = SyntheticChainGenerator::with_seed(99).generate(&nifty(), 10);
        let b = SyntheticChainGenerator::with_seed(99).generate(&nifty(), 10);
        assert_eq!(a, b);
    }
}
