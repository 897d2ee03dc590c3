//! Height-range dispatch of protocol rulesets.
//!
//! Each ruleset is a row of data binding a half-open block range to a revm
//! spec id, instead of a hierarchy of per-fork VM types.

use once_cell::sync::Lazy;
use revm::primitives::hardfork::SpecId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ReplayError, Result};

/// One protocol ruleset, applicable to the block range
/// `[start, end)`; an absent `end` extends the rule to every later height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkRule {
    /// First height the ruleset applies to.
    pub start: u64,
    /// First height past the ruleset, exclusive. `None` leaves the rule
    /// open-ended.
    pub end: Option<u64>,
    /// Execution semantics for the range.
    pub spec: SpecId,
}

impl ForkRule {
    /// Returns `true` if `height` falls inside this rule's range.
    pub fn contains(&self, height: u64) -> bool {
        height >= self.start && self.end.is_none_or(|end| height < end)
    }
}

/// Ordered, contiguous, non-overlapping table of [`ForkRule`]s for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkSchedule {
    chain_id: u64,
    rules: Vec<ForkRule>,
}

impl ForkSchedule {
    /// Builds a schedule after validating that `rules` are ascending,
    /// contiguous and cover `[genesis, +∞)`.
    pub fn new(chain_id: u64, rules: Vec<ForkRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(ReplayError::InvalidSchedule("no fork rules given".to_string()));
        }
        for pair in rules.windows(2) {
            let (rule, next) = (&pair[0], &pair[1]);
            match rule.end {
                Some(end) if end <= rule.start => {
                    return Err(ReplayError::InvalidSchedule(format!(
                        "empty range for {:?} at height {}",
                        rule.spec, rule.start
                    )));
                }
                Some(end) if end != next.start => {
                    return Err(ReplayError::InvalidSchedule(format!(
                        "gap or overlap between {:?} (ends {}) and {:?} (starts {})",
                        rule.spec, end, next.spec, next.start
                    )));
                }
                None => {
                    return Err(ReplayError::InvalidSchedule(format!(
                        "open-ended {:?} is followed by {:?}",
                        rule.spec, next.spec
                    )));
                }
                _ => {}
            }
        }
        let last = rules.last().expect("validated non-empty");
        if last.end.is_some() {
            return Err(ReplayError::InvalidSchedule(format!(
                "final rule {:?} must be open-ended",
                last.spec
            )));
        }
        Ok(Self { chain_id, rules })
    }

    /// The chain this schedule describes.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The validated rule table.
    pub fn rules(&self) -> &[ForkRule] {
        &self.rules
    }

    /// Resolves the ruleset applicable at `height`.
    ///
    /// Exactly one rule can match by construction; heights below the first
    /// rule fail with [`ReplayError::UnsupportedHeight`].
    pub fn resolve(&self, height: u64) -> Result<SpecId> {
        let spec = self
            .rules
            .iter()
            .find(|rule| rule.contains(height))
            .map(|rule| rule.spec)
            .ok_or(ReplayError::UnsupportedHeight(height))?;
        debug!(height, spec = ?spec, "Resolved fork ruleset");
        Ok(spec)
    }

    /// The Ethereum mainnet schedule up to the Muir Glacier rules.
    pub fn mainnet() -> &'static Self {
        static MAINNET: Lazy<ForkSchedule> = Lazy::new(|| {
            ForkSchedule::new(
                1,
                vec![
                    ForkRule { start: 0, end: Some(1_150_000), spec: SpecId::FRONTIER },
                    ForkRule { start: 1_150_000, end: Some(2_463_000), spec: SpecId::HOMESTEAD },
                    ForkRule { start: 2_463_000, end: Some(2_675_000), spec: SpecId::TANGERINE },
                    ForkRule {
                        start: 2_675_000,
                        end: Some(4_370_000),
                        spec: SpecId::SPURIOUS_DRAGON,
                    },
                    ForkRule { start: 4_370_000, end: Some(7_280_000), spec: SpecId::BYZANTIUM },
                    ForkRule { start: 7_280_000, end: Some(9_069_000), spec: SpecId::PETERSBURG },
                    ForkRule { start: 9_069_000, end: Some(9_200_000), spec: SpecId::ISTANBUL },
                    ForkRule { start: 9_200_000, end: None, spec: SpecId::MUIR_GLACIER },
                ],
            )
            .expect("mainnet schedule is valid")
        });
        &MAINNET
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, SpecId::FRONTIER)]
    #[case(1_149_999, SpecId::FRONTIER)]
    #[case(1_150_000, SpecId::HOMESTEAD)]
    #[case(2_675_000, SpecId::SPURIOUS_DRAGON)]
    #[case(7_280_000, SpecId::PETERSBURG)]
    #[case(9_069_000, SpecId::ISTANBUL)]
    #[case(9_199_999, SpecId::ISTANBUL)]
    #[case(9_200_000, SpecId::MUIR_GLACIER)]
    #[case(12_000_001, SpecId::MUIR_GLACIER)]
    fn mainnet_boundaries(#[case] height: u64, #[case] expected: SpecId) {
        assert_eq!(ForkSchedule::mainnet().resolve(height).unwrap(), expected);
    }

    #[test]
    fn heights_below_genesis_are_unsupported() {
        let schedule = ForkSchedule::new(
            1,
            vec![ForkRule { start: 100, end: None, spec: SpecId::ISTANBUL }],
        )
        .unwrap();
        assert!(matches!(
            schedule.resolve(99),
            Err(ReplayError::UnsupportedHeight(99))
        ));
    }

    #[test]
    fn gaps_are_rejected() {
        let result = ForkSchedule::new(
            1,
            vec![
                ForkRule { start: 0, end: Some(10), spec: SpecId::FRONTIER },
                ForkRule { start: 20, end: None, spec: SpecId::HOMESTEAD },
            ],
        );
        assert!(matches!(result, Err(ReplayError::InvalidSchedule(_))));
    }

    #[test]
    fn truncated_tables_are_rejected() {
        let result = ForkSchedule::new(
            1,
            vec![ForkRule { start: 0, end: Some(10), spec: SpecId::FRONTIER }],
        );
        assert!(matches!(result, Err(ReplayError::InvalidSchedule(_))));
    }

    /// Strategy producing valid schedules: ascending boundaries carved into
    /// contiguous ranges.
    fn valid_schedule() -> impl Strategy<Value = ForkSchedule> {
        proptest::collection::vec(1u64..10_000, 0..8).prop_map(|spans| {
            let specs = [
                SpecId::FRONTIER,
                SpecId::HOMESTEAD,
                SpecId::TANGERINE,
                SpecId::SPURIOUS_DRAGON,
                SpecId::BYZANTIUM,
                SpecId::PETERSBURG,
                SpecId::ISTANBUL,
                SpecId::MUIR_GLACIER,
                SpecId::BERLIN,
            ];
            let mut rules = Vec::with_capacity(spans.len() + 1);
            let mut start = 0u64;
            for (i, span) in spans.iter().enumerate() {
                rules.push(ForkRule { start, end: Some(start + span), spec: specs[i] });
                start += span;
            }
            rules.push(ForkRule { start, end: None, spec: specs[spans.len()] });
            ForkSchedule::new(1, rules).expect("constructed schedules are valid")
        })
    }

    proptest! {
        #[test]
        fn exactly_one_rule_resolves_every_height(
            schedule in valid_schedule(),
            height in 0u64..100_000,
        ) {
            let matching =
                schedule.rules().iter().filter(|rule| rule.contains(height)).count();
            prop_assert_eq!(matching, 1);
            let resolved = schedule.resolve(height).unwrap();
            let by_scan = schedule
                .rules()
                .iter()
                .find(|rule| rule.contains(height))
                .unwrap()
                .spec;
            prop_assert_eq!(resolved, by_scan);
        }
    }
}
