use crate::error::{Result, WeightsError};
use crate::table::WeightTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_registry::{Relation, TicketBook};
use tessera_types::{Address, EpochSchedule, Slot, TokenAmount};
use tracing::{debug, trace};

/// One vault → operator delegation as reported by the ledger snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeDelegation {
    pub vault: Address,
    pub operator: Address,
    pub mint: Address,
    pub amount: TokenAmount,
}

/// Aggregated stake weight for one operator over an epoch snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStake {
    pub operator: Address,
    pub stake_weight: u128,
}

/// A computed reward for one operator, ready to become a distribution leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardShare {
    pub operator: Address,
    pub amount: TokenAmount,
}

/// Folds snapshot delegations into per-operator stake weights for one epoch.
///
/// A delegation contributes iff all three relationship tickets
/// (operator↔network, vault↔network, vault↔operator) are eligible at the
/// epoch boundary and the delegated mint carries a frozen weight. A vault
/// that began cooling down mid-epoch therefore still backs its operators
/// until the cooldown ends.
pub struct StakeAggregator<'a> {
    network: Address,
    epoch_start_slot: Slot,
    schedule: &'a EpochSchedule,
    tickets: &'a TicketBook,
    table: &'a WeightTable,
}

impl<'a> StakeAggregator<'a> {
    /// Fails with `TableNotFinalized` unless the table is frozen; aggregating
    /// against a table still under construction would not be reproducible.
    pub fn new(
        epoch_start_slot: Slot,
        schedule: &'a EpochSchedule,
        tickets: &'a TicketBook,
        table: &'a WeightTable,
    ) -> Result<Self> {
        if !table.is_finalized() {
            return Err(WeightsError::TableNotFinalized(table.epoch));
        }
        Ok(Self {
            network: table.network,
            epoch_start_slot,
            schedule,
            tickets,
            table,
        })
    }

    fn is_eligible(&self, delegation: &StakeDelegation) -> bool {
        let relations = [
            Relation::OperatorNetwork {
                operator: delegation.operator,
                network: self.network,
            },
            Relation::VaultNetwork {
                vault: delegation.vault,
                network: self.network,
            },
            Relation::VaultOperator {
                vault: delegation.vault,
                operator: delegation.operator,
            },
        ];
        relations
            .iter()
            .all(|rel| self.tickets.is_eligible(rel, self.epoch_start_slot, self.schedule))
    }

    /// Per-operator stake weights in address order. Ineligible delegations
    /// and mints outside the frozen table contribute nothing; any overflow
    /// while accumulating aborts the whole aggregation.
    pub fn aggregate(&self, delegations: &[StakeDelegation]) -> Result<Vec<OperatorStake>> {
        let mut totals: BTreeMap<Address, u128> = BTreeMap::new();

        for delegation in delegations {
            if !self.is_eligible(delegation) {
                trace!(
                    vault = %delegation.vault,
                    operator = %delegation.operator,
                    "delegation skipped: relationship not eligible"
                );
                continue;
            }
            let weighted = match self.table.stake_weight(&delegation.mint, delegation.amount) {
                Ok(weighted) => weighted,
                Err(WeightsError::WeightNotFound(mint)) => {
                    trace!(mint = %mint, "delegation skipped: mint has no weight");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let total = totals.entry(delegation.operator).or_insert(0);
            *total = total
                .checked_add(weighted)
                .ok_or(WeightsError::ArithmeticOverflow)?;
        }

        debug!(
            epoch = self.table.epoch,
            operators = totals.len(),
            delegations = delegations.len(),
            "stake aggregated"
        );
        Ok(totals
            .into_iter()
            .map(|(operator, stake_weight)| OperatorStake {
                operator,
                stake_weight,
            })
            .collect())
    }
}

/// Floor-proportional split of `pool` by stake weight.
///
/// Each operator receives `pool * weight / total_weight` rounded down;
/// operators whose floor share is zero are omitted. The rounding residue is
/// deliberately left in the pool, where the post-window reclaim sweeps it.
pub fn reward_shares(pool: TokenAmount, stakes: &[OperatorStake]) -> Result<Vec<RewardShare>> {
    let mut total: u128 = 0;
    for stake in stakes {
        total = total
            .checked_add(stake.stake_weight)
            .ok_or(WeightsError::ArithmeticOverflow)?;
    }
    if total == 0 || pool.is_zero() {
        return Ok(Vec::new());
    }

    let mut shares = Vec::with_capacity(stakes.len());
    for stake in stakes {
        let numerator = (pool.units() as u128)
            .checked_mul(stake.stake_weight)
            .ok_or(WeightsError::ArithmeticOverflow)?;
        let units =
            u64::try_from(numerator / total).map_err(|_| WeightsError::ArithmeticOverflow)?;
        if units == 0 {
            continue;
        }
        shares.push(RewardShare {
            operator: stake.operator,
            amount: TokenAmount::new(units),
        });
    }
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::WEIGHT_PRECISION;

    struct Fixture {
        network: Address,
        schedule: EpochSchedule,
        tickets: TicketBook,
        table: WeightTable,
        mint: Address,
    }

    // One operator and one vault, fully linked at slot 0 with a weight of
    // 1.0 for the vault's mint, table frozen at slot 20.
    fn fixture() -> (Fixture, Address, Address) {
        let network = Address::new_unique();
        let operator = Address::new_unique();
        let vault = Address::new_unique();
        let mint = Address::new_unique();
        let schedule = EpochSchedule {
            epoch_length_slots: 100,
            warmup_slots: 10,
            cooldown_slots: 10,
            claim_window_slots: 100,
        };

        let mut tickets = TicketBook::new();
        tickets
            .activate(Relation::OperatorNetwork { operator, network }, 0, &schedule)
            .unwrap();
        tickets
            .activate(Relation::VaultNetwork { vault, network }, 0, &schedule)
            .unwrap();
        tickets
            .activate(Relation::VaultOperator { vault, operator }, 0, &schedule)
            .unwrap();

        let mut table = WeightTable::new(network, 1, vec![mint], 10);
        table.set_weight(mint, WEIGHT_PRECISION, 15).unwrap();
        table.finalize(20).unwrap();

        (
            Fixture {
                network,
                schedule,
                tickets,
                table,
                mint,
            },
            operator,
            vault,
        )
    }

    fn delegation(fix: &Fixture, operator: Address, vault: Address, amount: u64) -> StakeDelegation {
        StakeDelegation {
            vault,
            operator,
            mint: fix.mint,
            amount: TokenAmount::new(amount),
        }
    }

    #[test]
    fn test_eligible_delegation_contributes() {
        let (fix, operator, vault) = fixture();
        let aggregator =
            StakeAggregator::new(100, &fix.schedule, &fix.tickets, &fix.table).unwrap();

        let stakes = aggregator
            .aggregate(&[delegation(&fix, operator, vault, 500)])
            .unwrap();
        assert_eq!(
            stakes,
            vec![OperatorStake {
                operator,
                stake_weight: 500
            }]
        );
    }

    #[test]
    fn test_missing_ticket_excludes_delegation() {
        let (fix, _operator, vault) = fixture();
        let stranger = Address::new_unique();
        let aggregator =
            StakeAggregator::new(100, &fix.schedule, &fix.tickets, &fix.table).unwrap();

        // Same vault, but no vault<->operator ticket for this operator.
        let stakes = aggregator
            .aggregate(&[delegation(&fix, stranger, vault, 500)])
            .unwrap();
        assert!(stakes.is_empty());
    }

    #[test]
    fn test_cooling_down_vault_still_counts() {
        let (mut fix, operator, vault) = fixture();
        let network = fix.network;
        fix.tickets
            .deactivate(Relation::VaultNetwork { vault, network }, 95, &fix.schedule)
            .unwrap();

        // Cooldown runs until slot 105, so the boundary at 100 still counts
        // the vault; the next boundary does not.
        let aggregator =
            StakeAggregator::new(100, &fix.schedule, &fix.tickets, &fix.table).unwrap();
        let stakes = aggregator
            .aggregate(&[delegation(&fix, operator, vault, 500)])
            .unwrap();
        assert_eq!(stakes.len(), 1);

        let aggregator =
            StakeAggregator::new(200, &fix.schedule, &fix.tickets, &fix.table).unwrap();
        let stakes = aggregator
            .aggregate(&[delegation(&fix, operator, vault, 500)])
            .unwrap();
        assert!(stakes.is_empty());
    }

    #[test]
    fn test_unweighted_mint_is_skipped() {
        let (fix, operator, vault) = fixture();
        let aggregator =
            StakeAggregator::new(100, &fix.schedule, &fix.tickets, &fix.table).unwrap();

        let mut foreign = delegation(&fix, operator, vault, 500);
        foreign.mint = Address::new_unique();
        let stakes = aggregator.aggregate(&[foreign]).unwrap();
        assert!(stakes.is_empty());
    }

    #[test]
    fn test_open_table_is_rejected() {
        let (fix, _, _) = fixture();
        let open = WeightTable::new(fix.network, 2, vec![fix.mint], 10);
        assert_eq!(
            StakeAggregator::new(100, &fix.schedule, &fix.tickets, &open)
                .err()
                .unwrap(),
            WeightsError::TableNotFinalized(2)
        );
    }

    #[test]
    fn test_overflow_aborts_whole_aggregation() {
        let (fix, operator, vault) = fixture();

        let mut table = WeightTable::new(fix.network, 1, vec![fix.mint], 10);
        table.set_weight(fix.mint, u128::MAX, 15).unwrap();
        table.finalize(20).unwrap();
        let aggregator =
            StakeAggregator::new(100, &fix.schedule, &fix.tickets, &table).unwrap();

        // The first delegation is representable; the second overflows
        // stake x weight and must abort the run, not be skipped or clamped.
        let small = delegation(&fix, operator, vault, 1);
        let big = delegation(&fix, operator, vault, 2);
        assert_eq!(
            aggregator.aggregate(&[small, big]),
            Err(WeightsError::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_reward_shares_floor_split() {
        let stakes: Vec<OperatorStake> = (0..3)
            .map(|_| OperatorStake {
                operator: Address::new_unique(),
                stake_weight: 1,
            })
            .collect();

        let shares = reward_shares(TokenAmount::new(100), &stakes).unwrap();
        assert_eq!(shares.len(), 3);
        for share in &shares {
            assert_eq!(share.amount, TokenAmount::new(33));
        }
        // The extra unit stays with the pool for the post-window reclaim.
        let paid: u64 = shares.iter().map(|s| s.amount.units()).sum();
        assert_eq!(paid, 99);
    }

    #[test]
    fn test_reward_shares_proportionality() {
        let a = Address::new_unique();
        let b = Address::new_unique();
        let stakes = vec![
            OperatorStake {
                operator: a,
                stake_weight: 300,
            },
            OperatorStake {
                operator: b,
                stake_weight: 100,
            },
        ];

        let shares = reward_shares(TokenAmount::new(1_000), &stakes).unwrap();
        assert_eq!(
            shares,
            vec![
                RewardShare {
                    operator: a,
                    amount: TokenAmount::new(750)
                },
                RewardShare {
                    operator: b,
                    amount: TokenAmount::new(250)
                },
            ]
        );
    }

    #[test]
    fn test_reward_shares_edge_cases() {
        assert!(reward_shares(TokenAmount::new(100), &[]).unwrap().is_empty());
        assert!(reward_shares(
            TokenAmount::ZERO,
            &[OperatorStake {
                operator: Address::new_unique(),
                stake_weight: 5
            }]
        )
        .unwrap()
        .is_empty());

        // A share that floors to zero is omitted rather than minted.
        let dust = reward_shares(
            TokenAmount::new(1),
            &[
                OperatorStake {
                    operator: Address::new_unique(),
                    stake_weight: 1,
                },
                OperatorStake {
                    operator: Address::new_unique(),
                    stake_weight: 999,
                },
            ],
        )
        .unwrap();
        assert_eq!(dust.len(), 0);
    }
}
