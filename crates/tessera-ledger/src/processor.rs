use crate::error::{LedgerError, Result};
use crate::instruction::{
    InitializeDistributionPayload, InitializeNetworkPayload, InitializeWeightTablePayload,
    Instruction, Opcode, RegisterMintPayload, RegisterOperatorPayload, RegisterVaultPayload,
    SetWeightPayload, TicketPayload, UploadChunkPayload, VerifyClaimPayload,
};
use crate::state::LedgerState;
use tessera_distributor::{ClaimProof, DistributionRoot};
use tessera_registry::{
    Network, Operator, RegistryError, Relation, RelationKind, Ticket, TicketBook, Vault,
    VaultRegistry,
};
use tessera_types::{Address, RecordKind, TokenAmount};
use tessera_weights::WeightTable;
use tracing::info;

/// A funds movement the host executes after the instruction succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub to: Address,
    pub amount: TokenAmount,
}

/// Result of a processed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outcome {
    pub transfer: Option<Transfer>,
}

/// Sequential instruction processor: the on-ledger logic.
///
/// Every public operation runs to completion against the store inside the
/// host's account-lock scope; nothing here assumes two instructions share a
/// transaction. The execution slot is read from the state, so a caller can
/// never smuggle a slot through a payload.
pub struct Processor;

impl Processor {
    pub fn process(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        match instruction.opcode {
            Opcode::InitializeNetwork => Self::initialize_network(state, instruction),
            Opcode::RegisterOperator => Self::register_operator(state, instruction),
            Opcode::RegisterVault => Self::register_vault(state, instruction),
            Opcode::InitializeVaultRegistry => Self::initialize_vault_registry(state, instruction),
            Opcode::RegisterMint => Self::register_mint(state, instruction),
            Opcode::ActivateTicket => Self::ticket_transition(state, instruction, true),
            Opcode::DeactivateTicket => Self::ticket_transition(state, instruction, false),
            Opcode::RetireOperator => Self::retire_operator(state, instruction),
            Opcode::InitializeWeightTable => Self::initialize_weight_table(state, instruction),
            Opcode::SetWeight => Self::set_weight(state, instruction),
            Opcode::FinalizeWeightTable => Self::finalize_weight_table(state, instruction),
            Opcode::InitializeDistribution => Self::initialize_distribution(state, instruction),
            Opcode::UploadMerkleRootChunk => Self::upload_chunk(state, instruction),
            Opcode::VerifyClaim => Self::verify_claim(state, instruction),
            Opcode::ReclaimUnclaimed => Self::reclaim_unclaimed(state, instruction),
        }
    }

    fn network_admin_gate(
        state: &LedgerState,
        instruction: &Instruction,
        network_index: usize,
        signer_index: usize,
    ) -> Result<Network> {
        let network: Network =
            state.record(&instruction.account(network_index)?.address)?;
        let signer = instruction.signer(signer_index)?;
        if signer != network.admin() {
            return Err(LedgerError::Unauthorized(signer));
        }
        Ok(network)
    }

    fn initialize_network(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let payload: InitializeNetworkPayload = instruction.decode_payload()?;
        let address = instruction.account(0)?.address;
        let admin = instruction.signer(1)?;
        let fee_wallet = instruction.account(2)?.address;

        let network = Network::new(
            address,
            admin,
            fee_wallet,
            payload.fee_bps,
            payload.schedule,
            state.slot(),
        )?;
        state.create_record(address, &network)?;
        info!(network = %address, slot = state.slot(), "network initialized");
        Ok(Outcome::default())
    }

    fn register_operator(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let payload: RegisterOperatorPayload = instruction.decode_payload()?;
        // Registration is open; the network account only anchors the context.
        let _network: Network = state.record(&instruction.account(0)?.address)?;
        let address = instruction.account(1)?.address;
        let admin = instruction.signer(2)?;

        let index = state.count_kind(RecordKind::Operator);
        let operator = Operator::new(address, admin, payload.fee_bps, index, state.slot())?;
        state.create_record(address, &operator)?;
        info!(operator = %address, index, "operator registered");
        Ok(Outcome::default())
    }

    fn register_vault(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let payload: RegisterVaultPayload = instruction.decode_payload()?;
        let _network: Network = state.record(&instruction.account(0)?.address)?;
        let registry_address = instruction.account(1)?.address;
        let vault_address = instruction.account(2)?.address;
        let admin = instruction.signer(3)?;

        let mut registry: VaultRegistry = state.record(&registry_address)?;
        registry.register_vault(vault_address, payload.mint, state.slot())?;
        let index = registry.vault_count() as u64 - 1;

        let vault = Vault::new(vault_address, admin, payload.mint, index, state.slot());
        state.create_record(vault_address, &vault)?;
        state.write_record(registry_address, &registry)?;
        Ok(Outcome::default())
    }

    fn initialize_vault_registry(
        state: &mut LedgerState,
        instruction: &Instruction,
    ) -> Result<Outcome> {
        let network_address = instruction.account(0)?.address;
        let _network: Network = state.record(&network_address)?;
        let registry_address = instruction.account(1)?.address;
        instruction.signer(2)?;

        let expected = VaultRegistry::derive_address(&network_address);
        if registry_address != expected {
            return Err(LedgerError::InvalidDerivedAddress {
                expected,
                found: registry_address,
            });
        }
        state.create_record(registry_address, &VaultRegistry::new(network_address))?;
        info!(network = %network_address, "vault registry initialized");
        Ok(Outcome::default())
    }

    fn register_mint(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let payload: RegisterMintPayload = instruction.decode_payload()?;
        Self::network_admin_gate(state, instruction, 0, 2)?;
        let registry_address = instruction.account(1)?.address;

        let mut registry: VaultRegistry = state.record(&registry_address)?;
        registry.register_mint(payload.mint, state.slot())?;
        state.write_record(registry_address, &registry)?;
        Ok(Outcome::default())
    }

    fn retire_operator(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let _network: Network = state.record(&instruction.account(0)?.address)?;
        let operator_address = instruction.account(1)?.address;
        let signer = instruction.signer(2)?;

        let mut operator: Operator = state.record(&operator_address)?;
        if signer != operator.admin() {
            return Err(LedgerError::Unauthorized(signer));
        }
        if operator.is_retired() {
            return Err(RegistryError::OperatorRetired(operator_address).into());
        }
        operator.retire();
        state.write_record(operator_address, &operator)?;
        info!(operator = %operator_address, slot = state.slot(), "operator retired");
        Ok(Outcome::default())
    }

    fn relation_from(instruction: &Instruction, kind: RelationKind) -> Result<Relation> {
        let party_a = instruction.account(1)?.address;
        let party_b = instruction.account(2)?.address;
        Ok(match kind {
            RelationKind::OperatorNetwork => Relation::OperatorNetwork {
                operator: party_a,
                network: party_b,
            },
            RelationKind::VaultNetwork => Relation::VaultNetwork {
                vault: party_a,
                network: party_b,
            },
            RelationKind::VaultOperator => Relation::VaultOperator {
                vault: party_a,
                operator: party_b,
            },
        })
    }

    /// The initiating party's admin must sign: the operator's for an
    /// operator↔network ticket, the vault's otherwise.
    fn initiator_gate(
        state: &LedgerState,
        instruction: &Instruction,
        relation: &Relation,
    ) -> Result<()> {
        let signer = instruction.signer(3)?;
        let (party_a, _) = relation.parties();
        let admin = match relation.kind() {
            RelationKind::OperatorNetwork => state.record::<Operator>(&party_a)?.admin(),
            RelationKind::VaultNetwork | RelationKind::VaultOperator => {
                state.record::<Vault>(&party_a)?.admin()
            }
        };
        if signer != admin {
            return Err(LedgerError::Unauthorized(signer));
        }
        Ok(())
    }

    fn ticket_transition(
        state: &mut LedgerState,
        instruction: &Instruction,
        activate: bool,
    ) -> Result<Outcome> {
        let payload: TicketPayload = instruction.decode_payload()?;
        let relation = Self::relation_from(instruction, payload.kind)?;
        Self::initiator_gate(state, instruction, &relation)?;

        // A retired operator can wind down existing relationships but never
        // enter new ones.
        if activate {
            let operator = match relation {
                Relation::OperatorNetwork { operator, .. } => Some(operator),
                Relation::VaultOperator { operator, .. } => Some(operator),
                Relation::VaultNetwork { .. } => None,
            };
            if let Some(operator) = operator {
                if state.record::<Operator>(&operator)?.is_retired() {
                    return Err(RegistryError::OperatorRetired(operator).into());
                }
            }
        }

        let ticket_address = instruction.account(4)?.address;
        let expected = relation.ticket_address();
        if ticket_address != expected {
            return Err(LedgerError::InvalidDerivedAddress {
                expected,
                found: ticket_address,
            });
        }

        // Warmup/cooldown delays always come from the network record, so
        // every relation kind runs the same lifecycle clock.
        let schedule = state
            .record::<Network>(&instruction.account(0)?.address)?
            .schedule();

        // Run the transition through the lifecycle state machine over the
        // single stored ticket.
        let mut book = TicketBook::new();
        if let Some(existing) = state.record_if_present::<Ticket>(&ticket_address)? {
            book.insert(existing);
        }
        let ticket = if activate {
            *book.activate(relation, state.slot(), &schedule)?
        } else {
            *book.deactivate(relation, state.slot(), &schedule)?
        };
        state.write_record(ticket_address, &ticket)?;
        Ok(Outcome::default())
    }

    fn initialize_weight_table(
        state: &mut LedgerState,
        instruction: &Instruction,
    ) -> Result<Outcome> {
        let payload: InitializeWeightTablePayload = instruction.decode_payload()?;
        let network_address = instruction.account(0)?.address;
        let _network: Network = state.record(&network_address)?;
        let registry: VaultRegistry = state.record(&instruction.account(1)?.address)?;
        let table_address = instruction.account(2)?.address;
        instruction.signer(3)?;

        let expected = WeightTable::derive_address(&network_address, payload.epoch);
        if table_address != expected {
            return Err(LedgerError::InvalidDerivedAddress {
                expected,
                found: table_address,
            });
        }
        if state.contains(&table_address) {
            return Err(LedgerError::EpochAlreadyInitialized(payload.epoch));
        }

        let table = WeightTable::new(
            network_address,
            payload.epoch,
            registry.mints().collect(),
            state.slot(),
        );
        state.create_record(table_address, &table)?;
        info!(epoch = payload.epoch, "weight table initialized");
        Ok(Outcome::default())
    }

    fn set_weight(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let payload: SetWeightPayload = instruction.decode_payload()?;
        Self::network_admin_gate(state, instruction, 0, 2)?;
        let table_address = instruction.account(1)?.address;

        let mut table: WeightTable = state.record(&table_address)?;
        table.set_weight(payload.mint, payload.weight, state.slot())?;
        state.write_record(table_address, &table)?;
        Ok(Outcome::default())
    }

    fn finalize_weight_table(
        state: &mut LedgerState,
        instruction: &Instruction,
    ) -> Result<Outcome> {
        Self::network_admin_gate(state, instruction, 0, 2)?;
        let table_address = instruction.account(1)?.address;

        let mut table: WeightTable = state.record(&table_address)?;
        table.finalize(state.slot())?;
        state.write_record(table_address, &table)?;
        Ok(Outcome::default())
    }

    fn initialize_distribution(
        state: &mut LedgerState,
        instruction: &Instruction,
    ) -> Result<Outcome> {
        let payload: InitializeDistributionPayload = instruction.decode_payload()?;
        let network = Self::network_admin_gate(state, instruction, 0, 3)?;
        let table: WeightTable = state.record(&instruction.account(1)?.address)?;
        let distribution_address = instruction.account(2)?.address;

        if !table.is_finalized() {
            return Err(tessera_weights::WeightsError::TableNotFinalized(table.epoch).into());
        }
        if table.epoch != payload.epoch {
            return Err(LedgerError::WrongEpoch {
                expected: table.epoch,
                found: payload.epoch,
            });
        }
        let expected = DistributionRoot::derive_address(&network.address, payload.epoch);
        if distribution_address != expected {
            return Err(LedgerError::InvalidDerivedAddress {
                expected,
                found: distribution_address,
            });
        }

        let distribution = DistributionRoot::new(
            network.address,
            payload.epoch,
            tessera_distributor::derive_salt(&network.address, payload.epoch),
            payload.max_total_claim,
            payload.max_num_nodes,
            payload.chunk_size as usize,
        )?;
        state.create_record(distribution_address, &distribution)?;
        info!(
            epoch = payload.epoch,
            max_total_claim = %payload.max_total_claim,
            nodes = payload.max_num_nodes,
            "distribution initialized"
        );
        Ok(Outcome::default())
    }

    fn upload_chunk(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let payload: UploadChunkPayload = instruction.decode_payload()?;
        Self::network_admin_gate(state, instruction, 0, 2)?;
        let distribution_address = instruction.account(1)?.address;

        let mut distribution: DistributionRoot = state.record(&distribution_address)?;
        distribution.upload_chunk(payload.chunk_index, &payload.bytes, state.slot())?;
        state.write_record(distribution_address, &distribution)?;
        Ok(Outcome::default())
    }

    fn verify_claim(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let payload: VerifyClaimPayload = instruction.decode_payload()?;
        let _network: Network = state.record(&instruction.account(0)?.address)?;
        let distribution_address = instruction.account(1)?.address;
        let recipient = instruction.signer(2)?;

        let proof = ClaimProof {
            siblings: payload.proof_siblings,
            sides: payload.proof_sides,
        };
        let mut distribution: DistributionRoot = state.record(&distribution_address)?;
        let receipt = distribution.verify_claim(recipient, payload.amount, &proof)?;
        state.write_record(distribution_address, &distribution)?;

        Ok(Outcome {
            transfer: Some(Transfer {
                to: receipt.recipient,
                amount: receipt.amount,
            }),
        })
    }

    fn reclaim_unclaimed(state: &mut LedgerState, instruction: &Instruction) -> Result<Outcome> {
        let network = Self::network_admin_gate(state, instruction, 0, 2)?;
        let distribution_address = instruction.account(1)?.address;
        let fee_wallet = instruction.account(3)?.address;
        if fee_wallet != network.fee_wallet() {
            return Err(LedgerError::Unauthorized(fee_wallet));
        }

        let mut distribution: DistributionRoot = state.record(&distribution_address)?;
        let residual = distribution
            .reclaim_unclaimed(state.slot(), network.schedule().claim_window_slots)?;
        state.write_record(distribution_address, &distribution)?;

        Ok(Outcome {
            transfer: Some(Transfer {
                to: fee_wallet,
                amount: residual,
            }),
        })
    }
}
