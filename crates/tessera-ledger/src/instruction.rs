use crate::error::{LedgerError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tessera_registry::{Relation, RelationKind};
use tessera_types::{Address, Epoch, EpochSchedule, TokenAmount};

/// Instruction opcodes. One byte, stable, grouped the way record kinds are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    InitializeNetwork = 0x01,
    RegisterOperator = 0x02,
    RegisterVault = 0x03,
    InitializeVaultRegistry = 0x04,
    RegisterMint = 0x05,
    ActivateTicket = 0x06,
    DeactivateTicket = 0x07,
    RetireOperator = 0x08,

    InitializeWeightTable = 0x10,
    SetWeight = 0x11,
    FinalizeWeightTable = 0x12,

    InitializeDistribution = 0x40,
    UploadMerkleRootChunk = 0x41,
    VerifyClaim = 0x42,
    ReclaimUnclaimed = 0x43,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::InitializeNetwork),
            0x02 => Some(Self::RegisterOperator),
            0x03 => Some(Self::RegisterVault),
            0x04 => Some(Self::InitializeVaultRegistry),
            0x05 => Some(Self::RegisterMint),
            0x06 => Some(Self::ActivateTicket),
            0x07 => Some(Self::DeactivateTicket),
            0x08 => Some(Self::RetireOperator),
            0x10 => Some(Self::InitializeWeightTable),
            0x11 => Some(Self::SetWeight),
            0x12 => Some(Self::FinalizeWeightTable),
            0x40 => Some(Self::InitializeDistribution),
            0x41 => Some(Self::UploadMerkleRootChunk),
            0x42 => Some(Self::VerifyClaim),
            0x43 => Some(Self::ReclaimUnclaimed),
            _ => None,
        }
    }
}

/// One entry of an instruction's fixed, ordered account list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub address: Address,
    pub is_writable: bool,
    pub is_signer: bool,
}

impl AccountMeta {
    pub fn read(address: Address) -> Self {
        Self {
            address,
            is_writable: false,
            is_signer: false,
        }
    }

    pub fn write(address: Address) -> Self {
        Self {
            address,
            is_writable: true,
            is_signer: false,
        }
    }

    pub fn signer(address: Address) -> Self {
        Self {
            address,
            is_writable: false,
            is_signer: true,
        }
    }
}

/// A call into the on-ledger logic: opcode, ordered account list, and a
/// small bincode payload. The execution slot always comes from the host
/// context, never from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub accounts: Vec<AccountMeta>,
    pub payload: Vec<u8>,
}

impl Instruction {
    fn with_payload<P: Serialize>(
        opcode: Opcode,
        accounts: Vec<AccountMeta>,
        payload: &P,
    ) -> Result<Self> {
        Ok(Self {
            opcode,
            accounts,
            payload: bincode::serialize(payload).map_err(|e| LedgerError::Payload(e.to_string()))?,
        })
    }

    fn without_payload(opcode: Opcode, accounts: Vec<AccountMeta>) -> Self {
        Self {
            opcode,
            accounts,
            payload: Vec::new(),
        }
    }

    pub fn decode_payload<P: DeserializeOwned>(&self) -> Result<P> {
        bincode::deserialize(&self.payload).map_err(|e| LedgerError::Payload(e.to_string()))
    }

    pub fn account(&self, index: usize) -> Result<&AccountMeta> {
        self.accounts
            .get(index)
            .ok_or(LedgerError::MissingAccount { index })
    }

    /// Account at `index`, which must have signed.
    pub fn signer(&self, index: usize) -> Result<Address> {
        let meta = self.account(index)?;
        if !meta.is_signer {
            return Err(LedgerError::MissingSigner(meta.address));
        }
        Ok(meta.address)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InitializeNetworkPayload {
    pub fee_bps: u64,
    pub schedule: EpochSchedule,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterOperatorPayload {
    pub fee_bps: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterVaultPayload {
    pub mint: Address,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterMintPayload {
    pub mint: Address,
}

/// The two parties come from the account list; only the kind rides in the
/// payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TicketPayload {
    pub kind: RelationKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InitializeWeightTablePayload {
    pub epoch: Epoch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetWeightPayload {
    pub mint: Address,
    pub weight: u128,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InitializeDistributionPayload {
    pub epoch: Epoch,
    pub max_total_claim: TokenAmount,
    pub max_num_nodes: u64,
    pub chunk_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadChunkPayload {
    pub chunk_index: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyClaimPayload {
    pub amount: TokenAmount,
    pub proof_siblings: Vec<[u8; 32]>,
    pub proof_sides: u64,
}

// Builders fixing each opcode's account order. Indexes are what the
// processor dereferences, so the order here is part of the interface.

/// `[network(w), admin(s), fee_wallet(r)]`
pub fn initialize_network(
    network: Address,
    admin: Address,
    fee_wallet: Address,
    fee_bps: u64,
    schedule: EpochSchedule,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::InitializeNetwork,
        vec![
            AccountMeta::write(network),
            AccountMeta::signer(admin),
            AccountMeta::read(fee_wallet),
        ],
        &InitializeNetworkPayload { fee_bps, schedule },
    )
}

/// `[network(r), operator(w), admin(s)]`
pub fn register_operator(
    network: Address,
    operator: Address,
    admin: Address,
    fee_bps: u64,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::RegisterOperator,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(operator),
            AccountMeta::signer(admin),
        ],
        &RegisterOperatorPayload { fee_bps },
    )
}

/// `[network(r), operator(w), admin(s)]`
pub fn retire_operator(network: Address, operator: Address, admin: Address) -> Instruction {
    Instruction::without_payload(
        Opcode::RetireOperator,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(operator),
            AccountMeta::signer(admin),
        ],
    )
}

/// `[network(r), vault_registry(w), vault(w), admin(s)]`
pub fn register_vault(
    network: Address,
    vault_registry: Address,
    vault: Address,
    admin: Address,
    mint: Address,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::RegisterVault,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(vault_registry),
            AccountMeta::write(vault),
            AccountMeta::signer(admin),
        ],
        &RegisterVaultPayload { mint },
    )
}

/// `[network(r), vault_registry(w), payer(w+s)]`
pub fn initialize_vault_registry(
    network: Address,
    vault_registry: Address,
    payer: Address,
) -> Instruction {
    let mut payer_meta = AccountMeta::signer(payer);
    payer_meta.is_writable = true;
    Instruction::without_payload(
        Opcode::InitializeVaultRegistry,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(vault_registry),
            payer_meta,
        ],
    )
}

/// `[network(r), vault_registry(w), admin(s)]`
pub fn register_mint(
    network: Address,
    vault_registry: Address,
    admin: Address,
    mint: Address,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::RegisterMint,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(vault_registry),
            AccountMeta::signer(admin),
        ],
        &RegisterMintPayload { mint },
    )
}

/// `[network(r), party_a(r), party_b(r), authority(s), ticket(w)]` where
/// `(a, b)` are the relation's parties in declared order. The network
/// account supplies the warmup/cooldown schedule for every relation kind.
pub fn activate_ticket(
    network: Address,
    relation: Relation,
    authority: Address,
) -> Result<Instruction> {
    ticket_instruction(Opcode::ActivateTicket, network, relation, authority)
}

/// Same account shape as [`activate_ticket`].
pub fn deactivate_ticket(
    network: Address,
    relation: Relation,
    authority: Address,
) -> Result<Instruction> {
    ticket_instruction(Opcode::DeactivateTicket, network, relation, authority)
}

fn ticket_instruction(
    opcode: Opcode,
    network: Address,
    relation: Relation,
    authority: Address,
) -> Result<Instruction> {
    let (party_a, party_b) = relation.parties();
    Instruction::with_payload(
        opcode,
        vec![
            AccountMeta::read(network),
            AccountMeta::read(party_a),
            AccountMeta::read(party_b),
            AccountMeta::signer(authority),
            AccountMeta::write(relation.ticket_address()),
        ],
        &TicketPayload {
            kind: relation.kind(),
        },
    )
}

/// `[network(r), vault_registry(r), weight_table(w), payer(s)]`
pub fn initialize_weight_table(
    network: Address,
    vault_registry: Address,
    weight_table: Address,
    payer: Address,
    epoch: Epoch,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::InitializeWeightTable,
        vec![
            AccountMeta::read(network),
            AccountMeta::read(vault_registry),
            AccountMeta::write(weight_table),
            AccountMeta::signer(payer),
        ],
        &InitializeWeightTablePayload { epoch },
    )
}

/// `[network(r), weight_table(w), admin(s)]`
pub fn set_weight(
    network: Address,
    weight_table: Address,
    admin: Address,
    mint: Address,
    weight: u128,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::SetWeight,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(weight_table),
            AccountMeta::signer(admin),
        ],
        &SetWeightPayload { mint, weight },
    )
}

/// `[network(r), weight_table(w), admin(s)]`
pub fn finalize_weight_table(
    network: Address,
    weight_table: Address,
    admin: Address,
) -> Instruction {
    Instruction::without_payload(
        Opcode::FinalizeWeightTable,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(weight_table),
            AccountMeta::signer(admin),
        ],
    )
}

/// `[network(r), weight_table(r), distribution(w), admin(s)]`
pub fn initialize_distribution(
    network: Address,
    weight_table: Address,
    distribution: Address,
    admin: Address,
    payload: InitializeDistributionPayload,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::InitializeDistribution,
        vec![
            AccountMeta::read(network),
            AccountMeta::read(weight_table),
            AccountMeta::write(distribution),
            AccountMeta::signer(admin),
        ],
        &payload,
    )
}

/// `[network(r), distribution(w), admin(s)]`
pub fn upload_merkle_root_chunk(
    network: Address,
    distribution: Address,
    admin: Address,
    chunk_index: u64,
    bytes: Vec<u8>,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::UploadMerkleRootChunk,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(distribution),
            AccountMeta::signer(admin),
        ],
        &UploadChunkPayload { chunk_index, bytes },
    )
}

/// `[network(r), distribution(w), recipient(s)]`
pub fn verify_claim(
    network: Address,
    distribution: Address,
    recipient: Address,
    payload: VerifyClaimPayload,
) -> Result<Instruction> {
    Instruction::with_payload(
        Opcode::VerifyClaim,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(distribution),
            AccountMeta::signer(recipient),
        ],
        &payload,
    )
}

/// `[network(r), distribution(w), admin(s), fee_wallet(w)]`
pub fn reclaim_unclaimed(
    network: Address,
    distribution: Address,
    admin: Address,
    fee_wallet: Address,
) -> Instruction {
    Instruction::without_payload(
        Opcode::ReclaimUnclaimed,
        vec![
            AccountMeta::read(network),
            AccountMeta::write(distribution),
            AccountMeta::signer(admin),
            AccountMeta::write(fee_wallet),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for opcode in [
            Opcode::InitializeNetwork,
            Opcode::ActivateTicket,
            Opcode::RetireOperator,
            Opcode::SetWeight,
            Opcode::UploadMerkleRootChunk,
            Opcode::ReclaimUnclaimed,
        ] {
            assert_eq!(Opcode::from_u8(opcode as u8), Some(opcode));
        }
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_payload_round_trip() {
        let ix = set_weight(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            42,
        )
        .unwrap();
        let payload: SetWeightPayload = ix.decode_payload().unwrap();
        assert_eq!(payload.weight, 42);
    }

    #[test]
    fn test_signer_helper_enforces_flag() {
        let network = Address::new_unique();
        let table = Address::new_unique();
        let admin = Address::new_unique();
        let ix = finalize_weight_table(network, table, admin);

        assert_eq!(ix.signer(2).unwrap(), admin);
        assert!(matches!(ix.signer(0), Err(LedgerError::MissingSigner(a)) if a == network));
        assert!(matches!(
            ix.signer(9),
            Err(LedgerError::MissingAccount { index: 9 })
        ));
    }

    #[test]
    fn test_ticket_accounts_follow_relation_order() {
        let operator = Address::new_unique();
        let network = Address::new_unique();
        let relation = Relation::OperatorNetwork { operator, network };
        let ix = activate_ticket(network, relation, Address::new_unique()).unwrap();

        assert_eq!(ix.accounts[0].address, network);
        assert_eq!(ix.accounts[1].address, operator);
        assert_eq!(ix.accounts[2].address, network);
        assert_eq!(ix.accounts[4].address, relation.ticket_address());
        assert!(ix.accounts[4].is_writable);
    }
}
