//! Reward manager program: attestation-driven reward disbursements

use super::{dispatch, expect_empty, pda, DecodeError, Decoder, InstructionAccounts};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    pub min_votes: u8,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateSenderData {
    pub eth_address: [u8; 20],
    pub operator: [u8; 20],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubmitAttestationData {
    pub disbursement_id: String,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct EvaluateAttestationsData {
    pub amount: u64,
    pub disbursement_id: String,
    pub recipient_eth_address: [u8; 20],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardManagerData {
    Init(InitData),
    ChangeManagerAccount,
    CreateSender(CreateSenderData),
    DeleteSender,
    CreateSenderPublic(CreateSenderData),
    DeleteSenderPublic,
    SubmitAttestation(SubmitAttestationData),
    EvaluateAttestations(EvaluateAttestationsData),
}

fn decode_init(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    Ok(RewardManagerData::Init(borsh::from_slice(data)?))
}

fn decode_change_manager_account(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    expect_empty(data)?;
    Ok(RewardManagerData::ChangeManagerAccount)
}

fn decode_create_sender(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    Ok(RewardManagerData::CreateSender(borsh::from_slice(data)?))
}

fn decode_delete_sender(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    expect_empty(data)?;
    Ok(RewardManagerData::DeleteSender)
}

fn decode_create_sender_public(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    Ok(RewardManagerData::CreateSenderPublic(borsh::from_slice(data)?))
}

fn decode_delete_sender_public(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    expect_empty(data)?;
    Ok(RewardManagerData::DeleteSenderPublic)
}

fn decode_submit_attestation(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    Ok(RewardManagerData::SubmitAttestation(borsh::from_slice(data)?))
}

fn decode_evaluate_attestations(data: &[u8]) -> Result<RewardManagerData, DecodeError> {
    Ok(RewardManagerData::EvaluateAttestations(borsh::from_slice(data)?))
}

const DISPATCH: &[(u8, Decoder<RewardManagerData>)] = &[
    (0, decode_init),
    (1, decode_change_manager_account),
    (2, decode_create_sender),
    (3, decode_delete_sender),
    (4, decode_create_sender_public),
    (5, decode_delete_sender_public),
    (6, decode_submit_attestation),
    (7, decode_evaluate_attestations),
];

impl RewardManagerData {
    pub fn discriminant(&self) -> u8 {
        match self {
            RewardManagerData::Init(_) => 0,
            RewardManagerData::ChangeManagerAccount => 1,
            RewardManagerData::CreateSender(_) => 2,
            RewardManagerData::DeleteSender => 3,
            RewardManagerData::CreateSenderPublic(_) => 4,
            RewardManagerData::DeleteSenderPublic => 5,
            RewardManagerData::SubmitAttestation(_) => 6,
            RewardManagerData::EvaluateAttestations(_) => 7,
        }
    }

    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![self.discriminant()];
        match self {
            RewardManagerData::Init(data) => data.serialize(&mut buf)?,
            RewardManagerData::CreateSender(data) | RewardManagerData::CreateSenderPublic(data) => {
                data.serialize(&mut buf)?
            }
            RewardManagerData::SubmitAttestation(data) => data.serialize(&mut buf)?,
            RewardManagerData::EvaluateAttestations(data) => data.serialize(&mut buf)?,
            RewardManagerData::ChangeManagerAccount
            | RewardManagerData::DeleteSender
            | RewardManagerData::DeleteSenderPublic => {}
        }
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardManagerInstruction {
    pub data: RewardManagerData,
    pub accounts: InstructionAccounts,
}

pub fn decode(data: &[u8], accounts: InstructionAccounts) -> Result<RewardManagerInstruction, DecodeError> {
    let (&tag, rest) = data.split_first().ok_or(DecodeError::Empty)?;
    let data = dispatch(DISPATCH, tag, rest)?;
    Ok(RewardManagerInstruction { data, accounts })
}

// EvaluateAttestations accounts: attestations, reward manager state,
// authority, token source, destination user bank, disbursement,
// anti-abuse oracle, payer, rent, token program, system program.
impl RewardManagerInstruction {
    pub fn attestations(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(0, "attestations")
    }

    pub fn reward_manager_state(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(1, "reward_manager_state")
    }

    pub fn authority(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(2, "authority")
    }

    pub fn token_source(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(3, "token_source")
    }

    pub fn destination_user_bank(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(4, "destination_user_bank")
    }

    pub fn disbursement(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(5, "disbursement")
    }

    pub fn anti_abuse_oracle(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(6, "anti_abuse_oracle")
    }

    pub fn payer(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(7, "payer")
    }
}

/// Splits a disbursement id into challenge id and specifier. Only the first
/// `:` separates them; the specifier keeps any further separators.
pub fn split_disbursement_id(disbursement_id: &str) -> (String, String) {
    match disbursement_id.split_once(':') {
        Some((challenge_id, specifier)) => (challenge_id.to_string(), specifier.to_string()),
        None => (disbursement_id.to_string(), String::new()),
    }
}

pub fn derive_authority(program_id: &Pubkey, state: &Pubkey) -> Result<(Pubkey, u8), DecodeError> {
    Ok(pda::find_program_address(&[state.as_ref()], program_id)?)
}

fn derive_prefixed(
    program_id: &Pubkey,
    state: &Pubkey,
    prefix: &[u8],
    id: &[u8],
) -> Result<(Pubkey, u8), DecodeError> {
    let (authority, _) = derive_authority(program_id, state)?;
    let mut seed = prefix.to_vec();
    seed.extend_from_slice(id);
    Ok(pda::find_program_address(&[authority.as_ref(), &seed], program_id)?)
}

/// Sender PDA for an ethereum address, left-padded to 20 bytes.
pub fn derive_sender(
    program_id: &Pubkey,
    state: &Pubkey,
    eth_address: &[u8],
) -> Result<(Pubkey, u8), DecodeError> {
    if eth_address.len() > 20 {
        return Err(DecodeError::TrailingBytes(eth_address.len() - 20));
    }
    let mut padded = [0u8; 20];
    padded[20 - eth_address.len()..].copy_from_slice(eth_address);
    derive_prefixed(program_id, state, b"S_", &padded)
}

pub fn derive_attestations(
    program_id: &Pubkey,
    state: &Pubkey,
    disbursement_id: &str,
) -> Result<(Pubkey, u8), DecodeError> {
    derive_prefixed(program_id, state, b"V_", disbursement_id.as_bytes())
}

pub fn derive_disbursement(
    program_id: &Pubkey,
    state: &Pubkey,
    disbursement_id: &str,
) -> Result<(Pubkey, u8), DecodeError> {
    derive_prefixed(program_id, state, b"T_", disbursement_id.as_bytes())
}
