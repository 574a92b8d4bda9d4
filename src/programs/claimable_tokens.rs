//! Claimable tokens program: user banks keyed by ethereum address

use super::{dispatch, pda, DecodeError, Decoder, InstructionAccounts};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateTokenAccountData {
    pub eth_address: [u8; 20],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferData {
    pub sender_eth_address: [u8; 20],
}

/// Message signed by the sender's ethereum key, carried by the preceding
/// secp256k1 instruction of a transfer.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedTransferData {
    pub destination: [u8; 32],
    pub amount: u64,
    pub nonce: u64,
}

impl SignedTransferData {
    pub fn decode(message: &[u8]) -> Result<Self, DecodeError> {
        Ok(borsh::from_slice(message)?)
    }

    pub fn destination(&self) -> Pubkey {
        Pubkey::new_from_array(self.destination)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimableTokensData {
    CreateTokenAccount(CreateTokenAccountData),
    Transfer(TransferData),
}

const CREATE_TOKEN_ACCOUNT: u8 = 0;
const TRANSFER: u8 = 1;

fn decode_create_token_account(data: &[u8]) -> Result<ClaimableTokensData, DecodeError> {
    Ok(ClaimableTokensData::CreateTokenAccount(borsh::from_slice(data)?))
}

fn decode_transfer(data: &[u8]) -> Result<ClaimableTokensData, DecodeError> {
    Ok(ClaimableTokensData::Transfer(borsh::from_slice(data)?))
}

const DISPATCH: &[(u8, Decoder<ClaimableTokensData>)] = &[
    (CREATE_TOKEN_ACCOUNT, decode_create_token_account),
    (TRANSFER, decode_transfer),
];

impl ClaimableTokensData {
    pub fn discriminant(&self) -> u8 {
        match self {
            ClaimableTokensData::CreateTokenAccount(_) => CREATE_TOKEN_ACCOUNT,
            ClaimableTokensData::Transfer(_) => TRANSFER,
        }
    }

    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![self.discriminant()];
        match self {
            ClaimableTokensData::CreateTokenAccount(data) => data.serialize(&mut buf)?,
            ClaimableTokensData::Transfer(data) => data.serialize(&mut buf)?,
        }
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimableTokensInstruction {
    pub data: ClaimableTokensData,
    pub accounts: InstructionAccounts,
}

pub fn decode(data: &[u8], accounts: InstructionAccounts) -> Result<ClaimableTokensInstruction, DecodeError> {
    let (&tag, rest) = data.split_first().ok_or(DecodeError::Empty)?;
    let data = dispatch(DISPATCH, tag, rest)?;
    Ok(ClaimableTokensInstruction { data, accounts })
}

// Account roles. CreateTokenAccount: payer, mint, authority, user_bank, rent,
// token program, system program. Transfer: payer, sender_user_bank,
// destination, nonce, authority, rent, instructions sysvar, system program,
// token program.
impl ClaimableTokensInstruction {
    pub fn payer(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(0, "payer")
    }

    pub fn mint(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(1, "mint")
    }

    pub fn user_bank(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(3, "user_bank")
    }

    pub fn sender_user_bank(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(1, "sender_user_bank")
    }

    pub fn destination(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(2, "destination")
    }

    pub fn nonce_account(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(3, "nonce")
    }

    pub fn authority(&self) -> Result<&Pubkey, DecodeError> {
        match self.data {
            ClaimableTokensData::CreateTokenAccount(_) => self.accounts.get(2, "authority"),
            ClaimableTokensData::Transfer(_) => self.accounts.get(4, "authority"),
        }
    }
}

/// Authority PDA owning every user bank of a mint.
pub fn derive_authority(program_id: &Pubkey, mint: &Pubkey) -> Result<(Pubkey, u8), DecodeError> {
    Ok(pda::find_program_address(&[mint.as_ref()], program_id)?)
}

pub fn derive_user_bank(
    program_id: &Pubkey,
    mint: &Pubkey,
    eth_address: &[u8; 20],
) -> Result<Pubkey, DecodeError> {
    let (authority, _) = derive_authority(program_id, mint)?;
    let seed = bs58::encode(eth_address).into_string();
    Ok(pda::create_with_seed(&authority, &seed, &spl_token::ID)?)
}

pub fn derive_nonce(
    program_id: &Pubkey,
    mint: &Pubkey,
    eth_address: &[u8; 20],
) -> Result<(Pubkey, u8), DecodeError> {
    let (authority, _) = derive_authority(program_id, mint)?;
    let mut seed = b"N_".to_vec();
    seed.extend_from_slice(eth_address);
    Ok(pda::find_program_address(&[authority.as_ref(), &seed], program_id)?)
}
