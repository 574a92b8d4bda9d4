//! Binary instruction codecs and address derivation for the tracked programs

pub mod claimable_tokens;
pub mod memo;
pub mod payment_router;
pub mod pda;
pub mod reward_manager;
pub mod secp256k1;

use solana_sdk::pubkey::Pubkey;
use std::fmt::Debug;
use thiserror::Error;

pub use pda::PdaError;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("instruction data is empty")]
    Empty,

    #[error("unknown discriminant: {0}")]
    UnknownDiscriminant(String),

    #[error("instruction data length mismatch: {0}")]
    Length(#[from] std::io::Error),

    #[error("unexpected {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("account index {index} out of range ({len} accounts)")]
    AccountIndexOutOfRange { index: usize, len: usize },

    #[error("missing account: {0}")]
    MissingAccount(&'static str),

    #[error("account count mismatch: expected {expected}, got {actual}")]
    AccountCountMismatch { expected: usize, actual: usize },

    #[error("invalid secp256k1 instruction: {0}")]
    Secp256k1(String),

    #[error("address derivation failed: {0}")]
    Pda(#[from] PdaError),

    #[error("token amount {0} exceeds the storable range")]
    AmountOverflow(u64),
}

/// Decoder signature shared by every program's dispatch table.
pub type Decoder<T> = fn(&[u8]) -> Result<T, DecodeError>;

/// Looks `key` up in a program's dispatch table and decodes the remaining bytes.
pub(crate) fn dispatch<K, T>(table: &[(K, Decoder<T>)], key: K, data: &[u8]) -> Result<T, DecodeError>
where
    K: PartialEq + Debug,
{
    let decoder = table
        .iter()
        .find(|(discriminant, _)| *discriminant == key)
        .map(|(_, decoder)| decoder)
        .ok_or_else(|| DecodeError::UnknownDiscriminant(format!("{:?}", key)))?;
    decoder(data)
}

/// Unit variants carry no fields, so anything after the discriminant is an error.
pub(crate) fn expect_empty(data: &[u8]) -> Result<(), DecodeError> {
    if data.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::TrailingBytes(data.len()))
    }
}

/// The account keys an instruction references, in instruction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionAccounts(Vec<Pubkey>);

impl InstructionAccounts {
    pub fn new(keys: Vec<Pubkey>) -> Self {
        Self(keys)
    }

    /// Maps a compiled instruction's account indexes onto the transaction's full account space.
    pub fn resolve(indexes: &[u8], account_keys: &[Pubkey]) -> Result<Self, DecodeError> {
        let keys = indexes
            .iter()
            .map(|&index| {
                account_keys
                    .get(index as usize)
                    .copied()
                    .ok_or(DecodeError::AccountIndexOutOfRange {
                        index: index as usize,
                        len: account_keys.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(keys))
    }

    pub fn get(&self, index: usize, role: &'static str) -> Result<&Pubkey, DecodeError> {
        self.0.get(index).ok_or(DecodeError::MissingAccount(role))
    }

    pub fn as_slice(&self) -> &[Pubkey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Program ids whose instructions are decoded and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedPrograms {
    pub claimable_tokens: Pubkey,
    pub reward_manager: Pubkey,
    pub payment_router: Pubkey,
}

impl TrackedPrograms {
    pub fn addresses(&self) -> [Pubkey; 3] {
        [self.claimable_tokens, self.reward_manager, self.payment_router]
    }

    pub fn contains(&self, program_id: &Pubkey) -> bool {
        self.addresses().contains(program_id)
    }
}

/// Formats a raw 20-byte ethereum address the way it is stored: lowercase, 0x-prefixed.
pub fn eth_address_hex(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}
