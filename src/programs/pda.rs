//! Deterministic program address derivation

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LEN: usize = 32;
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PdaError {
    #[error("too many seeds: {0} (max {MAX_SEEDS})")]
    TooManySeeds(usize),

    #[error("seed {index} is {len} bytes (max {MAX_SEED_LEN})")]
    MaxSeedLengthExceeded { index: usize, len: usize },

    #[error("no viable bump seed found")]
    NoViableBump,
}

fn validate_seeds(seeds: &[&[u8]]) -> Result<(), PdaError> {
    if seeds.len() > MAX_SEEDS {
        return Err(PdaError::TooManySeeds(seeds.len()));
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(PdaError::MaxSeedLengthExceeded {
                index,
                len: seed.len(),
            });
        }
    }
    Ok(())
}

/// Hashes the seeds into a candidate address. Returns `None` when the
/// candidate lies on the ed25519 curve and so could have a private key.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<Option<Pubkey>, PdaError> {
    validate_seeds(seeds)?;

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_ref());
    hasher.update(PDA_MARKER);
    let hash: [u8; 32] = hasher.finalize().into();

    let candidate = Pubkey::new_from_array(hash);
    if candidate.is_on_curve() {
        Ok(None)
    } else {
        Ok(Some(candidate))
    }
}

/// Searches bump seeds from 255 down and returns the first off-curve address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), PdaError> {
    validate_seeds(seeds)?;

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        if let Some(address) = create_program_address(&with_bump, program_id)? {
            return Ok((address, bump));
        }
    }
    Err(PdaError::NoViableBump)
}

/// `sha256(base || seed || owner)`, the derivation used for user bank accounts.
pub fn create_with_seed(base: &Pubkey, seed: &str, owner: &Pubkey) -> Result<Pubkey, PdaError> {
    if seed.len() > MAX_SEED_LEN {
        return Err(PdaError::MaxSeedLengthExceeded {
            index: 0,
            len: seed.len(),
        });
    }
    let mut hasher = Sha256::new();
    hasher.update(base.as_ref());
    hasher.update(seed.as_bytes());
    hasher.update(owner.as_ref());
    let hash: [u8; 32] = hasher.finalize().into();
    Ok(Pubkey::new_from_array(hash))
}
