//! Payment router program (Anchor): splits a payment across destinations

use super::{dispatch, expect_empty, DecodeError, Decoder, InstructionAccounts};
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

/// sha256("global:route")[..8]
pub const ROUTE_DISCRIMINATOR: [u8; 8] = [0xe5, 0x17, 0xcb, 0x97, 0x7a, 0xe3, 0xad, 0x2a];
/// sha256("global:create_payment_router_balance_pda")[..8]
pub const CREATE_BALANCE_PDA_DISCRIMINATOR: [u8; 8] = [0x53, 0xde, 0x4b, 0x81, 0xef, 0x14, 0x71, 0xea];

/// Anchor instruction discriminator for a snake_case instruction name.
pub fn sighash(name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&hash[..8]);
    discriminator
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct RouteData {
    pub payment_router_pda_bump: u8,
    pub amounts: Vec<u64>,
    pub total_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRouterData {
    CreatePaymentRouterBalancePda,
    Route(RouteData),
}

fn decode_create_balance_pda(data: &[u8]) -> Result<PaymentRouterData, DecodeError> {
    expect_empty(data)?;
    Ok(PaymentRouterData::CreatePaymentRouterBalancePda)
}

fn decode_route(data: &[u8]) -> Result<PaymentRouterData, DecodeError> {
    Ok(PaymentRouterData::Route(borsh::from_slice(data)?))
}

const DISPATCH: &[([u8; 8], Decoder<PaymentRouterData>)] = &[
    (CREATE_BALANCE_PDA_DISCRIMINATOR, decode_create_balance_pda),
    (ROUTE_DISCRIMINATOR, decode_route),
];

impl PaymentRouterData {
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        match self {
            PaymentRouterData::CreatePaymentRouterBalancePda => {
                Ok(CREATE_BALANCE_PDA_DISCRIMINATOR.to_vec())
            }
            PaymentRouterData::Route(route) => {
                let mut buf = ROUTE_DISCRIMINATOR.to_vec();
                route.serialize(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRouterInstruction {
    pub data: PaymentRouterData,
    pub accounts: InstructionAccounts,
}

pub fn decode(data: &[u8], accounts: InstructionAccounts) -> Result<PaymentRouterInstruction, DecodeError> {
    if data.len() < 8 {
        return Err(DecodeError::Length(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "missing anchor discriminator",
        )));
    }
    let (head, rest) = data.split_at(8);
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(head);
    let data = dispatch(DISPATCH, discriminator, rest)?;
    Ok(PaymentRouterInstruction { data, accounts })
}

// Route accounts: sender, sender_owner, token program, then one destination
// per routed amount.
impl PaymentRouterInstruction {
    pub fn sender(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(0, "sender")
    }

    pub fn sender_owner(&self) -> Result<&Pubkey, DecodeError> {
        self.accounts.get(1, "sender_owner")
    }

    pub fn destinations(&self) -> &[Pubkey] {
        self.accounts.as_slice().get(3..).unwrap_or(&[])
    }

    /// Destination and amount pairs in route order.
    pub fn payments(&self) -> Result<Vec<(Pubkey, u64)>, DecodeError> {
        let route = match &self.data {
            PaymentRouterData::Route(route) => route,
            PaymentRouterData::CreatePaymentRouterBalancePda => return Ok(Vec::new()),
        };
        let destinations = self.destinations();
        if destinations.len() != route.amounts.len() {
            return Err(DecodeError::AccountCountMismatch {
                expected: route.amounts.len(),
                actual: destinations.len(),
            });
        }
        Ok(destinations
            .iter()
            .copied()
            .zip(route.amounts.iter().copied())
            .collect())
    }

    /// Total amount routed to each destination account.
    pub fn route_map(&self) -> Result<HashMap<Pubkey, u64>, DecodeError> {
        let mut routed = HashMap::new();
        for (destination, amount) in self.payments()? {
            let entry = routed.entry(destination).or_insert(0u64);
            *entry = entry.saturating_add(amount);
        }
        Ok(routed)
    }
}
