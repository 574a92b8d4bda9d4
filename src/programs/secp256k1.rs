//! Native secp256k1 signature verification instruction

use super::DecodeError;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

pub const SECP256K1_PROGRAM_ID: Pubkey = pubkey!("KeccakSecp256k11111111111111111111111111111");
pub const SIGNATURE_OFFSETS_SERIALIZED_SIZE: usize = 11;
pub const ETH_ADDRESS_SIZE: usize = 20;
pub const SIGNATURE_SIZE: usize = 65;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureOffsets {
    pub signature_offset: u16,
    pub signature_instruction_index: u8,
    pub eth_address_offset: u16,
    pub eth_address_instruction_index: u8,
    pub message_data_offset: u16,
    pub message_data_size: u16,
    pub message_instruction_index: u8,
}

impl SignatureOffsets {
    fn read(bytes: &[u8]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Self {
            signature_offset: u16_at(0),
            signature_instruction_index: bytes[2],
            eth_address_offset: u16_at(3),
            eth_address_instruction_index: bytes[5],
            message_data_offset: u16_at(6),
            message_data_size: u16_at(8),
            message_instruction_index: bytes[10],
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.signature_offset.to_le_bytes());
        buf.push(self.signature_instruction_index);
        buf.extend_from_slice(&self.eth_address_offset.to_le_bytes());
        buf.push(self.eth_address_instruction_index);
        buf.extend_from_slice(&self.message_data_offset.to_le_bytes());
        buf.extend_from_slice(&self.message_data_size.to_le_bytes());
        buf.push(self.message_instruction_index);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecpSignature {
    pub offsets: SignatureOffsets,
    pub eth_address: [u8; ETH_ADDRESS_SIZE],
    pub signature: Vec<u8>,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secp256k1Instruction {
    pub signatures: Vec<SecpSignature>,
}

fn slice(data: &[u8], offset: u16, len: usize, what: &str) -> Result<Vec<u8>, DecodeError> {
    let start = offset as usize;
    data.get(start..start + len)
        .map(|bytes| bytes.to_vec())
        .ok_or_else(|| {
            DecodeError::Secp256k1(format!(
                "{} at {}..{} exceeds {} bytes",
                what,
                start,
                start + len,
                data.len()
            ))
        })
}

pub fn decode(data: &[u8]) -> Result<Secp256k1Instruction, DecodeError> {
    let (&count, _) = data.split_first().ok_or(DecodeError::Empty)?;
    let offsets_end = 1 + count as usize * SIGNATURE_OFFSETS_SERIALIZED_SIZE;
    if data.len() < offsets_end {
        return Err(DecodeError::Secp256k1(format!(
            "{} offsets need {} bytes, got {}",
            count,
            offsets_end,
            data.len()
        )));
    }

    let mut signatures = Vec::with_capacity(count as usize);
    for chunk in data[1..offsets_end].chunks_exact(SIGNATURE_OFFSETS_SERIALIZED_SIZE) {
        let offsets = SignatureOffsets::read(chunk);

        let eth = slice(data, offsets.eth_address_offset, ETH_ADDRESS_SIZE, "eth address")?;
        let mut eth_address = [0u8; ETH_ADDRESS_SIZE];
        eth_address.copy_from_slice(&eth);

        signatures.push(SecpSignature {
            offsets,
            eth_address,
            signature: slice(data, offsets.signature_offset, SIGNATURE_SIZE, "signature")?,
            message: slice(
                data,
                offsets.message_data_offset,
                offsets.message_data_size as usize,
                "message",
            )?,
        });
    }

    Ok(Secp256k1Instruction { signatures })
}

/// Builds a single-signature instruction body: offsets, then eth address,
/// signature and message laid out back to back.
pub fn encode_single(
    eth_address: &[u8; ETH_ADDRESS_SIZE],
    signature: &[u8; SIGNATURE_SIZE],
    message: &[u8],
    instruction_index: u8,
) -> Vec<u8> {
    let data_start = (1 + SIGNATURE_OFFSETS_SERIALIZED_SIZE) as u16;
    let eth_address_offset = data_start;
    let signature_offset = eth_address_offset + ETH_ADDRESS_SIZE as u16;
    let message_data_offset = signature_offset + SIGNATURE_SIZE as u16;
    let offsets = SignatureOffsets {
        signature_offset,
        signature_instruction_index: instruction_index,
        eth_address_offset,
        eth_address_instruction_index: instruction_index,
        message_data_offset,
        message_data_size: message.len() as u16,
        message_instruction_index: instruction_index,
    };

    let mut buf = vec![1u8];
    offsets.write(&mut buf);
    buf.extend_from_slice(eth_address);
    buf.extend_from_slice(signature);
    buf.extend_from_slice(message);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_signature() {
        let eth = [0x0au8; 20];
        let signature = [0x33u8; 65];
        let message = vec![9u8; 48];
        let data = encode_single(&eth, &signature, &message, 1);

        let decoded = decode(&data).unwrap();
        assert_eq!(decoded.signatures.len(), 1);
        let sig = &decoded.signatures[0];
        assert_eq!(sig.offsets.eth_address_offset, 12);
        assert_eq!(sig.offsets.signature_offset, 32);
        assert_eq!(sig.offsets.message_data_offset, 97);
        assert_eq!(sig.eth_address, eth);
        assert_eq!(sig.signature, signature.to_vec());
        assert_eq!(sig.message, message);
    }

    #[test]
    fn rejects_truncated_body() {
        let data = encode_single(&[1u8; 20], &[2u8; 65], &[3u8; 48], 0);
        assert!(matches!(
            decode(&data[..data.len() - 1]),
            Err(DecodeError::Secp256k1(_))
        ));
        assert!(matches!(decode(&[2, 0, 0]), Err(DecodeError::Secp256k1(_))));
        assert!(matches!(decode(&[]), Err(DecodeError::Empty)));
    }
}
