//! Purchase and location memos attached to payment router routes

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

pub const MEMO_PROGRAM_ID: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");
pub const MEMO_V1_PROGRAM_ID: Pubkey = pubkey!("Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo");

pub fn is_memo_program(program_id: &Pubkey) -> bool {
    *program_id == MEMO_PROGRAM_ID || *program_id == MEMO_V1_PROGRAM_ID
}

/// `contentType:contentId:validAfterBlocknumber:buyerUserId[:accessType]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseMemo {
    pub content_type: String,
    pub content_id: i64,
    pub valid_after_blocknumber: i64,
    pub buyer_user_id: i64,
    pub access_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationMemo {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
}

pub fn parse_purchase_memo(memo: &str) -> Option<PurchaseMemo> {
    let parts: Vec<&str> = memo.split(':').collect();
    if parts.len() <= 3 {
        return None;
    }
    Some(PurchaseMemo {
        content_type: parts[0].to_string(),
        content_id: parts[1].parse().ok()?,
        valid_after_blocknumber: parts[2].parse().ok()?,
        buyer_user_id: parts[3].parse().ok()?,
        access_type: parts.get(4).unwrap_or(&"stream").to_string(),
    })
}

pub fn parse_location_memo(memo: &str) -> Result<LocationMemo, String> {
    if !memo.starts_with("geo") || memo.len() <= 3 {
        return Err("not a location memo".to_string());
    }
    let body = memo.get(4..).unwrap_or_default();
    serde_json::from_str(body).map_err(|e| e.to_string())
}

/// First memo, in instruction order, that parses as a purchase.
pub fn find_purchase_memo<'a>(memos: impl IntoIterator<Item = &'a str>) -> Option<PurchaseMemo> {
    memos.into_iter().find_map(|memo| {
        let parsed = parse_purchase_memo(memo);
        if parsed.is_none() {
            warn!("Skipping memo that is not a purchase: {}", memo);
        }
        parsed
    })
}

/// First memo, in instruction order, that parses as a location. Defaults to an empty location.
pub fn find_location_memo<'a>(memos: impl IntoIterator<Item = &'a str>) -> LocationMemo {
    memos
        .into_iter()
        .find_map(|memo| parse_location_memo(memo).ok())
        .unwrap_or_default()
}
