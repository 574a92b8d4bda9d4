pub mod balance;
pub mod checkpoint;
pub mod claimable;
pub mod connection;
pub mod migration;
pub mod mint;
pub mod payment;
pub mod pricing;
pub mod reward;
pub mod unprocessed;

pub const INIT_SCHEMA: &str = r#"
-- Coverage per subscription configuration
CREATE TABLE IF NOT EXISTS sol_slot_checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_slot INTEGER NOT NULL,
    to_slot INTEGER NOT NULL,
    subscription TEXT NOT NULL,
    subscription_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_sol_slot_checkpoints_hash ON sol_slot_checkpoints(subscription_hash, to_slot);

CREATE TABLE IF NOT EXISTS sol_token_account_balance_changes (
    signature TEXT NOT NULL,
    account TEXT NOT NULL,
    owner TEXT,
    mint TEXT NOT NULL,
    change INTEGER NOT NULL,
    balance INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    block_timestamp INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (signature, account)
);
CREATE INDEX IF NOT EXISTS idx_balance_changes_slot ON sol_token_account_balance_changes(slot);
CREATE INDEX IF NOT EXISTS idx_balance_changes_account ON sol_token_account_balance_changes(account, mint, slot);
CREATE INDEX IF NOT EXISTS idx_balance_changes_mint ON sol_token_account_balance_changes(mint);
CREATE INDEX IF NOT EXISTS idx_balance_changes_owner ON sol_token_account_balance_changes(mint, owner);

CREATE TABLE IF NOT EXISTS sol_claimable_accounts (
    signature TEXT NOT NULL,
    instruction_index INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    mint TEXT NOT NULL,
    ethereum_address TEXT NOT NULL,
    account TEXT NOT NULL,
    PRIMARY KEY (signature, instruction_index)
);
CREATE INDEX IF NOT EXISTS idx_claimable_accounts_account ON sol_claimable_accounts(account, mint);
CREATE INDEX IF NOT EXISTS idx_claimable_accounts_eth ON sol_claimable_accounts(mint, ethereum_address);

CREATE TABLE IF NOT EXISTS sol_claimable_account_transfers (
    signature TEXT NOT NULL,
    instruction_index INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    from_account TEXT NOT NULL,
    to_account TEXT NOT NULL,
    sender_eth_address TEXT NOT NULL,
    PRIMARY KEY (signature, instruction_index)
);

CREATE TABLE IF NOT EXISTS sol_payments (
    signature TEXT NOT NULL,
    instruction_index INTEGER NOT NULL,
    route_index INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    to_account TEXT NOT NULL,
    PRIMARY KEY (signature, instruction_index, route_index)
);

CREATE TABLE IF NOT EXISTS sol_purchases (
    signature TEXT NOT NULL,
    instruction_index INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    from_account TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content_id INTEGER NOT NULL,
    buyer_user_id INTEGER NOT NULL,
    access_type TEXT NOT NULL,
    valid_after_blocknumber INTEGER NOT NULL,
    is_valid BOOLEAN,
    city TEXT,
    region TEXT,
    country TEXT,
    PRIMARY KEY (signature, instruction_index)
);

CREATE TABLE IF NOT EXISTS sol_reward_disbursements (
    signature TEXT NOT NULL,
    instruction_index INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    user_bank TEXT NOT NULL,
    challenge_id TEXT NOT NULL,
    specifier TEXT NOT NULL,
    PRIMARY KEY (signature, instruction_index)
);

CREATE TABLE IF NOT EXISTS sol_user_balances (
    identity TEXT NOT NULL,
    mint TEXT NOT NULL,
    balance INTEGER NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (identity, mint)
);

CREATE TABLE IF NOT EXISTS sol_unprocessed_txs (
    signature TEXT PRIMARY KEY,
    slot INTEGER NOT NULL DEFAULT 0,
    error_message TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

-- Tracked mints and their change notifications
CREATE TABLE IF NOT EXISTS artist_coins (
    mint TEXT PRIMARY KEY,
    ticker TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS artist_coins_notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TRIGGER IF NOT EXISTS artist_coins_notify_insert AFTER INSERT ON artist_coins
BEGIN
    INSERT INTO artist_coins_notifications (payload)
    VALUES (json_object('operation', 'INSERT', 'new_mint', NEW.mint, 'old_mint', NULL));
END;

CREATE TRIGGER IF NOT EXISTS artist_coins_notify_update AFTER UPDATE ON artist_coins
BEGIN
    INSERT INTO artist_coins_notifications (payload)
    VALUES (json_object('operation', 'UPDATE', 'new_mint', NEW.mint, 'old_mint', OLD.mint));
END;

CREATE TRIGGER IF NOT EXISTS artist_coins_notify_delete AFTER DELETE ON artist_coins
BEGIN
    INSERT INTO artist_coins_notifications (payload)
    VALUES (json_object('operation', 'DELETE', 'new_mint', NULL, 'old_mint', OLD.mint));
END;

-- Reference data written by the content indexer, read for purchase validation
CREATE TABLE IF NOT EXISTS blocks (
    number INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    wallet TEXT
);

CREATE TABLE IF NOT EXISTS usdc_user_bank_accounts (
    ethereum_address TEXT PRIMARY KEY,
    bank_account TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_payout_wallet_history (
    user_id INTEGER NOT NULL,
    spl_usdc_payout_wallet TEXT,
    block_timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS track_price_history (
    track_id INTEGER NOT NULL,
    access TEXT NOT NULL,
    total_price_cents INTEGER NOT NULL,
    splits TEXT NOT NULL,
    blocknumber INTEGER NOT NULL,
    block_timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS album_price_history (
    album_id INTEGER NOT NULL,
    access TEXT NOT NULL,
    total_price_cents INTEGER NOT NULL,
    splits TEXT NOT NULL,
    blocknumber INTEGER NOT NULL,
    block_timestamp INTEGER NOT NULL
);
"#;
