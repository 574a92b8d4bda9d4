use crate::programs::TrackedPrograms;
use dotenv::dotenv;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CLAIMABLE_TOKENS_PROGRAM_ID: &str = "Ewkv3JahEFRKkcJmpoKB7pXbnUHwjAyXiwEo4ZY2rezQ";
pub const DEFAULT_REWARD_MANAGER_PROGRAM_ID: &str = "DDZDcYdQFEMwcu2Mwo75yGFjJ1mUQyyXLWzhZLEVFcei";
pub const DEFAULT_REWARD_MANAGER_STATE: &str = "71hWFVYokLaN1PNYzTAWi13EfJ7Xt9VbSWUKsXUT8mxE";
pub const DEFAULT_PAYMENT_ROUTER_PROGRAM_ID: &str = "paytYpX3LPN98TAeen6bFFeraGSuWnomZmCXjAsoqPa";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid public key for {key}: {value}")]
    InvalidPubkey { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub solana_rpc_url: String,
    pub solana_commitment_level: String,
    pub rpc_timeout_secs: u64,
    pub rpc_rate_limit: Option<u32>,
    pub grpc_endpoint: String,
    pub grpc_token: Option<String>,
    pub grpc_max_reconnect_attempts: i64,
    pub worker_count: usize,
    pub retry_interval: Duration,
    pub mint_cache_ttl: Duration,
    pub mint_poll_interval: Duration,
    pub programs: TrackedPrograms,
    pub reward_manager_state: Pubkey,
    pub network_take_rate: f64,
    pub staking_bridge_usdc_token_account: Pubkey,
}

fn pubkey_var(key: &'static str, default: &str) -> Result<Pubkey, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    Pubkey::from_str(&value).map_err(|_| ConfigError::InvalidPubkey { key, value })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:indexer.db".to_string(),
            solana_rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            solana_commitment_level: "confirmed".to_string(),
            rpc_timeout_secs: 30,
            rpc_rate_limit: None,
            grpc_endpoint: "http://127.0.0.1:10000".to_string(),
            grpc_token: None,
            grpc_max_reconnect_attempts: 0,
            worker_count: num_cpus::get(),
            retry_interval: Duration::from_secs(300),
            mint_cache_ttl: Duration::from_secs(60),
            mint_poll_interval: Duration::from_millis(1000),
            programs: TrackedPrograms {
                claimable_tokens: pubkey!("Ewkv3JahEFRKkcJmpoKB7pXbnUHwjAyXiwEo4ZY2rezQ"),
                reward_manager: pubkey!("DDZDcYdQFEMwcu2Mwo75yGFjJ1mUQyyXLWzhZLEVFcei"),
                payment_router: pubkey!("paytYpX3LPN98TAeen6bFFeraGSuWnomZmCXjAsoqPa"),
            },
            reward_manager_state: pubkey!("71hWFVYokLaN1PNYzTAWi13EfJ7Xt9VbSWUKsXUT8mxE"),
            network_take_rate: 10.0,
            staking_bridge_usdc_token_account: Pubkey::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:indexer.db".to_string());
        let solana_rpc_url = env::var("SOLANA_RPC_URL")
            .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());
        let solana_commitment_level = env::var("SOLANA_COMMITMENT_LEVEL")
            .unwrap_or_else(|_| "confirmed".to_string());
        let rpc_timeout_secs = env::var("RPC_TIMEOUT_SECS")
            .map(|v| v.parse().unwrap_or(30))
            .unwrap_or(30);
        let rpc_rate_limit = env::var("RPC_RATE_LIMIT")
            .map(|v| v.parse().ok())
            .unwrap_or(None);
        let grpc_endpoint = env::var("GEYSER_GRPC_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:10000".to_string());
        let grpc_token = env::var("GEYSER_GRPC_TOKEN").ok().filter(|t| !t.is_empty());
        let grpc_max_reconnect_attempts = env::var("GEYSER_MAX_RECONNECT_ATTEMPTS")
            .map(|v| v.parse().unwrap_or(0))
            .unwrap_or(0);
        let worker_count = env::var("SOLANA_INDEXER_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or_else(num_cpus::get);
        let retry_interval = env::var("SOLANA_INDEXER_RETRY_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));
        let mint_cache_ttl = env::var("MINT_CACHE_TTL")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));
        let mint_poll_interval = env::var("MINT_NOTIFICATION_POLL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(1000));

        let programs = TrackedPrograms {
            claimable_tokens: pubkey_var("CLAIMABLE_TOKENS_PROGRAM_ID", DEFAULT_CLAIMABLE_TOKENS_PROGRAM_ID)?,
            reward_manager: pubkey_var("REWARD_MANAGER_PROGRAM_ID", DEFAULT_REWARD_MANAGER_PROGRAM_ID)?,
            payment_router: pubkey_var("PAYMENT_ROUTER_PROGRAM_ID", DEFAULT_PAYMENT_ROUTER_PROGRAM_ID)?,
        };
        let reward_manager_state = pubkey_var("REWARD_MANAGER_STATE", DEFAULT_REWARD_MANAGER_STATE)?;
        let network_take_rate = env::var("NETWORK_TAKE_RATE")
            .map(|v| v.parse().unwrap_or(10.0))
            .unwrap_or(10.0);

        let staking_bridge_usdc_token_account = match env::var("STAKING_BRIDGE_USDC_TOKEN_ACCOUNT") {
            Ok(value) => Pubkey::from_str(&value).map_err(|_| ConfigError::InvalidPubkey {
                key: "STAKING_BRIDGE_USDC_TOKEN_ACCOUNT",
                value,
            })?,
            Err(_) => {
                warn!("STAKING_BRIDGE_USDC_TOKEN_ACCOUNT not set, purchases will not validate");
                Pubkey::default()
            }
        };

        Ok(Self {
            database_url,
            solana_rpc_url,
            solana_commitment_level,
            rpc_timeout_secs,
            rpc_rate_limit,
            grpc_endpoint,
            grpc_token,
            grpc_max_reconnect_attempts,
            worker_count,
            retry_interval,
            mint_cache_ttl,
            mint_poll_interval,
            programs,
            reward_manager_state,
            network_take_rate,
            staking_bridge_usdc_token_account,
        })
    }
}
