use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::clob;

pub const DEFAULT_MARKET_SLUG: &str = "highest-temperature-in-nyc-on-december-15";

#[derive(Clone)]
pub struct Config {
    /// None → simulation only.
    pub private_key: Option<String>,
    pub rpc_url: String,
    pub database_url: String,
    pub gamma_base_url: String,
    pub clob_host: String,
    pub chain_id: u64,
    pub neg_risk: bool,
    pub market_slug: String,
    /// USDC per order.
    pub bet_size: Decimal,
    pub price_limit: Decimal,
    pub check_interval: Duration,
    pub state_file: Option<PathBuf>,
    pub dry_run: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("rpc_url", &self.rpc_url)
            .field("database_url", &"<redacted>")
            .field("gamma_base_url", &self.gamma_base_url)
            .field("clob_host", &self.clob_host)
            .field("chain_id", &self.chain_id)
            .field("neg_risk", &self.neg_risk)
            .field("market_slug", &self.market_slug)
            .field("bet_size", &self.bet_size)
            .field("price_limit", &self.price_limit)
            .field("check_interval", &self.check_interval)
            .field("state_file", &self.state_file)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value lookup (env in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").context("DATABASE_URL is required")?;

        let private_key = get("PRIVATE_KEY").filter(|k| clob::has_usable_key(Some(k)));

        let bet_size = parse_decimal(&get, "BET_SIZE", dec!(5))?;
        if bet_size <= Decimal::ZERO {
            anyhow::bail!("BET_SIZE must be positive, got {bet_size}");
        }
        let price_limit = parse_decimal(&get, "PRICE_LIMIT", dec!(0.99))?;
        if price_limit <= Decimal::ZERO || price_limit >= Decimal::ONE {
            anyhow::bail!("PRICE_LIMIT must be in (0, 1), got {price_limit}");
        }

        let check_interval_secs: u64 = get("CHECK_INTERVAL_SECS")
            .unwrap_or_else(|| "60".into())
            .parse()
            .context("Invalid CHECK_INTERVAL_SECS")?;
        if check_interval_secs == 0 {
            anyhow::bail!("CHECK_INTERVAL_SECS must be at least 1");
        }

        let chain_id: u64 = get("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|| "137".into())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;

        Ok(Self {
            private_key,
            rpc_url: get("RPC_URL").unwrap_or_else(|| "https://polygon-rpc.com".into()),
            database_url,
            gamma_base_url: get("GAMMA_API_URL")
                .unwrap_or_else(|| "https://gamma-api.polymarket.com".into()),
            clob_host: get("POLYMARKET_CLOB_HOST")
                .unwrap_or_else(|| "https://clob.polymarket.com".into()),
            chain_id,
            neg_risk: parse_bool(&get, "NEG_RISK", true)?,
            market_slug: get("MARKET_SLUG").unwrap_or_else(|| DEFAULT_MARKET_SLUG.into()),
            bet_size,
            price_limit,
            check_interval: Duration::from_secs(check_interval_secs),
            state_file: get("STATE_FILE").map(PathBuf::from),
            dry_run: parse_bool(&get, "DRY_RUN", false)?,
        })
    }

    /// Orders are simulated when forced or when no signing key is available.
    pub fn simulate(&self) -> bool {
        self.dry_run || self.private_key.is_none()
    }
}

fn parse_decimal<G>(get: &G, key: &str, default: Decimal) -> Result<Decimal>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(val) => val.trim().parse().with_context(|| format!("Invalid {key}")),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("Invalid {key}: expected true/false, got {v}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = load(&[("DATABASE_URL", "postgres://u:p@localhost/db")]).unwrap();
        assert_eq!(c.market_slug, DEFAULT_MARKET_SLUG);
        assert_eq!(c.bet_size, dec!(5));
        assert_eq!(c.price_limit, dec!(0.99));
        assert_eq!(c.check_interval, Duration::from_secs(60));
        assert_eq!(c.chain_id, 137);
        assert!(c.neg_risk);
        assert!(c.private_key.is_none());
        assert!(c.state_file.is_none());
        assert!(c.simulate());
    }

    #[test]
    fn database_url_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn placeholder_key_means_simulation() {
        let c = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("PRIVATE_KEY", "YOUR_PRIVATE_KEY_HERE"),
        ])
        .unwrap();
        assert!(c.private_key.is_none());
        assert!(c.simulate());
    }

    #[test]
    fn real_key_is_live_unless_dry_run() {
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let c = load(&[("DATABASE_URL", "postgres://x"), ("PRIVATE_KEY", key)]).unwrap();
        assert!(!c.simulate());
        let c = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("PRIVATE_KEY", key),
            ("DRY_RUN", "true"),
        ])
        .unwrap();
        assert!(c.simulate());
    }

    #[test]
    fn overrides() {
        let c = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("MARKET_SLUG", "highest-temperature-in-chicago-on-january-3"),
            ("BET_SIZE", "12.5"),
            ("PRICE_LIMIT", "0.6"),
            ("CHECK_INTERVAL_SECS", "15"),
            ("STATE_FILE", "/tmp/autobet.json"),
            ("NEG_RISK", "false"),
        ])
        .unwrap();
        assert_eq!(c.market_slug, "highest-temperature-in-chicago-on-january-3");
        assert_eq!(c.bet_size, dec!(12.5));
        assert_eq!(c.price_limit, dec!(0.6));
        assert_eq!(c.check_interval, Duration::from_secs(15));
        assert_eq!(c.state_file, Some(PathBuf::from("/tmp/autobet.json")));
        assert!(!c.neg_risk);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("BET_SIZE", "five")]).unwrap_err();
        assert!(err.to_string().contains("BET_SIZE"));
        let err = load(&[("DATABASE_URL", "postgres://x"), ("PRICE_LIMIT", "1.5")]).unwrap_err();
        assert!(err.to_string().contains("PRICE_LIMIT"));
        let err =
            load(&[("DATABASE_URL", "postgres://x"), ("CHECK_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("CHECK_INTERVAL_SECS"));
        let err = load(&[("DATABASE_URL", "postgres://x"), ("DRY_RUN", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("DRY_RUN"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = load(&[
            ("DATABASE_URL", "postgres://user:hunter2@db/x"),
            ("PRIVATE_KEY", "0xdeadbeef"),
        ])
        .unwrap();
        let s = format!("{c:?}");
        assert!(!s.contains("hunter2"));
        assert!(!s.contains("deadbeef"));
    }
}
