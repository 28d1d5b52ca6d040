//! Order execution on the CLOB. Dry-run logs only; live signs EIP-712 orders
//! and posts them with HMAC L2 auth.

use crate::signing::{self, OrderFields};
use anyhow::{Context, Result};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::H160;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Placeholder value shipped in .env templates; treated as "no key".
pub const PLACEHOLDER_PRIVATE_KEY: &str = "YOUR_PRIVATE_KEY_HERE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
        }
    }
}

/// A limit order for one instrument. Only BUY is ever sent.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub instrument_id: String,
    /// USDC to spend.
    pub notional: Decimal,
    pub limit_price: Decimal,
    pub side: OrderSide,
    /// Human label for logs.
    pub label: String,
}

/// Result of placing an order.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: Option<String>,
    pub success: bool,
    pub error_msg: Option<String>,
}

/// Capability the reconciler uses to act. `Err` and `success == false` are both failures.
#[async_trait::async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderReceipt>;

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Dry-run: log order and return success with a fake order ID.
pub struct DryRunClob;

#[async_trait::async_trait]
impl OrderExecutor for DryRunClob {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderReceipt> {
        info!(
            "[DryRun] would {} YES on \"{}\" ${} @ {} token_id={}",
            order.side.as_str(),
            order.label,
            order.notional,
            order.limit_price,
            short_id(&order.instrument_id)
        );
        Ok(OrderReceipt {
            order_id: Some(format!("dry-run-{}", uuid::Uuid::new_v4())),
            success: true,
            error_msg: None,
        })
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// L2 API credentials derived from the wallet.
#[derive(Debug, Clone, Deserialize)]
struct ApiCreds {
    #[serde(rename = "apiKey")]
    api_key: String,
    secret: String,
    passphrase: String,
}

#[derive(Debug, Deserialize)]
struct PostOrderResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
    #[serde(rename = "orderID", default)]
    order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

pub struct LiveClob {
    clob_host: String,
    wallet: LocalWallet,
    chain_id: u64,
    exchange: H160,
    client: reqwest::Client,
    creds: Mutex<Option<ApiCreds>>,
}

impl LiveClob {
    pub fn new(clob_host: &str, private_key: &str, chain_id: u64, neg_risk: bool) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .context("PRIVATE_KEY is not a valid secp256k1 key")?
            .with_chain_id(chain_id);
        let exchange = if neg_risk {
            signing::NEG_RISK_EXCHANGE_POLYGON
        } else {
            signing::EXCHANGE_ADDRESS_POLYGON
        }
        .parse::<H160>()
        .context("exchange address")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        info!(address = %ethers::utils::to_checksum(&wallet.address(), None), chain_id, neg_risk, "live CLOB wallet loaded");
        Ok(Self {
            clob_host: clob_host.trim_end_matches('/').to_string(),
            wallet,
            chain_id,
            exchange,
            client,
            creds: Mutex::new(None),
        })
    }

    /// Ask the RPC which chain it serves; a mismatch would make every signature invalid.
    pub async fn verify_chain(&self, rpc_url: &str) -> Result<()> {
        let provider = Provider::<Http>::try_from(rpc_url).context("invalid RPC_URL")?;
        let remote = provider.get_chainid().await.context("eth_chainId")?;
        if remote.as_u64() != self.chain_id {
            anyhow::bail!(
                "RPC {} serves chain {} but orders are signed for chain {}",
                rpc_url,
                remote,
                self.chain_id
            );
        }
        debug!(chain_id = self.chain_id, "RPC chain id verified");
        Ok(())
    }

    fn address(&self) -> String {
        ethers::utils::to_checksum(&self.wallet.address(), None)
    }

    fn l1_headers(&self) -> Result<Vec<(&'static str, String)>> {
        let ts = now_unix();
        let nonce = 0u64;
        let sig = signing::sign_clob_auth(&self.wallet, self.chain_id, ts, nonce)?;
        Ok(vec![
            ("POLY_ADDRESS", self.address()),
            ("POLY_SIGNATURE", sig),
            ("POLY_TIMESTAMP", ts.to_string()),
            ("POLY_NONCE", nonce.to_string()),
        ])
    }

    /// Derive existing API key; create one if the wallet never had one.
    async fn derive_creds(&self) -> Result<ApiCreds> {
        info!("authenticating (deriving CLOB API key)");
        let derive_url = format!("{}/auth/derive-api-key", self.clob_host);
        let mut req = self.client.get(&derive_url);
        for (k, v) in self.l1_headers()? {
            req = req.header(k, v);
        }
        let res = req.send().await.context("derive-api-key request")?;
        if res.status().is_success() {
            return res.json().await.context("derive-api-key JSON");
        }
        warn!(status = %res.status(), "derive-api-key failed, creating API key");

        let create_url = format!("{}/auth/api-key", self.clob_host);
        let mut req = self.client.post(&create_url);
        for (k, v) in self.l1_headers()? {
            req = req.header(k, v);
        }
        let res = req.send().await.context("create api-key request")?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!(
                "CLOB auth {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            );
        }
        res.json().await.context("create api-key JSON")
    }

    async fn creds(&self) -> Result<ApiCreds> {
        let mut guard = self.creds.lock().await;
        if let Some(c) = guard.as_ref() {
            return Ok(c.clone());
        }
        let c = self.derive_creds().await?;
        *guard = Some(c.clone());
        Ok(c)
    }

    fn build_order_body(&self, order: &OrderRequest, owner: &str) -> Result<serde_json::Value> {
        let token_id = signing::parse_token_id(&order.instrument_id)?;
        let amounts = signing::buy_amounts(order.notional, order.limit_price.round_dp(2))?;
        let fields = OrderFields {
            salt: salt(),
            maker: self.wallet.address(),
            signer: self.wallet.address(),
            taker: H160::zero(),
            token_id,
            maker_amount: amounts.maker_amount,
            taker_amount: amounts.taker_amount,
            expiration: 0,
            nonce: 0,
            fee_rate_bps: 0,
            side: signing::SIDE_BUY,
            signature_type: signing::SIGNATURE_TYPE_EOA,
        };
        let signature = signing::sign_order(&self.wallet, self.chain_id, self.exchange, &fields)?;
        debug!(shares = %amounts.shares, "order built");
        Ok(serde_json::json!({
            "order": {
                "salt": fields.salt,
                "maker": self.address(),
                "signer": self.address(),
                "taker": ethers::utils::to_checksum(&fields.taker, None),
                "tokenId": fields.token_id.to_string(),
                "makerAmount": fields.maker_amount.to_string(),
                "takerAmount": fields.taker_amount.to_string(),
                "expiration": fields.expiration.to_string(),
                "nonce": fields.nonce.to_string(),
                "feeRateBps": fields.fee_rate_bps.to_string(),
                "side": order.side.as_str(),
                "signatureType": fields.signature_type,
                "signature": signature,
            },
            "owner": owner,
            "orderType": "GTC",
        }))
    }
}

#[async_trait::async_trait]
impl OrderExecutor for LiveClob {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderReceipt> {
        let creds = self.creds().await?;
        let body = self.build_order_body(order, &creds.api_key)?.to_string();
        let ts = now_unix();
        let path = "/order";
        let sig = signing::build_poly_hmac(&creds.secret, ts, "POST", path, Some(&body))?;

        info!(
            "placing order: BUY YES on \"{}\" ${} @ {}",
            order.label, order.notional, order.limit_price
        );
        let res = self
            .client
            .post(format!("{}{}", self.clob_host, path))
            .header("Content-Type", "application/json")
            .header("POLY_ADDRESS", self.address())
            .header("POLY_SIGNATURE", sig)
            .header("POLY_TIMESTAMP", ts.to_string())
            .header("POLY_API_KEY", &creds.api_key)
            .header("POLY_PASSPHRASE", &creds.passphrase)
            .body(body)
            .send()
            .await
            .context("POST /order")?;

        let status = res.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Stale key: re-derive on the next attempt.
            *self.creds.lock().await = None;
        }
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Ok(OrderReceipt {
                order_id: None,
                success: false,
                error_msg: Some(format!(
                    "CLOB {}: {}",
                    status,
                    text.chars().take(200).collect::<String>()
                )),
            });
        }
        let parsed: PostOrderResponse =
            serde_json::from_str(&text).context("POST /order response JSON")?;
        debug!(status = ?parsed.status, "order response");
        Ok(OrderReceipt {
            order_id: parsed.order_id.filter(|s| !s.is_empty()),
            success: parsed.success,
            error_msg: parsed.error_msg.filter(|s| !s.is_empty()),
        })
    }
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Random salt that stays exact as a JSON number (< 2^53).
fn salt() -> u64 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf) & ((1u64 << 53) - 1)
}

/// Token ids are long decimal strings; logs only need the head.
fn short_id(id: &str) -> String {
    id.chars().take(18).collect()
}

/// False if the key is unset, empty, or the template placeholder.
pub fn has_usable_key(private_key: Option<&str>) -> bool {
    private_key
        .map(str::trim)
        .map(|k| !k.is_empty() && k != PLACEHOLDER_PRIVATE_KEY)
        .unwrap_or(false)
}
