//! EIP-712 signing (CLOB auth + orders) and HMAC L2 auth for Polymarket CLOB.

use anyhow::{Context, Result};
use base64::Engine;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{H160, H256, U256};
use ethers::utils::keccak256;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::Sha256;

const PROTOCOL_NAME: &str = "Polymarket CTF Exchange";
const PROTOCOL_VERSION: &str = "1";
const CLOB_AUTH_DOMAIN: &str = "ClobAuthDomain";
const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";

/// Polygon mainnet CTF Exchange (non-neg-risk).
pub const EXCHANGE_ADDRESS_POLYGON: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";
/// Neg-risk CTF Exchange (multi-outcome markets).
pub const NEG_RISK_EXCHANGE_POLYGON: &str = "0xC5d563A36AE78145C45a50134d48A1215220f80a";

/// USDC and CTF shares both use 6 decimals on-chain.
const TOKEN_DECIMALS: u32 = 6;
const SIZE_DECIMALS: u32 = 2;
const AMOUNT_DECIMALS: u32 = 4;

pub const SIDE_BUY: u8 = 0;
/// EOA signature type.
pub const SIGNATURE_TYPE_EOA: u8 = 0;

fn u256_to_32_bytes(u: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    u.to_big_endian(&mut buf);
    buf
}

fn address_to_32_bytes(addr: &H160) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..32].copy_from_slice(addr.as_bytes());
    buf
}

/// EIP-712 domain separator hash for Polymarket CTF Exchange.
fn exchange_domain_separator(verifying_contract: H160, chain_id: u64) -> [u8; 32] {
    let type_hash = keccak256(
        "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );
    let mut encoded = Vec::with_capacity(32 * 5);
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&keccak256(PROTOCOL_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(PROTOCOL_VERSION.as_bytes()));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(chain_id)));
    encoded.extend_from_slice(&address_to_32_bytes(&verifying_contract));
    keccak256(encoded)
}

/// Domain for L1 auth: no verifying contract.
fn clob_auth_domain_separator(chain_id: u64) -> [u8; 32] {
    let type_hash = keccak256("EIP712Domain(string name,string version,uint256 chainId)");
    let mut encoded = Vec::with_capacity(32 * 4);
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&keccak256(CLOB_AUTH_DOMAIN.as_bytes()));
    encoded.extend_from_slice(&keccak256(PROTOCOL_VERSION.as_bytes()));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(chain_id)));
    keccak256(encoded)
}

fn clob_auth_struct_hash(address: H160, timestamp: &str, nonce: u64) -> [u8; 32] {
    let type_hash =
        keccak256("ClobAuth(address address,string timestamp,uint256 nonce,string message)");
    let mut encoded = Vec::with_capacity(32 * 5);
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&address_to_32_bytes(&address));
    encoded.extend_from_slice(&keccak256(timestamp.as_bytes()));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(nonce)));
    encoded.extend_from_slice(&keccak256(CLOB_AUTH_MESSAGE.as_bytes()));
    keccak256(encoded)
}

/// Fields of the exchange `Order` struct, in type-hash order.
#[derive(Debug, Clone)]
pub struct OrderFields {
    pub salt: u64,
    pub maker: H160,
    pub signer: H160,
    pub taker: H160,
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    pub expiration: u64,
    pub nonce: u64,
    pub fee_rate_bps: u64,
    pub side: u8,
    pub signature_type: u8,
}

/// Order struct type hash (must match Polymarket exchange).
fn order_type_hash() -> [u8; 32] {
    keccak256(
        "Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
    )
}

fn order_struct_hash(o: &OrderFields) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(32 * 13);
    encoded.extend_from_slice(&order_type_hash());
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(o.salt)));
    encoded.extend_from_slice(&address_to_32_bytes(&o.maker));
    encoded.extend_from_slice(&address_to_32_bytes(&o.signer));
    encoded.extend_from_slice(&address_to_32_bytes(&o.taker));
    encoded.extend_from_slice(&u256_to_32_bytes(o.token_id));
    encoded.extend_from_slice(&u256_to_32_bytes(o.maker_amount));
    encoded.extend_from_slice(&u256_to_32_bytes(o.taker_amount));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(o.expiration)));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(o.nonce)));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(o.fee_rate_bps)));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(o.side)));
    encoded.extend_from_slice(&u256_to_32_bytes(U256::from(o.signature_type)));
    keccak256(encoded)
}

/// EIP-712 digest for signing: keccak256("\x19\x01" || domain_sep || struct_hash).
fn eip712_digest(domain_sep: [u8; 32], struct_hash: [u8; 32]) -> [u8; 32] {
    let mut prefixed = Vec::with_capacity(2 + 32 + 32);
    prefixed.extend_from_slice(b"\x19\x01");
    prefixed.extend_from_slice(&domain_sep);
    prefixed.extend_from_slice(&struct_hash);
    keccak256(prefixed)
}

fn sign_digest(wallet: &LocalWallet, digest: [u8; 32]) -> Result<String> {
    let sig = wallet
        .sign_hash(H256::from(digest))
        .context("wallet sign_hash")?;
    Ok(format!("0x{}", hex::encode(sig.to_vec())))
}

/// Parse token_id string (hex 0x... or decimal) to U256.
pub fn parse_token_id(token_id: &str) -> Result<U256> {
    let t = token_id.trim();
    if t.starts_with("0x") || t.starts_with("0X") {
        U256::from_str_radix(&t[2..], 16).context("token_id hex parse")
    } else {
        U256::from_dec_str(t).context("token_id decimal parse")
    }
}

/// Sign an order against the given exchange; returns 0x-prefixed hex signature.
pub fn sign_order(
    wallet: &LocalWallet,
    chain_id: u64,
    verifying_contract: H160,
    order: &OrderFields,
) -> Result<String> {
    let digest = eip712_digest(
        exchange_domain_separator(verifying_contract, chain_id),
        order_struct_hash(order),
    );
    sign_digest(wallet, digest)
}

/// POLY_SIGNATURE for L1 (API key derivation).
pub fn sign_clob_auth(
    wallet: &LocalWallet,
    chain_id: u64,
    timestamp: u64,
    nonce: u64,
) -> Result<String> {
    let digest = eip712_digest(
        clob_auth_domain_separator(chain_id),
        clob_auth_struct_hash(wallet.address(), &timestamp.to_string(), nonce),
    );
    sign_digest(wallet, digest)
}

/// Amounts for a BUY of `notional` USDC at `price`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyAmounts {
    /// Shares bought (2 decimals).
    pub shares: Decimal,
    /// USDC paid, 6-decimal fixed point.
    pub maker_amount: U256,
    /// Shares received, 6-decimal fixed point.
    pub taker_amount: U256,
}

/// shares = floor(notional / price, 2dp); maker = shares * price (4dp).
pub fn buy_amounts(notional: Decimal, price: Decimal) -> Result<BuyAmounts> {
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        anyhow::bail!("limit price {price} outside (0, 1)");
    }
    if notional <= Decimal::ZERO {
        anyhow::bail!("notional {notional} must be positive");
    }
    let shares = (notional / price).round_dp_with_strategy(SIZE_DECIMALS, RoundingStrategy::ToZero);
    if shares.is_zero() {
        anyhow::bail!("notional {notional} buys zero shares at {price}");
    }
    let cost = (shares * price).round_dp(AMOUNT_DECIMALS);
    Ok(BuyAmounts {
        shares,
        maker_amount: to_fixed_6(cost)?,
        taker_amount: to_fixed_6(shares)?,
    })
}

fn to_fixed_6(x: Decimal) -> Result<U256> {
    let scaled = (x * Decimal::from(10u64.pow(TOKEN_DECIMALS))).trunc();
    let raw = scaled
        .to_u128()
        .with_context(|| format!("amount {x} out of range"))?;
    Ok(U256::from(raw))
}

/// Build POLY_SIGNATURE for L2: HMAC-SHA256(secret, timestamp + method + path + body), base64url.
pub fn build_poly_hmac(
    secret_b64: &str,
    timestamp: u64,
    method: &str,
    request_path: &str,
    body: Option<&str>,
) -> Result<String> {
    let message = format!("{}{}{}{}", timestamp, method, request_path, body.unwrap_or(""));
    let secret_bytes = base64::engine::general_purpose::STANDARD
        .decode(
            secret_b64
                .replace('-', "+")
                .replace('_', "/")
                .trim()
                .as_bytes(),
        )
        .context("SECRET base64 decode")?;
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(&secret_bytes).context("HMAC key")?;
    mac.update(message.as_bytes());
    let sig_b64 = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    Ok(sig_b64.replace('+', "-").replace('/', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // Well-known test key (hardhat account #0); never funded on Polygon.
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> LocalWallet {
        TEST_KEY.parse().unwrap()
    }

    #[test]
    fn buy_amounts_at_99c() {
        let a = buy_amounts(dec!(5), dec!(0.99)).unwrap();
        assert_eq!(a.shares, dec!(5.05));
        // 5.05 * 0.99 = 4.9995
        assert_eq!(a.maker_amount, U256::from(4_999_500u64));
        assert_eq!(a.taker_amount, U256::from(5_050_000u64));
    }

    #[test]
    fn buy_amounts_rejects_bad_inputs() {
        assert!(buy_amounts(dec!(5), dec!(1)).is_err());
        assert!(buy_amounts(dec!(5), dec!(0)).is_err());
        assert!(buy_amounts(dec!(0), dec!(0.5)).is_err());
        assert!(buy_amounts(dec!(0.001), dec!(0.99)).is_err());
    }

    #[test]
    fn token_id_decimal_and_hex() {
        assert_eq!(parse_token_id("255").unwrap(), U256::from(255));
        assert_eq!(parse_token_id("0xff").unwrap(), U256::from(255));
        assert!(parse_token_id("abc").is_err());
    }

    #[test]
    fn hmac_is_deterministic_and_url_safe() {
        let secret = base64::engine::general_purpose::STANDARD.encode(b"super-secret-key");
        let a = build_poly_hmac(&secret, 1_700_000_000, "POST", "/order", Some("{}")).unwrap();
        let b = build_poly_hmac(&secret, 1_700_000_000, "POST", "/order", Some("{}")).unwrap();
        let c = build_poly_hmac(&secret, 1_700_000_001, "POST", "/order", Some("{}")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.contains('+') && !a.contains('/'));
    }

    #[test]
    fn signatures_are_65_bytes_and_domain_dependent() {
        let w = wallet();
        let order = OrderFields {
            salt: 1,
            maker: w.address(),
            signer: w.address(),
            taker: H160::zero(),
            token_id: U256::from(1234u64),
            maker_amount: U256::from(4_999_500u64),
            taker_amount: U256::from(5_050_000u64),
            expiration: 0,
            nonce: 0,
            fee_rate_bps: 0,
            side: SIDE_BUY,
            signature_type: SIGNATURE_TYPE_EOA,
        };
        let std_ex: H160 = EXCHANGE_ADDRESS_POLYGON.parse().unwrap();
        let neg_ex: H160 = NEG_RISK_EXCHANGE_POLYGON.parse().unwrap();
        let s1 = sign_order(&w, 137, std_ex, &order).unwrap();
        let s2 = sign_order(&w, 137, neg_ex, &order).unwrap();
        assert_eq!(s1.len(), 2 + 65 * 2);
        assert_ne!(s1, s2);

        let auth = sign_clob_auth(&w, 137, 1_700_000_000, 0).unwrap();
        assert_eq!(auth.len(), 2 + 65 * 2);
    }
}
