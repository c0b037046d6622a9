//! Advisory Poller
//!
//! ANALYST workers periodically read the chain's reference price and ask an
//! external generative-language service for a BUY/SELL/HOLD call. The answer
//! is broadcast as a `MARKET_PULSE`; nothing here checks that it is sensible.
//!
//! Created: 2026-10-19

use crate::config::AdvisorySettings;
use crate::rpc::{reads, ChainRpc, RpcError};
use crate::types::{ChainDescriptor, MarketPulse};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a professional cross-chain crypto analyst. Respond ONLY in JSON.";

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("price reference unavailable: {0}")]
    Price(#[from] RpcError),
    #[error("advisory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("advisory response had no text candidate")]
    EmptyResponse,
    #[error("advisory payload is not a market pulse: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("no advisory API key configured")]
    MissingKey,
}

/// Anything that can turn a price into a market pulse.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn assess(&self, price: f64) -> Result<MarketPulse, AdvisoryError>;
}

// ── Generative-language HTTP client ──────────────────────────────────

pub struct GeminiAdvisor {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl GeminiAdvisor {
    pub fn new(api_key: Option<&str>, settings: &AdvisorySettings) -> Result<Self, AdvisoryError> {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .ok_or(AdvisoryError::MissingKey)?
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            client,
            url: format!(
                "{}/{}:generateContent",
                settings.endpoint.trim_end_matches('/'),
                settings.model
            ),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn user_query(price: f64) -> String {
    format!(
        "ETH Price: ${:.2}. Suggest if cross-chain strikes should be aggressive (BUY) or defensive (SELL).",
        price
    )
}

/// Pull the first candidate's text out of a generateContent reply and parse
/// it as a pulse.
fn parse_generate_response(body: &str) -> Result<MarketPulse, AdvisoryError> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(AdvisoryError::EmptyResponse)?;

    Ok(serde_json::from_str(text.trim())?)
}

#[async_trait]
impl AdvisoryService for GeminiAdvisor {
    async fn assess(&self, price: f64) -> Result<MarketPulse, AdvisoryError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": user_query(price) }] }],
            "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "generationConfig": { "responseMimeType": "application/json" },
        });

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        parse_generate_response(&text)
    }
}

// ── Poller ───────────────────────────────────────────────────────────

/// One poll cycle: reference price → advisory → pulse.
pub async fn poll_once(
    chain: &ChainDescriptor,
    rpc: &dyn ChainRpc,
    advisor: &dyn AdvisoryService,
) -> Result<MarketPulse, AdvisoryError> {
    let price = reads::price_reference(rpc, chain.price_feed).await?;
    debug!("{} reference price {:.2}", chain, price);
    advisor.assess(price).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{CallRequest, FeeData, PendingTransfer};
    use crate::types::{Advice, SubmissionMode};
    use alloy::primitives::{Address, Bytes, TxHash, I256, U256};
    use alloy::sol_types::SolValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_generate_response() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "parts": [{ "text": "{\"advice\":\"BUY\",\"confidence\":0.82,\"margin_multiplier\":1.1}" }],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        }"#;
        let pulse = parse_generate_response(body).unwrap();
        assert_eq!(pulse.advice, Advice::Buy);
        assert_eq!(pulse.confidence, 0.82);
        assert_eq!(pulse.margin_multiplier, 1.1);
    }

    #[test]
    fn test_parse_rejects_missing_candidate() {
        assert!(matches!(
            parse_generate_response(r#"{"candidates":[]}"#),
            Err(AdvisoryError::EmptyResponse)
        ));
        assert!(matches!(
            parse_generate_response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
            Err(AdvisoryError::EmptyResponse)
        ));
    }

    #[test]
    fn test_parse_rejects_non_json_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"I think you should buy."}]}}]}"#;
        assert!(matches!(parse_generate_response(body), Err(AdvisoryError::Payload(_))));
    }

    #[test]
    fn test_missing_key_rejected() {
        let settings = AdvisorySettings::default();
        assert!(matches!(GeminiAdvisor::new(None, &settings), Err(AdvisoryError::MissingKey)));
        assert!(matches!(GeminiAdvisor::new(Some(""), &settings), Err(AdvisoryError::MissingKey)));

        let advisor = GeminiAdvisor::new(Some("k"), &settings).unwrap();
        assert!(advisor.url.ends_with("/gemini-2.5-flash-preview-09-2025:generateContent"));
    }

    struct PriceRpc {
        answer: Option<u64>,
    }

    #[async_trait]
    impl ChainRpc for PriceRpc {
        fn label(&self) -> &str {
            "price"
        }

        async fn call(&self, _request: &CallRequest) -> Result<Bytes, RpcError> {
            let answer = self.answer.ok_or_else(|| RpcError::Transport("down".into()))?;
            let encoded = (
                U256::from(1u64),
                I256::from_raw(U256::from(answer)),
                U256::ZERO,
                U256::ZERO,
                U256::from(1u64),
            )
                .abi_encode_params();
            Ok(Bytes::from(encoded))
        }

        async fn fee_data(&self) -> Result<FeeData, RpcError> {
            Ok(FeeData::default())
        }

        async fn transaction_count(&self, _address: Address) -> Result<u64, RpcError> {
            Ok(0)
        }

        async fn block_number(&self) -> Result<u64, RpcError> {
            Ok(0)
        }

        async fn transaction(&self, _hash: TxHash) -> Result<Option<PendingTransfer>, RpcError> {
            Ok(None)
        }
    }

    /// Echoes SELL when the price is above 3000, BUY otherwise
    struct ThresholdAdvisor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AdvisoryService for ThresholdAdvisor {
        async fn assess(&self, price: f64) -> Result<MarketPulse, AdvisoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let advice = if price > 3000.0 { Advice::Sell } else { Advice::Buy };
            Ok(MarketPulse {
                advice,
                confidence: 0.9,
                margin_multiplier: 1.0,
            })
        }
    }

    fn chain() -> ChainDescriptor {
        ChainDescriptor {
            chain_id: 1,
            name: "ETH_MAINNET".into(),
            rpc_urls: vec![],
            ws_url: None,
            price_feed: Address::repeat_byte(0xfe),
            gas_oracle: None,
            weth: Address::ZERO,
            submission_mode: SubmissionMode::PrivateRelay,
            relay_url: None,
        }
    }

    #[tokio::test]
    async fn test_poll_once_feeds_scaled_price() {
        let rpc = PriceRpc { answer: Some(350_000_000_000) };
        let advisor = ThresholdAdvisor { calls: AtomicUsize::new(0) };

        let pulse = poll_once(&chain(), &rpc, &advisor).await.unwrap();
        assert_eq!(pulse.advice, Advice::Sell);
    }

    #[tokio::test]
    async fn test_poll_once_skips_advisor_when_price_fails() {
        let rpc = PriceRpc { answer: None };
        let advisor = ThresholdAdvisor { calls: AtomicUsize::new(0) };

        let err = poll_once(&chain(), &rpc, &advisor).await.unwrap_err();
        assert!(matches!(err, AdvisoryError::Price(_)));
        assert_eq!(advisor.calls.load(Ordering::SeqCst), 0);
    }
}
