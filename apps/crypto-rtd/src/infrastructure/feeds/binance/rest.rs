//! Binance REST client for one-shot snapshots.
//!
//! - `GET /api/v3/ticker/24hr?symbol=` for 24h statistics
//! - `GET /api/v3/historicalTrades` when an API key is configured,
//!   `GET /api/v3/trades` otherwise

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::messages::{ApiError, Ticker24hResponse, TradeResponse};
use crate::application::ports::{SnapshotClient, UpstreamError};
use crate::domain::streaming::{TickerRecord, TradeHistory};

/// Binance caps trade queries at this many rows.
pub const MAX_TRADE_LIMIT: u32 = 1000;

/// HTTP client for Binance market data endpoints.
#[derive(Clone)]
pub struct BinanceRestClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for BinanceRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceRestClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl BinanceRestClient {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        signed: bool,
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.get(&url).query(query);
        if signed && let Some(key) = &self.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), path, "Binance request failed");
            return Err(match serde_json::from_str::<ApiError>(&body) {
                Ok(err) => UpstreamError::Api {
                    code: err.code,
                    message: err.msg,
                },
                Err(_) => UpstreamError::Http {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SnapshotClient for BinanceRestClient {
    async fn ticker_24h(&self, symbol: &str) -> Result<TickerRecord, UpstreamError> {
        let response: Ticker24hResponse = self
            .get("/api/v3/ticker/24hr", &[("symbol", symbol.to_uppercase())], false)
            .await?;
        Ok(response.into())
    }

    async fn trade_history(&self, symbol: &str, limit: u32) -> Result<TradeHistory, UpstreamError> {
        let path = if self.api_key.is_some() {
            "/api/v3/historicalTrades"
        } else {
            "/api/v3/trades"
        };
        let query = [
            ("symbol", symbol.to_uppercase()),
            ("limit", limit.clamp(1, MAX_TRADE_LIMIT).to_string()),
        ];

        let trades: Vec<TradeResponse> = self.get(path, &query, true).await?;
        Ok(TradeHistory {
            symbol: symbol.to_uppercase(),
            trades: trades.into_iter().map(Into::into).collect(),
        })
    }
}
