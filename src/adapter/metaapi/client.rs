//! MetaApi REST client.
//!
//! Wraps the provisioning, client and risk-management APIs. All requests
//! carry the `auth-token` header.

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::dto::{
    AccountDto, NewTrackerDto, TrackerDto, TrackerEventDto, TrackerIdDto, TradeRequest,
    TradeResponse,
};
use super::MetaApiSettings;
use crate::domain::{AccountId, AccountInformation, Deal, Order, Position, TrackerId};
use crate::error::{GatewayError, Result};

/// HTTP client for the MetaApi cloud.
#[derive(Clone)]
pub struct MetaApiClient {
    http: Client,
    token: String,
    provisioning: Url,
    trading: Url,
    risk: Url,
}

impl MetaApiClient {
    /// Build a client for the region configured in `settings`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client or a base URL cannot be built.
    pub fn new(settings: &MetaApiSettings) -> Result<Self> {
        let http = Client::builder().timeout(settings.request_timeout).build()?;
        let domain = &settings.domain;
        let region = &settings.region;
        Ok(Self {
            http,
            token: settings.token.clone(),
            provisioning: Url::parse(&format!("https://mt-provisioning-api-v1.{domain}/"))?,
            trading: Url::parse(&format!("https://mt-client-api-v1.{region}.{domain}/"))?,
            risk: Url::parse(&format!("https://risk-management-api-v1.{region}.{domain}/"))?,
        })
    }

    fn account_path(base: &Url, account: &AccountId, suffix: &str) -> Result<Url> {
        Ok(base.join(&format!("users/current/accounts/{account}{suffix}"))?)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("auth-token", &self.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, account: &AccountId) -> Result<T> {
        debug!(url = %url, "MetaApi GET");
        let response = self.authed(self.http.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::AccountNotFound {
                account_id: account.to_string(),
            }
            .into());
        }
        Ok(response.error_for_status()?.json().await?)
    }

    /// Provisioning record of an account.
    pub async fn account(&self, account: &AccountId) -> Result<AccountDto> {
        let url = Self::account_path(&self.provisioning, account, "")?;
        self.get_json(url, account).await
    }

    /// Request deployment of an account.
    pub async fn deploy(&self, account: &AccountId) -> Result<()> {
        let url = Self::account_path(&self.provisioning, account, "/deploy")?;
        self.authed(self.http.post(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn account_information(&self, account: &AccountId) -> Result<AccountInformation> {
        let url = Self::account_path(&self.trading, account, "/account-information")?;
        self.get_json(url, account).await
    }

    pub async fn positions(&self, account: &AccountId) -> Result<Vec<Position>> {
        let url = Self::account_path(&self.trading, account, "/positions")?;
        self.get_json(url, account).await
    }

    pub async fn orders(&self, account: &AccountId) -> Result<Vec<Order>> {
        let url = Self::account_path(&self.trading, account, "/orders")?;
        self.get_json(url, account).await
    }

    /// Deals between `from` and `to`, capped at `limit`.
    pub async fn history_deals(
        &self,
        account: &AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Deal>> {
        let mut url = Self::account_path(
            &self.trading,
            account,
            &format!(
                "/history-deals/time/{}/{}",
                from.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                to.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            ),
        )?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json(url, account).await
    }

    /// Submit a trade action.
    pub async fn trade(&self, account: &AccountId, request: &TradeRequest) -> Result<()> {
        let url = Self::account_path(&self.trading, account, "/trade")?;
        let response: TradeResponse = self
            .authed(self.http.post(url))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.is_success() {
            let action = match request {
                TradeRequest::ClosePosition { .. } => "POSITION_CLOSE_ID",
                TradeRequest::CancelOrder { .. } => "ORDER_CANCEL",
            };
            return Err(GatewayError::Rejected {
                action: action.to_string(),
                reason: response.message.unwrap_or(response.string_code),
            }
            .into());
        }
        Ok(())
    }

    pub async fn create_tracker(
        &self,
        account: &AccountId,
        tracker: &NewTrackerDto<'_>,
    ) -> Result<TrackerId> {
        let url = Self::account_path(&self.risk, account, "/trackers")?;
        let created: TrackerIdDto = self
            .authed(self.http.post(url))
            .json(tracker)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created.id)
    }

    /// Tracker details; the name routes events back to a participant.
    pub async fn tracker(&self, account: &AccountId, tracker: &TrackerId) -> Result<TrackerDto> {
        let url = Self::account_path(&self.risk, account, &format!("/trackers/{tracker}"))?;
        self.get_json(url, account).await
    }

    pub async fn delete_tracker(&self, account: &AccountId, tracker: &TrackerId) -> Result<()> {
        let url = Self::account_path(&self.risk, account, &format!("/trackers/{tracker}"))?;
        let response = self.authed(self.http.delete(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    /// Tracker events after `after`, long-polled.
    pub async fn tracker_events(&self, after: Option<u64>) -> Result<Vec<TrackerEventDto>> {
        let mut url = self.risk.join("users/current/tracker-events/stream")?;
        if let Some(after) = after {
            url.query_pairs_mut()
                .append_pair("previousSequenceNumber", &after.to_string());
        }
        let response = self.authed(self.http.get(url)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }
}
