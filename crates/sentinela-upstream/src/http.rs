//! Production upstream client, backed by `reqwest`.
//!
//! Owns authentication: a cached bearer token refreshed transparently
//! when a call comes back 401.

use crate::client::{
    ClientRecord, Contract, HealthReport, TicketPatch, TicketPayload, TicketStatusSnapshot,
    TicketSummary, TicketSyncResult, UpstreamClient, UpstreamError,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use std::time::{Duration, Instant};

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct HttpUpstreamClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<CachedToken>>,
}

impl HttpUpstreamClient {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            token: RwLock::new(None),
        }
    }

    async fn token(&self) -> Result<String, UpstreamError> {
        if let Some(cached) = self.token.read().as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, UpstreamError> {
        let resp = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .json(&json!({ "username": self.username, "password": self.password, "grant_type": "password" }))
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !resp.status().is_success() {
            return Err(UpstreamError::from_status(
                resp.status().as_u16(),
                "authentication failed",
                None,
            ));
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::connection(e.to_string()))?;

        let token = body.access_token.clone();
        *self.token.write() = Some(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in.saturating_sub(30)),
        });
        Ok(token)
    }

    async fn authenticated(
        &self,
        build: impl Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, UpstreamError> {
        let token = self.token().await?;
        let resp = build(&self.http, &self.base_url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if resp.status().as_u16() == 401 {
            *self.token.write() = None;
            let token = self.token().await?;
            return build(&self.http, &self.base_url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| map_transport_error(&e));
        }
        Ok(resp)
    }
}

fn map_transport_error(e: &reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::timeout()
    } else {
        UpstreamError::connection(e.to_string())
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn error_from_response(resp: reqwest::Response) -> UpstreamError {
    let status = resp.status().as_u16();
    let retry = retry_after(&resp);
    let body = resp.text().await.unwrap_or_default();
    UpstreamError::from_status(status, body, retry)
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn verify_client_by_cpf(
        &self,
        cpf: &str,
        include_contracts: bool,
    ) -> Result<Option<ClientRecord>, UpstreamError> {
        let cpf = cpf.to_string();
        let resp = self
            .authenticated(|http, base| {
                http.get(format!("{}/clientes", base))
                    .query(&[("cpf_cnpj", cpf.as_str()), ("incluir_contratos", if include_contracts { "1" } else { "0" })])
            })
            .await?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let record: Option<ClientRecord> = resp
            .json()
            .await
            .map_err(|e| UpstreamError::connection(e.to_string()))?;
        Ok(record)
    }

    async fn create_ticket(&self, payload: &TicketPayload) -> Result<TicketSyncResult, UpstreamError> {
        let payload = payload.clone();
        let resp = self
            .authenticated(move |http, base| http.post(format!("{}/tickets", base)).json(&payload))
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        resp.json().await.map_err(|e| UpstreamError::connection(e.to_string()))
    }

    async fn update_ticket(&self, upstream_id: &str, patch: &TicketPatch) -> Result<(), UpstreamError> {
        let upstream_id = upstream_id.to_string();
        let patch = patch.clone();
        let resp = self
            .authenticated(move |http, base| {
                http.patch(format!("{}/tickets/{}", base, upstream_id)).json(&patch)
            })
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(())
    }

    async fn get_ticket_status(&self, upstream_id: &str) -> Result<TicketStatusSnapshot, UpstreamError> {
        let upstream_id = upstream_id.to_string();
        let resp = self
            .authenticated(move |http, base| http.get(format!("{}/tickets/{}", base, upstream_id)))
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        resp.json().await.map_err(|e| UpstreamError::connection(e.to_string()))
    }

    async fn search_tickets_by_cpf(
        &self,
        cpf: &str,
        limit: usize,
    ) -> Result<Vec<TicketSummary>, UpstreamError> {
        let cpf = cpf.to_string();
        let resp = self
            .authenticated(move |http, base| {
                http.get(format!("{}/tickets", base))
                    .query(&[("cpf_cnpj", cpf.as_str()), ("limit", &limit.to_string())])
            })
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        resp.json().await.map_err(|e| UpstreamError::connection(e.to_string()))
    }

    async fn get_client_contracts(&self, cpf: &str) -> Result<Vec<Contract>, UpstreamError> {
        let cpf = cpf.to_string();
        let resp = self
            .authenticated(move |http, base| {
                http.get(format!("{}/clientes/contratos", base)).query(&[("cpf_cnpj", cpf.as_str())])
            })
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        resp.json().await.map_err(|e| UpstreamError::connection(e.to_string()))
    }

    async fn check_health(&self) -> Result<HealthReport, UpstreamError> {
        let start = Instant::now();
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        Ok(HealthReport {
            healthy: resp.status().is_success(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
