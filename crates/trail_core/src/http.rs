//! HTTP Progress Service - REST client for the learning backend
//!
//! Endpoints (relative to `remote.base_url`):
//! - `POST /gamification/award-xp`     body `{amount, eventKey}`
//! - `GET  /lessons/user/all-progress` list of `{lesson_id, completed}`
//! - `POST /lessons/{id}/complete`
//!
//! 401 maps to `RemoteError::Unauthorized`, any other non-2xx status to
//! `RemoteError::Rejected`, connection failures to `RemoteError::Transport`.

use crate::config::RemoteSettings;
use crate::error::RemoteError;
use crate::ledger::XpTotals;
use crate::lesson::LessonId;
use crate::remote::{AwardRequest, AwardResponse, LessonProgress, ProgressService};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("trail-progress/", env!("CARGO_PKG_VERSION"));

/// User totals as returned by the award endpoint
#[derive(Debug, Deserialize)]
struct UserTotals {
    xp: u64,
    #[serde(default)]
    level: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwardBody {
    #[serde(default = "default_true", alias = "success")]
    accepted: bool,
    #[serde(default)]
    already_awarded: bool,
    #[serde(default)]
    user: Option<UserTotals>,
}

fn default_true() -> bool {
    true
}

/// Progress list, bare or wrapped in `{ "data": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProgressBody {
    Bare(Vec<LessonProgress>),
    Wrapped { data: Vec<LessonProgress> },
}

impl ProgressBody {
    fn into_vec(self) -> Vec<LessonProgress> {
        match self {
            ProgressBody::Bare(items) | ProgressBody::Wrapped { data: items } => items,
        }
    }
}

pub struct HttpProgressService {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpProgressService {
    pub fn new(settings: &RemoteSettings) -> Result<Self> {
        let timeout = settings.effective_request_timeout();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_error(&self, err: reqwest::Error) -> RemoteError {
        match RemoteError::from(err) {
            RemoteError::Timeout(_) => RemoteError::Timeout(self.timeout),
            other => other,
        }
    }

    /// Turn a non-2xx response into an error, reading the body for context
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Unauthorized);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl ProgressService for HttpProgressService {
    async fn award(&self, request: &AwardRequest, token: &str) -> Result<AwardResponse, RemoteError> {
        debug!("POST award-xp key={} amount={}", request.event_key, request.amount);
        let response = self
            .http
            .post(self.url("/gamification/award-xp"))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let response = self.check(response).await?;

        let body: AwardBody = response.json().await.map_err(|e| self.map_error(e))?;
        let totals = body.user.map(|user| XpTotals {
            xp: user.xp,
            level: user
                .level
                .unwrap_or_else(|| XpTotals::from_xp(user.xp).level),
        });

        Ok(AwardResponse {
            accepted: body.accepted,
            already_awarded: body.already_awarded,
            totals,
        })
    }

    async fn all_progress(&self, token: &str) -> Result<Vec<LessonProgress>, RemoteError> {
        let response = self
            .http
            .get(self.url("/lessons/user/all-progress"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let response = self.check(response).await?;

        let body: ProgressBody = response.json().await.map_err(|e| self.map_error(e))?;
        Ok(body.into_vec())
    }

    async fn complete_lesson(&self, lesson_id: LessonId, token: &str) -> Result<(), RemoteError> {
        let response = self
            .http
            .post(self.url(&format!("/lessons/{}/complete", lesson_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.check(response).await?;
        Ok(())
    }
}
