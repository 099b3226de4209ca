//! Lazy project-id discovery against the Code Assist onboarding endpoints.
//!
//! Order: explicit hint (environment / config) -> `:loadCodeAssist` ->
//! `:onboardUser` polled until the long-running operation completes.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProxyError;
use crate::models::DEFAULT_MODEL;
use crate::protocol::gemini::{
    ClientMetadata, LoadCodeAssistRequest, LoadCodeAssistResponse, OnboardOperation,
    OnboardUserRequest,
};

use super::GeminiClient;

const ONBOARD_POLL_ATTEMPTS: u32 = 30;
const ONBOARD_POLL_INTERVAL: Duration = Duration::from_secs(1);
const FREE_TIER: &str = "free-tier";

impl GeminiClient {
    /// The project id for this client, discovering and caching it on first
    /// use.
    ///
    /// # Errors
    ///
    /// Propagates auth/transport failures; times out fatally when
    /// onboarding never completes.
    pub async fn project(&self) -> Result<String, ProxyError> {
        let mut guard = self.project.lock().await;
        if let Some(project) = guard.as_ref() {
            return Ok(project.clone());
        }
        let discovered = self.discover_project().await?;
        tracing::info!(project = %discovered, "discovered Code Assist project");
        *guard = Some(discovered.clone());
        Ok(discovered)
    }

    async fn discover_project(&self) -> Result<String, ProxyError> {
        if let Some(hint) = self.auth.project_hint() {
            return Ok(hint);
        }

        let load: LoadCodeAssistResponse = self
            .post_internal(
                "loadCodeAssist",
                &LoadCodeAssistRequest {
                    cloudaicompanion_project: None,
                    metadata: ClientMetadata::default(),
                },
            )
            .await?;
        if let Some(project) = load.cloudaicompanion_project {
            return Ok(project);
        }

        let tier_id = load
            .allowed_tiers
            .unwrap_or_default()
            .into_iter()
            .find(|tier| tier.is_default)
            .map_or_else(|| FREE_TIER.to_string(), |tier| tier.id);

        for _ in 0..ONBOARD_POLL_ATTEMPTS {
            let operation: OnboardOperation = self
                .post_internal(
                    "onboardUser",
                    &OnboardUserRequest {
                        tier_id: tier_id.clone(),
                        cloudaicompanion_project: None,
                        metadata: ClientMetadata::default(),
                    },
                )
                .await?;
            if operation.done {
                if let Some(project) = operation
                    .response
                    .and_then(|response| response.cloudaicompanion_project)
                    .map(|project| project.id)
                    .filter(|id| !id.is_empty())
                {
                    return Ok(project);
                }
                return Err(ProxyError::Internal(
                    "onboarding finished without a project id".to_string(),
                ));
            }
            tokio::time::sleep(ONBOARD_POLL_INTERVAL).await;
        }

        Err(ProxyError::Internal(
            "project discovery timed out waiting for onboarding".to_string(),
        ))
    }

    async fn post_internal<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, ProxyError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(self.method_url(method))
            .headers(self.base_headers(&token, DEFAULT_MODEL))
            .json(body)
            .send()
            .await
            .map_err(|err| ProxyError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                message: format!(":{method} failed: {body}"),
            });
        }
        response
            .json()
            .await
            .map_err(|err| ProxyError::Upstream {
                status: status.as_u16(),
                message: format!(":{method} returned malformed JSON: {err}"),
            })
    }
}
