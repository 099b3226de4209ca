//! Rate-limit fallback controller with per-model cooldown.

use std::future::Future;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::ProxyError;
use crate::state::cooldown::CooldownTracker;

/// Result of a controlled call: the value plus which model actually served
/// it and, when a switch happened, a human-readable notification. The
/// notification is carried for outer layers; the SSE re-emitters do not
/// surface it.
#[derive(Debug)]
pub struct FallbackOutcome<T> {
    pub value: T,
    pub served_model: String,
    pub auto_switch_notification: Option<String>,
}

/// Redirects rate-limited calls to a fallback model per a static table.
pub struct FallbackController {
    table: FxHashMap<String, String>,
    cooldowns: Arc<CooldownTracker>,
    enabled: bool,
}

impl FallbackController {
    #[must_use]
    pub fn new(
        table: impl IntoIterator<Item = (String, String)>,
        cooldowns: Arc<CooldownTracker>,
        enabled: bool,
    ) -> Self {
        Self {
            table: table.into_iter().collect(),
            cooldowns,
            enabled,
        }
    }

    #[must_use]
    pub fn fallback_for(&self, model: &str) -> Option<&str> {
        self.table.get(model).map(String::as_str)
    }

    #[must_use]
    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    /// Walk the fallback chain, skipping models still in cooldown. Returns
    /// the first available model, or the original when the whole chain is
    /// cooling.
    #[must_use]
    pub fn best_available(&self, model: &str) -> String {
        if !self.enabled || !self.cooldowns.is_cooling(model) {
            return model.to_string();
        }
        let mut seen = vec![model.to_string()];
        let mut current = model;
        while let Some(next) = self.fallback_for(current) {
            if seen.iter().any(|m| m == next) {
                break;
            }
            if !self.cooldowns.is_cooling(next) {
                return next.to_string();
            }
            seen.push(next.to_string());
            current = next;
        }
        model.to_string()
    }

    /// Run a non-streaming upstream call under fallback control.
    ///
    /// # Errors
    ///
    /// Rethrows the original error when auto-switching is disabled, the
    /// model has no fallback, it is already cooling, or the retry fails too.
    pub async fn wrap_nonstreaming<T, F, Fut>(
        &self,
        model: &str,
        doit: F,
    ) -> Result<FallbackOutcome<T>, ProxyError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProxyError>>,
    {
        self.wrap(model, doit).await
    }

    /// Run a streaming upstream call under fallback control. Each attempt
    /// calls `doit` afresh, so the retry gets a brand-new stream with reset
    /// first-chunk state.
    ///
    /// # Errors
    ///
    /// Same policy as [`Self::wrap_nonstreaming`].
    pub async fn wrap_streaming<T, F, Fut>(
        &self,
        model: &str,
        doit: F,
    ) -> Result<FallbackOutcome<T>, ProxyError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProxyError>>,
    {
        self.wrap(model, doit).await
    }

    async fn wrap<T, F, Fut>(&self, model: &str, doit: F) -> Result<FallbackOutcome<T>, ProxyError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProxyError>>,
    {
        match doit(model.to_string()).await {
            Ok(value) => Ok(FallbackOutcome {
                value,
                served_model: model.to_string(),
                auto_switch_notification: None,
            }),
            Err(err) if err.is_rate_limit() && self.enabled => {
                if self.cooldowns.is_cooling(model) {
                    return Err(err);
                }
                let ProxyError::RateLimit { status, .. } = &err else {
                    unreachable!("is_rate_limit checked above");
                };
                self.cooldowns.record(model, *status);

                let Some(fallback) = self.fallback_for(model) else {
                    return Err(err);
                };
                tracing::warn!(
                    from = model,
                    to = fallback,
                    "rate limited, switching to fallback model"
                );
                let value = doit(fallback.to_string()).await?;
                Ok(FallbackOutcome {
                    value,
                    served_model: fallback.to_string(),
                    auto_switch_notification: Some(format!(
                        "Auto-switched from {model} to {fallback} after a rate limit"
                    )),
                })
            }
            Err(err) => Err(err),
        }
    }
}
