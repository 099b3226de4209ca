pub mod cooldown;
pub mod signature_cache;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthClient;
use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::fallback::FallbackController;
use crate::upstream::GeminiClient;

use self::cooldown::CooldownTracker;
use self::signature_cache::SignatureCache;

/// Process-wide shared state handed to every request handler.
pub struct AppState {
    pub config: AppConfig,
    pub gemini: GeminiClient,
    pub signatures: Arc<SignatureCache>,
    pub fallback: FallbackController,
}

impl AppState {
    /// Wire up the full state from configuration and an auth capability.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Transport` when the upstream HTTP client cannot
    /// be built.
    pub fn new(config: AppConfig, auth: Arc<dyn AuthClient>) -> Result<Self, ProxyError> {
        let signatures = Arc::new(SignatureCache::new());
        let gemini = GeminiClient::new(
            auth,
            Arc::clone(&signatures),
            Duration::from_secs(config.server.timeout),
        )?;
        Ok(Self::from_parts(config, gemini, signatures))
    }

    /// Assemble state around an existing client (tests point the client at a
    /// mock endpoint).
    #[must_use]
    pub fn from_parts(
        config: AppConfig,
        gemini: GeminiClient,
        signatures: Arc<SignatureCache>,
    ) -> Self {
        let cooldowns = Arc::new(CooldownTracker::new());
        let fallback = FallbackController::new(
            config.fallback_models.clone(),
            cooldowns,
            config.features.auto_switch_models,
        );
        Self {
            config,
            gemini,
            signatures,
            fallback,
        }
    }
}
