//! Process-wide store of Gemini thought signatures.
//!
//! Signatures outlive a single request: multi-turn conversations arrive as
//! distinct inbound calls, and thinking-capable models require prior
//! reasoning to be echoed back with its original signature.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::models::ModelFamily;

/// Upstream signatures are opaque blobs of at least this length; anything
/// shorter is a truncated echo and must not be replayed.
pub const MIN_SIGNATURE_LEN: usize = 100;

/// Two keyed maps: latest signature per model family, and signature per
/// tool-call id. Insertions are idempotent; both maps live for the process.
#[derive(Debug, Default)]
pub struct SignatureCache {
    by_family: RwLock<FxHashMap<ModelFamily, String>>,
    by_tool_call: RwLock<FxHashMap<String, String>>,
}

/// Whether a signature is long enough to be replayed upstream.
#[must_use]
pub fn is_valid_signature(signature: &str) -> bool {
    signature.len() >= MIN_SIGNATURE_LEN
}

impl SignatureCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest thinking signature for a model family.
    /// Short signatures are discarded.
    pub fn store_for_family(&self, family: ModelFamily, signature: &str) {
        if !is_valid_signature(signature) {
            return;
        }
        self.by_family.write().insert(family, signature.to_string());
    }

    /// Store the signature attached to a tool call.
    pub fn store_for_tool_call(&self, tool_call_id: &str, signature: &str) {
        if !is_valid_signature(signature) {
            return;
        }
        self.by_tool_call
            .write()
            .insert(tool_call_id.to_string(), signature.to_string());
    }

    #[must_use]
    pub fn for_family(&self, family: ModelFamily) -> Option<String> {
        self.by_family.read().get(&family).cloned()
    }

    #[must_use]
    pub fn for_tool_call(&self, tool_call_id: &str) -> Option<String> {
        self.by_tool_call.read().get(tool_call_id).cloned()
    }

    /// Drop every entry. Test hook.
    pub fn clear(&self) {
        self.by_family.write().clear();
        self.by_tool_call.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_sig(fill: char) -> String {
        std::iter::repeat(fill).take(MIN_SIGNATURE_LEN + 20).collect()
    }

    #[test]
    fn stores_and_returns_by_family() {
        let cache = SignatureCache::new();
        let sig = long_sig('a');
        cache.store_for_family(ModelFamily::Gemini, &sig);
        assert_eq!(cache.for_family(ModelFamily::Gemini).as_deref(), Some(sig.as_str()));
        assert!(cache.for_family(ModelFamily::Claude).is_none());
    }

    #[test]
    fn rejects_short_signatures() {
        let cache = SignatureCache::new();
        cache.store_for_family(ModelFamily::Gemini, "too-short");
        cache.store_for_tool_call("call_1", &"x".repeat(MIN_SIGNATURE_LEN - 1));
        assert!(cache.for_family(ModelFamily::Gemini).is_none());
        assert!(cache.for_tool_call("call_1").is_none());
    }

    #[test]
    fn exactly_100_chars_is_accepted() {
        let cache = SignatureCache::new();
        let sig = "x".repeat(MIN_SIGNATURE_LEN);
        cache.store_for_tool_call("call_2", &sig);
        assert_eq!(cache.for_tool_call("call_2").as_deref(), Some(sig.as_str()));
    }

    #[test]
    fn newer_family_signature_replaces_older() {
        let cache = SignatureCache::new();
        cache.store_for_family(ModelFamily::Claude, &long_sig('a'));
        cache.store_for_family(ModelFamily::Claude, &long_sig('b'));
        assert!(cache
            .for_family(ModelFamily::Claude)
            .unwrap()
            .starts_with('b'));
    }

    #[test]
    fn clear_empties_both_maps() {
        let cache = SignatureCache::new();
        cache.store_for_family(ModelFamily::Gemini, &long_sig('a'));
        cache.store_for_tool_call("call_3", &long_sig('c'));
        cache.clear();
        assert!(cache.for_family(ModelFamily::Gemini).is_none());
        assert!(cache.for_tool_call("call_3").is_none());
    }
}
