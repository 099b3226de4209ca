//! Model name resolution: aliases, suffix stripping, and canonical ids.

/// Default model when the client omits one or asks for a non-Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Canonical Gemini model ids the upstream accepts as-is.
pub const KNOWN_MODELS: [&str; 6] = [
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite-preview",
    "gemini-3-pro-preview",
    "gemini-3-flash-preview",
    "gemini-3-flash-lite-preview",
];

/// Alias table mapping convenience names to canonical ids.
const MODEL_ALIASES: [(&str, &str); 5] = [
    ("gemini-3-pro-high", "gemini-3-pro-preview"),
    ("gemini-3-pro", "gemini-3-pro-preview"),
    ("gemini-3", "gemini-3-flash-preview"),
    ("gemini-3-flash", "gemini-3-flash-preview"),
    ("gemini-2.5-flash-lite", "gemini-2.5-flash-lite-preview"),
];

/// Which signature-cache family a requested model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Gemini,
    Claude,
}

impl ModelFamily {
    /// Membership is a substring test on the *requested* model name, so a
    /// Claude-speaking client keeps its own signature slot even though the
    /// request is served by Gemini.
    #[must_use]
    pub fn of(requested_model: &str) -> Self {
        if requested_model.contains("claude") {
            ModelFamily::Claude
        } else {
            ModelFamily::Gemini
        }
    }
}

/// Split a trailing `[<digits>m]` budget suffix off a model name.
///
/// Returns the bare name and the parsed digits, if any.
#[must_use]
pub fn split_budget_suffix(name: &str) -> (&str, Option<u64>) {
    let trimmed = name.trim_end();
    let Some(without_bracket) = trimmed.strip_suffix("m]") else {
        return (name, None);
    };
    let Some(open) = without_bracket.rfind('[') else {
        return (name, None);
    };
    let digits = &without_bracket[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (name, None);
    }
    let value = digits.parse::<u64>().ok();
    (&trimmed[..open], value)
}

/// Resolve a user-supplied model name to a canonical Gemini model id.
///
/// Unknown non-Gemini names (for example Claude aliases sent by Anthropic
/// clients) resolve to [`DEFAULT_MODEL`].
#[must_use]
pub fn resolve(name: Option<&str>) -> String {
    let Some(name) = name else {
        return DEFAULT_MODEL.to_string();
    };
    let (bare, _budget) = split_budget_suffix(name.trim());
    if bare.is_empty() {
        return DEFAULT_MODEL.to_string();
    }

    for (alias, canonical) in MODEL_ALIASES {
        if bare == alias {
            return canonical.to_string();
        }
    }
    if KNOWN_MODELS.contains(&bare) {
        return bare.to_string();
    }
    if bare.starts_with("gemini-") {
        return bare.to_string();
    }
    DEFAULT_MODEL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_model_resolves_to_default() {
        assert_eq!(resolve(None), DEFAULT_MODEL);
        assert_eq!(resolve(Some("")), DEFAULT_MODEL);
    }

    #[test]
    fn aliases_resolve_to_canonical_ids() {
        assert_eq!(resolve(Some("gemini-3-pro-high")), "gemini-3-pro-preview");
        assert_eq!(resolve(Some("gemini-3")), "gemini-3-flash-preview");
        assert_eq!(
            resolve(Some("gemini-2.5-flash-lite")),
            "gemini-2.5-flash-lite-preview"
        );
    }

    #[test]
    fn known_and_prefixed_ids_pass_through() {
        assert_eq!(resolve(Some("gemini-2.5-flash")), "gemini-2.5-flash");
        assert_eq!(resolve(Some("gemini-9.9-ultra")), "gemini-9.9-ultra");
    }

    #[test]
    fn claude_aliases_fall_back_to_default() {
        assert_eq!(resolve(Some("claude-3-5-sonnet-20241022")), DEFAULT_MODEL);
        assert_eq!(resolve(Some("gpt-4o")), DEFAULT_MODEL);
    }

    #[test]
    fn budget_suffix_is_stripped_and_parsed() {
        assert_eq!(split_budget_suffix("gemini-2.5-pro[8m]"), ("gemini-2.5-pro", Some(8)));
        assert_eq!(split_budget_suffix("claude-opus[1m]"), ("claude-opus", Some(1)));
        assert_eq!(split_budget_suffix("gemini-2.5-pro"), ("gemini-2.5-pro", None));
        assert_eq!(split_budget_suffix("weird[m]"), ("weird[m]", None));
        assert_eq!(resolve(Some("gemini-2.5-flash[2m]")), "gemini-2.5-flash");
    }

    #[test]
    fn model_family_is_a_substring_test() {
        assert_eq!(ModelFamily::of("claude-3-5-sonnet-20241022"), ModelFamily::Claude);
        assert_eq!(ModelFamily::of("gemini-2.5-pro"), ModelFamily::Gemini);
        assert_eq!(ModelFamily::of("anthropic/claude-x"), ModelFamily::Claude);
    }
}
