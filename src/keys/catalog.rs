//! Static metadata for every key slot the panel knows.
//!
//! The set of identifiers is fixed at build time. Provider tags are
//! derived from identifiers, and each tag maps to the URL the validator
//! probes to prove a key works.

// ── Key Spec ────────────────────────────────────────────────────────

/// Static description of one API key slot.
#[derive(Debug, Clone)]
pub struct KeySpec {
    /// Stable identifier, also the environment variable name.
    pub identifier: &'static str,
    /// Human-readable provider name
    pub display_name: &'static str,
}

// ── Static Catalog ──────────────────────────────────────────────────

/// All known key slots, in display order.
pub static KNOWN_KEYS: &[KeySpec] = &[
    KeySpec { identifier: "OPENAI_API_KEY", display_name: "OpenAI" },
    KeySpec { identifier: "ANTHROPIC_API_KEY", display_name: "Anthropic" },
    KeySpec { identifier: "GROQ_API_KEY", display_name: "Groq" },
    KeySpec { identifier: "DEEPSEEK_API_KEY", display_name: "DeepSeek" },
    KeySpec { identifier: "GOOGLE_API_KEY", display_name: "Google AI" },
    KeySpec { identifier: "FINANCIAL_DATASETS_API_KEY", display_name: "Financial Datasets" },
];

/// Provider tag → probe URL.
static PROBE_ENDPOINTS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1/models"),
    ("anthropic", "https://api.anthropic.com/v1/messages"),
    ("groq", "https://api.groq.com/openai/v1/models"),
    ("deepseek", "https://api.deepseek.com/v1/models"),
    ("google", "https://generativelanguage.googleapis.com/v1beta/models"),
    ("financial", "https://api.financialdatasets.ai/company/facts/?ticker=AAPL"),
];

// ── Catalog API ─────────────────────────────────────────────────────

/// Identifiers of every known slot, in display order.
pub fn known_identifiers() -> Vec<String> {
    KNOWN_KEYS.iter().map(|k| k.identifier.to_string()).collect()
}

/// Look up a slot by identifier.
pub fn get_key(identifier: &str) -> Option<&'static KeySpec> {
    KNOWN_KEYS.iter().find(|k| k.identifier == identifier)
}

/// Derive the provider tag: the part before the first `_`, lower-cased.
///
/// An identifier without a separator is its own tag.
pub fn provider_tag(identifier: &str) -> String {
    identifier
        .split('_')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Probe URL for a provider tag, or `""` when the provider is unknown.
pub fn probe_endpoint(tag: &str) -> &'static str {
    PROBE_ENDPOINTS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, url)| *url)
        .unwrap_or("")
}
