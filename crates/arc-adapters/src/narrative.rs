//! Narrative LLM adapter contract (spec §4.C, §4.E.5). Optional: the dossier
//! worker falls back to a deterministic structured write-up when this
//! fails or is unconfigured.

use async_trait::async_trait;

/// Fallible text-generation capability. `generate` returning `Err` (or this
/// adapter being absent) must never abort the dossier worker — it falls
/// back to the structured, non-LLM dossier (spec §4.E.5).
#[async_trait]
pub trait NarrativeLlm: Send + Sync {
    /// Generate narrative text from `prompt`, bounded by `max_tokens`.
    async fn generate(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String, String>;
}

/// Default [`NarrativeLlm`] that always fails, forcing the structured
/// fallback path (spec §6: "a deterministic fallback is specified").
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNarrativeLlm;

#[async_trait]
impl NarrativeLlm for NullNarrativeLlm {
    async fn generate(&self, _prompt: &str, _model: &str, _max_tokens: u32) -> Result<String, String> {
        Err("no narrative LLM configured".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_narrative_llm_always_fails() {
        let result = NullNarrativeLlm.generate("write a memo", "none", 500).await;
        assert!(result.is_err());
    }
}
