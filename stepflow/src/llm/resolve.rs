//! Backend selection, resolved once per run.

use std::sync::Arc;

use crate::settings::{BackendMode, LlmSettings};

use super::{BackendKind, LlmBackend, OpenAiCompatible, PlaceholderLlm};

/// Picks the backend for one run.
///
/// Priority: `injected`, then online (API key set, mode `auto` or `online`), then local
/// (local url set, mode `auto` or `local`), then the placeholder. `offline` always yields
/// the placeholder unless a backend is injected.
pub fn resolve_backend(
    settings: &LlmSettings,
    injected: Option<Arc<dyn LlmBackend>>,
) -> Arc<dyn LlmBackend> {
    if let Some(backend) = injected {
        tracing::debug!(backend = %backend.info().name, "using injected llm backend");
        return backend;
    }
    let allow_online = matches!(settings.mode, BackendMode::Auto | BackendMode::Online);
    let allow_local = matches!(settings.mode, BackendMode::Auto | BackendMode::Local);

    if allow_online {
        if let Some(key) = &settings.api_key {
            match OpenAiCompatible::new(
                &settings.base_url,
                Some(key.clone()),
                settings.model.clone(),
                BackendKind::Online,
            ) {
                Ok(backend) => return Arc::new(backend),
                Err(e) => tracing::warn!(error = %e, "online llm backend unusable"),
            }
        } else if settings.mode == BackendMode::Online {
            tracing::warn!("llm mode is online but OPENAI_API_KEY is not set");
        }
    }
    if allow_local {
        if let Some(url) = &settings.local_url {
            match OpenAiCompatible::new(url, None, settings.local_model.clone(), BackendKind::Local)
            {
                Ok(backend) => return Arc::new(backend),
                Err(e) => tracing::warn!(error = %e, "local llm backend unusable"),
            }
        } else if settings.mode == BackendMode::Local {
            tracing::warn!("llm mode is local but STEPFLOW_LOCAL_LLM_URL is not set");
        }
    }
    Arc::new(PlaceholderLlm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    fn settings(mode: BackendMode, key: bool, local: bool) -> LlmSettings {
        LlmSettings {
            mode,
            api_key: key.then(|| "sk-test".to_string()),
            local_url: local.then(|| "http://localhost:11434/v1".to_string()),
            ..LlmSettings::default()
        }
    }

    #[test]
    fn injected_backend_wins() {
        let injected: Arc<dyn LlmBackend> = Arc::new(MockLlm::always("x"));
        let b = resolve_backend(&settings(BackendMode::Auto, true, true), Some(injected));
        assert_eq!(b.info().kind, BackendKind::Mock);
    }

    #[test]
    fn auto_prefers_online_then_local_then_placeholder() {
        let b = resolve_backend(&settings(BackendMode::Auto, true, true), None);
        assert_eq!(b.info().kind, BackendKind::Online);
        let b = resolve_backend(&settings(BackendMode::Auto, false, true), None);
        assert_eq!(b.info().kind, BackendKind::Local);
        let b = resolve_backend(&settings(BackendMode::Auto, false, false), None);
        assert_eq!(b.info().kind, BackendKind::Placeholder);
        assert!(!b.is_available());
    }

    #[test]
    fn explicit_modes_restrict_the_chain() {
        let b = resolve_backend(&settings(BackendMode::Local, true, true), None);
        assert_eq!(b.info().kind, BackendKind::Local);
        let b = resolve_backend(&settings(BackendMode::Offline, true, true), None);
        assert_eq!(b.info().kind, BackendKind::Placeholder);
        let b = resolve_backend(&settings(BackendMode::Online, false, true), None);
        assert_eq!(b.info().kind, BackendKind::Placeholder);
    }
}
