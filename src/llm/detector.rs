//! Discovery of a running local inference server.
//!
//! Candidate endpoints come from the profile table. Every endpoint is probed
//! concurrently; within one endpoint every protocol is probed concurrently and
//! the most specific match wins, since a vLLM or LM Studio server also answers
//! the generic `/v1/models` probe.

use crate::error::{ClassifiedError, ErrorCategory};
use crate::llm::lmstudio_provider::LMStudioProvider;
use crate::llm::ollama_provider::OllamaProvider;
use crate::llm::openai_provider::OpenAICompatibleProvider;
use crate::llm::provider::LLMProvider;
use crate::llm::tgi_provider::TGIProvider;
use crate::llm::types::{ProviderConfig, ProviderEndpoint, ProviderKind};
use crate::llm::vllm_provider::VLLMProvider;
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A named default configuration for a known server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ProviderKind,
    pub host: &'static str,
    pub port: u16,
}

impl ProviderProfile {
    pub fn endpoint(&self) -> ProviderEndpoint {
        ProviderEndpoint::new(self.host, self.port)
    }
}

pub const DEFAULT_PROFILES: [ProviderProfile; 6] = [
    ProviderProfile {
        name: "ollama",
        label: "Ollama",
        kind: ProviderKind::Ollama,
        host: "localhost",
        port: 11434,
    },
    ProviderProfile {
        name: "lmstudio",
        label: "LM Studio",
        kind: ProviderKind::LmStudio,
        host: "localhost",
        port: 1234,
    },
    ProviderProfile {
        name: "vllm",
        label: "vLLM",
        kind: ProviderKind::Vllm,
        host: "localhost",
        port: 8000,
    },
    ProviderProfile {
        name: "tgi",
        label: "Hugging Face TGI",
        kind: ProviderKind::Tgi,
        host: "localhost",
        port: 8080,
    },
    ProviderProfile {
        name: "text-generation-webui",
        label: "text-generation-webui (OpenAI API)",
        kind: ProviderKind::OpenAiCompatible,
        host: "localhost",
        port: 5000,
    },
    ProviderProfile {
        name: "koboldcpp",
        label: "KoboldCpp",
        kind: ProviderKind::OpenAiCompatible,
        host: "localhost",
        port: 5001,
    },
];

pub fn find_profile(name: &str) -> Option<&'static ProviderProfile> {
    DEFAULT_PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Builds adapters for a protocol kind.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(
        kind: ProviderKind,
        endpoint: ProviderEndpoint,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn LLMProvider>, ClassifiedError> {
        let provider: Arc<dyn LLMProvider> = match kind {
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(endpoint, config)?),
            ProviderKind::LmStudio => Arc::new(LMStudioProvider::new(endpoint, config)?),
            ProviderKind::Vllm => Arc::new(VLLMProvider::new(endpoint, config)?),
            ProviderKind::Tgi => Arc::new(TGIProvider::new(endpoint, config)?),
            ProviderKind::OpenAiCompatible => {
                Arc::new(OpenAICompatibleProvider::new(endpoint, config)?)
            }
        };
        Ok(provider)
    }
}

/// A provider that answered its detection probe.
#[derive(Clone)]
pub struct DetectedProvider {
    pub kind: ProviderKind,
    pub endpoint: ProviderEndpoint,
    pub provider: Arc<dyn LLMProvider>,
}

impl fmt::Debug for DetectedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectedProvider")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

pub struct ProviderDetector {
    candidates: Vec<ProviderEndpoint>,
    config: ProviderConfig,
}

impl ProviderDetector {
    /// Detector over the default profile endpoints.
    pub fn new(config: ProviderConfig) -> Self {
        let endpoints = DEFAULT_PROFILES.iter().map(ProviderProfile::endpoint).collect();
        Self::with_candidates(endpoints, config)
    }

    /// Detector over an explicit candidate list, deduplicated by host and port
    /// while keeping the first occurrence's position.
    pub fn with_candidates(endpoints: Vec<ProviderEndpoint>, config: ProviderConfig) -> Self {
        let mut seen = HashSet::new();
        let candidates = endpoints
            .into_iter()
            .filter(|e| seen.insert((e.host.to_lowercase(), e.port)))
            .collect();
        Self { candidates, config }
    }

    pub fn candidates(&self) -> &[ProviderEndpoint] {
        &self.candidates
    }

    /// Profiles to suggest to the user when nothing was found.
    pub fn suggestions(&self) -> &'static [ProviderProfile] {
        &DEFAULT_PROFILES
    }

    /// Probes every candidate and returns the first endpoint that answers.
    ///
    /// Probes still in flight when a match is found are dropped.
    pub async fn detect(&self) -> Option<DetectedProvider> {
        let started = Instant::now();
        let mut probes: FuturesUnordered<_> = self
            .candidates
            .iter()
            .map(|endpoint| self.probe_endpoint(endpoint.clone()))
            .collect();

        while let Some(result) = probes.next().await {
            if let Some(detected) = result {
                info!(
                    "Detected {} at {} in {}ms",
                    detected.kind.label(),
                    detected.endpoint,
                    started.elapsed().as_millis()
                );
                return Some(detected);
            }
        }
        debug!(
            "No provider answered on {} candidate endpoints",
            self.candidates.len()
        );
        None
    }

    /// Every responsive candidate, in candidate order.
    pub async fn scan(&self) -> Vec<DetectedProvider> {
        let probes = self
            .candidates
            .iter()
            .map(|endpoint| self.probe_endpoint(endpoint.clone()));
        join_all(probes).await.into_iter().flatten().collect()
    }

    /// Validates an explicitly configured endpoint.
    ///
    /// With a kind hint only that protocol is probed; otherwise all of them
    /// are and the most specific match wins.
    pub async fn detect_at(
        &self,
        endpoint: ProviderEndpoint,
        kind: Option<ProviderKind>,
    ) -> Result<DetectedProvider, ClassifiedError> {
        match kind {
            Some(kind) => {
                let provider = ProviderFactory::create(kind, endpoint.clone(), &self.config)?;
                if provider.detect().await {
                    info!("Validated {} at {}", kind.label(), endpoint);
                    Ok(DetectedProvider {
                        kind,
                        endpoint,
                        provider,
                    })
                } else {
                    Err(ClassifiedError::new(
                        ErrorCategory::Configuration,
                        format!("no {} server answered at {}", kind.label(), endpoint),
                    )
                    .with_context("endpoint", endpoint.base_url())
                    .with_context("provider", kind.as_str()))
                }
            }
            None => self.probe_endpoint(endpoint.clone()).await.ok_or_else(|| {
                ClassifiedError::network(format!("no supported LLM server answered at {}", endpoint))
                    .with_context("endpoint", endpoint.base_url())
            }),
        }
    }

    async fn probe_endpoint(&self, endpoint: ProviderEndpoint) -> Option<DetectedProvider> {
        let adapters: Vec<Arc<dyn LLMProvider>> = ProviderKind::SPECIFICITY_ORDER
            .iter()
            .filter_map(|kind| {
                match ProviderFactory::create(*kind, endpoint.clone(), &self.config) {
                    Ok(provider) => Some(provider),
                    Err(e) => {
                        debug!("Cannot build {} adapter for {}: {}", kind, endpoint, e);
                        None
                    }
                }
            })
            .collect();

        let results = join_all(adapters.iter().map(|p| p.detect())).await;
        adapters
            .into_iter()
            .zip(results)
            .filter(|(_, found)| *found)
            .map(|(provider, _)| provider)
            .min_by_key(|p| p.kind().specificity_rank())
            .map(|provider| DetectedProvider {
                kind: provider.kind(),
                endpoint,
                provider,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_ports() {
        let ports: Vec<u16> = DEFAULT_PROFILES.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![11434, 1234, 8000, 8080, 5000, 5001]);
        assert_eq!(find_profile("LMStudio").map(|p| p.kind), Some(ProviderKind::LmStudio));
        assert!(find_profile("nope").is_none());
    }

    #[test]
    fn test_candidates_deduplicated() {
        let detector = ProviderDetector::with_candidates(
            vec![
                ProviderEndpoint::localhost(8000),
                ProviderEndpoint::localhost(1234),
                ProviderEndpoint::new("LOCALHOST", 8000),
            ],
            ProviderConfig::default(),
        );
        let ports: Vec<u16> = detector.candidates().iter().map(|e| e.port).collect();
        assert_eq!(ports, vec![8000, 1234]);
    }

    #[test]
    fn test_factory_builds_every_kind() {
        for kind in ProviderKind::SPECIFICITY_ORDER {
            let provider =
                ProviderFactory::create(kind, ProviderEndpoint::localhost(9), &ProviderConfig::default())
                    .unwrap();
            assert_eq!(provider.kind(), kind);
            assert_eq!(provider.endpoint().port, 9);
        }
    }
}
