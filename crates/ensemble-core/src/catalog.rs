//! Model catalog: known local models, use-case lookup, and availability
//!
//! The catalog is static metadata. `ModelManager` checks it against what the
//! backend actually has and pulls missing models on request.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::BackendResult;
use crate::transport::{LocalModel, OllamaClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Balanced models for everyday use
    General,
    Specialized,
    /// Small enough for routing and pre-processing
    Lightweight,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::General => "general",
            Self::Specialized => "specialized",
            Self::Lightweight => "lightweight",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub key: &'static str,
    pub display_name: &'static str,
    pub size_gb: f32,
    pub vram_gb: f32,
    pub tier: ModelTier,
    pub description: &'static str,
    pub strengths: &'static [&'static str],
    pub use_cases: &'static [&'static str],
    /// Name the backend knows the model by, tag included
    pub ollama_name: &'static str,
}

impl ModelInfo {
    /// `ollama_name` without its `:tag`
    pub fn base_name(&self) -> &'static str {
        strip_tag(self.ollama_name)
    }
}

const DEFAULT_MODEL_KEY: &str = "llama3.2";

static CATALOG: [ModelInfo; 8] = [
    ModelInfo {
        key: "llama3.2",
        display_name: "Llama 3.2 8B",
        size_gb: 4.7,
        vram_gb: 5.5,
        tier: ModelTier::General,
        description: "Strong balance of quality and speed, multilingual",
        strengths: &["Solid reasoning", "Multilingual", "General use"],
        use_cases: &["General agent", "Chatbot", "Text analysis"],
        ollama_name: "llama3.2",
    },
    ModelInfo {
        key: "mistral",
        display_name: "Mistral 7B",
        size_gb: 4.1,
        vram_gb: 4.5,
        tier: ModelTier::General,
        description: "Fast and efficient",
        strengths: &["Speed", "Efficiency", "Instruction following"],
        use_cases: &["Fast processing", "Batch processing", "Classification"],
        ollama_name: "mistral",
    },
    ModelInfo {
        key: "deepseek-r1",
        display_name: "DeepSeek-R1 8B",
        size_gb: 4.9,
        vram_gb: 5.5,
        tier: ModelTier::General,
        description: "Advanced logical reasoning",
        strengths: &["Chain-of-thought", "Reasoning", "Logic"],
        use_cases: &["Complex analysis", "Problem solving", "Research"],
        ollama_name: "deepseek-r1:8b",
    },
    ModelInfo {
        key: "phi4",
        display_name: "Phi-4 14B",
        size_gb: 8.0,
        vram_gb: 9.0,
        tier: ModelTier::Specialized,
        description: "Intensive logical reasoning",
        strengths: &["Legal analysis", "Structured logic", "Research"],
        use_cases: &["Document analysis", "Deep research"],
        ollama_name: "phi4",
    },
    ModelInfo {
        key: "qwen2.5",
        display_name: "Qwen 2.5 7B",
        size_gb: 4.7,
        vram_gb: 5.5,
        tier: ModelTier::Specialized,
        description: "Excellent at multilingual work and coding",
        strengths: &["Multilingual", "Programming", "Reasoning"],
        use_cases: &["Coding assistant", "Translation", "Multilingual support"],
        ollama_name: "qwen2.5:7b",
    },
    ModelInfo {
        key: "gemma2",
        display_name: "Gemma 2 9B",
        size_gb: 5.4,
        vram_gb: 6.5,
        tier: ModelTier::Specialized,
        description: "Fast, by Google",
        strengths: &["Speed", "Efficiency", "Quality"],
        use_cases: &["Quick answers", "Classification", "Analysis"],
        ollama_name: "gemma2:9b",
    },
    ModelInfo {
        key: "phi3-mini",
        display_name: "Phi-3 Mini",
        size_gb: 2.3,
        vram_gb: 2.5,
        tier: ModelTier::Lightweight,
        description: "Very fast and light",
        strengths: &["Extreme speed", "Low resource use", "Surprisingly capable"],
        use_cases: &["Pre-processing", "Simple classification", "Routing"],
        ollama_name: "phi3:mini",
    },
    ModelInfo {
        key: "tinyllama",
        display_name: "TinyLlama 1.1B",
        size_gb: 0.637,
        vram_gb: 0.8,
        tier: ModelTier::Lightweight,
        description: "Extremely light",
        strengths: &["Minimal resource use", "Maximum speed"],
        use_cases: &["Basic classification", "Agent routing", "Filtering"],
        ollama_name: "tinyllama",
    },
];

pub fn all_models() -> &'static [ModelInfo] {
    &CATALOG
}

pub fn model_info(key: &str) -> Option<&'static ModelInfo> {
    CATALOG.iter().find(|m| m.key == key)
}

pub fn models_by_tier(tier: ModelTier) -> Vec<&'static ModelInfo> {
    CATALOG.iter().filter(|m| m.tier == tier).collect()
}

/// Catalog entry for a use case such as "coding" or "research".
/// Unrecognized use cases get the general-purpose default.
pub fn recommended_for(use_case: &str) -> &'static ModelInfo {
    let key = match use_case.trim().to_lowercase().as_str() {
        "coding" | "code" | "programming" => "qwen2.5",
        "research" | "reasoning" | "analysis" => "deepseek-r1",
        "chat" | "general" | "conversation" => "llama3.2",
        "fast" | "quick" | "speed" => "mistral",
        "lightweight" => "phi3-mini",
        "minimal" => "tinyllama",
        _ => {
            warn!(
                "No specific model for use case '{}', defaulting to {}",
                use_case, DEFAULT_MODEL_KEY
            );
            DEFAULT_MODEL_KEY
        }
    };
    model_info(key).unwrap_or(&CATALOG[0])
}

fn strip_tag(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

/// Backend operations the model manager needs
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn list_models(&self) -> BackendResult<Vec<LocalModel>>;
    async fn pull_model(&self, name: &str) -> BackendResult<()>;
    async fn show_model(&self, name: &str) -> BackendResult<Value>;
}

#[async_trait]
impl ModelStore for OllamaClient {
    async fn list_models(&self) -> BackendResult<Vec<LocalModel>> {
        OllamaClient::list_models(self).await
    }

    async fn pull_model(&self, name: &str) -> BackendResult<()> {
        OllamaClient::pull_model(self, name).await
    }

    async fn show_model(&self, name: &str) -> BackendResult<Value> {
        OllamaClient::show_model(self, name).await
    }
}

pub struct ModelManager {
    store: Arc<dyn ModelStore>,
    available: Mutex<Vec<String>>,
}

impl ModelManager {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        info!("ModelManager initialized");
        Self {
            store,
            available: Mutex::new(Vec::new()),
        }
    }

    /// Re-read the backend's local models. Names come back without tags.
    pub async fn refresh_available(&self) -> BackendResult<Vec<String>> {
        let names: Vec<String> = self
            .store
            .list_models()
            .await?
            .iter()
            .map(|m| strip_tag(&m.name).to_string())
            .collect();
        info!("Available models refreshed: {} found", names.len());
        *self.available.lock().await = names.clone();
        Ok(names)
    }

    /// Names from the last refresh
    pub async fn available(&self) -> Vec<String> {
        self.available.lock().await.clone()
    }

    /// Pull `key` unless the backend already has it. Unknown keys return
    /// `false` without contacting the backend.
    pub async fn ensure_available(&self, key: &str) -> BackendResult<bool> {
        let Some(info) = model_info(key) else {
            error!("Model {} not found in catalog", key);
            return Ok(false);
        };

        let available = self.refresh_available().await?;
        if available.iter().any(|name| name == info.base_name()) {
            info!("Model {} already available", key);
            return Ok(true);
        }

        info!("Model {} not found, downloading {}", key, info.ollama_name);
        self.store.pull_model(info.ollama_name).await?;
        self.refresh_available().await?;
        Ok(true)
    }

    /// Backend details for a catalog model, `None` for unknown keys
    pub async fn model_stats(&self, key: &str) -> BackendResult<Option<Value>> {
        match model_info(key) {
            Some(info) => Ok(Some(self.store.show_model(info.ollama_name).await?)),
            None => Ok(None),
        }
    }
}
