//! Static per-model limits and provider routing.

use std::fmt;

pub const DEFAULT_MODEL: &str = "o3-mini";

const FALLBACK_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    DeepSeek,
}

impl Provider {
    /// `gpt-`, `o1-` and `o3-` models go to OpenAI, everything else to DeepSeek.
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("gpt-")
            || model.starts_with("o1-")
            || model.starts_with("o3-")
            || model == "o3-mini"
        {
            Self::OpenAi
        } else {
            Self::DeepSeek
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::DeepSeek => "DeepSeek",
        }
    }

    /// Path segment of the retrieval function serving this provider.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which request field carries the completion length limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionField {
    MaxTokens,
    MaxCompletionTokens,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: &'static str,
    pub supports_temperature: bool,
    pub default_temperature: Option<f32>,
    pub default_max_tokens: u32,
    /// Context-window ceiling used for clamping and prompt truncation
    pub max_allowed_tokens: u32,
    pub completion_field: CompletionField,
}

impl ModelConfig {
    /// Requested completion length, or the model default, capped at the ceiling.
    pub fn clamp_max_tokens(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_max_tokens)
            .min(self.max_allowed_tokens)
    }

    /// Temperature to send, or `None` when the model rejects the parameter.
    pub fn effective_temperature(&self, requested: Option<f32>) -> Option<f32> {
        if !self.supports_temperature {
            return None;
        }
        Some(
            requested
                .or(self.default_temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
        )
    }
}

static MODELS: &[ModelConfig] = &[
    ModelConfig {
        name: "o3-mini",
        supports_temperature: false,
        default_temperature: None,
        default_max_tokens: 40000,
        max_allowed_tokens: 200000,
        completion_field: CompletionField::MaxCompletionTokens,
    },
    ModelConfig {
        name: "o1-mini",
        supports_temperature: false,
        default_temperature: None,
        default_max_tokens: 40000,
        max_allowed_tokens: 128000,
        completion_field: CompletionField::MaxCompletionTokens,
    },
    ModelConfig {
        name: "gpt-4",
        supports_temperature: true,
        default_temperature: Some(DEFAULT_TEMPERATURE),
        default_max_tokens: 40000,
        max_allowed_tokens: 100000,
        completion_field: CompletionField::MaxTokens,
    },
    ModelConfig {
        name: "gpt-4o",
        supports_temperature: true,
        default_temperature: Some(DEFAULT_TEMPERATURE),
        default_max_tokens: 16000,
        max_allowed_tokens: 128000,
        completion_field: CompletionField::MaxTokens,
    },
    ModelConfig {
        name: "gpt-3.5-turbo",
        supports_temperature: true,
        default_temperature: Some(DEFAULT_TEMPERATURE),
        default_max_tokens: 40000,
        max_allowed_tokens: 100000,
        completion_field: CompletionField::MaxTokens,
    },
    ModelConfig {
        name: "deepseek-chat",
        supports_temperature: true,
        default_temperature: Some(DEFAULT_TEMPERATURE),
        default_max_tokens: 8000,
        max_allowed_tokens: 64000,
        completion_field: CompletionField::MaxTokens,
    },
    ModelConfig {
        name: "deepseek-reasoner",
        supports_temperature: false,
        default_temperature: None,
        default_max_tokens: 8000,
        max_allowed_tokens: 64000,
        completion_field: CompletionField::MaxTokens,
    },
];

/// Limits for `model`; unknown names get the `gpt-3.5-turbo` entry.
pub fn model_config(model: &str) -> &'static ModelConfig {
    MODELS
        .iter()
        .find(|config| config.name == model)
        .or_else(|| MODELS.iter().find(|config| config.name == FALLBACK_MODEL))
        .unwrap_or(&MODELS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_routing() {
        assert_eq!(Provider::for_model("gpt-4"), Provider::OpenAi);
        assert_eq!(Provider::for_model("o1-preview"), Provider::OpenAi);
        assert_eq!(Provider::for_model("o3-mini"), Provider::OpenAi);
        assert_eq!(Provider::for_model("deepseek-chat"), Provider::DeepSeek);
        assert_eq!(Provider::for_model("claude"), Provider::DeepSeek);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let config = model_config("mystery-model");
        assert_eq!(config.name, "gpt-3.5-turbo");
    }

    #[test]
    fn test_clamp_max_tokens() {
        let o3 = model_config("o3-mini");
        assert_eq!(o3.clamp_max_tokens(None), 40000);
        assert_eq!(o3.clamp_max_tokens(Some(500)), 500);
        assert_eq!(o3.clamp_max_tokens(Some(900_000)), 200000);
        assert_eq!(o3.completion_field, CompletionField::MaxCompletionTokens);
    }

    #[test]
    fn test_temperature_support() {
        assert_eq!(model_config("o3-mini").effective_temperature(Some(0.2)), None);
        assert_eq!(model_config("gpt-4").effective_temperature(None), Some(0.7));
        assert_eq!(model_config("gpt-4").effective_temperature(Some(0.3)), Some(0.3));
    }
}
