use std::fmt;

const MODEL_FILE: &str = "model.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq)]
pub enum ModelUrlError {
    Empty,
    UnknownHost,
}

impl fmt::Display for ModelUrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelUrlError::Empty => write!(f, "Please enter a valid model URL"),
            ModelUrlError::UnknownHost => {
                write!(f, "Please enter a valid Teachable Machine model URL")
            }
        }
    }
}

impl std::error::Error for ModelUrlError {}

/// Syntactic check only. Returns the trimmed URL.
pub fn validate(input: &str, host: &str) -> Result<String, ModelUrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ModelUrlError::Empty);
    }
    if !trimmed.contains(host) {
        return Err(ModelUrlError::UnknownHost);
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEndpoints {
    pub model_url: String,
    pub metadata_url: String,
}

pub fn endpoints(model_source: &str) -> ModelEndpoints {
    let base = if model_source.ends_with('/') {
        model_source.to_string()
    } else {
        format!("{}/", model_source)
    };

    ModelEndpoints {
        model_url: format!("{}{}", base, MODEL_FILE),
        metadata_url: format!("{}{}", base, METADATA_FILE),
    }
}
