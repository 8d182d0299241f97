use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuardError>;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Parse error in {template}: {message}")]
    Parse { template: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule error ({rule_id}) while analysing {template}: {message}")]
    RuleInvocation {
        rule_id: String,
        template: String,
        message: String,
    },

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    pub fn parse(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Rule identifier when this error came out of a rule invocation.
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            Self::RuleInvocation { rule_id, .. } => Some(rule_id),
            _ => None,
        }
    }

    /// Every error surfaced to the driver is a run-level failure.
    pub fn exit_code(&self) -> i32 {
        2
    }
}
