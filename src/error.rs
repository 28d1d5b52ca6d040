//! Error taxonomy for a reconciliation cycle.
//!
//! Collaborators return `anyhow::Result`; the reconciler wraps failures into
//! one of these so log lines carry the class. None of them is fatal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    /// Reading store or market catalog unavailable.
    #[error("data source error ({source_name}): {reason}")]
    DataSource { source_name: &'static str, reason: String },

    /// Order submission, auth, or signing failure.
    #[error("execution error on {instrument_id}: {reason}")]
    Execution { instrument_id: String, reason: String },

    /// Configuration that makes execution structurally impossible.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BotError {
    pub fn data_source(source_name: &'static str, err: &anyhow::Error) -> Self {
        BotError::DataSource {
            source_name,
            reason: format!("{err:#}"),
        }
    }

    pub fn execution(instrument_id: &str, reason: impl Into<String>) -> Self {
        BotError::Execution {
            instrument_id: instrument_id.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_source_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("WeatherLog query");
        let e = BotError::data_source("readings", &err);
        let msg = e.to_string();
        assert!(msg.contains("readings"));
        assert!(msg.contains("WeatherLog query"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn execution_names_instrument() {
        let e = BotError::execution("7123", "not enough balance");
        assert_eq!(
            e.to_string(),
            "execution error on 7123: not enough balance"
        );
    }
}
