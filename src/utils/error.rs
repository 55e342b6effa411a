use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LunchError {
    #[error("Voting window is closed: {message}")]
    WindowClosed { message: String },

    #[error("Persistence error during {operation}: {message}")]
    Persistence { operation: String, message: String },

    #[error("No eligible items to recommend")]
    NoEligibleItems,

    #[error("Auto-close already performed for {date}")]
    AlreadyClosed { date: NaiveDate },

    #[error("Lunch already recorded for user {user_id} on {date}")]
    AlreadyRecorded { date: NaiveDate, user_id: String },

    #[error("Malformed document {collection}/{key}: {source}")]
    MalformedDocument {
        collection: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{collection}/{key} not found")]
    NotFound { collection: String, key: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Voting,
    Storage,
    Recommendation,
    Scheduling,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl LunchError {
    pub fn persistence(operation: &str, message: impl Into<String>) -> Self {
        LunchError::Persistence {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(collection: &str, key: &str) -> Self {
        LunchError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            LunchError::WindowClosed { .. } | LunchError::AlreadyRecorded { .. } => {
                ErrorCategory::Voting
            }
            LunchError::Persistence { .. }
            | LunchError::MalformedDocument { .. }
            | LunchError::NotFound { .. }
            | LunchError::IoError(_)
            | LunchError::SerializationError(_) => ErrorCategory::Storage,
            LunchError::NoEligibleItems => ErrorCategory::Recommendation,
            LunchError::AlreadyClosed { .. } => ErrorCategory::Scheduling,
            LunchError::ConfigError { .. }
            | LunchError::MissingConfigError { .. }
            | LunchError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LunchError::AlreadyClosed { .. } | LunchError::NoEligibleItems => ErrorSeverity::Low,
            LunchError::WindowClosed { .. }
            | LunchError::AlreadyRecorded { .. }
            | LunchError::Persistence { .. }
            | LunchError::NotFound { .. } => ErrorSeverity::Medium,
            LunchError::MalformedDocument { .. }
            | LunchError::SerializationError(_)
            | LunchError::IoError(_) => ErrorSeverity::High,
            LunchError::ConfigError { .. }
            | LunchError::MissingConfigError { .. }
            | LunchError::InvalidConfigValueError { .. } => ErrorSeverity::Critical,
        }
    }

    /// Only store failures are worth retrying; everything else fails the same way again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, LunchError::Persistence { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            LunchError::WindowClosed { .. } => "Wait until the voting window opens again",
            LunchError::Persistence { .. } => "Check the document store and retry",
            LunchError::NoEligibleItems => "Add items or remove some dislikes",
            LunchError::AlreadyClosed { .. } => "Nothing to do, today's vote is already closed",
            LunchError::AlreadyRecorded { .. } => "Today's lunch is already recorded",
            LunchError::MalformedDocument { .. } | LunchError::SerializationError(_) => {
                "Repair or remove the offending document"
            }
            LunchError::NotFound { .. } => "Check that the user or item exists",
            LunchError::IoError(_) => "Check file paths and permissions",
            LunchError::ConfigError { .. }
            | LunchError::MissingConfigError { .. }
            | LunchError::InvalidConfigValueError { .. } => "Fix the configuration file",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            LunchError::WindowClosed { message } => format!("Voting is not open: {}", message),
            LunchError::Persistence { .. } => {
                "Could not reach the lunch database, please try again".to_string()
            }
            LunchError::NoEligibleItems => "No recommendation available".to_string(),
            LunchError::AlreadyRecorded { .. } => {
                "You already picked a lunch for today".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_persistence_is_retriable() {
        assert!(LunchError::persistence("get", "timeout").is_retriable());
        assert!(!LunchError::NoEligibleItems.is_retriable());
        assert!(!LunchError::WindowClosed {
            message: "closed".to_string()
        }
        .is_retriable());
    }

    #[test]
    fn test_already_closed_is_low_severity() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let err = LunchError::AlreadyClosed { date };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.category(), ErrorCategory::Scheduling);
    }

    #[test]
    fn test_user_friendly_message_hides_store_details() {
        let err = LunchError::persistence("atomic_update", "connection reset by peer");
        assert!(!err.user_friendly_message().contains("connection reset"));
    }
}
