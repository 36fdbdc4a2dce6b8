// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for weft-core.
//!
//! Precondition violations (double-create, operating on an unknown instance)
//! are fatal to the specific call and are never retried here. "Definition not
//! found" during a start attempt is surfaced by the runtime facade as a soft
//! `None` instead of this error where the contract allows it.

use std::fmt;

use weft_engine::EngineError;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while operating on workflow instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// No instance was ever created for the addressed actor, or the durable
    /// record is gone.
    InstanceNotFound {
        /// The instance ID that was not found.
        instance_id: String,
    },

    /// A second `Create` was issued against an actor that already holds an
    /// instance.
    InstanceAlreadyCreated {
        /// The instance ID already bound to the actor.
        instance_id: String,
    },

    /// A workflow definition could not be resolved.
    DefinitionNotFound {
        /// The definition ID that was not found.
        definition_id: String,
    },

    /// The actor's mailbox is closed or the actor died before replying.
    ActorUnavailable {
        /// The instance ID the actor was addressed by.
        instance_id: String,
    },

    /// The execution engine reported a failure.
    Engine {
        /// Error details from the engine.
        details: String,
    },

    /// A store operation failed. Never masked: a snapshot or state write
    /// failure fails the in-flight operation.
    Storage {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Workflow state could not be serialized or deserialized.
    Serialization {
        /// Error details.
        details: String,
    },

    /// Input validation failed.
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            Self::InstanceAlreadyCreated { .. } => "INSTANCE_ALREADY_CREATED",
            Self::DefinitionNotFound { .. } => "DEFINITION_NOT_FOUND",
            Self::ActorUnavailable { .. } => "ACTOR_UNAVAILABLE",
            Self::Engine { .. } => "ENGINE_ERROR",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstanceNotFound { instance_id } => {
                write!(f, "Workflow instance '{}' not found", instance_id)
            }
            Self::InstanceAlreadyCreated { instance_id } => {
                write!(f, "Workflow instance '{}' already created", instance_id)
            }
            Self::DefinitionNotFound { definition_id } => {
                write!(f, "Workflow definition '{}' not found", definition_id)
            }
            Self::ActorUnavailable { instance_id } => {
                write!(f, "Actor for instance '{}' is unavailable", instance_id)
            }
            Self::Engine { details } => {
                write!(f, "Execution engine error: {}", details)
            }
            Self::Storage { operation, details } => {
                write!(f, "Storage error during '{}': {}", operation, details)
            }
            Self::Serialization { details } => {
                write!(f, "Workflow state serialization error: {}", details)
            }
            Self::Validation { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Storage {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization {
            details: err.to_string(),
        }
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::DefinitionNotFound(definition_id) => {
                CoreError::DefinitionNotFound { definition_id }
            }
            other => CoreError::Engine {
                details: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases = vec![
            (
                CoreError::InstanceNotFound {
                    instance_id: "wf-1".to_string(),
                },
                "INSTANCE_NOT_FOUND",
            ),
            (
                CoreError::InstanceAlreadyCreated {
                    instance_id: "wf-1".to_string(),
                },
                "INSTANCE_ALREADY_CREATED",
            ),
            (
                CoreError::DefinitionNotFound {
                    definition_id: "def-1".to_string(),
                },
                "DEFINITION_NOT_FOUND",
            ),
            (
                CoreError::ActorUnavailable {
                    instance_id: "wf-1".to_string(),
                },
                "ACTOR_UNAVAILABLE",
            ),
            (
                CoreError::Engine {
                    details: "boom".to_string(),
                },
                "ENGINE_ERROR",
            ),
            (
                CoreError::Storage {
                    operation: "insert".to_string(),
                    details: "locked".to_string(),
                },
                "STORAGE_ERROR",
            ),
            (
                CoreError::Serialization {
                    details: "bad json".to_string(),
                },
                "SERIALIZATION_ERROR",
            ),
            (
                CoreError::Validation {
                    field: "instance_id".to_string(),
                    message: "empty".to_string(),
                },
                "VALIDATION_ERROR",
            ),
        ];

        for (error, expected_code) in cases {
            assert_eq!(error.error_code(), expected_code, "error {:?}", error);
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_display_messages() {
        let err = CoreError::InstanceAlreadyCreated {
            instance_id: "abc-123".to_string(),
        };
        assert_eq!(err.to_string(), "Workflow instance 'abc-123' already created");

        let err = CoreError::Storage {
            operation: "save_snapshot".to_string(),
            details: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Storage error during 'save_snapshot': disk full"
        );
    }

    #[test]
    fn test_engine_error_mapping() {
        let err: CoreError = EngineError::DefinitionNotFound("def-9".to_string()).into();
        assert_eq!(err.error_code(), "DEFINITION_NOT_FOUND");

        let err: CoreError = EngineError::Execution("activity blew up".to_string()).into();
        assert_eq!(err.error_code(), "ENGINE_ERROR");
        assert!(err.to_string().contains("activity blew up"));
    }
}
