//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Zimod Error Module
//!
//! This module defines the error and warning types used throughout the export
//! engine.
//!
//! ## Error Handling Philosophy
//!
//! An export run distinguishes two kinds of failure:
//!
//! - **Fatal**: only the pre-flight configuration check may reject a run. It
//!   surfaces as [`ZiError::RejectedConfiguration`] before any record is read.
//! - **Recoverable**: access failures, unresolved references, circular model
//!   dependencies and binary payload failures never abort a run. Each phase
//!   returns its output together with a list of [`ZiWarning`] values.
//!
//! ## Usage
//!
//! ```rust
//! use zimod::errors::{Result, ZiError};
//!
//! fn check(model: &str) -> Result<()> {
//!     if model.is_empty() {
//!         return Err(ZiError::rejected(model, "model name cannot be empty"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout Zimod.
pub type Result<T> = std::result::Result<T, ZiError>;

/// Canonical error enumeration for Zimod.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ZiError {
    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Validation errors triggered by invalid parameters or inputs.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The export configuration failed the pre-flight check.
    #[error("rejected configuration for model '{model}': {message}")]
    RejectedConfiguration { model: String, message: String },

    /// A record store call failed for one model.
    #[error("record store error on '{model}': {message}")]
    Store { model: String, message: String },

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Failures while writing structured XML.
    #[error("xml error: {0}")]
    Xml(String),

    /// Errors originating from ZIP file operations.
    #[error("zip error: {0}")]
    Zip(String),

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for ZiError {
    fn from(err: io::Error) -> Self {
        ZiError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ZiError {
    fn from(err: serde_json::Error) -> Self {
        ZiError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for ZiError {
    fn from(err: serde_yaml::Error) -> Self {
        ZiError::Serde(err.to_string())
    }
}

#[cfg(feature = "zip")]
impl From<zip::result::ZipError> for ZiError {
    fn from(err: zip::result::ZipError) -> Self {
        ZiError::Zip(err.to_string())
    }
}

impl ZiError {
    /// Helper to construct simple validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        ZiError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct pre-flight configuration rejections.
    pub fn rejected(model: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::RejectedConfiguration {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Helper to construct record store errors.
    pub fn store(model: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::Store {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Helper to construct XML writer errors.
    pub fn xml<T: fmt::Display>(err: T) -> Self {
        ZiError::Xml(err.to_string())
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        ZiError::Internal(message.into())
    }

    /// Whether this error comes from the pre-flight configuration check.
    pub fn is_rejected_configuration(&self) -> bool {
        matches!(self, ZiError::RejectedConfiguration { .. })
    }
}

/// Category of a recoverable condition reported by an export run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZiWarningKind {
    /// The record store refused a query; the model was skipped.
    AccessDenied,
    /// A relational value pointed at a record without any identifier.
    UnresolvedReference,
    /// Models depend on each other in a loop.
    CircularDependency,
    /// A binary payload could not be loaded.
    BinaryPayload,
    /// A row's pre-existing identifier was already held by another row.
    IdentifierConflict,
    /// A record or model could not be selected for another reason.
    Selection,
}

impl ZiWarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZiWarningKind::AccessDenied => "access_denied",
            ZiWarningKind::UnresolvedReference => "unresolved_reference",
            ZiWarningKind::CircularDependency => "circular_dependency",
            ZiWarningKind::BinaryPayload => "binary_payload",
            ZiWarningKind::IdentifierConflict => "identifier_conflict",
            ZiWarningKind::Selection => "selection",
        }
    }
}

/// A recoverable condition surfaced to the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiWarning {
    pub kind: ZiWarningKind,
    pub model: Option<String>,
    pub message: String,
}

impl ZiWarning {
    pub fn new(kind: ZiWarningKind, model: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ZiWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "[{}] {}: {}", self.kind.as_str(), model, self.message),
            None => write!(f, "[{}] {}", self.kind.as_str(), self.message),
        }
    }
}
