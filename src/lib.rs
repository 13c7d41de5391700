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

//! # Zimod Core Library
//!
//! Customization export engine: turns the customized rows of a record-store
//! application into an installable data module with a deterministic load
//! order, stable identifiers and extracted binary payloads.
//!
//! ## Module Overview
//!
//! - **config**: Export rules, manual customizations and the pre-flight check
//! - **domain**: Filter expressions attached to rules
//! - **record**: Row snapshots, provenance and selection candidates
//! - **metadata**: Field schemas and the metadata provider seam
//! - **store**: The record store seam and an in-memory store
//! - **policy**: Pristine-record retention policies
//! - **selector**: Candidate selection
//! - **identifier**: Stable identifier registry
//! - **graph**: Model dependency graph
//! - **scheduler**: Topological scheduling with cycle reporting
//! - **serializer**: XML record serialization
//! - **binary**: Binary payload extraction into side files
//! - **export**: Assembly, manifest and on-disk materialization
//! - **pipeline**: End-to-end orchestration
//!
//! ## Feature Flags
//!
//! - `zip`: Enables zip archive output (default)
//!
//! ## Architecture
//!
//! An export run is a strict sequence of phases:
//! 1. **Selection**: rules and customizations are evaluated against the store
//! 2. **Identifiers**: every selected row gets a stable identifier
//! 3. **Graph**: relations between selected rows become model dependencies
//! 4. **Scheduling**: each bucket is ordered, cycles are reported
//! 5. **Assembly**: rows are serialized into files, binaries into side files
//!
//! ## Error Handling
//!
//! Only [`ZiExportConfig::validate`] can fail a run. Everything else that goes
//! wrong is reported as a [`ZiWarning`] on the result.

pub mod errors;
pub mod record;
pub mod domain;
pub mod metadata;
pub mod store;
pub mod policy;
pub mod config;
pub mod identifier;
pub mod selector;
pub mod graph;
pub mod scheduler;
pub mod binary;
pub mod serializer;
pub mod export;
pub mod pipeline;

pub use errors::{Result, ZiError, ZiWarning, ZiWarningKind};
pub use record::{
    ZiAttachmentPass, ZiBucket, ZiCandidateOrigin, ZiCandidateRecord, ZiFieldValue, ZiProvenance,
    ZiRecordRef, ZiStoredRecord,
};
pub use domain::{ZiCondition, ZiDomain, ZiDomainOperator, ZiDomainValue};
pub use metadata::{
    ZiFieldKind, ZiFieldMeta, ZiMetadataProvider, ZiModelSchema, ZiScalarType, ZiSchemaCatalog,
    ZiStaticMetadata,
};
pub use store::{ZiMemoryStore, ZiRecordStore, ZiStoreError};
pub use policy::{ZiKeepAll, ZiOwnNamespace, ZiPristinePolicy, ZiRetentionPolicy};
pub use config::{ZiExportConfig, ZiExportModelRule};
pub use identifier::{slugify, ZiIdentifierRegistry};
pub use selector::{ZiExportSelector, ZiSelection};
pub use graph::{ZiModelGraph, ZiModelNode, ZiNodeId};
pub use scheduler::{ZiCycle, ZiSchedule, ZiTopologicalScheduler};
pub use binary::{ZiBinaryExtractor, ZiBinaryField, ZiPayloadCache};
pub use serializer::{ZiFieldBody, ZiFieldEntry, ZiRecordSerializer, ZiReferenceIndex};
pub use export::{
    ZiExportStats, ZiFileRole, ZiManifest, ZiManifestFile, ZiModuleAssembler, ZiModuleWriter,
    ZiOutputFormat, ZiOutputSet,
};
pub use pipeline::{ZiExportResult, ZiExporter};
