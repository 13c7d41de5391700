//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.
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

//! # Record Serializer Module
//!
//! Turns selected rows into `<record>` blocks of an XML data file.
//!
//! ## Field rules
//!
//! - Excluded, non-stored, one-to-many and bookkeeping fields are skipped, as
//!   are falsy values of fields that are not required.
//! - The label field comes first, the rest follow in alphabetical order.
//! - Text is written verbatim; only `<`, `>` and `&` are escaped. Markup
//!   fields are embedded unescaped with `type="xml"`.
//! - Many-to-one values become `ref="<identifier>"`, many-to-many values
//!   `eval="[Command.set([ref('a'), ref('b')])]"` and reference values
//!   `eval="ref('<identifier>')"`. A reference that resolves to no identifier
//!   is dropped with a warning; the record itself is kept.
//! - Binary values go through the [`ZiBinaryExtractor`].
//!
//! ## Output
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <odoo>
//!     <record id="custom.res_partner_azure_interior" model="res.partner">
//!         <field name="name">Azure Interior</field>
//!         <field name="is_company" eval="True"/>
//!         <field name="parent_id" ref="base.main_partner"/>
//!     </record>
//! </odoo>
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use futures::future::join_all;
use quick_xml::escape::partial_escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;

use crate::binary::{ZiBinaryExtractor, ZiBinaryField, ZiPayloadCache};
use crate::errors::{Result, ZiError, ZiWarning, ZiWarningKind};
use crate::identifier::ZiIdentifierRegistry;
use crate::metadata::{ZiFieldKind, ZiFieldMeta, ZiScalarType, ZiSchemaCatalog};
use crate::record::{ZiCandidateRecord, ZiFieldValue, ZiRecordRef, ZiStoredRecord};
use crate::store::ZiRecordStore;

/// Bookkeeping columns the loading side maintains itself.
pub const MAGIC_FIELDS: &[&str] = &[
    "id",
    "create_uid",
    "create_date",
    "write_uid",
    "write_date",
    "__last_update",
];

/// Resolves row references to stable identifiers.
///
/// Selected rows resolve through the registry; everything else through the
/// store's pre-existing identifier index.
#[derive(Debug)]
pub struct ZiReferenceIndex<'a> {
    registry: &'a ZiIdentifierRegistry,
    selected: HashSet<ZiRecordRef>,
    external: HashMap<ZiRecordRef, String>,
}

impl<'a> ZiReferenceIndex<'a> {
    pub fn new(registry: &'a ZiIdentifierRegistry, selected: HashSet<ZiRecordRef>) -> Self {
        Self {
            registry,
            selected,
            external: HashMap::new(),
        }
    }

    pub fn with_external(mut self, key: ZiRecordRef, identifier: &str) -> Self {
        self.external.insert(key, identifier.to_string());
        self
    }

    /// Looks up pre-existing identifiers of every row the selection points at
    /// but does not contain.
    pub async fn build(
        store: &dyn ZiRecordStore,
        registry: &'a ZiIdentifierRegistry,
        candidates: &[ZiCandidateRecord],
        catalog: &ZiSchemaCatalog,
    ) -> (ZiReferenceIndex<'a>, Vec<ZiWarning>) {
        let selected: HashSet<ZiRecordRef> = candidates.iter().map(ZiCandidateRecord::key).collect();
        let mut wanted: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
        for candidate in candidates {
            for target in outgoing_references(candidate, catalog) {
                if !selected.contains(&target) {
                    wanted.entry(target.model).or_default().insert(target.id);
                }
            }
        }

        let queries: Vec<(String, Vec<i64>)> = wanted
            .into_iter()
            .map(|(model, ids)| (model, ids.into_iter().collect()))
            .collect();
        let results = join_all(queries.iter().map(|(model, ids)| store.external_ids(model, ids))).await;

        let mut index = Self::new(registry, selected);
        let mut warnings = Vec::new();
        for ((model, _), result) in queries.iter().zip(results) {
            match result {
                Ok(found) => {
                    for (id, identifier) in found {
                        index.external.insert(ZiRecordRef::new(model, id), identifier);
                    }
                }
                Err(err) => {
                    log::warn!(
                        "export.serializer.identifier_lookup: lookup failed - model={}, error={}",
                        model,
                        err
                    );
                    warnings.push(ZiWarning::new(
                        ZiWarningKind::UnresolvedReference,
                        Some(model),
                        format!("identifier lookup failed: {}", err),
                    ));
                }
            }
        }
        (index, warnings)
    }

    /// Pre-existing identifiers of referenced rows outside the selection,
    /// ordered by row.
    pub fn external_identifiers(&self) -> Vec<(&ZiRecordRef, &str)> {
        let mut found: Vec<(&ZiRecordRef, &str)> = self.external.iter().map(|(k, v)| (k, v.as_str())).collect();
        found.sort();
        found
    }

    pub fn is_selected(&self, key: &ZiRecordRef) -> bool {
        self.selected.contains(key)
    }

    pub fn resolve(&self, key: &ZiRecordRef) -> Option<String> {
        if self.selected.contains(key) {
            self.registry.lookup(key)
        } else {
            self.external.get(key).cloned()
        }
    }
}

/// Rows a candidate points at through many-to-one, many-to-many and
/// reference fields.
pub fn outgoing_references(candidate: &ZiCandidateRecord, catalog: &ZiSchemaCatalog) -> Vec<ZiRecordRef> {
    let Some(schema) = catalog.get(candidate.model()) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for field in &schema.fields {
        if !field.stored || candidate.excluded_fields.contains(&field.name) {
            continue;
        }
        let Some(value) = candidate.record.get(&field.name) else {
            continue;
        };
        match &field.kind {
            ZiFieldKind::ManyToOne { target } | ZiFieldKind::ManyToMany { target } => {
                out.extend(value.relation_ids().into_iter().map(|id| ZiRecordRef::new(target, id)));
            }
            ZiFieldKind::Reference { model_field } => {
                if let Some(key) = reference_target(&candidate.record, model_field, value) {
                    out.push(key);
                }
            }
            _ => {}
        }
    }
    out
}

fn reference_target(record: &ZiStoredRecord, model_field: &str, value: &ZiFieldValue) -> Option<ZiRecordRef> {
    let model = record.get(model_field).and_then(ZiFieldValue::as_str)?;
    let id = value.as_i64().filter(|id| *id > 0)?;
    if model.is_empty() {
        return None;
    }
    Some(ZiRecordRef::new(model, id))
}

/// Body of a serialized field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZiFieldBody {
    Empty,
    /// Escaped on output.
    Text(String),
    /// Written as-is.
    Markup(String),
}

/// One `<field>` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZiFieldEntry {
    pub name: String,
    pub attributes: Vec<(&'static str, String)>,
    pub body: ZiFieldBody,
}

impl ZiFieldEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            body: ZiFieldBody::Empty,
        }
    }

    fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((key, value.into()));
        self
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.body = ZiFieldBody::Text(text.into());
        self
    }

    fn markup(mut self, markup: impl Into<String>) -> Self {
        self.body = ZiFieldBody::Markup(markup.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Serializes the rows of one output file.
pub struct ZiRecordSerializer<'s, 'r> {
    catalog: &'s ZiSchemaCatalog,
    index: &'s ZiReferenceIndex<'r>,
    payloads: &'s ZiPayloadCache,
    extractor: &'s mut ZiBinaryExtractor,
    warnings: Vec<ZiWarning>,
    external_refs: BTreeSet<ZiRecordRef>,
}

impl<'s, 'r> ZiRecordSerializer<'s, 'r> {
    pub fn new(
        catalog: &'s ZiSchemaCatalog,
        index: &'s ZiReferenceIndex<'r>,
        payloads: &'s ZiPayloadCache,
        extractor: &'s mut ZiBinaryExtractor,
    ) -> Self {
        Self {
            catalog,
            index,
            payloads,
            extractor,
            warnings: Vec::new(),
            external_refs: BTreeSet::new(),
        }
    }

    /// Warnings raised so far.
    pub fn warnings(&self) -> &[ZiWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<ZiWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Rows outside the selection that serialized references resolved to.
    pub fn external_refs(&self) -> &BTreeSet<ZiRecordRef> {
        &self.external_refs
    }

    /// Complete XML document holding `records` in the given order.
    pub fn write_file(&mut self, records: &[&ZiCandidateRecord], no_update: bool) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(ZiError::xml)?;
        let mut root = BytesStart::new("odoo");
        if no_update {
            root.push_attribute(attribute("noupdate", "1"));
        }
        writer.write_event(Event::Start(root)).map_err(ZiError::xml)?;

        for candidate in records {
            let identifier = self.identifier_of(&candidate.key());
            let entries = self.record_fields(candidate);
            let mut start = BytesStart::new("record");
            start.push_attribute(attribute("id", &identifier));
            start.push_attribute(attribute("model", candidate.model()));
            if entries.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(ZiError::xml)?;
                continue;
            }
            writer.write_event(Event::Start(start)).map_err(ZiError::xml)?;
            for entry in &entries {
                write_field(&mut writer, entry)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("record")))
                .map_err(ZiError::xml)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("odoo")))
            .map_err(ZiError::xml)?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn identifier_of(&self, key: &ZiRecordRef) -> String {
        // every selected row is registered before serialization starts
        self.index
            .resolve(key)
            .unwrap_or_else(|| format!("{}.{}_{}", self.index.registry.namespace(), key.model.replace('.', "_"), key.id))
    }

    /// Field elements of one record, in output order.
    pub fn record_fields(&mut self, candidate: &ZiCandidateRecord) -> Vec<ZiFieldEntry> {
        let schema = self.catalog.get(candidate.model());
        let rec_name = schema.map(|s| s.rec_name.as_str()).unwrap_or("name");

        let mut entries = Vec::new();
        for (name, value) in &candidate.record.values {
            if candidate.excluded_fields.contains(name) || MAGIC_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let meta = match schema {
                Some(schema) => match schema.get(name) {
                    Some(meta) => Some(meta),
                    None => {
                        log::debug!(
                            "export.serializer.unknown_field: field not in schema - model={}, field={}",
                            candidate.model(),
                            name
                        );
                        continue;
                    }
                },
                None => None,
            };
            if let Some(meta) = meta {
                if !meta.stored || matches!(meta.kind, ZiFieldKind::OneToMany { .. }) {
                    continue;
                }
            }
            if matches!(value, ZiFieldValue::OneToMany(_)) {
                continue;
            }
            let required = meta.map(|m| m.required).unwrap_or(false);
            if value.is_falsy() {
                if required {
                    entries.push(falsy_entry(name, value, meta));
                }
                continue;
            }
            if let Some(entry) = self.field_entry(candidate, name, value, meta) {
                entries.push(entry);
            }
        }

        if let Some(pos) = entries.iter().position(|e| e.name == rec_name) {
            let label = entries.remove(pos);
            entries.insert(0, label);
        }
        entries
    }

    fn field_entry(
        &mut self,
        candidate: &ZiCandidateRecord,
        name: &str,
        value: &ZiFieldValue,
        meta: Option<&ZiFieldMeta>,
    ) -> Option<ZiFieldEntry> {
        let entry = ZiFieldEntry::new(name);
        match (meta.map(|m| &m.kind), value) {
            (Some(ZiFieldKind::ManyToOne { target }), _) => {
                let id = value.relation_ids().into_iter().next()?;
                let identifier = self.resolve_reference(candidate, name, &ZiRecordRef::new(target, id))?;
                Some(entry.attr("ref", identifier))
            }
            (Some(ZiFieldKind::ManyToMany { target }), _) => {
                let refs: Vec<String> = value
                    .relation_ids()
                    .into_iter()
                    .filter_map(|id| self.resolve_reference(candidate, name, &ZiRecordRef::new(target, id)))
                    .map(|identifier| format!("ref('{}')", identifier))
                    .collect();
                if refs.is_empty() {
                    return None;
                }
                Some(entry.attr("eval", format!("[Command.set([{}])]", refs.join(", "))))
            }
            (Some(ZiFieldKind::Reference { model_field }), _) => {
                let Some(target) = reference_target(&candidate.record, model_field, value) else {
                    self.unresolved(candidate, name, "reference has no target model");
                    return None;
                };
                let identifier = self.resolve_reference(candidate, name, &target)?;
                Some(entry.attr("eval", format!("ref('{}')", identifier)))
            }
            (_, ZiFieldValue::Binary(bytes)) => Some(self.binary_entry(candidate, entry, bytes)),
            (_, ZiFieldValue::BinaryRef(_)) => {
                let Some(bytes) = self.payloads.get(&candidate.key(), name) else {
                    // fetch failure already reported
                    return None;
                };
                Some(self.binary_entry(candidate, entry, bytes))
            }
            (Some(ZiFieldKind::Scalar { scalar: ZiScalarType::Xml }), ZiFieldValue::Text(markup)) => {
                Some(entry.attr("type", "xml").markup(markup.clone()))
            }
            (_, ZiFieldValue::Boolean(b)) => Some(entry.attr("eval", eval_literal(*b))),
            (_, ZiFieldValue::Integer(i)) => Some(entry.text(i.to_string())),
            (_, ZiFieldValue::Float(f)) => Some(entry.text(f.to_string())),
            (_, ZiFieldValue::Text(s)) => Some(entry.text(s.clone())),
            (None, ZiFieldValue::ManyToOne(_))
            | (None, ZiFieldValue::ManyToMany(_))
            | (None, ZiFieldValue::Reference(_)) => {
                self.unresolved(candidate, name, "relation without field metadata");
                None
            }
            (_, ZiFieldValue::Empty) | (_, ZiFieldValue::OneToMany(_)) => None,
            (Some(_), _) => {
                log::debug!(
                    "export.serializer.type_mismatch: value does not match field kind - record={}, field={}",
                    candidate.key(),
                    name
                );
                None
            }
        }
    }

    fn binary_entry(&mut self, candidate: &ZiCandidateRecord, entry: ZiFieldEntry, bytes: &[u8]) -> ZiFieldEntry {
        match self.extractor.extract(&candidate.record, &entry.name, bytes) {
            ZiBinaryField::Inline(encoded) => entry.attr("type", "base64").text(encoded),
            ZiBinaryField::File(path) => entry.attr("type", "base64").attr("file", path),
        }
    }

    fn resolve_reference(&mut self, candidate: &ZiCandidateRecord, field: &str, target: &ZiRecordRef) -> Option<String> {
        match self.index.resolve(target) {
            Some(identifier) => {
                if !self.index.is_selected(target) {
                    self.external_refs.insert(target.clone());
                }
                Some(identifier)
            }
            None => {
                self.unresolved(candidate, field, &format!("no identifier for {}", target));
                None
            }
        }
    }

    fn unresolved(&mut self, candidate: &ZiCandidateRecord, field: &str, reason: &str) {
        log::warn!(
            "export.serializer.unresolved: reference dropped - record={}, field={}, reason={}",
            candidate.key(),
            field,
            reason
        );
        self.warnings.push(ZiWarning::new(
            ZiWarningKind::UnresolvedReference,
            Some(candidate.model()),
            format!("{} field '{}' dropped: {}", candidate.key(), field, reason),
        ));
    }
}

fn falsy_entry(name: &str, value: &ZiFieldValue, meta: Option<&ZiFieldMeta>) -> ZiFieldEntry {
    let entry = ZiFieldEntry::new(name);
    match (value, meta.map(|m| &m.kind)) {
        (ZiFieldValue::Integer(i), _) => entry.text(i.to_string()),
        (ZiFieldValue::Float(f), _) => entry.text(f.to_string()),
        (ZiFieldValue::Text(_), _) => entry.text(""),
        (_, Some(ZiFieldKind::ManyToMany { .. })) | (ZiFieldValue::ManyToMany(_), _) => {
            entry.attr("eval", "[Command.clear()]")
        }
        _ => entry.attr("eval", eval_literal(false)),
    }
}

fn eval_literal(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// Attribute with only `&`, `<` and `"` escaped, so `eval` expressions stay
/// readable.
fn attribute<'a>(key: &'a str, value: &str) -> Attribute<'a> {
    let escaped = value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;");
    Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escaped.into_bytes()),
    }
}

fn write_field(writer: &mut Writer<Vec<u8>>, entry: &ZiFieldEntry) -> Result<()> {
    let mut start = BytesStart::new("field");
    start.push_attribute(attribute("name", &entry.name));
    for (key, value) in &entry.attributes {
        start.push_attribute(attribute(key, value));
    }
    let body = match &entry.body {
        ZiFieldBody::Empty => {
            writer.write_event(Event::Empty(start)).map_err(ZiError::xml)?;
            return Ok(());
        }
        ZiFieldBody::Text(text) => partial_escape(text.as_str()).into_owned(),
        ZiFieldBody::Markup(markup) => markup.clone(),
    };
    writer.write_event(Event::Start(start)).map_err(ZiError::xml)?;
    writer
        .write_event(Event::Text(BytesText::from_escaped(body)))
        .map_err(ZiError::xml)?;
    writer
        .write_event(Event::End(BytesEnd::new("field")))
        .map_err(ZiError::xml)?;
    Ok(())
}
