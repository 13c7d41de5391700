//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.

use std::collections::HashSet;

use zimod::{
    ZiBinaryExtractor, ZiBucket, ZiCandidateOrigin, ZiCandidateRecord, ZiFieldKind, ZiFieldMeta,
    ZiFieldValue, ZiIdentifierRegistry, ZiMemoryStore, ZiModelSchema, ZiPayloadCache,
    ZiProvenance, ZiRecordRef, ZiRecordSerializer, ZiReferenceIndex, ZiScalarType,
    ZiSchemaCatalog, ZiStoredRecord, ZiWarningKind,
};

fn catalog() -> ZiSchemaCatalog {
    let mut catalog = ZiSchemaCatalog::default();
    catalog.insert(
        ZiModelSchema::new("x.product")
            .field(ZiFieldMeta::new("name", ZiFieldKind::scalar(ZiScalarType::Char)))
            .field(ZiFieldMeta::new("description", ZiFieldKind::scalar(ZiScalarType::Html)))
            .field(ZiFieldMeta::new("image", ZiFieldKind::Binary))
            .field(ZiFieldMeta::new(
                "tag_ids",
                ZiFieldKind::ManyToMany {
                    target: "x.tag".into(),
                },
            ))
            .field(ZiFieldMeta::new(
                "uom_id",
                ZiFieldKind::ManyToOne {
                    target: "uom.uom".into(),
                },
            )),
    );
    catalog.insert(ZiModelSchema::new("x.tag").field(ZiFieldMeta::new("name", ZiFieldKind::scalar(ZiScalarType::Char))));
    catalog.insert(
        ZiModelSchema::new("ir.attachment")
            .field(ZiFieldMeta::new("name", ZiFieldKind::scalar(ZiScalarType::Char)))
            .field(ZiFieldMeta::new("res_model", ZiFieldKind::scalar(ZiScalarType::Char)))
            .field(ZiFieldMeta::new(
                "res_id",
                ZiFieldKind::Reference {
                    model_field: "res_model".into(),
                },
            ))
            .field(ZiFieldMeta::new("datas", ZiFieldKind::Binary)),
    );
    catalog
}

fn candidate(record: ZiStoredRecord) -> ZiCandidateRecord {
    ZiCandidateRecord::new(record, ZiBucket::Data, ZiCandidateOrigin::Rule)
}

fn rows() -> Vec<ZiCandidateRecord> {
    vec![
        candidate(ZiStoredRecord::new("x.tag", 1).with_value("name", ZiFieldValue::text("Red"))),
        candidate(ZiStoredRecord::new("x.tag", 2).with_value("name", ZiFieldValue::text("Blue"))),
        candidate(
            ZiStoredRecord::new("x.product", 10)
                .with_value("name", ZiFieldValue::text("Desk"))
                .with_value("description", ZiFieldValue::text("<p>Solid\n\n  oak</p>"))
                .with_value("image", ZiFieldValue::Binary(vec![0x89, 0x50, 0x4e, 0x47]))
                .with_value("tag_ids", ZiFieldValue::ManyToMany(vec![2, 1, 3]))
                .with_value("uom_id", ZiFieldValue::ManyToOne(1)),
        ),
        candidate(
            ZiStoredRecord::new("ir.attachment", 5)
                .with_value("name", ZiFieldValue::text("spec sheet.pdf"))
                .with_value("res_model", ZiFieldValue::text("x.product"))
                .with_value("res_id", ZiFieldValue::Reference(10))
                .with_value("datas", ZiFieldValue::BinaryRef("ab/cdef".into())),
        ),
    ]
}

async fn serialize(rows: &[ZiCandidateRecord]) -> (String, Vec<(String, Vec<u8>)>, Vec<ZiWarningKind>) {
    let catalog = catalog();
    let store = ZiMemoryStore::new()
        .with_external_id("uom.uom", 1, "uom.product_uom_unit")
        .with_payload("ab/cdef", b"%PDF-1.4".to_vec());
    let registry = ZiIdentifierRegistry::new("custom");
    for row in rows {
        registry.assign(&row.record, "name");
    }
    let (index, index_warnings) = ZiReferenceIndex::build(&store, &registry, rows, &catalog).await;
    assert!(index_warnings.is_empty());
    let (payloads, payload_warnings) = ZiPayloadCache::prefetch(&store, rows).await;
    assert!(payload_warnings.is_empty());

    let mut extractor = ZiBinaryExtractor::new("custom", 0, &["ir.attachment".to_string()]);
    let (xml, warnings) = {
        let mut serializer = ZiRecordSerializer::new(&catalog, &index, &payloads, &mut extractor);
        let refs: Vec<&ZiCandidateRecord> = rows.iter().collect();
        let xml = serializer.write_file(&refs, false).unwrap();
        let kinds = serializer.warnings().iter().map(|w| w.kind).collect::<Vec<_>>();
        (String::from_utf8(xml).unwrap(), kinds)
    };
    let side_files = extractor.into_side_files().into_iter().collect();
    (xml, side_files, warnings)
}

#[tokio::test]
async fn test_serializer_relations_and_binaries() {
    let (xml, side_files, warnings) = serialize(&rows()).await;

    assert!(xml.contains(r#"<field name="tag_ids" eval="[Command.set([ref('custom.x_tag_blue'), ref('custom.x_tag_red')])]"/>"#));
    assert!(xml.contains(r#"<field name="uom_id" ref="uom.product_uom_unit"/>"#));
    assert!(xml.contains(r#"<field name="image" type="base64" file="custom/static/binary/x_product/10-image"/>"#));
    assert!(xml.contains(r#"<field name="res_id" eval="ref('custom.x_product_desk')"/>"#));
    assert!(xml.contains(r#"<field name="datas" type="base64" file="custom/static/binary/ir_attachment/5-spec_sheet.pdf"/>"#));
    // tag 3 was never exported and has no identifier
    assert_eq!(warnings, vec![ZiWarningKind::UnresolvedReference]);

    assert_eq!(
        side_files,
        vec![
            ("static/binary/ir_attachment/5-spec_sheet.pdf".to_string(), b"%PDF-1.4".to_vec()),
            ("static/binary/x_product/10-image".to_string(), vec![0x89, 0x50, 0x4e, 0x47]),
        ]
    );
}

#[tokio::test]
async fn test_serializer_preserves_multiline_text() {
    let (xml, _, _) = serialize(&rows()).await;
    assert!(xml.contains("<field name=\"description\">&lt;p&gt;Solid\n\n  oak&lt;/p&gt;</field>"));
}

#[tokio::test]
async fn test_serializer_output_is_stable() {
    let (first, first_files, _) = serialize(&rows()).await;
    let (second, second_files, _) = serialize(&rows()).await;
    assert_eq!(first, second);
    assert_eq!(first_files, second_files);
}

#[tokio::test]
async fn test_serializer_external_lookup_covers_only_unselected_rows() {
    let registry = ZiIdentifierRegistry::new("custom");
    let rows = rows();
    let store = ZiMemoryStore::new().with_external_id("uom.uom", 1, "uom.product_uom_unit");
    let (index, _) = ZiReferenceIndex::build(&store, &registry, &rows, &catalog()).await;
    assert_eq!(
        index.resolve(&ZiRecordRef::new("uom.uom", 1)).as_deref(),
        Some("uom.product_uom_unit")
    );
    assert!(index.is_selected(&ZiRecordRef::new("x.tag", 1)));
    assert!(index.resolve(&ZiRecordRef::new("x.tag", 3)).is_none());
}

#[test]
fn test_serializer_prefers_existing_identifiers() {
    let registry = ZiIdentifierRegistry::new("custom");
    let record = ZiStoredRecord::new("x.tag", 4)
        .with_value("name", ZiFieldValue::text("Green"))
        .with_provenance(ZiProvenance::created_by(6).with_external_id("__export__.x_tag_4_a1b2"));
    registry.assign(&record, "name");
    let selected: HashSet<ZiRecordRef> = [record.key()].into_iter().collect();
    let index = ZiReferenceIndex::new(&registry, selected);
    assert_eq!(
        index.resolve(&record.key()).as_deref(),
        Some("__export__.x_tag_4_a1b2")
    );
}
