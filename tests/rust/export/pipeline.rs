//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.

use std::sync::Arc;

use zimod::export::{MANIFEST_FILE, WARNINGS_FILE};
use zimod::{
    ZiExportConfig, ZiExportModelRule, ZiExporter, ZiFieldKind, ZiFieldMeta, ZiFieldValue,
    ZiFileRole, ZiIdentifierRegistry, ZiManifest, ZiMemoryStore, ZiModelSchema, ZiProvenance,
    ZiRecordRef, ZiScalarType, ZiStaticMetadata, ZiStoredRecord, ZiWarningKind,
};

fn schema(model: &str, links: &[(&str, &str)]) -> ZiModelSchema {
    let mut schema = ZiModelSchema::new(model)
        .with_module("custom_app")
        .field(ZiFieldMeta::new("name", ZiFieldKind::scalar(ZiScalarType::Char)));
    for (field, target) in links {
        schema = schema.field(ZiFieldMeta::new(
            field,
            ZiFieldKind::ManyToOne {
                target: target.to_string(),
            },
        ));
    }
    schema
}

fn row(model: &str, id: i64, name: &str) -> ZiStoredRecord {
    ZiStoredRecord::new(model, id)
        .with_value("name", ZiFieldValue::text(name))
        .with_provenance(ZiProvenance::created_by(6))
}

fn exporter(config: ZiExportConfig, store: ZiMemoryStore, metadata: ZiStaticMetadata) -> ZiExporter {
    ZiExporter::new(config, Arc::new(store), Arc::new(metadata))
}

#[tokio::test]
async fn test_export_orders_dependencies_and_drops_unresolvable_references() {
    let metadata = ZiStaticMetadata::new()
        .with_model(schema("x.m1", &[]))
        .with_model(schema("x.m2", &[("m3_id", "x.m3")]))
        .with_model(schema("x.m3", &[("m1_id", "x.m1")]));
    let store = ZiMemoryStore::new()
        .with_record(row("x.m1", 1, "One"))
        .with_record(row("x.m2", 2, "Two").with_value("m3_id", ZiFieldValue::ManyToOne(3)))
        .with_record(row("x.m3", 3, "Three").with_value("m1_id", ZiFieldValue::ManyToOne(1)));
    let config = ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("x.m2"))
        .with_rule(ZiExportModelRule::new("x.m3"));

    let result = exporter(config, store, metadata).run().await.unwrap();

    assert_eq!(result.manifest.data, vec!["data/x_m3.xml", "data/x_m2.xml"]);
    assert!(result.manifest.demo.is_empty());
    let m3 = result.output.text("data/x_m3.xml").unwrap();
    assert!(!m3.contains("m1_id"));
    let m2 = result.output.text("data/x_m2.xml").unwrap();
    assert!(m2.contains(r#"<field name="m3_id" ref="custom.x_m3_three"/>"#));

    let unresolved: Vec<_> = result
        .warnings
        .iter()
        .filter(|w| w.kind == ZiWarningKind::UnresolvedReference)
        .collect();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].model.as_deref(), Some("x.m3"));
    assert!(result.cycles.is_empty());
    assert!(!result.output.contains(WARNINGS_FILE));
}

#[tokio::test]
async fn test_export_reports_cycle_and_keeps_every_reference() {
    let metadata = ZiStaticMetadata::new()
        .with_model(schema("x.m1", &[("m2_id", "x.m2")]))
        .with_model(schema("x.m2", &[("m3_id", "x.m3")]))
        .with_model(schema("x.m3", &[("m1_id", "x.m1")]));
    let store = ZiMemoryStore::new()
        .with_record(row("x.m1", 1, "One").with_value("m2_id", ZiFieldValue::ManyToOne(2)))
        .with_record(row("x.m2", 2, "Two").with_value("m3_id", ZiFieldValue::ManyToOne(3)))
        .with_record(row("x.m3", 3, "Three").with_value("m1_id", ZiFieldValue::ManyToOne(1)));
    let config = ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("x.m1"))
        .with_rule(ZiExportModelRule::new("x.m2"))
        .with_rule(ZiExportModelRule::new("x.m3"));

    let result = exporter(config, store, metadata).run().await.unwrap();

    assert_eq!(result.manifest.data.len(), 3);
    assert_eq!(result.cycles.len(), 1);
    let report = result.output.text(WARNINGS_FILE).unwrap();
    assert_eq!(report.lines().count(), 1);
    assert!(report.starts_with("Found 3 circular dependencies"));
    assert!(report.trim_end().ends_with(": x.m1 -> x.m2 -> x.m3 -> x.m1"));

    assert!(result.output.text("data/x_m1.xml").unwrap().contains(r#"ref="custom.x_m2_two""#));
    assert!(result.output.text("data/x_m2.xml").unwrap().contains(r#"ref="custom.x_m3_three""#));
    assert!(result.output.text("data/x_m3.xml").unwrap().contains(r#"ref="custom.x_m1_one""#));
    assert!(result
        .warnings
        .iter()
        .all(|w| w.kind != ZiWarningKind::UnresolvedReference));
    assert_eq!(
        result
            .warnings
            .iter()
            .filter(|w| w.kind == ZiWarningKind::CircularDependency)
            .count(),
        1
    );
}

fn catalog_store() -> (ZiStaticMetadata, ZiMemoryStore) {
    let metadata = ZiStaticMetadata::new()
        .with_model(
            schema("x.product", &[("uom_id", "uom.uom"), ("categ_id", "x.category")])
                .field(ZiFieldMeta::new("image", ZiFieldKind::Binary)),
        )
        .with_model(schema("x.category", &[]))
        .with_model(ZiModelSchema::new("uom.uom").with_module("uom"));
    let store = ZiMemoryStore::new()
        .with_record(row("x.category", 4, "Furniture"))
        .with_record(
            row("x.product", 8, "Desk")
                .with_value("categ_id", ZiFieldValue::ManyToOne(4))
                .with_value("uom_id", ZiFieldValue::ManyToOne(1))
                .with_value("image", ZiFieldValue::BinaryRef("img/desk".into())),
        )
        .with_record(
            row("x.product", 9, "Chair")
                .with_value("categ_id", ZiFieldValue::ManyToOne(4))
                .with_value("image", ZiFieldValue::BinaryRef("img/missing".into())),
        )
        .with_record(
            ZiStoredRecord::new("x.product", 10)
                .with_value("name", ZiFieldValue::text("Seeded"))
                .with_provenance(ZiProvenance::created_by(1).with_external_id("stock.product_seeded")),
        )
        .with_external_id("uom.uom", 1, "uom.product_uom_unit")
        .with_payload("img/desk", vec![7; 64]);
    (metadata, store)
}

fn catalog_config() -> ZiExportConfig {
    ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("x.product").demo().include_attachment())
        .with_rule(ZiExportModelRule::new("x.category").no_update())
        .with_rule(ZiExportModelRule::new("x.empty"))
}

#[tokio::test]
async fn test_export_builds_complete_module() {
    let (metadata, store) = catalog_store();
    let result = exporter(catalog_config(), store, metadata).run().await.unwrap();
    let manifest = &result.manifest;

    assert_eq!(manifest.data, vec!["data/x_category.xml"]);
    assert_eq!(manifest.demo, vec!["demo/x_product.xml"]);
    assert_eq!(manifest.depends, vec!["base", "uom"]);
    assert!(manifest.file("data/x_category.xml").unwrap().no_update);
    assert_eq!(manifest.file("demo/x_product.xml").unwrap().role, ZiFileRole::Records);
    assert_eq!(manifest.file("demo/x_product.xml").unwrap().records, 2);
    assert!(result
        .output
        .text("data/x_category.xml")
        .unwrap()
        .contains("<odoo noupdate=\"1\">"));

    // pristine seed product stays out
    let products = result.output.text("demo/x_product.xml").unwrap();
    assert!(!products.contains("Seeded"));
    assert!(products.contains(r#"<field name="uom_id" ref="uom.product_uom_unit"/>"#));

    // extracted payload
    assert!(products.contains(r#"file="custom/static/binary/x_product/8-image""#));
    assert_eq!(result.output.get("static/binary/x_product/8-image"), Some(&[7u8; 64][..]));
    assert_eq!(manifest.side_files, vec!["static/binary/x_product/8-image"]);

    // failed payload only costs the field
    assert!(products.contains("custom.x_product_chair"));
    assert!(!products.contains("9-image"));
    assert!(result.warnings.iter().any(|w| w.kind == ZiWarningKind::BinaryPayload));

    // no empty files
    for path in result.output.paths().filter(|p| p.ends_with(".xml")) {
        assert!(result.output.text(path).unwrap().contains("<record "), "{} is empty", path);
    }
    assert!(!result.output.contains("data/x_empty.xml"));

    let stored: ZiManifest = ZiManifest::from_json(result.output.text(MANIFEST_FILE).unwrap()).unwrap();
    assert_eq!(&stored, manifest);
    assert_eq!(result.stats.data_records, 1);
    assert_eq!(result.stats.demo_records, 2);
    assert_eq!(result.stats.side_files, 1);
}

#[tokio::test]
async fn test_export_is_idempotent_across_runs_and_registries() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("identifiers.json");

    let (metadata, store) = catalog_store();
    let first = exporter(catalog_config(), store, metadata);
    let first_result = first.run().await.unwrap();
    first.registry().save(&registry_path).unwrap();

    let (metadata, store) = catalog_store();
    let registry = Arc::new(ZiIdentifierRegistry::load("custom", &registry_path).unwrap());
    let second = exporter(catalog_config(), store, metadata).with_registry(registry);
    let second_result = second.run().await.unwrap();

    assert_eq!(first_result.output, second_result.output);
    assert_eq!(first_result.manifest, second_result.manifest);
}

#[tokio::test]
async fn test_export_skips_denied_models() {
    let (metadata, store) = catalog_store();
    let result = exporter(catalog_config(), store.deny("x.category"), metadata)
        .run()
        .await
        .unwrap();
    assert!(result.manifest.data.is_empty());
    assert_eq!(result.manifest.demo, vec!["demo/x_product.xml"]);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.kind == ZiWarningKind::AccessDenied && w.model.as_deref() == Some("x.category")));
}

#[tokio::test]
async fn test_export_rejects_duplicate_rules_before_reading() {
    let (metadata, store) = catalog_store();
    let config = catalog_config().with_rule(ZiExportModelRule::new("x.category").demo());
    let err = exporter(config, store, metadata).run().await.unwrap_err();
    assert!(err.is_rejected_configuration());
}

#[tokio::test]
async fn test_export_rejects_foreign_registry() {
    let (metadata, store) = catalog_store();
    let err = exporter(catalog_config(), store, metadata)
        .with_registry(Arc::new(ZiIdentifierRegistry::new("other")))
        .run()
        .await
        .unwrap_err();
    assert!(err.is_rejected_configuration());
}

fn tag_export(store: ZiMemoryStore) -> ZiExporter {
    let metadata = ZiStaticMetadata::new().with_model(schema("x.tag", &[]));
    exporter(ZiExportConfig::new("custom").with_rule(ZiExportModelRule::new("x.tag")), store, metadata)
}

#[tokio::test]
async fn test_export_never_shares_an_identifier_between_rows() {
    let store = ZiMemoryStore::new().with_record(row("x.tag", 1, "Red")).with_record(
        ZiStoredRecord::new("x.tag", 2)
            .with_value("name", ZiFieldValue::text("Crimson"))
            .with_provenance(ZiProvenance::created_by(6).with_external_id("custom.x_tag_red")),
    );
    let export = tag_export(store);
    let result = export.run().await.unwrap();

    let tags = result.output.text("data/x_tag.xml").unwrap();
    assert_eq!(tags.matches(r#"id="custom.x_tag_red""#).count(), 1);
    assert_eq!(tags.matches(r#"id="custom.x_tag_red_2""#).count(), 1);
    assert_eq!(
        export.registry().lookup(&ZiRecordRef::new("x.tag", 2)).as_deref(),
        Some("custom.x_tag_red")
    );
    assert!(result
        .warnings
        .iter()
        .all(|w| w.kind != ZiWarningKind::IdentifierConflict));
}

#[tokio::test]
async fn test_export_warns_when_saved_identifier_is_claimed_by_another_row() {
    let registry = Arc::new(ZiIdentifierRegistry::new("custom"));
    registry.assign(&row("x.tag", 1, "Red"), "name");

    let store = ZiMemoryStore::new().with_record(row("x.tag", 1, "Red")).with_record(
        ZiStoredRecord::new("x.tag", 2)
            .with_value("name", ZiFieldValue::text("Crimson"))
            .with_provenance(ZiProvenance::created_by(6).with_external_id("custom.x_tag_red")),
    );
    let result = tag_export(store).with_registry(registry).run().await.unwrap();

    let tags = result.output.text("data/x_tag.xml").unwrap();
    assert_eq!(tags.matches(r#"id="custom.x_tag_red""#).count(), 1);
    assert!(tags.contains(r#"id="custom.x_tag_crimson""#));
    let conflicts: Vec<_> = result
        .warnings
        .iter()
        .filter(|w| w.kind == ZiWarningKind::IdentifierConflict)
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].model.as_deref(), Some("x.tag"));
}

#[tokio::test]
async fn test_export_keeps_rows_installed_from_this_module() {
    let store = ZiMemoryStore::new().with_record(
        ZiStoredRecord::new("x.tag", 1)
            .with_value("name", ZiFieldValue::text("Red"))
            .with_provenance(ZiProvenance::created_by(1).with_external_id("custom.x_tag_red")),
    );
    let result = tag_export(store).run().await.unwrap();

    assert_eq!(result.manifest.data, vec!["data/x_tag.xml"]);
    assert!(result
        .output
        .text("data/x_tag.xml")
        .unwrap()
        .contains(r#"<record id="custom.x_tag_red" model="x.tag">"#));
}
