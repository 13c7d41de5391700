//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.

use zimod::{
    ZiAttachmentPass, ZiBucket, ZiCandidateOrigin, ZiExportConfig, ZiExportModelRule,
    ZiExportSelector, ZiFieldKind, ZiFieldMeta, ZiFieldValue, ZiKeepAll, ZiMemoryStore,
    ZiModelSchema, ZiPristinePolicy, ZiProvenance, ZiRecordRef, ZiScalarType, ZiSchemaCatalog,
    ZiStoredRecord, ZiWarningKind,
};

fn catalog() -> ZiSchemaCatalog {
    let mut catalog = ZiSchemaCatalog::default();
    catalog.insert(
        ZiModelSchema::new("res.partner")
            .field(ZiFieldMeta::new("name", ZiFieldKind::scalar(ZiScalarType::Char)))
            .field(ZiFieldMeta::new(
                "country_id",
                ZiFieldKind::ManyToOne {
                    target: "res.country".into(),
                },
            ))
            .field(ZiFieldMeta::new(
                "contract_id",
                ZiFieldKind::ManyToOne {
                    target: "ir.attachment".into(),
                },
            ))
            .field(ZiFieldMeta::new(
                "user_ids",
                ZiFieldKind::OneToMany {
                    target: "res.users".into(),
                    inverse: "partner_id".into(),
                },
            )),
    );
    catalog.insert(
        ZiModelSchema::new("res.country").field(ZiFieldMeta::new("name", ZiFieldKind::scalar(ZiScalarType::Char))),
    );
    catalog
}

fn partner(id: i64, name: &str) -> ZiStoredRecord {
    ZiStoredRecord::new("res.partner", id)
        .with_value("name", ZiFieldValue::text(name))
        .with_provenance(ZiProvenance::created_by(6))
}

#[tokio::test]
async fn test_selector_security_filter_cannot_be_overridden() {
    let store = ZiMemoryStore::new()
        .with_record(partner(1, "Customer"))
        .with_record(partner(2, "Employee").with_value("user_ids", ZiFieldValue::OneToMany(vec![7])));
    let config = ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("res.partner").with_domain("[('user_ids', '!=', False)]"));
    let catalog = catalog();
    let selection = ZiExportSelector::new(&config, &catalog, &ZiKeepAll).select(&store).await;
    assert!(selection.is_empty());

    let open = ZiExportConfig::new("custom").with_rule(ZiExportModelRule::new("res.partner"));
    let selection = ZiExportSelector::new(&open, &catalog, &ZiKeepAll).select(&store).await;
    let ids: Vec<i64> = selection.candidates.iter().map(|c| c.record.id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_selector_login_accounts_are_never_selected_by_rules() {
    let store = ZiMemoryStore::new().with_record(ZiStoredRecord::new("res.users", 7));
    let config = ZiExportConfig::new("custom").with_rule(ZiExportModelRule::new("res.users"));
    let catalog = ZiSchemaCatalog::default();
    let selection = ZiExportSelector::new(&config, &catalog, &ZiKeepAll).select(&store).await;
    assert!(selection.is_empty());
}

#[tokio::test]
async fn test_selector_pristine_seed_data_is_dropped_until_edited() {
    let seed = ZiStoredRecord::new("res.country", 21)
        .with_value("name", ZiFieldValue::text("Belgium"))
        .with_provenance(ZiProvenance::created_by(1).with_external_id("base.be"));
    let config = ZiExportConfig::new("custom").with_rule(ZiExportModelRule::new("res.country"));
    let catalog = catalog();
    let policy = ZiPristinePolicy::default();

    let store = ZiMemoryStore::new().with_record(seed.clone());
    let selection = ZiExportSelector::new(&config, &catalog, &policy).select(&store).await;
    assert!(selection.is_empty());

    let edited = seed.with_provenance(ZiProvenance::created_by(1).written_by(6).with_external_id("base.be"));
    let store = ZiMemoryStore::new().with_record(edited);
    let selection = ZiExportSelector::new(&config, &catalog, &policy).select(&store).await;
    assert_eq!(selection.candidates.len(), 1);
}

#[tokio::test]
async fn test_selector_forces_pristine_rows_reachable_from_included_rows() {
    let store = ZiMemoryStore::new()
        .with_record(partner(1, "Customer").with_value("country_id", ZiFieldValue::ManyToOne(21)))
        .with_record(
            ZiStoredRecord::new("res.country", 21)
                .with_value("name", ZiFieldValue::text("Belgium"))
                .with_provenance(ZiProvenance::created_by(1).with_external_id("base.be")),
        )
        .with_record(
            ZiStoredRecord::new("res.country", 22)
                .with_value("name", ZiFieldValue::text("France"))
                .with_provenance(ZiProvenance::created_by(1).with_external_id("base.fr")),
        );
    let config = ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("res.partner").include_attachment())
        .with_rule(ZiExportModelRule::new("res.country"));
    let catalog = catalog();
    let policy = ZiPristinePolicy::default();
    let selection = ZiExportSelector::new(&config, &catalog, &policy).select(&store).await;

    let keys: Vec<ZiRecordRef> = selection.candidates.iter().map(|c| c.key()).collect();
    assert_eq!(
        keys,
        vec![ZiRecordRef::new("res.partner", 1), ZiRecordRef::new("res.country", 21)]
    );
    assert_eq!(selection.candidates[1].origin, ZiCandidateOrigin::Forced);
}

#[tokio::test]
async fn test_selector_access_denied_skips_only_that_model() {
    let store = ZiMemoryStore::new()
        .with_record(partner(1, "Customer"))
        .with_record(ZiStoredRecord::new("res.country", 21))
        .deny("res.country");
    let config = ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("res.partner"))
        .with_rule(ZiExportModelRule::new("res.country"));
    let catalog = catalog();
    let selection = ZiExportSelector::new(&config, &catalog, &ZiKeepAll).select(&store).await;

    assert_eq!(selection.candidates.len(), 1);
    assert_eq!(selection.model_order, vec!["res.partner".to_string()]);
    assert_eq!(selection.warnings.len(), 1);
    assert_eq!(selection.warnings[0].kind, ZiWarningKind::AccessDenied);
    assert_eq!(selection.warnings[0].model.as_deref(), Some("res.country"));
}

#[tokio::test]
async fn test_selector_collects_attachment_passes() {
    let attachment = |id: i64, res_id: i64| {
        ZiStoredRecord::new("ir.attachment", id)
            .with_value("name", ZiFieldValue::text(format!("file{}.pdf", id)))
            .with_value("res_model", ZiFieldValue::text(if res_id > 0 { "res.partner" } else { "" }))
            .with_value("res_id", ZiFieldValue::Reference(res_id))
    };
    let store = ZiMemoryStore::new()
        .with_record(partner(1, "Customer").with_value("contract_id", ZiFieldValue::ManyToOne(50)))
        .with_record(attachment(50, 0))
        .with_record(attachment(51, 1))
        .with_record(attachment(52, 99));
    let config = ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("res.partner").demo().include_attachment());
    let catalog = catalog();
    let selection = ZiExportSelector::new(&config, &catalog, &ZiKeepAll).select(&store).await;

    let passes: Vec<(i64, Option<ZiAttachmentPass>)> = selection
        .candidates
        .iter()
        .filter(|c| c.model() == "ir.attachment")
        .map(|c| (c.record.id, c.attachment_pass().map(|(_, pass)| pass)))
        .collect();
    assert_eq!(
        passes,
        vec![(50, Some(ZiAttachmentPass::Pre)), (51, Some(ZiAttachmentPass::Post))]
    );
    assert!(selection.candidates.iter().all(|c| c.bucket == ZiBucket::Demo));
}

#[tokio::test]
async fn test_selector_customizations_take_the_rule_bucket() {
    let store = ZiMemoryStore::new().with_record(
        partner(3, "Seeded").with_provenance(ZiProvenance::created_by(1).with_external_id("base.partner_demo")),
    );
    let config = ZiExportConfig::new("custom")
        .with_rule(ZiExportModelRule::new("res.partner").demo().no_update().exclude("phone"))
        .with_customization("res.partner", 3);
    let catalog = catalog();
    let policy = ZiPristinePolicy::default();
    let selection = ZiExportSelector::new(&config, &catalog, &policy).select(&store).await;

    assert_eq!(selection.candidates.len(), 1);
    let candidate = &selection.candidates[0];
    assert_eq!(candidate.origin, ZiCandidateOrigin::Customization);
    assert_eq!(candidate.bucket, ZiBucket::Demo);
    assert!(candidate.no_update);
    assert!(candidate.excluded_fields.contains("phone"));
}

#[tokio::test]
async fn test_selector_loads_main_attachment_before_its_owner() {
    let store = ZiMemoryStore::new()
        .with_record(partner(1, "Customer").with_value("contract_id", ZiFieldValue::ManyToOne(60)))
        .with_record(
            ZiStoredRecord::new("ir.attachment", 60)
                .with_value("name", ZiFieldValue::text("contract.pdf"))
                .with_value("res_model", ZiFieldValue::text("res.partner"))
                .with_value("res_id", ZiFieldValue::Reference(1)),
        );
    let config = ZiExportConfig::new("custom").with_rule(ZiExportModelRule::new("res.partner").include_attachment());
    let catalog = catalog();
    let selection = ZiExportSelector::new(&config, &catalog, &ZiKeepAll).select(&store).await;

    let attachments: Vec<_> = selection
        .candidates
        .iter()
        .filter(|c| c.model() == "ir.attachment")
        .collect();
    assert_eq!(attachments.len(), 1);
    assert_eq!(
        attachments[0].attachment_pass(),
        Some(("res.partner", ZiAttachmentPass::Pre))
    );

    let back_references: Vec<_> = selection
        .warnings
        .iter()
        .filter(|w| w.kind == ZiWarningKind::CircularDependency)
        .collect();
    assert_eq!(back_references.len(), 1);
    assert_eq!(back_references[0].model.as_deref(), Some("ir.attachment"));
}
