//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.

use std::fs;

use zimod::{ZiModuleWriter, ZiOutputSet};

fn output(marker: &str) -> ZiOutputSet {
    let mut output = ZiOutputSet::new();
    output.insert("__manifest__.json", b"{\"name\": \"custom\"}\n".to_vec());
    output.insert("data/res_partner.xml", format!("<odoo>{}</odoo>\n", marker).into_bytes());
    output.insert("static/binary/res_partner/7-image_1920", vec![0, 1, 2, 255]);
    output
}

#[test]
fn test_directory_write_materializes_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let set = output("first");
    let target = ZiModuleWriter::new("custom").write(&set, dir.path()).unwrap();

    assert_eq!(target, dir.path().join("custom"));
    for (path, content) in set.iter() {
        assert_eq!(fs::read(target.join(path)).unwrap(), content);
    }
    let leftovers: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["custom".to_string()]);
}

#[test]
fn test_directory_write_replaces_previous_module() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ZiModuleWriter::new("custom");
    let mut first = output("first");
    first.insert("data/obsolete.xml", b"<odoo/>\n".to_vec());
    writer.write(&first, dir.path()).unwrap();

    let target = writer.write(&output("second"), dir.path()).unwrap();
    assert!(!target.join("data/obsolete.xml").exists());
    assert_eq!(
        fs::read_to_string(target.join("data/res_partner.xml")).unwrap(),
        "<odoo>second</odoo>\n"
    );
    assert!(!dir.path().join(".custom.old").exists());
    assert!(!dir.path().join(".custom.tmp").exists());
}

#[cfg(feature = "zip")]
#[test]
fn test_zip_write_is_reproducible() {
    use std::io::Read;
    use zimod::ZiOutputFormat;

    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();
    let writer = ZiModuleWriter::new("custom").with_format(ZiOutputFormat::Zip);
    let set = output("first");

    let first = writer.write(&set, first_dir.path()).unwrap();
    let second = writer.write(&set, second_dir.path()).unwrap();
    assert_eq!(first, first_dir.path().join("custom.zip"));
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

    let mut archive = zip::ZipArchive::new(fs::File::open(&first).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "custom/__manifest__.json",
            "custom/data/res_partner.xml",
            "custom/static/binary/res_partner/7-image_1920",
        ]
    );
    let mut content = Vec::new();
    archive
        .by_name("custom/static/binary/res_partner/7-image_1920")
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, vec![0, 1, 2, 255]);
    assert!(!first_dir.path().join(".custom.zip.tmp").exists());
}
