//! End-to-end tests for the fixup pipeline
//!
//! These write a backup export to a temp directory, run the same
//! `run_fixup` entry point the `wp-fixup` binary uses, and inspect the
//! re-parsed output.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use wp_message_fixup::tree::{Document, Element};
use wp_message_fixup::{run_fixup, FixupConfig, FixupOptions};

/// Encode a solid 1x1 RGBA PNG with the `png` codec.
fn tiny_png() -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 1, 1);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[255, 0, 0, 255]).unwrap();
    }
    out
}

fn config(dir: &Path, substitutions: &[&[&str]], options: FixupOptions) -> FixupConfig {
    FixupConfig {
        input: dir.join("backup.xml"),
        output: dir.join("fixed.xml"),
        substitutions: substitutions
            .iter()
            .map(|d| d.iter().map(|s| s.to_string()).collect())
            .collect(),
        options,
    }
}

fn all_tagged<'a>(root: &'a Element, tag: &'a str) -> Vec<&'a Element> {
    root.iter_with_parent(Some(tag)).map(|v| v.element).collect()
}

#[test]
fn test_two_message_document() {
    let dir = tempfile::tempdir().unwrap();
    let xml = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<smses count="2">
  <mms date="1600000000000" m_id="m1" sub="0" msg_box="1" address="">
    <parts />
    <addrs>
      <addr address="555" type="137" charset="106" />
      <addr address="777" type="151" charset="106" />
    </addrs>
  </mms>
  <sms address="777" body="" type="1" />
</smses>
"#;
    std::fs::write(dir.path().join("backup.xml"), xml).unwrap();

    let cfg = config(
        dir.path(),
        &[],
        FixupOptions {
            current_number: Some("555".to_string()),
            delete_empty_sms: true,
            fix_smil: true,
        },
    );
    let report = run_fixup(&cfg).unwrap();
    assert_eq!(report.mms_marked_sent, 1);
    assert_eq!(report.sms_deleted, 1);

    let out = std::fs::read_to_string(&cfg.output).unwrap();
    assert!(out.starts_with("<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>"));
    let doc = Document::parse(&out).unwrap();

    let mms = all_tagged(&doc.root, "mms");
    assert_eq!(mms.len(), 1);
    assert_eq!(mms[0].attr("msg_box"), Some("2"));
    assert_eq!(mms[0].attr("address"), Some("777"));
    assert_eq!(mms[0].attr("sub"), Some("null"));
    assert!(all_tagged(&doc.root, "sms").is_empty());
}

#[test]
fn test_substitutions_scoping_and_smil_repair() {
    let dir = tempfile::tempdir().unwrap();
    let image = STANDARD.encode(tiny_png());
    let xml = format!(
        r#"<smses count="4">
  <mms m_id="m1" sub="Photos" msg_box="1" address="">
    <parts>
      <part seq="-1" ct="application/smil" chset="" cl="smil.xml" cid="&lt;smil&gt;" data="{image}" />
      <part seq="0" ct="text/plain" chset="106" cl="txt000.txt" text="Look" />
      <part seq="1" ct="application/smil" cl="a.smil" data="{image}" />
    </parts>
    <addrs>
      <addr address="5551111" type="137" charset="106" />
      <addr address="5552222" type="151" charset="106" />
    </addrs>
  </mms>
  <mms m_id="m2" sub="null" msg_box="1" address="">
    <parts>
      <part seq="-1" ct="application/smil" chset="" cl="smil.xml" data="{image}" />
    </parts>
    <addrs>
      <addr address="5551111" type="137" charset="106" />
      <addr address="insert-address-token" type="151" charset="106" />
    </addrs>
  </mms>
  <sms address="5551111" body="Hi&#10;there" type="1" />
  <sms address="5552222" type="2" />
</smses>"#
    );
    std::fs::write(dir.path().join("backup.xml"), xml).unwrap();

    let cfg = config(
        dir.path(),
        &[
            &["5551111,+15551111"],
            &["m1", "5551111,+15559999", "5552222,+15552222"],
            &["+15551111,+15550000"],
        ],
        FixupOptions {
            current_number: Some("+15552222".to_string()),
            delete_empty_sms: false,
            fix_smil: true,
        },
    );
    let report = run_fixup(&cfg).unwrap();
    assert_eq!(report.parts_repaired, 3);
    assert_eq!(report.sms_deleted, 0);

    let doc = Document::parse(&std::fs::read_to_string(&cfg.output).unwrap()).unwrap();
    let mms = all_tagged(&doc.root, "mms");

    // Universal rule #0 precedes the scoped rules, and nothing chains
    let m1_addr_elems = all_tagged(mms[0], "addr");
    let m1_addrs: Vec<&str> = m1_addr_elems
        .iter()
        .filter_map(|a| a.attr("address"))
        .collect();
    assert_eq!(m1_addrs, vec!["+15551111", "+15552222"]);
    assert_eq!(mms[0].attr("address"), Some("+15551111~+15552222"));
    assert_eq!(mms[0].attr("msg_box"), Some("1"));
    assert_eq!(mms[0].attr("sub"), Some("Photos"));

    // Placeholder with a recipient type code does not mark the message sent
    assert_eq!(mms[1].attr("address"), Some("+15551111~insert-address-token"));
    assert_eq!(mms[1].attr("msg_box"), Some("1"));

    let m1_parts = all_tagged(mms[0], "part");
    assert_eq!(m1_parts[0].attr("ct"), Some("image/png"));
    assert_eq!(m1_parts[0].attr("chset"), Some("null"));
    assert_eq!(m1_parts[0].attr("cl"), Some("image000000.png"));
    assert_eq!(m1_parts[0].attr("cid"), Some("<image000000.png>"));
    assert_eq!(m1_parts[1].attr("ct"), Some("text/plain"));
    assert_eq!(m1_parts[2].attr("cl"), Some("image000001.png"));
    assert_eq!(m1_parts[2].attr("cid"), Some("<image000001.png>"));

    // Numbering restarts for every message
    let m2_parts = all_tagged(mms[1], "part");
    assert_eq!(m2_parts[0].attr("cl"), Some("image000000.png"));

    let sms = all_tagged(&doc.root, "sms");
    assert_eq!(sms.len(), 2);
    assert_eq!(sms[0].attr("address"), Some("+15551111"));
    assert_eq!(sms[0].attr("body"), Some("Hi\nthere"));
    // Only an m1-scoped rule covers this number, and SMS never see scoped rules
    assert_eq!(sms[1].attr("address"), Some("5552222"));
}

#[test]
fn test_smil_repair_disabled_leaves_parts() {
    let dir = tempfile::tempdir().unwrap();
    let image = STANDARD.encode(tiny_png());
    let xml = format!(
        r#"<smses><mms m_id="m1"><parts><part ct="application/smil" data="{image}" /></parts></mms></smses>"#
    );
    std::fs::write(dir.path().join("backup.xml"), xml).unwrap();

    let cfg = config(dir.path(), &[], FixupOptions::default());
    let report = run_fixup(&cfg).unwrap();
    assert_eq!(report.parts_repaired, 0);

    let doc = Document::parse(&std::fs::read_to_string(&cfg.output).unwrap()).unwrap();
    let parts = all_tagged(&doc.root, "part");
    assert_eq!(parts[0].attr("ct"), Some("application/smil"));
    assert_eq!(parts[0].attr("chset"), None);
}

#[test]
fn test_malformed_substitution_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("backup.xml"),
        r#"<smses><sms address="1" body="" /></smses>"#,
    )
    .unwrap();

    let cfg = config(
        dir.path(),
        &[&["1,2"], &["3,4", "5"]],
        FixupOptions {
            delete_empty_sms: true,
            ..FixupOptions::default()
        },
    );
    assert!(run_fixup(&cfg).is_err());
    assert!(!cfg.output.exists());
}

#[test]
fn test_invalid_xml_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("backup.xml"), "<smses><sms></smses>").unwrap();

    let cfg = config(dir.path(), &[], FixupOptions::default());
    let err = run_fixup(&cfg).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse XML"));
    assert!(!cfg.output.exists());
}
