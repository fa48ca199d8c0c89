use std::sync::Arc;

use image::Rgba;
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use stampdesk::engine::{DocPoint, Stamp, StampId, StampImage};
use stampdesk::export::lopdf_backend::{LopdfMutator, page_rotations};
use stampdesk::export::{SkippedStamp, export_stamps};
use stampdesk::test_utils::test_helpers::{FakeOpener, FakeSource, solid_stamp};
use stampdesk::{Session, SessionOptions};

/// Minimal PDF of 600x800 pages with the given `/Rotate` values.
///
/// `inherited_rotate` is set on the page tree node instead of the pages.
fn build_pdf(rotations: &[i64], inherited_rotate: Option<i64>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for &rotate in rotations {
        let content = doc.add_object(Stream::new(
            dictionary! {},
            b"0 0 1 rg 0 0 10 10 re f".to_vec(),
        ));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content,
        };
        if inherited_rotate.is_none() {
            page.set("Rotate", rotate);
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => rotations.len() as i64,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(600),
            Object::Integer(800),
        ],
    };
    if let Some(rotate) = inherited_rotate {
        pages.set("Rotate", rotate);
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn stamp(id: u64, page: usize, image: &Arc<StampImage>) -> Stamp {
    Stamp {
        id: StampId(id),
        image: image.clone(),
        position: DocPoint::new(50.0, 50.0),
        scale: 1.0,
        page,
        last_interacted_at: id,
    }
}

fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Concatenated content streams of a page
fn page_content(doc: &Document, page: ObjectId) -> String {
    let dict = doc.get_object(page).unwrap().as_dict().unwrap();
    let refs: Vec<ObjectId> = match dict.get(b"Contents").unwrap() {
        Object::Array(items) => items.iter().map(|o| o.as_reference().unwrap()).collect(),
        Object::Reference(id) => vec![*id],
        other => panic!("unexpected contents {other:?}"),
    };
    refs.iter()
        .map(|id| {
            let stream = doc.get_object(*id).unwrap().as_stream().unwrap();
            String::from_utf8_lossy(&stream.content).into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn xobject_count(doc: &Document, subtype: &[u8]) -> usize {
    doc.objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .filter(|s| {
            s.dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|name| name == subtype)
        })
        .count()
}

fn image_xobject_count(doc: &Document) -> usize {
    xobject_count(doc, b"Image")
}

/// Deepest `q` nesting reached by a content string
fn max_q_depth(content: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0;
    for token in content.split_whitespace() {
        match token {
            "q" => {
                depth += 1;
                max = max.max(depth);
            }
            "Q" => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

#[test]
fn unsupported_rotation_is_skipped_and_the_rest_exported() {
    let bytes = build_pdf(&[0, 90, 45], None);
    let image = solid_stamp(100, 50, Rgba([200, 0, 0, 255]));
    // most recent first
    let stamps = vec![stamp(3, 2, &image), stamp(2, 1, &image), stamp(1, 0, &image)];

    let mut mutator = LopdfMutator::load(&bytes).unwrap();
    let report = export_stamps(&mut mutator, &stamps, 100.0).unwrap();

    assert_eq!(report.embedded, 2);
    assert_eq!(
        report.skipped,
        vec![SkippedStamp {
            stamp: StampId(3),
            page: 2,
            rotation: 45
        }]
    );

    let out = Document::load_mem(&report.bytes).unwrap();
    let pages = page_ids(&out);

    let first = page_content(&out, pages[0]);
    assert!(first.starts_with("q\n"));
    assert!(first.contains("0 0 1 rg 0 0 10 10 re f"));
    assert!(first.contains("q 100.0000 0.0000 0.0000 50.0000 50.0000 700.0000 cm /Stamp1 Do Q"));

    // 90 degree page: rotated about the projected origin
    let second = page_content(&out, pages[1]);
    assert!(second.contains("q 0.0000 100.0000 -50.0000 0.0000 100.0000 50.0000 cm /Stamp1 Do Q"));

    let third = page_content(&out, pages[2]);
    assert!(!third.contains("Do"));

    // one RGB image plus its soft mask, shared by both stamps
    assert_eq!(image_xobject_count(&out), 2);
}

#[test]
fn drawn_stamp_is_registered_in_page_resources() {
    let bytes = build_pdf(&[0], None);
    let image = solid_stamp(10, 10, Rgba([0, 0, 0, 128]));
    let stamps = vec![stamp(1, 0, &image)];

    let mut mutator = LopdfMutator::load(&bytes).unwrap();
    let report = export_stamps(&mut mutator, &stamps, 100.0).unwrap();

    let out = Document::load_mem(&report.bytes).unwrap();
    let page = out.get_object(page_ids(&out)[0]).unwrap().as_dict().unwrap();
    let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
    let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
    let image_id = xobjects.get(b"Stamp1").unwrap().as_reference().unwrap();

    let stream = out.get_object(image_id).unwrap().as_stream().unwrap();
    assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 10);
    assert!(stream.dict.get(b"SMask").is_ok());
    assert_eq!(stream.content.len(), 10 * 10 * 3);
}

#[test]
fn rotation_is_inherited_from_the_page_tree() {
    let bytes = build_pdf(&[0, 0], Some(90));
    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(page_rotations(&doc), vec![90, 90]);
}

#[test]
fn stamp_on_missing_page_fails_the_export() {
    let bytes = build_pdf(&[0], None);
    let image = solid_stamp(10, 10, Rgba([0, 0, 0, 255]));
    let stamps = vec![stamp(1, 4, &image)];

    let mut mutator = LopdfMutator::load(&bytes).unwrap();
    assert!(export_stamps(&mut mutator, &stamps, 100.0).is_err());
}

#[test]
fn session_exports_placed_stamps_to_file() {
    let bytes = build_pdf(&[0, 0], None);
    let source = FakeSource::uniform(2, 600.0, 800.0);
    let mut session =
        Session::new(FakeOpener::new(source), bytes, SessionOptions::default()).unwrap();

    let image = StampImage::new(
        image::RgbaImage::from_pixel(40, 20, Rgba([0, 120, 0, 255])),
        None,
    );
    let index = session.add_stamp(image);
    session
        .place(index, 1, DocPoint::new(100.0, 200.0), 2.0)
        .unwrap();
    assert!(session.place(index + 1, 0, DocPoint::new(0.0, 0.0), 1.0).is_err());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stamped.pdf");
    let report = session.export_to(&path).unwrap();
    assert_eq!(report.embedded, 1);
    assert!(report.skipped.is_empty());

    let out = Document::load(&path).unwrap();
    let pages = page_ids(&out);
    assert!(!page_content(&out, pages[0]).contains("Do"));
    // width 100 * scale 2 = 200, height 100; y = 800 - 200 - 100
    assert!(page_content(&out, pages[1])
        .contains("q 200.0000 0.0000 0.0000 100.0000 100.0000 500.0000 cm /Stamp1 Do Q"));
}

#[test]
fn many_stamps_on_one_page_keep_nesting_shallow() {
    let bytes = build_pdf(&[0], None);
    let image = solid_stamp(10, 10, Rgba([0, 0, 0, 255]));
    let stamps: Vec<Stamp> = (1..=30).rev().map(|id| stamp(id, 0, &image)).collect();

    let mut mutator = LopdfMutator::load(&bytes).unwrap();
    let report = export_stamps(&mut mutator, &stamps, 100.0).unwrap();
    assert_eq!(report.embedded, 30);

    let out = Document::load_mem(&report.bytes).unwrap();
    let content = page_content(&out, page_ids(&out)[0]);
    assert_eq!(content.matches("/Stamp1 Do").count(), 30);
    assert_eq!(content.matches("0 0 1 rg 0 0 10 10 re f").count(), 1);
    assert!(max_q_depth(&content) <= 2);
    assert_eq!(
        content.split_whitespace().filter(|t| *t == "q").count(),
        content.split_whitespace().filter(|t| *t == "Q").count()
    );
}

#[test]
fn indirect_content_array_is_flattened() {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let first = doc.add_object(Stream::new(dictionary! {}, b"0 1 0 rg".to_vec()));
    let second = doc.add_object(Stream::new(dictionary! {}, b"0 0 50 50 re f".to_vec()));
    let array = doc.add_object(vec![Object::Reference(first), Object::Reference(second)]);
    let page = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => array,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page)],
            "Count" => Object::Integer(1),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(600),
                Object::Integer(800),
            ],
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();

    let image = solid_stamp(10, 10, Rgba([0, 0, 0, 255]));
    let mut mutator = LopdfMutator::load(&bytes).unwrap();
    let report = export_stamps(&mut mutator, &[stamp(1, 0, &image)], 100.0).unwrap();

    let out = Document::load_mem(&report.bytes).unwrap();
    let page = out.get_object(page_ids(&out)[0]).unwrap().as_dict().unwrap();
    let contents = page.get(b"Contents").unwrap().as_array().unwrap();
    for item in contents {
        let id = item.as_reference().unwrap();
        assert!(out.get_object(id).unwrap().as_stream().is_ok());
    }
    let content = page_content(&out, page_ids(&out)[0]);
    assert!(content.contains("0 1 0 rg\n0 0 50 50 re f"));
    assert!(content.contains("/Stamp1 Do"));
}

#[cfg(feature = "svg")]
#[test]
fn drawn_stamp_from_replay_exports_as_vector() {
    let bytes = build_pdf(&[0], None);
    let source = FakeSource::uniform(1, 600.0, 800.0);
    let mut session =
        Session::new(FakeOpener::new(source), bytes, SessionOptions::default()).unwrap();

    let steps = stampdesk::session::parse_script(
        r#"[
            {"op": "stroke", "width": 200, "height": 100,
             "strokes": [[[20, 30], [120, 30], [120, 80]]]},
            {"op": "place", "stamp": 0, "page": 0, "x": 40, "y": 40}
        ]"#,
    )
    .unwrap();
    session.replay(&steps).unwrap();

    let report = session.export().unwrap();
    assert_eq!((report.embedded, report.vector), (1, 1));

    let out = Document::load_mem(&report.bytes).unwrap();
    assert_eq!(xobject_count(&out, b"Form"), 1);
    assert_eq!(image_xobject_count(&out), 0);
    let content = page_content(&out, page_ids(&out)[0]);
    assert!(content.contains("cm /Stamp1 Do Q"));
}
