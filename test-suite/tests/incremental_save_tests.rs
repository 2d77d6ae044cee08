//! Incremental Save Tests
//!
//! Drives documents through edit and save cycles and checks that the
//! writer is handed exactly the objects that changed.

use oxidize_cos::{
    Array, Dictionary, DocumentOptions, Name, Object, ObjectKey, XrefEntry, XrefMergePolicy,
};
use oxidize_cos_test_suite::generators::object_graphs::Node;
use oxidize_cos_test_suite::utils::init_tracing;
use oxidize_cos_test_suite::{GeneratedDocument, PoolValidator};
use pretty_assertions::assert_eq;

fn key(number: u64) -> ObjectKey {
    ObjectKey::from_parts(number, 0)
}

fn to_update(doc: &oxidize_cos::CosDocument) -> Vec<u64> {
    doc.objects_to_update()
        .iter()
        .map(|(key, _)| key.number())
        .collect()
}

#[test]
fn test_reading_does_not_dirty() {
    init_tracing();
    let doc = GeneratedDocument::page_tree(4).open(DocumentOptions::default());

    for key in doc.xref_table().iter().map(|(k, _)| k) {
        let value = doc.resolve(key);
        assert!(!value.is_null(), "{key} failed to resolve");
    }
    let font = doc.resolve(key(7));
    let base_font = font.as_dict().unwrap().get_name_or("BaseFont", "?");
    assert_eq!(base_font.as_str(), "Helvetica");

    assert!(to_update(&doc).is_empty());
}

#[test]
fn test_deeply_nested_edit_dirties_page_only() {
    init_tracing();
    let doc = GeneratedDocument::page_tree(2).open(DocumentOptions::default());

    let page = doc.resolve(key(3));
    let fonts = page
        .as_dict()
        .unwrap()
        .get_dictionary("Resources")
        .unwrap()
        .get_dictionary("Font")
        .unwrap();
    fonts.set("F2", doc.get_or_create_proxy(key(5)));

    assert_eq!(to_update(&doc), vec![3]);
    assert_eq!(doc.change_tracker().referrers_of(key(5)), vec![key(3)]);
}

#[test]
fn test_edit_through_reference_dirties_target_not_holder() {
    init_tracing();
    let doc = GeneratedDocument::page_tree(2).open(DocumentOptions::default());

    let page = doc.resolve(key(3));
    let font = page
        .as_dict()
        .unwrap()
        .get_dictionary("Resources")
        .unwrap()
        .get_dictionary("Font")
        .unwrap()
        .get_dictionary("F1")
        .unwrap();
    font.set("BaseFont", Name::new("Times-Roman"));

    assert_eq!(to_update(&doc), vec![5]);
}

#[test]
fn test_direct_font_moves_dirtiness_to_pages() {
    init_tracing();
    let doc = GeneratedDocument::page_tree(3).open(DocumentOptions::default());
    for n in 3..=6 {
        doc.resolve(key(n));
    }
    let font = doc.resolve(key(6));
    let font = font.as_dict().unwrap();

    font.set_direct(true);
    assert_eq!(to_update(&doc), vec![3, 4, 5]);
    doc.mark_saved();

    font.set("Encoding", Name::new("WinAnsiEncoding"));
    assert_eq!(to_update(&doc), vec![3, 4, 5]);
    assert!(!doc.is_dirty(key(6)));

    doc.mark_saved();
    font.set_direct(false);
    assert_eq!(to_update(&doc), vec![3, 4, 5, 6]);
}

#[test]
fn test_multiple_save_cycles() {
    init_tracing();
    let doc = GeneratedDocument::page_tree(3).open(DocumentOptions::default());
    let pages = doc.resolve(key(2));
    let pages = pages.as_dict().unwrap();

    // Cycle 1: append a page
    let page = Dictionary::new();
    page.set("Type", Name::new("Page"));
    page.set("Parent", doc.get_or_create_proxy(key(2)));
    let new_page = doc.add_object(page);
    pages.get_array("Kids").unwrap().add(new_page.clone());
    pages.set("Count", 4);
    assert_eq!(to_update(&doc), vec![2, 7]);
    assert!(PoolValidator::new().validate(&doc).is_empty());
    doc.mark_saved();

    // Cycle 2: nothing changed
    assert!(to_update(&doc).is_empty());

    // Cycle 3: edit the new page
    let page = new_page.resolve();
    page.as_dict()
        .unwrap()
        .set("MediaBox", Array::from_floats(&[0.0, 0.0, 595.0, 842.0]));
    assert_eq!(to_update(&doc), vec![7]);
    doc.mark_saved();

    // Cycle 4: remove it again
    let kids = pages.get_array("Kids").unwrap();
    assert!(kids.remove_value_dereferenced(&page));
    assert_eq!(to_update(&doc), vec![2]);
}

#[test]
fn test_incremental_xref_sections() {
    init_tracing();
    let mut original = GeneratedDocument::new();
    original.insert(1, Node::Integer(1));
    original.insert(2, Node::Integer(2));
    let doc = original.open(DocumentOptions::default());

    // An update section moves object 2 and adds a compressed object 3
    doc.add_xref_entries([
        (key(2), XrefEntry::InUse { offset: 9000 }),
        (
            key(3),
            XrefEntry::Compressed {
                stream_number: 10,
                index: 0,
            },
        ),
    ]);
    assert_eq!(doc.xref_entry(key(2)), Some(XrefEntry::InUse { offset: 9000 }));
    let stored = doc.xref_table().stored_key(key(3)).unwrap();
    assert_eq!(stored.stream_index(), Some(0));
    assert_eq!(doc.highest_object_number(), 3);

    let options = DocumentOptions::default().with_xref_merge(XrefMergePolicy::KeepExisting);
    let keep = original.open(options);
    keep.add_xref_entries([(key(2), XrefEntry::Free)]);
    assert_eq!(keep.resolve(key(2)), Object::Integer(2));
}

#[test]
fn test_unresolvable_targets_read_as_null() {
    init_tracing();
    let mut generated = GeneratedDocument::new();
    generated.insert(
        1,
        Node::Dictionary(vec![
            ("Missing".into(), Node::Reference(40)),
            (
                "Array".into(),
                Node::Array(vec![Node::Reference(41), Node::Integer(3)]),
            ),
        ]),
    );
    let doc = generated.open(DocumentOptions::default());
    let root = doc.resolve(key(1));
    let root = root.as_dict().unwrap();

    assert_eq!(root.get_dereferenced("Missing"), None);
    assert_eq!(root.get_int("Missing", -1), -1);
    let array = root.get_array("Array").unwrap();
    assert_eq!(array.get_int(0, -1), -1);
    assert_eq!(array.get_int(1, -1), 3);
    assert!(to_update(&doc).is_empty());
}

#[test]
fn test_strict_documents_surface_errors() {
    init_tracing();
    let doc = GeneratedDocument::new().open(DocumentOptions::strict());
    let proxy = doc.get_or_create_proxy(key(1));

    assert!(proxy.try_resolve().is_err());
    assert!(proxy.try_resolve().is_err(), "strict documents do not cache failures");
    assert!(proxy.resolve().is_null());
}
