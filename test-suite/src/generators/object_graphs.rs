//! Object Graph Generator
//!
//! Builds documents as blueprints of plain nodes, then opens them through a
//! source that materializes each object on demand, the way a parser does.

use oxidize_cos::update::Container;
use oxidize_cos::{
    Array, CosDocument, Dictionary, DocumentOptions, FnSource, Name, Object, ObjectKey, PdfError,
    PdfString, Real, XrefEntry,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

const KEY_POOL: &[&str] = &[
    "Type", "Subtype", "Kids", "Parent", "Resources", "Font", "XObject", "MediaBox", "Contents",
    "Annots", "Rect", "Border", "Dest", "Count", "Width", "Height", "Length",
];

/// A value of a generated object, with references by object number.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f32),
    Name(String),
    Text(String),
    Reference(u64),
    Array(Vec<Node>),
    Dictionary(Vec<(String, Node)>),
}

impl Node {
    /// Build the object, obtaining proxies for references from `document`.
    pub fn materialize(&self, document: &CosDocument) -> Object {
        match self {
            Node::Null => Object::Null,
            Node::Boolean(b) => Object::Boolean(*b),
            Node::Integer(i) => Object::Integer(*i),
            Node::Real(r) => Object::Real(Real::from_f32(*r)),
            Node::Name(n) => Object::Name(Name::new(n)),
            Node::Text(t) => Object::String(PdfString::from_text(t)),
            Node::Reference(n) => {
                Object::Reference(document.get_or_create_proxy(ObjectKey::from_parts(*n, 0)))
            }
            Node::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| item.materialize(document))
                    .collect::<Array>(),
            ),
            Node::Dictionary(entries) => {
                let dict = Dictionary::with_capacity(entries.len());
                for (key, value) in entries {
                    dict.set(key.as_str(), value.materialize(document));
                }
                Object::Dictionary(dict)
            }
        }
    }

    /// Object numbers referenced from this node.
    pub fn references(&self) -> Vec<u64> {
        match self {
            Node::Reference(n) => vec![*n],
            Node::Array(items) => items.iter().flat_map(Node::references).collect(),
            Node::Dictionary(entries) => entries.iter().flat_map(|(_, v)| v.references()).collect(),
            _ => Vec::new(),
        }
    }
}

/// A generated document: object blueprints keyed by object number.
#[derive(Debug, Clone, Default)]
pub struct GeneratedDocument {
    objects: BTreeMap<u64, Node>,
}

impl GeneratedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, number: u64, node: Node) {
        self.objects.insert(number, node);
    }

    pub fn node(&self, number: u64) -> Option<&Node> {
        self.objects.get(&number)
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        self.objects
            .keys()
            .map(|n| ObjectKey::from_parts(*n, 0))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Cross-reference entries with made-up but increasing offsets.
    pub fn xref_entries(&self) -> Vec<(ObjectKey, XrefEntry)> {
        self.objects
            .keys()
            .enumerate()
            .map(|(i, n)| {
                (
                    ObjectKey::from_parts(*n, 0),
                    XrefEntry::InUse {
                        offset: 15 + 120 * i as u64,
                    },
                )
            })
            .collect()
    }

    /// Open the document. Objects are materialized on first resolution.
    pub fn open(&self, options: DocumentOptions) -> CosDocument {
        let objects = Arc::new(self.objects.clone());
        let source = FnSource::new(
            move |key: ObjectKey, entry: Option<XrefEntry>, document: &CosDocument| {
                if entry.is_none() {
                    return Err(PdfError::UnresolvableReference {
                        key,
                        reason: "no cross-reference entry".to_string(),
                    });
                }
                objects
                    .get(&key.number())
                    .map(|node| node.materialize(document))
                    .ok_or_else(|| PdfError::UnresolvableReference {
                        key,
                        reason: "object missing from body".to_string(),
                    })
            },
        );
        let document = CosDocument::with_source(options, source);
        document.add_xref_entries(self.xref_entries());
        document
    }

    /// Catalog, page tree root, `pages` pages and one shared font.
    ///
    /// Object 1 is the catalog, 2 the page tree root, pages start at 3 and
    /// the font comes last.
    pub fn page_tree(pages: usize) -> Self {
        let pages = pages as u64;
        let font = 3 + pages;
        let mut document = GeneratedDocument::new();

        document.insert(
            1,
            Node::Dictionary(vec![
                ("Type".into(), Node::Name("Catalog".into())),
                ("Pages".into(), Node::Reference(2)),
            ]),
        );
        document.insert(
            2,
            Node::Dictionary(vec![
                ("Type".into(), Node::Name("Pages".into())),
                (
                    "Kids".into(),
                    Node::Array((3..font).map(Node::Reference).collect()),
                ),
                ("Count".into(), Node::Integer(pages as i64)),
            ]),
        );
        for number in 3..font {
            document.insert(
                number,
                Node::Dictionary(vec![
                    ("Type".into(), Node::Name("Page".into())),
                    ("Parent".into(), Node::Reference(2)),
                    (
                        "MediaBox".into(),
                        Node::Array(vec![
                            Node::Integer(0),
                            Node::Integer(0),
                            Node::Integer(612),
                            Node::Integer(792),
                        ]),
                    ),
                    (
                        "Resources".into(),
                        Node::Dictionary(vec![(
                            "Font".into(),
                            Node::Dictionary(vec![("F1".into(), Node::Reference(font))]),
                        )]),
                    ),
                ]),
            );
        }
        document.insert(
            font,
            Node::Dictionary(vec![
                ("Type".into(), Node::Name("Font".into())),
                ("Subtype".into(), Node::Name("Type1".into())),
                ("BaseFont".into(), Node::Name("Helvetica".into())),
            ]),
        );
        document
    }
}

/// Seeded generator of random object graphs.
pub struct GraphGenerator {
    rng: StdRng,
    objects: usize,
    max_depth: usize,
    reference_probability: f64,
}

impl GraphGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            objects: 20,
            max_depth: 4,
            reference_probability: 0.2,
        }
    }

    pub fn with_objects(mut self, objects: usize) -> Self {
        self.objects = objects.max(1);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_reference_probability(mut self, probability: f64) -> Self {
        self.reference_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Generate a document whose objects are all dictionaries. References
    /// may point forward, backward or at the object itself.
    pub fn generate(&mut self) -> GeneratedDocument {
        let mut document = GeneratedDocument::new();
        for number in 1..=self.objects as u64 {
            let entries = self.entries(0);
            document.insert(number, Node::Dictionary(entries));
        }
        document
    }

    fn entries(&mut self, depth: usize) -> Vec<(String, Node)> {
        let count = self.rng.gen_range(1..=4);
        let mut entries: Vec<(String, Node)> = Vec::with_capacity(count);
        for _ in 0..count {
            let key = KEY_POOL[self.rng.gen_range(0..KEY_POOL.len())].to_string();
            if entries.iter().any(|(k, _)| *k == key) {
                continue;
            }
            let value = self.node(depth + 1);
            entries.push((key, value));
        }
        entries
    }

    fn node(&mut self, depth: usize) -> Node {
        if self.rng.gen_bool(self.reference_probability) {
            return Node::Reference(self.rng.gen_range(1..=self.objects as u64));
        }
        let leaf_only = depth >= self.max_depth;
        match self.rng.gen_range(0..if leaf_only { 6 } else { 8 }) {
            0 => Node::Null,
            1 => Node::Boolean(self.rng.gen()),
            2 => Node::Integer(self.rng.gen_range(-1000..1000)),
            3 => Node::Real(self.rng.gen_range(-100.0f32..100.0)),
            4 => Node::Name(KEY_POOL[self.rng.gen_range(0..KEY_POOL.len())].to_string()),
            5 => Node::Text(format!("text {}", self.rng.gen_range(0..100))),
            6 => {
                let len = self.rng.gen_range(0..4);
                Node::Array((0..len).map(|_| self.node(depth + 1)).collect())
            }
            _ => Node::Dictionary(self.entries(depth)),
        }
    }
}

/// Direct containers reachable from `object` without crossing a reference,
/// outermost first.
pub fn direct_containers(object: &Object) -> Vec<Container> {
    let mut found = Vec::new();
    let mut pending: Vec<Object> = vec![object.clone()];
    while let Some(value) = pending.pop() {
        let Some(container) = Container::of_value(&value) else {
            continue;
        };
        match &container {
            Container::Dictionary(dict) => pending.extend(dict.values().into_iter().rev()),
            Container::Array(array) => pending.extend(array.to_vec().into_iter().rev()),
        }
        found.push(container);
    }
    found
}
