//! Interned PDF names.
//!
//! Every [`Name`] handed out by a [`NameTable`] for a given text shares one
//! allocation, so equality checks usually stop at a pointer comparison. The
//! table only keeps entries alive while something outside the table still
//! holds them; well-known names are pinned for the lifetime of the table.

use lazy_static::lazy_static;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock};

/// Number of insertions after which a table sweeps unreferenced entries.
pub const DEFAULT_PURGE_THRESHOLD: usize = 4096;

/// An interned PDF name such as `/Type`.
#[derive(Clone)]
pub struct Name(Arc<str>);

impl Name {
    /// Intern `text` in the process-wide table.
    pub fn new(text: &str) -> Self {
        NameTable::global().intern(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when both handles point to the same interned allocation.
    pub fn ptr_eq(&self, other: &Name) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Write the name in PDF syntax, escaping irregular bytes as `#xx`.
    pub fn to_pdf_syntax(&self) -> String {
        let mut out = String::with_capacity(self.0.len() + 1);
        out.push('/');
        for byte in self.0.bytes() {
            let regular = (0x21..=0x7E).contains(&byte)
                && !matches!(
                    byte,
                    b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
                );
            if regular {
                out.push(byte as char);
            } else {
                out.push_str(&format!("#{byte:02X}"));
            }
        }
        out
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with `str`'s hash for `Borrow<str>` lookups.
        self.as_str().hash(state);
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pdf_syntax())
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::new(text)
    }
}

impl From<String> for Name {
    fn from(text: String) -> Self {
        Name::new(&text)
    }
}

impl From<&Name> for Name {
    fn from(name: &Name) -> Self {
        name.clone()
    }
}

/// Content-addressed name cache.
///
/// Safe to share between threads: lookups take a read lock and only a miss
/// upgrades to the write lock, where the lookup is repeated before inserting.
pub struct NameTable {
    entries: RwLock<HashSet<Arc<str>>>,
    pinned: Vec<Name>,
    purge_threshold: usize,
    inserts_since_purge: AtomicUsize,
}

impl NameTable {
    /// Create an independent table with the well-known names pinned.
    pub fn new() -> Self {
        Self::with_purge_threshold(DEFAULT_PURGE_THRESHOLD)
    }

    /// Create a table that sweeps dead entries every `threshold` insertions.
    /// A threshold of zero disables automatic sweeping.
    pub fn with_purge_threshold(threshold: usize) -> Self {
        let mut table = Self {
            entries: RwLock::new(HashSet::new()),
            pinned: Vec::new(),
            purge_threshold: threshold,
            inserts_since_purge: AtomicUsize::new(0),
        };
        let pinned: Vec<Name> = WELL_KNOWN
            .iter()
            .map(|text| table.intern(text))
            .collect();
        table.pinned = pinned;
        table
    }

    /// The process-wide table used by [`Name::new`].
    pub fn global() -> &'static NameTable {
        &GLOBAL_TABLE
    }

    /// Return the canonical name for `text`.
    pub fn intern(&self, text: &str) -> Name {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = entries.get(text) {
                return Name(Arc::clone(existing));
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have inserted between the two locks.
        if let Some(existing) = entries.get(text) {
            return Name(Arc::clone(existing));
        }

        if self.purge_threshold > 0 {
            let inserted = self.inserts_since_purge.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            if inserted >= self.purge_threshold {
                self.inserts_since_purge.store(0, AtomicOrdering::Relaxed);
                Self::sweep(&mut entries);
            }
        }

        let interned: Arc<str> = Arc::from(text);
        entries.insert(Arc::clone(&interned));
        Name(interned)
    }

    /// Drop entries no longer held outside the table. Returns how many
    /// entries were removed.
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Self::sweep(&mut entries)
    }

    fn sweep(entries: &mut HashSet<Arc<str>>) -> usize {
        let before = entries.len();
        // A count of one means the set holds the only reference. No other
        // thread can clone it while the write lock is held.
        entries.retain(|entry| Arc::strong_count(entry) > 1);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::trace!(removed, remaining = entries.len(), "purged name table");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `text` currently has a live entry.
    pub fn contains(&self, text: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(text)
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NameTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameTable")
            .field("entries", &self.len())
            .field("pinned", &self.pinned.len())
            .field("purge_threshold", &self.purge_threshold)
            .finish()
    }
}

/// Names pinned in every table.
const WELL_KNOWN: &[&str] = &[
    "",
    "Type",
    "Subtype",
    "Length",
    "Filter",
    "DecodeParms",
    "Size",
    "Root",
    "Info",
    "ID",
    "Encrypt",
    "Prev",
    "XRefStm",
    "Catalog",
    "Pages",
    "Page",
    "Kids",
    "Count",
    "Parent",
    "Resources",
    "Contents",
    "MediaBox",
    "Font",
    "XObject",
    "ObjStm",
    "XRef",
    "N",
    "First",
    "Index",
    "W",
    "FlateDecode",
    "LZWDecode",
    "ASCIIHexDecode",
    "ASCII85Decode",
    "RunLengthDecode",
    "CCITTFaxDecode",
    "DCTDecode",
    "JBIG2Decode",
    "JPXDecode",
    "Crypt",
];

lazy_static! {
    static ref GLOBAL_TABLE: NameTable = NameTable::new();
}

/// Frequently used names, interned once in the global table.
pub mod names {
    use super::Name;
    use lazy_static::lazy_static;

    lazy_static! {
        pub static ref EMPTY: Name = Name::new("");
        pub static ref TYPE: Name = Name::new("Type");
        pub static ref SUBTYPE: Name = Name::new("Subtype");
        pub static ref LENGTH: Name = Name::new("Length");
        pub static ref FILTER: Name = Name::new("Filter");
        pub static ref DECODE_PARMS: Name = Name::new("DecodeParms");
        pub static ref SIZE: Name = Name::new("Size");
        pub static ref ROOT: Name = Name::new("Root");
        pub static ref INFO: Name = Name::new("Info");
        pub static ref ID: Name = Name::new("ID");
        pub static ref ENCRYPT: Name = Name::new("Encrypt");
        pub static ref PREV: Name = Name::new("Prev");
        pub static ref CATALOG: Name = Name::new("Catalog");
        pub static ref PAGES: Name = Name::new("Pages");
        pub static ref FLATE_DECODE: Name = Name::new("FlateDecode");
        pub static ref ASCII_HEX_DECODE: Name = Name::new("ASCIIHexDecode");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_intern_returns_same_instance() {
        let table = NameTable::new();
        let a = table.intern("Font");
        let b = table.intern("Font");
        assert!(a.ptr_eq(&b));
        assert_eq!(a.as_str(), "Font");
    }

    #[test]
    fn test_names_from_distinct_tables_compare_by_text() {
        let first = NameTable::new().intern("Widget");
        let second = NameTable::new().intern("Widget");
        assert!(!first.ptr_eq(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_ordering_is_textual() {
        let mut names = vec![Name::new("Subtype"), Name::new("Length"), Name::new("A")];
        names.sort();
        let texts: Vec<_> = names.iter().map(Name::as_str).collect();
        assert_eq!(texts, vec!["A", "Length", "Subtype"]);
    }

    #[test]
    fn test_borrow_lookup_in_map() {
        let mut map = HashMap::new();
        map.insert(Name::new("Type"), 1);
        assert_eq!(map.get("Type"), Some(&1));
    }

    #[test]
    fn test_purge_keeps_live_and_pinned_names() {
        let table = NameTable::with_purge_threshold(0);
        let live = table.intern("StillHeld");
        drop(table.intern("Transient"));

        let removed = table.purge();
        assert_eq!(removed, 1);
        assert!(table.contains("StillHeld"));
        assert!(!table.contains("Transient"));
        assert!(table.contains("Type"));
        assert!(table.contains(""));

        // Re-interning after a purge still yields the live instance.
        assert!(table.intern("StillHeld").ptr_eq(&live));
    }

    #[test]
    fn test_automatic_purge() {
        let table = NameTable::with_purge_threshold(4);
        for i in 0..16 {
            drop(table.intern(&format!("OneOff{i}")));
        }
        // Well-known names plus at most one sweep window of transient names.
        assert!(table.len() <= WELL_KNOWN.len() + 4);
    }

    #[test]
    fn test_concurrent_intern_yields_one_instance() {
        let table = Arc::new(NameTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.intern("SharedName"))
            })
            .collect();

        let names: Vec<Name> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for name in &names[1..] {
            assert!(name.ptr_eq(&names[0]));
        }
    }

    #[test]
    fn test_pdf_syntax_escaping() {
        assert_eq!(Name::new("Type").to_string(), "/Type");
        assert_eq!(Name::new("A B").to_string(), "/A#20B");
        assert_eq!(Name::new("x#y").to_string(), "/x#23y");
        assert_eq!(Name::new("").to_string(), "/");
    }

    #[test]
    fn test_well_known_statics() {
        assert_eq!(names::TYPE.as_str(), "Type");
        assert!(names::FILTER.ptr_eq(&Name::new("Filter")));
    }
}
