mod array;
mod dictionary;
mod key;
mod name;
mod primitive;
mod proxy;
mod stream;

pub use array::Array;
pub(crate) use array::WeakArray;
pub use dictionary::{Dictionary, MergePolicy};
pub(crate) use dictionary::WeakDictionary;
pub use key::ObjectKey;
pub use name::{names, Name, NameTable, DEFAULT_PURGE_THRESHOLD};
pub use primitive::{Object, PdfString, Real};
pub use proxy::Proxy;
pub use stream::Stream;
