use crate::error::{PdfError, Result};
use crate::filters::{DecodeResult, FilterRegistry};
use crate::objects::{names, Array, Dictionary, Name, Object};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// A dictionary plus a byte payload.
///
/// The payload is held encoded (as read from the file), decoded, or both
/// once both sides have been requested. Writing either side drops the
/// other. The mutex around the buffers only makes the handle shareable
/// between threads; callers must not decode or encode one stream from
/// several threads at once.
#[derive(Clone)]
pub struct Stream(Arc<StreamInner>);

struct StreamInner {
    dictionary: Dictionary,
    registry: Arc<FilterRegistry>,
    buffers: Mutex<Buffers>,
}

#[derive(Default)]
struct Buffers {
    encoded: Option<Vec<u8>>,
    decoded: Option<Vec<u8>>,
    decode_results: Vec<DecodeResult>,
    closed: bool,
}

impl Stream {
    /// An empty stream with an empty dictionary.
    pub fn new() -> Self {
        Self::build(Dictionary::new(), Buffers::default(), FilterRegistry::global())
    }

    /// A stream read from a file: `data` is still filtered.
    pub fn from_encoded(dictionary: Dictionary, data: Vec<u8>) -> Self {
        dictionary.set(names::LENGTH.clone(), data.len() as i64);
        let buffers = Buffers {
            encoded: Some(data),
            ..Buffers::default()
        };
        Self::build(dictionary, buffers, FilterRegistry::global())
    }

    /// A stream holding unfiltered `data`, encoded on demand.
    pub fn from_decoded(dictionary: Dictionary, data: Vec<u8>) -> Self {
        let buffers = Buffers {
            decoded: Some(data),
            ..Buffers::default()
        };
        Self::build(dictionary, buffers, FilterRegistry::global())
    }

    /// An empty stream using `registry` for its filters.
    pub fn with_registry(dictionary: Dictionary, registry: Arc<FilterRegistry>) -> Self {
        Self::build(dictionary, Buffers::default(), registry)
    }

    fn build(dictionary: Dictionary, buffers: Buffers, registry: Arc<FilterRegistry>) -> Self {
        Stream(Arc::new(StreamInner {
            dictionary,
            registry,
            buffers: Mutex::new(buffers),
        }))
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.0.dictionary
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.0.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_buffers(&self) -> Result<MutexGuard<'_, Buffers>> {
        let buffers = self.lock();
        if buffers.closed {
            return Err(PdfError::ResourceClosed("stream".to_string()));
        }
        Ok(buffers)
    }

    /// The `/Filter` chain in decoding order.
    pub fn filters(&self) -> Result<Vec<Name>> {
        match self.dictionary().get_dereferenced("Filter") {
            None => Ok(Vec::new()),
            Some(Object::Name(name)) => Ok(vec![name]),
            Some(Object::Array(array)) => array
                .iter()
                .map(|entry| match entry.dereference() {
                    Object::Name(name) => Ok(name),
                    other => Err(other.mismatch("Name")),
                })
                .collect(),
            Some(other) => Err(other.mismatch("Name or Array")),
        }
    }

    /// `/DecodeParms` aligned with [`filters`](Self::filters).
    pub fn decode_parameters(&self) -> Vec<Option<Dictionary>> {
        match self.dictionary().get_dereferenced("DecodeParms") {
            Some(Object::Dictionary(params)) => vec![Some(params)],
            Some(Object::Array(array)) => array
                .iter()
                .map(|entry| match entry.dereference() {
                    Object::Dictionary(params) => Some(params),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Filtered bytes, encoding the decoded side if needed.
    pub fn encoded_bytes(&self) -> Result<Vec<u8>> {
        let encoded = {
            let mut buffers = self.open_buffers()?;
            if let Some(encoded) = &buffers.encoded {
                return Ok(encoded.clone());
            }
            let encoded = match &buffers.decoded {
                Some(decoded) => self.0.registry.encode_chain(
                    decoded,
                    &self.filters()?,
                    &self.decode_parameters(),
                )?,
                None => return Ok(Vec::new()),
            };
            buffers.encoded = Some(encoded.clone());
            encoded
        };
        self.sync_length(encoded.len());
        Ok(encoded)
    }

    /// Keep `/Length` equal to the encoded size. Must not be called with
    /// the buffer lock held, since the dictionary notifies its observers.
    fn sync_length(&self, len: usize) {
        let len = len as i64;
        if self.dictionary().get_int("Length", -1) != len {
            self.dictionary().set(names::LENGTH.clone(), len);
        }
    }

    /// Unfiltered bytes, decoding the encoded side if needed.
    pub fn decoded_bytes(&self) -> Result<Vec<u8>> {
        let mut buffers = self.open_buffers()?;
        if let Some(decoded) = &buffers.decoded {
            return Ok(decoded.clone());
        }
        let (decoded, results) = match &buffers.encoded {
            Some(encoded) => self.0.registry.decode_chain(
                encoded,
                &self.filters()?,
                &self.decode_parameters(),
            )?,
            None => return Ok(Vec::new()),
        };
        buffers.decoded = Some(decoded.clone());
        buffers.decode_results = results;
        Ok(decoded)
    }

    /// Per-filter results of the last decode.
    pub fn decode_results(&self) -> Vec<DecodeResult> {
        self.lock().decode_results.clone()
    }

    /// Replace the payload with already filtered bytes.
    pub fn set_encoded(&self, data: Vec<u8>) -> Result<()> {
        let len = data.len() as i64;
        {
            let mut buffers = self.open_buffers()?;
            buffers.encoded = Some(data);
            buffers.decoded = None;
            buffers.decode_results.clear();
        }
        self.dictionary().set(names::LENGTH.clone(), len);
        Ok(())
    }

    /// Replace the payload with unfiltered bytes.
    pub fn set_decoded(&self, data: Vec<u8>) -> Result<()> {
        {
            let mut buffers = self.open_buffers()?;
            buffers.decoded = Some(data);
            buffers.encoded = None;
            buffers.decode_results.clear();
        }
        self.dictionary().report_update();
        Ok(())
    }

    /// Change the filter chain, keeping the unfiltered content.
    pub fn set_filters(&self, chain: &[Name]) -> Result<()> {
        let decoded = self.decoded_bytes()?;
        {
            let mut buffers = self.open_buffers()?;
            buffers.decoded = Some(decoded);
            buffers.encoded = None;
            buffers.decode_results.clear();
        }

        let dict = self.dictionary();
        match chain {
            [] => {
                dict.remove("Filter");
            }
            [single] => dict.set(names::FILTER.clone(), single),
            many => dict.set(
                names::FILTER.clone(),
                many.iter().map(Object::from).collect::<Array>(),
            ),
        }
        dict.remove("DecodeParms");
        Ok(())
    }

    pub fn has_encoded(&self) -> bool {
        self.lock().encoded.is_some()
    }

    pub fn has_decoded(&self) -> bool {
        self.lock().decoded.is_some()
    }

    /// Release both buffers. Further data access fails with
    /// [`PdfError::ResourceClosed`]; closing again does nothing.
    pub fn close(&self) {
        let mut buffers = self.lock();
        if buffers.closed {
            return;
        }
        buffers.encoded = None;
        buffers.decoded = None;
        buffers.decode_results.clear();
        buffers.closed = true;
        trace!("stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// The `/Length` entry.
    pub fn length(&self) -> i64 {
        self.dictionary().get_int("Length", 0)
    }

    pub fn ptr_eq(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        let buffers = self
            .buffers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if !buffers.closed && (buffers.encoded.is_some() || buffers.decoded.is_some()) {
            warn!("stream dropped without close, releasing its buffers");
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffers = self.lock();
        f.debug_struct("Stream")
            .field("dictionary", self.dictionary())
            .field("encoded", &buffers.encoded.as_ref().map(Vec::len))
            .field("decoded", &buffers.decoded.as_ref().map(Vec::len))
            .field("closed", &buffers.closed)
            .finish()
    }
}
