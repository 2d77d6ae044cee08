//! Stream filters
//!
//! The object model does not implement codecs itself. Streams look filters
//! up by name in a [`FilterRegistry`]; the registry returned by
//! [`FilterRegistry::global`] carries `FlateDecode` (with the `compression`
//! feature) and `ASCIIHexDecode`.

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Name};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Output of a single decode step.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    /// Decoded bytes
    pub data: Vec<u8>,
    /// Parameters the filter actually applied
    pub parameters: Option<Dictionary>,
}

impl DecodeResult {
    pub fn new(data: Vec<u8>, parameters: Option<Dictionary>) -> Self {
        Self { data, parameters }
    }
}

/// A stream codec.
pub trait Filter: Send + Sync {
    /// Name as written in a `/Filter` entry.
    fn name(&self) -> &str;

    /// Decode `encoded`. `index` is the position of this filter in the
    /// stream's filter chain.
    fn decode(
        &self,
        encoded: &[u8],
        parameters: Option<&Dictionary>,
        index: usize,
    ) -> Result<DecodeResult>;

    fn encode(&self, decoded: &[u8], parameters: Option<&Dictionary>, index: usize)
        -> Result<Vec<u8>>;
}

/// Filters by name.
pub struct FilterRegistry {
    filters: RwLock<HashMap<Name, Arc<dyn Filter>>>,
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<FilterRegistry> = Arc::new(FilterRegistry::with_builtin());
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the built-in filters.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        #[cfg(feature = "compression")]
        registry.register(Arc::new(FlateFilter));
        registry.register(Arc::new(AsciiHexFilter));
        registry
    }

    /// The shared registry used by streams created without one.
    pub fn global() -> Arc<FilterRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Add `filter`, replacing any filter registered under the same name.
    pub fn register(&self, filter: Arc<dyn Filter>) {
        let name = Name::new(filter.name());
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, filter);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Filter>> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| PdfError::UnsupportedFilter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Apply `chain` in order, returning the final bytes and every step's result.
    pub fn decode_chain(
        &self,
        data: &[u8],
        chain: &[Name],
        parameters: &[Option<Dictionary>],
    ) -> Result<(Vec<u8>, Vec<DecodeResult>)> {
        let mut current = data.to_vec();
        let mut results = Vec::with_capacity(chain.len());
        for (index, name) in chain.iter().enumerate() {
            let filter = self.get(name.as_str())?;
            let params = parameters.get(index).and_then(Option::as_ref);
            let result = filter.decode(&current, params, index)?;
            current = result.data.clone();
            results.push(result);
        }
        Ok((current, results))
    }

    /// Apply the encoders of `chain` in reverse order.
    pub fn encode_chain(
        &self,
        data: &[u8],
        chain: &[Name],
        parameters: &[Option<Dictionary>],
    ) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for (index, name) in chain.iter().enumerate().rev() {
            let filter = self.get(name.as_str())?;
            let params = parameters.get(index).and_then(Option::as_ref);
            current = filter.encode(&current, params, index)?;
        }
        Ok(current)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&str> = filters.keys().map(Name::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FilterRegistry")
            .field("filters", &names)
            .finish()
    }
}

/// Flate decode (zlib/deflate compression)
#[cfg(feature = "compression")]
#[derive(Debug, Default)]
pub struct FlateFilter;

#[cfg(feature = "compression")]
impl Filter for FlateFilter {
    fn name(&self) -> &str {
        "FlateDecode"
    }

    fn decode(
        &self,
        encoded: &[u8],
        parameters: Option<&Dictionary>,
        _index: usize,
    ) -> Result<DecodeResult> {
        use flate2::read::ZlibDecoder;
        use std::io::Read;

        check_no_predictor(parameters)?;
        let mut decoder = ZlibDecoder::new(encoded);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .map_err(|e| PdfError::FilterError(format!("Flate decode error: {e}")))?;
        Ok(DecodeResult::new(decoded, parameters.cloned()))
    }

    fn encode(
        &self,
        decoded: &[u8],
        parameters: Option<&Dictionary>,
        _index: usize,
    ) -> Result<Vec<u8>> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        check_no_predictor(parameters)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(decoded)
            .map_err(|e| PdfError::FilterError(format!("Flate encode error: {e}")))?;
        encoder
            .finish()
            .map_err(|e| PdfError::FilterError(format!("Flate encode error: {e}")))
    }
}

#[cfg(feature = "compression")]
fn check_no_predictor(parameters: Option<&Dictionary>) -> Result<()> {
    let predictor = parameters.map_or(1, |p| p.get_int("Predictor", 1));
    if predictor > 1 {
        return Err(PdfError::UnsupportedFilter(format!(
            "FlateDecode with predictor {predictor}"
        )));
    }
    Ok(())
}

/// ASCII hex decode
#[derive(Debug, Default)]
pub struct AsciiHexFilter;

impl Filter for AsciiHexFilter {
    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }

    fn decode(
        &self,
        encoded: &[u8],
        parameters: Option<&Dictionary>,
        _index: usize,
    ) -> Result<DecodeResult> {
        let mut decoded = Vec::with_capacity(encoded.len() / 2);
        let mut high: Option<u8> = None;
        for &b in encoded {
            if b.is_ascii_whitespace() {
                continue;
            }
            if b == b'>' {
                break;
            }
            let value = hex_digit_value(b).ok_or_else(|| {
                PdfError::FilterError(format!("Invalid hex digit: {}", b as char))
            })?;
            match high.take() {
                Some(h) => decoded.push((h << 4) | value),
                None => high = Some(value),
            }
        }
        // An odd final digit is padded with 0.
        if let Some(h) = high {
            decoded.push(h << 4);
        }
        Ok(DecodeResult::new(decoded, parameters.cloned()))
    }

    fn encode(
        &self,
        decoded: &[u8],
        _parameters: Option<&Dictionary>,
        _index: usize,
    ) -> Result<Vec<u8>> {
        const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
        let mut encoded = Vec::with_capacity(decoded.len() * 2 + 1);
        for &b in decoded {
            encoded.push(DIGITS[usize::from(b >> 4)]);
            encoded.push(DIGITS[usize::from(b & 0x0F)]);
        }
        encoded.push(b'>');
        Ok(encoded)
    }
}

fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_hex_decode() {
        let result = AsciiHexFilter.decode(b"48 65 6C\n6c 6F>", None, 0).unwrap();
        assert_eq!(result.data, b"Hello");
    }

    #[test]
    fn test_ascii_hex_odd_digit_padded() {
        let result = AsciiHexFilter.decode(b"414>", None, 0).unwrap();
        assert_eq!(result.data, vec![0x41, 0x40]);
    }

    #[test]
    fn test_ascii_hex_invalid_digit() {
        let err = AsciiHexFilter.decode(b"4G>", None, 0).unwrap_err();
        assert!(matches!(err, PdfError::FilterError(_)));
    }

    #[test]
    fn test_ascii_hex_encode() {
        let encoded = AsciiHexFilter.encode(&[0x00, 0xAB, 0x7F], None, 0).unwrap();
        assert_eq!(encoded, b"00AB7F>");
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_flate_round_trip() {
        let original = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET".repeat(20);
        let encoded = FlateFilter.encode(&original, None, 0).unwrap();
        assert!(encoded.len() < original.len());

        let decoded = FlateFilter.decode(&encoded, None, 0).unwrap();
        assert_eq!(decoded.data, original);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_flate_corrupt_data_is_filter_error() {
        let err = FlateFilter.decode(b"not zlib", None, 0).unwrap_err();
        assert!(matches!(err, PdfError::FilterError(_)));
        assert!(!err.is_io());
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_flate_predictor_unsupported() {
        let params = Dictionary::new();
        params.set("Predictor", 12);
        let err = FlateFilter.decode(b"", Some(&params), 0).unwrap_err();
        assert!(matches!(err, PdfError::UnsupportedFilter(_)));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = FilterRegistry::with_builtin();
        assert!(registry.contains("ASCIIHexDecode"));
        assert!(matches!(
            registry.get("JBIG2Decode"),
            Err(PdfError::UnsupportedFilter(name)) if name == "JBIG2Decode"
        ));
        assert!(!FilterRegistry::new().contains("ASCIIHexDecode"));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_chain_round_trip() {
        let registry = FilterRegistry::global();
        let chain = vec![Name::new("ASCIIHexDecode"), Name::new("FlateDecode")];
        let original = b"stream content".to_vec();

        let encoded = registry.encode_chain(&original, &chain, &[]).unwrap();
        assert_eq!(encoded.last(), Some(&b'>'));

        let (decoded, steps) = registry.decode_chain(&encoded, &chain, &[]).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(steps.len(), 2);
    }

    struct Upper;

    impl Filter for Upper {
        fn name(&self) -> &str {
            "Upper"
        }

        fn decode(
            &self,
            encoded: &[u8],
            _parameters: Option<&Dictionary>,
            _index: usize,
        ) -> Result<DecodeResult> {
            Ok(DecodeResult::new(encoded.to_ascii_uppercase(), None))
        }

        fn encode(
            &self,
            decoded: &[u8],
            _parameters: Option<&Dictionary>,
            _index: usize,
        ) -> Result<Vec<u8>> {
            Ok(decoded.to_ascii_lowercase())
        }
    }

    #[test]
    fn test_custom_filter_registration() {
        let registry = FilterRegistry::new();
        registry.register(Arc::new(Upper));

        let (decoded, _) = registry
            .decode_chain(b"abc", &[Name::new("Upper")], &[])
            .unwrap();
        assert_eq!(decoded, b"ABC");
    }
}
