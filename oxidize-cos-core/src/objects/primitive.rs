use crate::error::{PdfError, Result};
use crate::objects::{Array, Dictionary, Name, ObjectKey, Proxy, Stream};
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::warn;

/// A PDF real number.
///
/// Stored as the nearest `f32`. Magnitudes below the smallest normal `f32`
/// collapse to zero and magnitudes above `f32::MAX` saturate instead of
/// becoming infinite. Equality and hashing compare bit patterns.
#[derive(Debug, Clone, Copy)]
pub struct Real(f32);

impl Real {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            warn!("NaN real coerced to 0");
            return Real(0.0);
        }
        if value.abs() > f64::from(f32::MAX) {
            return Real(if value.is_sign_negative() {
                -f32::MAX
            } else {
                f32::MAX
            });
        }
        if value.abs() < f64::from(f32::MIN_POSITIVE) {
            return Real(0.0);
        }
        Self::from_f32(value as f32)
    }

    /// Applies the same coercion as [`new`](Self::new). Zero, subnormals
    /// and negative zero all become `+0`.
    pub fn from_f32(value: f32) -> Self {
        if value.is_nan() {
            warn!("NaN real coerced to 0");
            Real(0.0)
        } else if value.is_infinite() {
            Real(if value.is_sign_negative() {
                -f32::MAX
            } else {
                f32::MAX
            })
        } else if value.abs() < f32::MIN_POSITIVE {
            Real(0.0)
        } else {
            Real(value)
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Parse a numeric token as written in a content or object stream.
    ///
    /// Accepts doubled signs (`--5`, `-+3`) and a minus misplaced after the
    /// leading zeros of a fraction (`0.00-12`), both produced by broken
    /// writers.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let sign_len = token
            .bytes()
            .take_while(|b| *b == b'-' || *b == b'+')
            .count();
        let (signs, body) = token.split_at(sign_len);
        let mut negative = signs.contains('-');

        let mut body = body.to_string();
        if let Some(fixed) = fix_misplaced_minus(&body) {
            negative = !negative;
            body = fixed;
        }

        if !is_numeric_body(&body) {
            return Err(PdfError::InvalidArgument(format!(
                "not a real number: {token:?}"
            )));
        }

        let magnitude: f32 = body.parse().map_err(|_| {
            PdfError::InvalidArgument(format!("not a real number: {token:?}"))
        })?;
        Ok(Self::from_f32(if negative { -magnitude } else { magnitude }))
    }
}

/// `0.00-12` becomes `0.0012`.
fn fix_misplaced_minus(body: &str) -> Option<String> {
    let rest = body.strip_prefix("0.")?;
    let zeros = rest.bytes().take_while(|b| *b == b'0').count();
    let digits = rest[zeros..].strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("0.{}{}", &rest[..zeros], digits))
}

fn is_numeric_body(body: &str) -> bool {
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };

    let mut digits = 0;
    let mut dots = 0;
    for b in mantissa.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return false,
        }
    }
    if digits == 0 || dots > 1 {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && exp.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

impl PartialEq for Real {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Real {}

impl Hash for Real {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Real {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `f32` Display is the shortest round-trip form and never uses an exponent.
        write!(f, "{}", self.0)
    }
}

impl From<f32> for Real {
    fn from(value: f32) -> Self {
        Real::from_f32(value)
    }
}

impl From<f64> for Real {
    fn from(value: f64) -> Self {
        Real::new(value)
    }
}

/// A PDF string: raw bytes plus a hint for hex serialization.
#[derive(Clone, Default)]
pub struct PdfString {
    bytes: Vec<u8>,
    hex: bool,
}

impl PdfString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
        }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
        }
    }

    /// Encode text: ASCII is stored as-is, anything else as UTF-16BE with a BOM.
    pub fn from_text(text: &str) -> Self {
        if text.is_ascii() {
            return Self::new(text.as_bytes());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn is_hex(&self) -> bool {
        self.hex
    }

    pub fn set_hex(&mut self, hex: bool) {
        self.hex = hex;
    }

    /// Decode as text, honoring a UTF-16BE byte order mark.
    pub fn to_text(&self) -> String {
        match self.bytes.strip_prefix(&[0xFE, 0xFF]) {
            Some(utf16) => {
                let units: Vec<u16> = utf16
                    .chunks(2)
                    .map(|pair| match pair {
                        [hi, lo] => u16::from_be_bytes([*hi, *lo]),
                        [hi] => u16::from_be_bytes([*hi, 0]),
                        _ => 0,
                    })
                    .collect();
                String::from_utf16_lossy(&units)
            }
            None => self.to_string_lossy(),
        }
    }

    /// Bytes interpreted as Latin-1.
    pub fn to_string_lossy(&self) -> String {
        self.bytes.iter().map(|&b| char::from(b)).collect()
    }
}

impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PdfString {}

impl Hash for PdfString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hex {
            write!(f, "<")?;
            for b in &self.bytes {
                write!(f, "{b:02X}")?;
            }
            write!(f, ">")
        } else {
            write!(f, "({})", self.to_string_lossy())
        }
    }
}

/// A COS value.
///
/// Containers and streams are shared handles: cloning an `Object` holding
/// one of them yields another handle to the same container.
#[derive(Clone)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(Real),
    String(PdfString),
    Name(Name),
    Array(Array),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(Proxy),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Object::Reference(_))
    }

    /// Resolve a reference through its proxy; other values are returned as-is.
    pub fn dereference(&self) -> Object {
        match self {
            Object::Reference(proxy) => proxy.resolve(),
            other => other.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real.
    pub fn as_real(&self) -> Option<f32> {
        match self {
            Object::Real(r) => Some(r.value()),
            Object::Integer(i) => Some(*i as f32),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// The dictionary of a dictionary or stream.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(stream.dictionary()),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Proxy> {
        match self {
            Object::Reference(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn reference_key(&self) -> Option<ObjectKey> {
        self.as_reference().map(Proxy::key)
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> PdfError {
        PdfError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::Null
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Real(a), Object::Real(b)) => a == b,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Name(a), Object::Name(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => a == b,
            (Object::Dictionary(a), Object::Dictionary(b)) => a == b,
            (Object::Stream(a), Object::Stream(b)) => a.ptr_eq(b),
            (Object::Reference(a), Object::Reference(b)) => a.key() == b.key(),
            _ => false,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Null => write!(f, "null"),
            Object::Boolean(b) => write!(f, "{b}"),
            Object::Integer(i) => write!(f, "{i}"),
            Object::Real(r) => write!(f, "{r}"),
            Object::String(s) => write!(f, "{s:?}"),
            Object::Name(n) => write!(f, "{n:?}"),
            Object::Array(a) => write!(f, "{a:?}"),
            Object::Dictionary(d) => write!(f, "{d:?}"),
            Object::Stream(s) => write!(f, "{s:?}"),
            Object::Reference(p) => write!(f, "{}", p.key()),
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl From<i32> for Object {
    fn from(i: i32) -> Self {
        Object::Integer(i64::from(i))
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<u32> for Object {
    fn from(i: u32) -> Self {
        Object::Integer(i64::from(i))
    }
}

impl From<f32> for Object {
    fn from(f: f32) -> Self {
        Object::Real(Real::from_f32(f))
    }
}

impl From<f64> for Object {
    fn from(f: f64) -> Self {
        Object::Real(Real::new(f))
    }
}

impl From<Real> for Object {
    fn from(r: Real) -> Self {
        Object::Real(r)
    }
}

impl From<PdfString> for Object {
    fn from(s: PdfString) -> Self {
        Object::String(s)
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Object::String(PdfString::from_text(&s))
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::String(PdfString::from_text(s))
    }
}

impl From<Name> for Object {
    fn from(n: Name) -> Self {
        Object::Name(n)
    }
}

impl From<&Name> for Object {
    fn from(n: &Name) -> Self {
        Object::Name(n.clone())
    }
}

impl From<Array> for Object {
    fn from(a: Array) -> Self {
        Object::Array(a)
    }
}

impl From<Vec<Object>> for Object {
    fn from(v: Vec<Object>) -> Self {
        Object::Array(Array::from(v))
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl From<Stream> for Object {
    fn from(s: Stream) -> Self {
        Object::Stream(s)
    }
}

impl From<Proxy> for Object {
    fn from(p: Proxy) -> Self {
        Object::Reference(p)
    }
}

impl From<&Proxy> for Object {
    fn from(p: &Proxy) -> Self {
        Object::Reference(p.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_underflow_collapses_to_zero() {
        assert_eq!(Real::new(1e-40).value(), 0.0);
        assert_eq!(Real::new(-1e-45).value(), 0.0);
        assert_eq!(Real::from_f32(f32::MIN_POSITIVE / 2.0).value(), 0.0);
        assert_eq!(Real::new(f64::from(f32::MIN_POSITIVE)).value(), f32::MIN_POSITIVE);
    }

    #[test]
    fn test_real_overflow_saturates() {
        assert_eq!(Real::new(1e39).value(), f32::MAX);
        assert_eq!(Real::new(-1e300).value(), -f32::MAX);
        assert_eq!(Real::from_f32(f32::INFINITY).value(), f32::MAX);
        assert_eq!(Real::new(f64::NEG_INFINITY).value(), -f32::MAX);
    }

    #[test]
    fn test_real_nan_becomes_zero() {
        assert_eq!(Real::new(f64::NAN).value(), 0.0);
    }

    #[test]
    fn test_real_equality_is_bitwise() {
        assert_eq!(Real::from_f32(1.5), Real::from_f32(1.5));
        assert_ne!(Real::from_f32(1.0), Real::from_f32(-1.0));
        assert_ne!(Real::from_f32(0.1), Real::from_f32(0.1 + f32::EPSILON));
    }

    #[test]
    fn test_negative_zero_collapses_to_zero() {
        assert_eq!(Real::from_f32(-0.0), Real::from_f32(0.0));
        assert_eq!(Real::from_f32(-0.0).value().to_bits(), 0);
        assert_eq!(Real::new(-0.0).value().to_bits(), 0);
        assert_eq!(Real::parse("-0.0").unwrap().value().to_bits(), 0);
    }

    #[test]
    fn test_real_parse_plain() {
        assert_eq!(Real::parse("3.25").unwrap().value(), 3.25);
        assert_eq!(Real::parse("-.5").unwrap().value(), -0.5);
        assert_eq!(Real::parse("+7.").unwrap().value(), 7.0);
        assert_eq!(Real::parse("  42 ").unwrap().value(), 42.0);
        assert_eq!(Real::parse("1.5e2").unwrap().value(), 150.0);
    }

    #[test]
    fn test_real_parse_malformed_signs() {
        assert_eq!(Real::parse("--5").unwrap().value(), -5.0);
        assert_eq!(Real::parse("-+3").unwrap().value(), -3.0);
        assert_eq!(Real::parse("++2.5").unwrap().value(), 2.5);
    }

    #[test]
    fn test_real_parse_misplaced_minus() {
        assert_eq!(Real::parse("0.00-12").unwrap(), Real::parse("-0.0012").unwrap());
        assert_eq!(Real::parse("0.-5").unwrap().value(), -0.5);
    }

    #[test]
    fn test_real_parse_rejects_garbage() {
        for token in ["", "-", ".", "abc", "1.2.3", "12x", "inf", "NaN", "1e", "0.0-"] {
            assert!(
                matches!(Real::parse(token), Err(PdfError::InvalidArgument(_))),
                "{token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_real_parse_out_of_range() {
        assert_eq!(Real::parse("1e50").unwrap().value(), f32::MAX);
        assert_eq!(Real::parse("-1e50").unwrap().value(), -f32::MAX);
        assert_eq!(Real::parse("1e-42").unwrap().value(), 0.0);
    }

    #[test]
    fn test_real_display_round_trips() {
        for value in [0.1f32, 1.0, -2.75, 123456.79, 1e-30, 3.4e38] {
            let real = Real::from_f32(value);
            let text = real.to_string();
            assert!(!text.contains('e'), "{text} uses exponent notation");
            assert_eq!(Real::parse(&text).unwrap(), real);
        }
    }

    #[test]
    fn test_pdf_string_text_round_trip() {
        let ascii = PdfString::from_text("Hello");
        assert_eq!(ascii.as_bytes(), b"Hello");
        assert_eq!(ascii.to_text(), "Hello");

        let unicode = PdfString::from_text("Grüße");
        assert_eq!(&unicode.as_bytes()[..2], &[0xFE, 0xFF]);
        assert_eq!(unicode.to_text(), "Grüße");
    }

    #[test]
    fn test_pdf_string_hex_flag_ignored_by_equality() {
        let literal = PdfString::new(vec![0x01, 0xAB]);
        let hex = PdfString::hex(vec![0x01, 0xAB]);
        assert!(hex.is_hex());
        assert_eq!(literal, hex);
        assert_eq!(format!("{hex:?}"), "<01AB>");
    }

    #[test]
    fn test_object_accessors() {
        assert!(Object::Null.is_null());
        assert_eq!(Object::from(true).as_bool(), Some(true));
        assert_eq!(Object::from(42i64).as_integer(), Some(42));
        assert_eq!(Object::from(42i32).as_real(), Some(42.0));
        assert_eq!(Object::from(2.5f32).as_real(), Some(2.5));
        assert_eq!(Object::from(Name::new("Type")).as_name().unwrap().as_str(), "Type");
        assert_eq!(Object::from("text").as_string().unwrap().to_text(), "text");
        assert!(Object::from(1i64).as_name().is_none());
    }

    #[test]
    fn test_object_type_names() {
        assert_eq!(Object::Null.type_name(), "Null");
        assert_eq!(Object::from(Dictionary::new()).type_name(), "Dictionary");
        assert_eq!(Object::from(Array::new()).type_name(), "Array");
        assert_eq!(
            Object::from(1i64).mismatch("Name").to_string(),
            "Type mismatch: expected Name, found Integer"
        );
    }

    #[test]
    fn test_object_equality_by_content() {
        let a = Array::from_ints(&[1, 2, 3]);
        let b = Array::from_ints(&[1, 2, 3]);
        assert_eq!(Object::from(a), Object::from(b));
        assert_ne!(Object::from(1i64), Object::from(1.0f32));
    }
}
