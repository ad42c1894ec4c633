//! Tagged numeric scalar shared by indices, pixel samples and expected results.

/// A 64-bit numeric value tagged as either integer or floating point.
///
/// The tag only records which setter ran last. Every accessor projects the
/// stored 64-bit pattern into the requested view without looking at the tag:
///
/// - integer views of a `Float` value read `f64::to_bits` of the payload,
/// - float views of an `Integer` value read `f64::from_bits` of the payload.
///
/// Reading a view that does not match the tag is never an error and silently
/// yields a reinterpreted number. Probe comparisons depend on this exact
/// behaviour, so it is kept as is. Callers that care must check
/// [`is_integer`](Self::is_integer) / [`is_float`](Self::is_float) first.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ScalarValue {
    Integer(u64),
    Float(f64),
}

impl Default for ScalarValue {
    fn default() -> Self {
        ScalarValue::Float(0.0)
    }
}

impl ScalarValue {
    #[inline]
    pub const fn integer(bits: u64) -> Self {
        ScalarValue::Integer(bits)
    }

    #[inline]
    pub const fn float(value: f64) -> Self {
        ScalarValue::Float(value)
    }

    /// Replaces the payload with `value` and tags it as integer.
    #[inline]
    pub fn set_integer(&mut self, value: u64) {
        *self = ScalarValue::Integer(value);
    }

    /// Replaces the payload with `value` and tags it as float.
    #[inline]
    pub fn set_float(&mut self, value: f64) {
        *self = ScalarValue::Float(value);
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarValue::Integer(_))
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, ScalarValue::Float(_))
    }

    /// Raw 64-bit pattern backing every view.
    #[inline]
    fn bits(&self) -> u64 {
        match *self {
            ScalarValue::Integer(bits) => bits,
            ScalarValue::Float(value) => value.to_bits(),
        }
    }

    #[inline]
    pub fn as_u8(&self) -> u8 {
        self.bits() as u8
    }

    #[inline]
    pub fn as_u16(&self) -> u16 {
        self.bits() as u16
    }

    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.bits() as u32
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.bits()
    }

    #[inline]
    pub fn as_i8(&self) -> i8 {
        self.bits() as i8
    }

    #[inline]
    pub fn as_i16(&self) -> i16 {
        self.bits() as i16
    }

    #[inline]
    pub fn as_i32(&self) -> i32 {
        self.bits() as i32
    }

    #[inline]
    pub fn as_i64(&self) -> i64 {
        self.bits() as i64
    }

    /// Correctly-rounded narrowing of [`as_f64`](Self::as_f64).
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.as_f64() as f32
    }

    #[inline]
    pub fn as_f64(&self) -> f64 {
        match *self {
            ScalarValue::Integer(bits) => f64::from_bits(bits),
            ScalarValue::Float(value) => value,
        }
    }
}

impl From<u32> for ScalarValue {
    fn from(value: u32) -> Self {
        ScalarValue::Integer(u64::from(value))
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<f32> for ScalarValue {
    fn from(value: f32) -> Self {
        ScalarValue::Float(f64::from(value))
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}
