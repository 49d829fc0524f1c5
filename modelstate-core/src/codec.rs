/*!
Value codec: primitive values to and from their persisted textual form.

Every leaf of a state document is text. Floating point values can be written
at two precisions: [`Precision::Full`] round-trips the exact bit pattern,
[`Precision::Short`] keeps single-precision significant digits and is meant
for diagnostic or example data where footprint matters more than exactness.
*/

use crate::{PersistError, Result};

/// Token written for NaN.
pub const NAN_TOKEN: &str = "nan";
/// Token written for positive infinity.
pub const POS_INF_TOKEN: &str = "inf";
/// Token written for negative infinity.
pub const NEG_INF_TOKEN: &str = "-inf";

/// Separator used by the list helpers.
pub const LIST_DELIMITER: char = ',';

const SHORT_SIGNIFICANT_DIGITS: usize = 7;

/// Floating point precision used when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// Single-precision significant digits
    Short,
    /// Shortest text that restores the identical `f64`
    #[default]
    Full,
}

/// Encode a floating point value at the requested precision.
///
/// # Example
/// ```rust
/// use modelstate_core::codec::{decode_f64, encode_f64, Precision};
///
/// assert_eq!(encode_f64(3.14, Precision::Short), "3.14");
/// let x = 0.1 + 0.2;
/// assert_eq!(decode_f64(&encode_f64(x, Precision::Full)).unwrap(), x);
/// ```
pub fn encode_f64(value: f64, precision: Precision) -> String {
    if value.is_nan() {
        return NAN_TOKEN.to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            POS_INF_TOKEN.to_string()
        } else {
            NEG_INF_TOKEN.to_string()
        };
    }
    match precision {
        Precision::Full => format_finite(value),
        Precision::Short => {
            let rounded = format!("{:.*e}", SHORT_SIGNIFICANT_DIGITS - 1, value);
            // Always parses: we just produced it from a finite value.
            let rounded: f64 = rounded.parse().unwrap_or(value);
            format_finite(rounded)
        }
    }
}

/// Decode text produced by [`encode_f64`] at either precision.
pub fn decode_f64(text: &str) -> Result<f64> {
    match text {
        NAN_TOKEN | "NaN" | "NAN" => Ok(f64::NAN),
        POS_INF_TOKEN | "+inf" | "infinity" | "Infinity" => Ok(f64::INFINITY),
        NEG_INF_TOKEN | "-infinity" | "-Infinity" => Ok(f64::NEG_INFINITY),
        _ => text
            .parse::<f64>()
            .map_err(|_| PersistError::value_decode(text, "f64")),
    }
}

/// Encode a slice of floating point values as one delimited text value.
pub fn encode_f64_list(values: &[f64], precision: Precision) -> String {
    values
        .iter()
        .map(|value| encode_f64(*value, precision))
        .collect::<Vec<_>>()
        .join(&LIST_DELIMITER.to_string())
}

/// Decode a delimited list written by [`encode_f64_list`]. Empty text is an empty list.
pub fn decode_f64_list(text: &str) -> Result<Vec<f64>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(LIST_DELIMITER).map(decode_f64).collect()
}

// Plain decimal for ordinary magnitudes, scientific notation otherwise. Both
// forms are the shortest representation that parses back to `value`.
fn format_finite(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-5..1e16).contains(&magnitude) {
        format!("{value}")
    } else {
        format!("{value:e}")
    }
}

/// A primitive that can be stored as a leaf of a state document.
pub trait StateValue: Sized {
    /// Name used in decode errors.
    const TYPE_NAME: &'static str;

    /// Textual form of the value.
    fn to_state_text(&self) -> String;

    /// Parse the textual form back.
    fn from_state_text(text: &str) -> Result<Self>;
}

impl StateValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn to_state_text(&self) -> String {
        encode_f64(*self, Precision::Full)
    }

    fn from_state_text(text: &str) -> Result<Self> {
        decode_f64(text)
    }
}

impl StateValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn to_state_text(&self) -> String {
        if self.is_finite() {
            // f32 Display is the shortest text that restores the same f32.
            format!("{self}")
        } else {
            encode_f64(f64::from(*self), Precision::Full)
        }
    }

    fn from_state_text(text: &str) -> Result<Self> {
        match decode_f64(text)? {
            value if value.is_finite() => text
                .parse::<f32>()
                .map_err(|_| PersistError::value_decode(text, Self::TYPE_NAME)),
            value => Ok(value as f32),
        }
    }
}

impl StateValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn to_state_text(&self) -> String {
        self.to_string()
    }

    fn from_state_text(text: &str) -> Result<Self> {
        match text {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(PersistError::value_decode(text, Self::TYPE_NAME)),
        }
    }
}

impl StateValue for char {
    const TYPE_NAME: &'static str = "char";

    fn to_state_text(&self) -> String {
        self.to_string()
    }

    fn from_state_text(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(PersistError::value_decode(text, Self::TYPE_NAME)),
        }
    }
}

impl StateValue for String {
    const TYPE_NAME: &'static str = "string";

    fn to_state_text(&self) -> String {
        self.clone()
    }

    fn from_state_text(text: &str) -> Result<Self> {
        Ok(text.to_string())
    }
}

macro_rules! integer_state_value {
    ($($ty:ty),*) => {
        $(
            impl StateValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn to_state_text(&self) -> String {
                    self.to_string()
                }

                fn from_state_text(text: &str) -> Result<Self> {
                    text.parse::<$ty>()
                        .map_err(|_| PersistError::value_decode(text, Self::TYPE_NAME))
                }
            }
        )*
    };
}

integer_state_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Anything that can be written as a leaf value: every [`StateValue`] plus
/// borrowed strings.
pub trait IntoStateText {
    fn into_state_text(self) -> String;
}

impl<T: StateValue> IntoStateText for T {
    fn into_state_text(self) -> String {
        self.to_state_text()
    }
}

impl IntoStateText for &str {
    fn into_state_text(self) -> String {
        self.to_string()
    }
}

impl IntoStateText for &String {
    fn into_state_text(self) -> String {
        self.clone()
    }
}

/// Encode any [`StateValue`].
pub fn encode<T: StateValue>(value: &T) -> String {
    value.to_state_text()
}

/// Decode any [`StateValue`].
pub fn decode<T: StateValue>(text: &str) -> Result<T> {
    T::from_state_text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_full_precision_roundtrip_random_bits() {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let value = f64::from_bits(rng.gen::<u64>());
            if !value.is_finite() {
                continue;
            }
            let text = encode_f64(value, Precision::Full);
            let restored = decode_f64(&text).unwrap();
            assert_eq!(restored.to_bits(), value.to_bits(), "{value} -> {text}");
        }
    }

    #[test]
    fn test_full_precision_extremes() {
        for value in [
            f64::MIN_POSITIVE,
            f64::MAX,
            f64::MIN,
            f64::EPSILON,
            1e-300,
            5e-324,
            123456789.123456789,
            0.1 + 0.2,
        ] {
            let restored = decode_f64(&encode_f64(value, Precision::Full)).unwrap();
            assert_eq!(restored.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_negative_zero_is_preserved() {
        let text = encode_f64(-0.0, Precision::Full);
        assert_eq!(text, "-0");
        let restored = decode_f64(&text).unwrap();
        assert!(restored == 0.0 && restored.is_sign_negative());
    }

    #[test]
    fn test_short_precision_within_tolerance() {
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let value: f64 = rng.gen_range(-1e6..1e6);
            let restored = decode_f64(&encode_f64(value, Precision::Short)).unwrap();
            let tolerance = 1e-6 * value.abs().max(f64::MIN_POSITIVE);
            assert!((restored - value).abs() <= tolerance, "{value} vs {restored}");
        }
    }

    #[test]
    fn test_short_precision_is_compact() {
        assert_eq!(encode_f64(3.14, Precision::Short), "3.14");
        assert_eq!(encode_f64(1.0 / 3.0, Precision::Short), "0.3333333");
        assert_eq!(encode_f64(1234567.891, Precision::Short), "1234568");
    }

    #[test]
    fn test_non_finite_tokens() {
        for precision in [Precision::Short, Precision::Full] {
            assert_eq!(encode_f64(f64::NAN, precision), NAN_TOKEN);
            assert_eq!(encode_f64(f64::INFINITY, precision), POS_INF_TOKEN);
            assert_eq!(encode_f64(f64::NEG_INFINITY, precision), NEG_INF_TOKEN);
        }
        assert!(decode_f64(NAN_TOKEN).unwrap().is_nan());
        assert_eq!(decode_f64(POS_INF_TOKEN).unwrap(), f64::INFINITY);
        assert_eq!(decode_f64(NEG_INF_TOKEN).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_large_magnitudes_use_exponent() {
        assert_eq!(encode_f64(1e300, Precision::Full), "1e300");
        assert_eq!(encode_f64(-2.5e-7, Precision::Full), "-2.5e-7");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_f64("3.1x"),
            Err(PersistError::ValueDecode { expected: "f64", .. })
        ));
        assert!(decode::<u32>("-1").is_err());
        assert!(decode::<bool>("yes").is_err());
        assert!(decode::<char>("zz").is_err());
        assert!(decode::<char>("").is_err());
    }

    #[test]
    fn test_primitive_roundtrips() {
        assert!(decode::<bool>(&encode(&true)).unwrap());
        assert!(!decode::<bool>("0").unwrap());
        assert_eq!(decode::<char>(&encode(&'z')).unwrap(), 'z');
        assert_eq!(decode::<i64>(&encode(&i64::MIN)).unwrap(), i64::MIN);
        assert_eq!(decode::<u64>(&encode(&u64::MAX)).unwrap(), u64::MAX);
        assert_eq!(decode::<usize>(&encode(&25usize)).unwrap(), 25);
        assert_eq!(
            decode::<String>(&encode(&"a<b>&c".to_string())).unwrap(),
            "a<b>&c"
        );
        let single = 0.1f32;
        assert_eq!(decode::<f32>(&encode(&single)).unwrap().to_bits(), single.to_bits());
    }

    #[test]
    fn test_f64_list_roundtrip() {
        let values = vec![1.5, -0.0, f64::NAN, 1e-300];
        let text = encode_f64_list(&values, Precision::Full);
        let restored = decode_f64_list(&text).unwrap();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored[0], 1.5);
        assert!(restored[1].is_sign_negative());
        assert!(restored[2].is_nan());
        assert_eq!(restored[3], 1e-300);
        assert!(decode_f64_list("").unwrap().is_empty());
    }
}
