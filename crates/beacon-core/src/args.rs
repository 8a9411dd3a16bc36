//! Positional argument binding for topic method calls.
//!
//! Arguments arrive from the wire as dynamically typed [`serde_json::Value`]s
//! and are coerced to the method's declared parameter types by position.
//! Integers travel as a wide wire type and are narrowed with exact range
//! checks; anything that does not fit becomes an [`ArgError`] fault, never a
//! silent default.

use crate::error::ArgError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// The positional arguments of one invocation, plus the call's cancellation
/// token.
pub struct CallArgs {
    values: Vec<Value>,
    index: usize,
    cancel: CancellationToken,
}

impl CallArgs {
    /// Wrap the raw wire arguments for a call.
    #[must_use]
    pub fn new(values: Vec<Value>, cancel: CancellationToken) -> Self {
        Self {
            values,
            index: 0,
            cancel,
        }
    }

    /// Bind the next parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if no argument remains at this position or the value
    /// cannot be coerced to `A`.
    pub fn take<A: FromCallArg>(&mut self) -> Result<A, ArgError> {
        A::from_call_arg(self)
    }

    /// Number of positional arguments not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.values.len().saturating_sub(self.index)
    }

    /// The cancellation token for this call. It is cancelled when the
    /// calling connection drops.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Pop the next positional value, advancing the cursor.
    fn next_value(&mut self) -> Result<(usize, Value), ArgError> {
        let position = self.index;
        let slot = self
            .values
            .get_mut(position)
            .ok_or(ArgError::Missing(position))?;
        self.index += 1;
        Ok((position, slot.take()))
    }
}

/// A parameter type that can be bound from a positional wire argument.
pub trait FromCallArg: Sized {
    /// Bind this type from the next argument position.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or cannot be coerced.
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError>;
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl FromCallArg for Value {
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
        let (_, value) = args.next_value()?;
        Ok(value)
    }
}

impl FromCallArg for String {
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
        let (position, value) = args.next_value()?;
        match value {
            Value::String(s) => Ok(s),
            other => Err(ArgError::WrongKind {
                position,
                expected: "string",
                actual: kind_of(&other),
            }),
        }
    }
}

impl FromCallArg for bool {
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
        let (position, value) = args.next_value()?;
        value.as_bool().ok_or(ArgError::WrongKind {
            position,
            expected: "bool",
            actual: kind_of(&value),
        })
    }
}

impl FromCallArg for f64 {
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
        let (position, value) = args.next_value()?;
        value.as_f64().ok_or(ArgError::WrongKind {
            position,
            expected: "number",
            actual: kind_of(&value),
        })
    }
}

impl FromCallArg for f32 {
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
        f64::from_call_arg(args).map(|v| v as f32)
    }
}

macro_rules! integer_from_call_arg {
    ($($target:ty),* $(,)?) => {$(
        impl FromCallArg for $target {
            fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
                let (position, value) = args.next_value()?;
                let wide = match &value {
                    Value::Number(n) => n
                        .as_i64()
                        .map(i128::from)
                        .or_else(|| n.as_u64().map(i128::from)),
                    _ => None,
                };
                let Some(wide) = wide else {
                    return Err(ArgError::WrongKind {
                        position,
                        expected: "integer",
                        actual: kind_of(&value),
                    });
                };
                <$target>::try_from(wide).map_err(|_| ArgError::OutOfRange {
                    position,
                    value: wide,
                    target: stringify!($target),
                })
            }
        }
    )*};
}

integer_from_call_arg!(i8, i16, i32, i64, u8, u16, u32, u64);

/// Trailing optional parameter: `None` when the caller supplied fewer
/// arguments, otherwise bound like `T`.
impl<T: FromCallArg> FromCallArg for Option<T> {
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
        if args.remaining() == 0 {
            return Ok(None);
        }
        T::from_call_arg(args).map(Some)
    }
}

/// A cancellation-token parameter binds to the call's token without
/// consuming a positional argument. The token is cancelled when the calling
/// connection disconnects.
impl FromCallArg for CancellationToken {
    fn from_call_arg(args: &mut CallArgs) -> Result<Self, ArgError> {
        Ok(args.cancellation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(values: Vec<Value>) -> CallArgs {
        CallArgs::new(values, CancellationToken::new())
    }

    #[test]
    fn test_positional_binding() {
        let mut a = args(vec![json!("hi"), json!(42), json!(true)]);
        assert_eq!(a.take::<String>().unwrap(), "hi");
        assert_eq!(a.take::<i32>().unwrap(), 42);
        assert!(a.take::<bool>().unwrap());
        assert_eq!(a.remaining(), 0);
    }

    #[test]
    fn test_missing_argument() {
        let mut a = args(vec![json!("only")]);
        let _ = a.take::<String>().unwrap();
        assert!(matches!(a.take::<i32>(), Err(ArgError::Missing(1))));
    }

    #[test]
    fn test_wrong_kind() {
        let mut a = args(vec![json!(42)]);
        assert!(matches!(
            a.take::<String>(),
            Err(ArgError::WrongKind { position: 0, .. })
        ));
    }

    #[test]
    fn test_narrowing_full_i8_range() {
        // Every value representable by the narrow type round-trips exactly.
        for v in i8::MIN..=i8::MAX {
            let mut a = args(vec![json!(i64::from(v))]);
            assert_eq!(a.take::<i8>().unwrap(), v);
        }
    }

    #[test]
    fn test_narrowing_full_u8_range() {
        for v in u8::MIN..=u8::MAX {
            let mut a = args(vec![json!(u64::from(v))]);
            assert_eq!(a.take::<u8>().unwrap(), v);
        }
    }

    #[test]
    fn test_narrowing_out_of_range() {
        let mut a = args(vec![json!(128)]);
        assert!(matches!(
            a.take::<i8>(),
            Err(ArgError::OutOfRange { position: 0, value: 128, .. })
        ));

        let mut a = args(vec![json!(-1)]);
        assert!(matches!(a.take::<u64>(), Err(ArgError::OutOfRange { .. })));
    }

    #[test]
    fn test_u64_above_i64_range() {
        let mut a = args(vec![json!(u64::MAX)]);
        assert_eq!(a.take::<u64>().unwrap(), u64::MAX);
    }

    #[test]
    fn test_trailing_optional() {
        let mut a = args(vec![json!("x")]);
        assert_eq!(a.take::<String>().unwrap(), "x");
        assert_eq!(a.take::<Option<i32>>().unwrap(), None);

        let mut a = args(vec![json!("x"), json!(5)]);
        let _ = a.take::<String>().unwrap();
        assert_eq!(a.take::<Option<i32>>().unwrap(), Some(5));
    }

    #[test]
    fn test_cancellation_token_is_not_positional() {
        let cancel = CancellationToken::new();
        let mut a = CallArgs::new(vec![json!(1)], cancel.clone());
        let token = a.take::<CancellationToken>().unwrap();
        assert!(!token.is_cancelled());
        cancel.cancel();
        assert!(token.is_cancelled());
        // The positional argument is still there.
        assert_eq!(a.take::<i32>().unwrap(), 1);
    }

    #[test]
    fn test_raw_value_passthrough() {
        let mut a = args(vec![json!({"k": [1, 2]})]);
        assert_eq!(a.take::<Value>().unwrap(), json!({"k": [1, 2]}));
    }
}
