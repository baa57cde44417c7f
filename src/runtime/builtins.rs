//! Built-in functions, always present in a fresh environment.
//!
//! These mirror the coercion-heavy contract of the filter language: most
//! take any value and work on its inspect form, returning `Null` rather
//! than failing on bad input.

use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::runtime::environment::Environment;
use crate::runtime::value::Value;

/// Maximum regex nesting level, to keep hostile patterns cheap.
const REGEX_NEST_LIMIT: u32 = 10;

/// Maximum size of a compiled regex in bytes.
const REGEX_SIZE_LIMIT: usize = 100_000;

lazy_static! {
    // Compiled patterns are constants, so the cache is process-wide and
    // shared across runs and threads.
    static ref REGEX_CACHE: RwLock<HashMap<String, Regex>> = RwLock::new(HashMap::new());
}

/// Fetch a compiled regex from the cache, compiling on first use.
pub(crate) fn cached_regex(pattern: &str) -> Result<Regex, regex::Error> {
    if let Some(re) = REGEX_CACHE
        .read()
        .expect("regex cache lock poisoned")
        .get(pattern)
    {
        return Ok(re.clone());
    }

    let re = RegexBuilder::new(pattern)
        .nest_limit(REGEX_NEST_LIMIT)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()?;

    REGEX_CACHE
        .write()
        .expect("regex cache lock poisoned")
        .insert(pattern.to_string(), re.clone());

    Ok(re)
}

/// Register every built-in on the given environment.
pub(crate) fn install(env: &mut Environment) {
    env.register_function("float", fn_float);
    env.register_function("int", fn_int);
    env.register_function("len", fn_len);
    env.register_function("lower", fn_lower);
    env.register_function("upper", fn_upper);
    env.register_function("string", fn_string);
    env.register_function("trim", fn_trim);
    env.register_function("type", fn_type);
    env.register_function("print", fn_print);
    env.register_function("match", fn_match);
}

/// `float(x)`: parse the inspect form as a float.
fn fn_float(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::Null;
    }
    match args[0].inspect().parse::<f64>() {
        Ok(n) => Value::Float(n),
        Err(_) => Value::Null,
    }
}

/// `int(x)`: parse the inspect form as a base-10 integer.
fn fn_int(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::Null;
    }
    match args[0].inspect().parse::<i64>() {
        Ok(n) => Value::Integer(n),
        Err(_) => Value::Null,
    }
}

/// `len(x)`: element count for arrays, otherwise the Unicode scalar count
/// of the inspect form. So `len(false)` is 5 and `len(3)` is 1.
fn fn_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::Null;
    }
    match &args[0] {
        Value::Array(elements) => Value::Integer(elements.len() as i64),
        other => Value::Integer(other.inspect().chars().count() as i64),
    }
}

/// `lower(x)`: lower-case the inspect form.
fn fn_lower(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::Null;
    }
    Value::String(args[0].inspect().to_lowercase())
}

/// `upper(x)`: upper-case the inspect form, so `upper(true)` is `"TRUE"`.
fn fn_upper(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::Null;
    }
    Value::String(args[0].inspect().to_uppercase())
}

/// `string(x)`: the inspect form as a string value.
fn fn_string(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::Null;
    }
    Value::String(args[0].inspect())
}

/// `trim(...)`: concatenate all arguments' inspect forms and strip
/// leading/trailing whitespace.
fn fn_trim(args: &[Value]) -> Value {
    let mut joined = String::new();
    for arg in args {
        joined.push_str(&arg.inspect());
    }
    Value::String(joined.trim().to_string())
}

/// `type(x)`: the lowercase name of the value's type tag.
fn fn_type(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::Null;
    }
    Value::String(args[0].kind().name().to_string())
}

/// `print(...)`: write each argument's inspect form to stdout.
fn fn_print(args: &[Value]) -> Value {
    for arg in args {
        print!("{}", arg.inspect());
    }
    Value::Integer(0)
}

/// `match(haystack, pattern)`: split the haystack by newline, trim each
/// line, and report whether any line matches the pattern.
///
/// An invalid pattern is not an error: it prints a diagnostic to stderr
/// and the match is false.
fn fn_match(args: &[Value]) -> Value {
    if args.len() != 2 {
        return Value::Boolean(false);
    }

    let haystack = args[0].inspect();
    let pattern = args[1].inspect();

    let re = match cached_regex(&pattern) {
        Ok(re) => re,
        Err(err) => {
            eprintln!("invalid regular expression {}: {}", pattern, err);
            return Value::Boolean(false);
        }
    };

    for line in haystack.split('\n') {
        if re.is_match(line.trim()) {
            return Value::Boolean(true);
        }
    }
    Value::Boolean(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float() {
        assert_eq!(fn_float(&[Value::String("3.5".into())]), Value::Float(3.5));
        assert_eq!(fn_float(&[Value::Integer(3)]), Value::Float(3.0));
        assert_eq!(fn_float(&[Value::String("steve".into())]), Value::Null);
        assert_eq!(fn_float(&[]), Value::Null);
    }

    #[test]
    fn test_int() {
        assert_eq!(fn_int(&[Value::String("42".into())]), Value::Integer(42));
        assert_eq!(fn_int(&[Value::Boolean(true)]), Value::Null);
        assert_eq!(fn_int(&[Value::String("3.5".into())]), Value::Null);
    }

    #[test]
    fn test_len_counts_scalars_not_bytes() {
        assert_eq!(fn_len(&[Value::String("héllo".into())]), Value::Integer(5));
        assert_eq!(fn_len(&[Value::Boolean(false)]), Value::Integer(5));
        assert_eq!(fn_len(&[Value::Integer(3)]), Value::Integer(1));
        assert_eq!(
            fn_len(&[Value::Array(vec![Value::Integer(1), Value::Integer(2)])]),
            Value::Integer(2)
        );
        assert_eq!(fn_len(&[Value::Array(Vec::new())]), Value::Integer(0));
    }

    #[test]
    fn test_case_folding() {
        assert_eq!(
            fn_lower(&[Value::String("STEVE".into())]),
            Value::String("steve".into())
        );
        assert_eq!(
            fn_upper(&[Value::Boolean(true)]),
            Value::String("TRUE".into())
        );
    }

    #[test]
    fn test_trim_is_variadic() {
        assert_eq!(
            fn_trim(&[
                Value::String("  a".into()),
                Value::String("b  ".into()),
            ]),
            Value::String("ab".into())
        );
        assert_eq!(fn_trim(&[]), Value::String(String::new()));
    }

    #[test]
    fn test_type() {
        assert_eq!(fn_type(&[Value::Integer(1)]), Value::String("integer".into()));
        assert_eq!(fn_type(&[Value::Null]), Value::String("null".into()));
        assert_eq!(
            fn_type(&[Value::Array(Vec::new())]),
            Value::String("array".into())
        );
    }

    #[test]
    fn test_match_basic() {
        assert_eq!(
            fn_match(&[
                Value::String("Kernel PANIC".into()),
                Value::String("(?i)panic".into()),
            ]),
            Value::Boolean(true)
        );
        assert_eq!(
            fn_match(&[Value::String("all fine".into()), Value::String("panic".into())]),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_match_tries_each_trimmed_line() {
        assert_eq!(
            fn_match(&[
                Value::String("one\n   two   \nthree".into()),
                Value::String("^two$".into()),
            ]),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_match_literal_self() {
        for s in ["steve", "kernel panic", "a b c"] {
            assert_eq!(
                fn_match(&[Value::String(s.into()), Value::String(s.into())]),
                Value::Boolean(true)
            );
        }
    }

    #[test]
    fn test_match_invalid_pattern_is_false() {
        assert_eq!(
            fn_match(&[Value::String("x".into()), Value::String("(unclosed".into())]),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_regex_cache_returns_same_pattern() {
        let a = cached_regex("^steve$").unwrap();
        let b = cached_regex("^steve$").unwrap();
        assert_eq!(a.as_str(), b.as_str());
    }
}
