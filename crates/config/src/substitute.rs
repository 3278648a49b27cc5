//! `${VAR}` / `${VAR:default}` token substitution.

use serde_json::Value;

use cloudlift_core::ConfigurationError;

/// Recursively substitute environment tokens in every string of `value`.
///
/// `${VAR}` fails with `ConfigurationError` when `VAR` is unset; the
/// `${VAR:default}` form never fails. Non-string leaves pass through
/// untouched.
pub fn substitute_value(value: &mut Value) -> Result<(), ConfigurationError> {
    match value {
        Value::String(s) => {
            *s = substitute_str(s)?;
            Ok(())
        }
        Value::Array(items) => items.iter_mut().try_for_each(substitute_value),
        Value::Object(map) => map.values_mut().try_for_each(substitute_value),
        _ => Ok(()),
    }
}

fn substitute_str(input: &str) -> Result<String, ConfigurationError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let token = &rest[start + 2..];
        let Some(end) = token.find('}') else {
            return Err(ConfigurationError::new(format!(
                "unterminated ${{...}} token in config value '{input}'"
            )));
        };
        out.push_str(&resolve_token(&token[..end], input)?);
        rest = &token[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn resolve_token(token: &str, original: &str) -> Result<String, ConfigurationError> {
    let (name, default) = match token.split_once(':') {
        Some((name, default)) => (name, Some(default)),
        None => (token, None),
    };
    if name.is_empty() {
        return Err(ConfigurationError::new(format!(
            "empty variable name in config value '{original}'"
        )));
    }
    match std::env::var(name) {
        Ok(v) => Ok(v),
        Err(_) => match default {
            Some(d) => Ok(d.to_string()),
            None => Err(ConfigurationError::new(format!(
                "required environment variable '{name}' is not set"
            ))
            .with("variable", name)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_used_when_unset() {
        assert_eq!(substitute_str("${CLOUDLIFT_SUBST_UNSET_1:bar}").unwrap(), "bar");
    }

    #[test]
    fn env_value_wins_over_default() {
        unsafe { std::env::set_var("CLOUDLIFT_SUBST_SET_1", "baz") };
        assert_eq!(substitute_str("${CLOUDLIFT_SUBST_SET_1:bar}").unwrap(), "baz");
        assert_eq!(substitute_str("${CLOUDLIFT_SUBST_SET_1}").unwrap(), "baz");
    }

    #[test]
    fn missing_required_variable_fails() {
        let err = substitute_str("${CLOUDLIFT_SUBST_UNSET_2}").unwrap_err();
        assert!(err.message.contains("CLOUDLIFT_SUBST_UNSET_2"));
    }

    #[test]
    fn substitutes_inside_larger_string_and_arrays() {
        let mut v = json!({
            "url": "postgres://${CLOUDLIFT_SUBST_UNSET_3:localhost}:5432/app",
            "hosts": ["${CLOUDLIFT_SUBST_UNSET_4:a}", "b"],
            "port": 5432
        });
        substitute_value(&mut v).unwrap();
        assert_eq!(v["url"], "postgres://localhost:5432/app");
        assert_eq!(v["hosts"][0], "a");
        assert_eq!(v["port"], 5432);
    }

    #[test]
    fn empty_default_is_allowed() {
        assert_eq!(substitute_str("${CLOUDLIFT_SUBST_UNSET_5:}").unwrap(), "");
    }

    #[test]
    fn unterminated_token_is_an_error() {
        assert!(substitute_str("${OOPS").is_err());
    }
}
