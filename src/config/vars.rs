//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `${VAR}` - substitute with the env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset or empty
//! - `$$` - escape sequence for a literal `$`

use regex::Regex;
use std::env;
use std::sync::LazyLock;

use crate::error::ConfigError;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # Escape sequence $$
        |
        \$\{                           # Opening ${
            ([A-Za-z_][A-Za-z0-9_]*)   # Variable name (capture group 1)
            (?:                        # Optional default value group
                :-                     # Separator
                ([^}]*)                # Default value (capture group 2)
            )?
        \}                             # Closing }
        ",
    )
    .expect("invalid interpolation pattern")
});

/// Interpolate environment variables in the given text.
///
/// Missing variables without a default are accumulated so the user sees
/// every unresolved reference at once.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut errors = Vec::new();

    let text = VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            if &caps[0] == "$$" {
                return "$".to_string();
            }

            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            match env::var(name) {
                Ok(value) if value.contains('\n') || value.contains('\r') => {
                    errors.push(format!(
                        "environment variable '{name}' contains newlines, which is not allowed"
                    ));
                    caps[0].to_string()
                }
                Ok(value) if value.is_empty() => default.unwrap_or("").to_string(),
                Ok(value) => value,
                Err(_) => match default {
                    Some(default) => default.to_string(),
                    None => {
                        errors.push(format!("environment variable '{name}' is not set"));
                        caps[0].to_string()
                    }
                },
            }
        })
        .to_string();

    if errors.is_empty() {
        Ok(text)
    } else {
        Err(ConfigError::EnvInterpolation { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: test values are restored below and the variable names are
        // unique per test, so concurrent tests never touch the same key
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring the original environment state
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, &v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_braced_substitution() {
        with_env_vars(&[("GRAUPEL_TEST_BRACED", Some("hello"))], || {
            let text = interpolate("path: ${GRAUPEL_TEST_BRACED}").unwrap();
            assert_eq!(text, "path: hello");
        });
    }

    #[test]
    fn test_missing_variable_error() {
        with_env_vars(&[("GRAUPEL_TEST_MISSING", None)], || {
            let err = interpolate("path: ${GRAUPEL_TEST_MISSING}").unwrap_err();
            let ConfigError::EnvInterpolation { errors } = err else {
                panic!("expected interpolation error");
            };
            assert_eq!(errors.len(), 1);
            assert!(errors[0].contains("GRAUPEL_TEST_MISSING"));
        });
    }

    #[test]
    fn test_all_missing_variables_reported() {
        with_env_vars(
            &[("GRAUPEL_TEST_MISS1", None), ("GRAUPEL_TEST_MISS2", None)],
            || {
                let err =
                    interpolate("a: ${GRAUPEL_TEST_MISS1}, b: ${GRAUPEL_TEST_MISS2}").unwrap_err();
                let ConfigError::EnvInterpolation { errors } = err else {
                    panic!("expected interpolation error");
                };
                assert_eq!(errors.len(), 2);
            },
        );
    }

    #[test]
    fn test_default_applies_when_unset_or_empty() {
        with_env_vars(
            &[
                ("GRAUPEL_TEST_UNSET", None),
                ("GRAUPEL_TEST_EMPTY", Some("")),
            ],
            || {
                let text =
                    interpolate("a: ${GRAUPEL_TEST_UNSET:-one}, b: ${GRAUPEL_TEST_EMPTY:-two}")
                        .unwrap();
                assert_eq!(text, "a: one, b: two");
            },
        );
    }

    #[test]
    fn test_set_variable_wins_over_default() {
        with_env_vars(&[("GRAUPEL_TEST_SET", Some("actual"))], || {
            let text = interpolate("v: ${GRAUPEL_TEST_SET:-default}").unwrap();
            assert_eq!(text, "v: actual");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let text = interpolate("price: $$100").unwrap();
        assert_eq!(text, "price: $100");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("GRAUPEL_TEST_NL", Some("a\nb"))], || {
            let err = interpolate("v: ${GRAUPEL_TEST_NL}").unwrap_err();
            assert!(err.to_string().contains("newlines"));
        });
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = interpolate("plain text without variables").unwrap();
        assert_eq!(text, "plain text without variables");
    }
}
