//! `${VAR}` expansion for job files.
//!
//! Bucket names, prefixes and credentials usually come from the deployment
//! environment, so the YAML text is expanded before it is parsed. Two forms
//! are recognised:
//!
//! - `${VAR}`: the value of `VAR`; unset is an error
//! - `${VAR:-default}`: `default` when `VAR` is unset or empty
//!
//! Any other `$` is copied through untouched.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("placeholder pattern must compile")
});

/// Expand placeholders from the process environment.
pub(super) fn expand(input: &str) -> Result<String, Vec<String>> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand placeholders, resolving names through `lookup`.
///
/// Every problem is collected, so a job file with several missing variables
/// is rejected once with all of them.
pub(super) fn expand_with<F>(input: &str, lookup: F) -> Result<String, Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut problems = Vec::new();

    let expanded = PLACEHOLDER.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str());

        match (lookup(name), default) {
            (Some(value), Some(default)) if value.is_empty() => default.to_string(),
            // A line break would let a variable inject extra YAML keys
            (Some(value), _) if value.contains(['\n', '\r']) => {
                problems.push(format!("environment variable '{name}' contains a line break"));
                String::new()
            }
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                problems.push(format!("environment variable '{name}' is not set"));
                String::new()
            }
        }
    });

    if problems.is_empty() {
        Ok(expanded.into_owned())
    } else {
        Err(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_source_section_from_environment() {
        let yaml = r#"
source:
  url: "gs://${RAW_BUCKET}"
  prefix: ${BALANZA_PREFIX:-balanzas/2024}
  file_type: ".xlsx"
  storage_options:
    google_service_account: ${GCP_SA_PATH}
"#;
        let expanded = expand_with(
            yaml,
            env(&[
                ("RAW_BUCKET", "contabilidad-raw"),
                ("GCP_SA_PATH", "/secrets/sa.json"),
            ]),
        )
        .unwrap();

        assert!(expanded.contains(r#"url: "gs://contabilidad-raw""#));
        assert!(expanded.contains("prefix: balanzas/2024"));
        assert!(expanded.contains("google_service_account: /secrets/sa.json"));
        assert!(expanded.contains(r#"file_type: ".xlsx""#));
    }

    #[test]
    fn test_default_applies_to_empty_value() {
        let expanded = expand_with(
            "prefix: ${BALANZA_PREFIX:-entrada}",
            env(&[("BALANZA_PREFIX", "")]),
        )
        .unwrap();
        assert_eq!(expanded, "prefix: entrada");

        let expanded = expand_with(
            "prefix: ${BALANZA_PREFIX:-entrada}",
            env(&[("BALANZA_PREFIX", "balanzas/2025")]),
        )
        .unwrap();
        assert_eq!(expanded, "prefix: balanzas/2025");
    }

    #[test]
    fn test_empty_value_without_default_is_kept() {
        let expanded = expand_with("file_prefix: \"${FILE_PREFIX}\"", env(&[("FILE_PREFIX", "")]))
            .unwrap();
        assert_eq!(expanded, "file_prefix: \"\"");
    }

    #[test]
    fn test_all_missing_variables_are_reported() {
        let problems = expand_with(
            "url: \"s3://${RAW_BUCKET}\"\nstorage_options:\n  aws_secret_access_key: ${AWS_SECRET}\n",
            env(&[]),
        )
        .unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("RAW_BUCKET"));
        assert!(problems[1].contains("AWS_SECRET"));
    }

    #[test]
    fn test_line_break_in_value_is_rejected() {
        let problems = expand_with(
            "prefix: ${BALANZA_PREFIX}",
            env(&[("BALANZA_PREFIX", "in\nuse_ledger: false")]),
        )
        .unwrap_err();
        assert!(problems[0].contains("line break"));
    }

    #[test]
    fn test_other_dollar_signs_pass_through() {
        let text = "file_prefix: \"$BZ_\"\ndelimiter: \"$\"\n";
        assert_eq!(expand_with(text, env(&[])).unwrap(), text);
    }

    #[test]
    fn test_process_environment_lookup() {
        let problems = expand("url: ${SLEET_VARS_TEST_NEVER_SET}").unwrap_err();
        assert!(problems[0].contains("SLEET_VARS_TEST_NEVER_SET"));
    }
}
