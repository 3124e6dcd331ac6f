//! Full name parsing

use async_trait::async_trait;
use sdk::types::value_to_string;
use sdk::{
    ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig, HelperError,
    HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};

use crate::helpers::{invalid_config, read_field, write_field, PrimaryStep};

const PREFIXES: &[&str] = &[
    "mr", "mrs", "ms", "miss", "mx", "dr", "prof", "rev", "sir", "madam", "fr",
];

const SUFFIXES: &[&str] = &[
    "jr", "sr", "ii", "iii", "iv", "v", "phd", "md", "dds", "esq", "cpa", "mba", "rn",
];

fn normalize(token: &str) -> String {
    token
        .trim_matches(|c: char| c == '.' || c == ',')
        .replace('.', "")
        .to_lowercase()
}

fn is_prefix(token: &str) -> bool {
    PREFIXES.contains(&normalize(token).as_str())
}

fn is_suffix(token: &str) -> bool {
    SUFFIXES.contains(&normalize(token).as_str())
}

/// Parts of a person's name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedName {
    pub prefix: Option<String>,
    pub first: Option<String>,
    pub middle: Option<String>,
    pub last: Option<String>,
    pub suffix: Option<String>,
}

fn joined(tokens: &[&str]) -> Option<String> {
    (!tokens.is_empty()).then(|| tokens.join(" "))
}

/// Strip a leading prefix and trailing suffixes in place
fn split_affixes<'a>(tokens: &mut Vec<&'a str>) -> (Option<String>, Option<String>) {
    let prefix = if tokens.len() > 1 && is_prefix(tokens[0]) {
        Some(tokens.remove(0).to_string())
    } else {
        None
    };

    let mut suffixes = Vec::new();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| is_suffix(t)) {
        if let Some(token) = tokens.pop() {
            suffixes.insert(0, token);
        }
    }
    (prefix, joined(&suffixes))
}

/// Split a full name into prefix, first, middle, last and suffix
///
/// Handles "First Middle Last", "Dr. First Last Jr." and the
/// "Last, First Middle" form. A trailing ", Jr." is read as a suffix rather
/// than as the comma form.
pub fn parse_name(full: &str) -> ParsedName {
    let full = full.trim();
    if full.is_empty() {
        return ParsedName::default();
    }

    if let Some((before, after)) = full.split_once(',') {
        let after_tokens: Vec<&str> = after.split_whitespace().collect();
        let only_suffixes = !after_tokens.is_empty() && after_tokens.iter().all(|t| is_suffix(t));

        if only_suffixes {
            let mut parsed = parse_name(before);
            let trailing = after_tokens.join(" ");
            parsed.suffix = Some(match parsed.suffix {
                Some(existing) => format!("{} {}", existing, trailing),
                None => trailing,
            });
            return parsed;
        }

        // "Last, First Middle"
        let mut tokens: Vec<&str> = after_tokens;
        let (prefix, suffix) = split_affixes(&mut tokens);
        let last = before.trim();
        return ParsedName {
            prefix,
            first: tokens.first().map(|t| t.to_string()),
            middle: joined(tokens.get(1..).unwrap_or_default()),
            last: (!last.is_empty()).then(|| last.to_string()),
            suffix,
        };
    }

    let mut tokens: Vec<&str> = full.split_whitespace().collect();
    let (prefix, suffix) = split_affixes(&mut tokens);
    let (first, middle, last) = match tokens.as_slice() {
        [] => (None, None, None),
        [only] => (Some(only.to_string()), None, None),
        [first, rest @ .., last] => (Some(first.to_string()), joined(rest), Some(last.to_string())),
    };
    ParsedName {
        prefix,
        first,
        middle,
        last,
        suffix,
    }
}

struct NameSettings<'a> {
    source: &'a str,
    first: &'a str,
    last: &'a str,
    middle: Option<&'a str>,
    suffix: Option<&'a str>,
    prefix: Option<&'a str>,
}

impl<'a> NameSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            source: config.require_str("source_field")?,
            first: config.str_or("first_name_field", "first_name")?,
            last: config.str_or("last_name_field", "last_name")?,
            middle: config.opt_str("middle_name_field")?,
            suffix: config.opt_str("suffix_field")?,
            prefix: config.opt_str("prefix_field")?,
        })
    }
}

/// Split a full name field into its parts
#[derive(Debug, Default, Clone, Copy)]
pub struct NameParseIt;

#[async_trait]
impl Helper for NameParseIt {
    fn name(&self) -> &str {
        "Name Parse It"
    }

    fn helper_type(&self) -> &str {
        "name_parse_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Contact
    }

    fn description(&self) -> &str {
        "Split a full name into first, middle and last name, prefix and suffix"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("source_field", PropertySchema::string("Field holding the full name"))
            .optional(
                "first_name_field",
                PropertySchema::string("Field for the first name").with_default(json!("first_name")),
            )
            .optional(
                "last_name_field",
                PropertySchema::string("Field for the last name").with_default(json!("last_name")),
            )
            .optional("middle_name_field", PropertySchema::string("Field for middle names"))
            .optional("suffix_field", PropertySchema::string("Field for the suffix (Jr., PhD)"))
            .optional("prefix_field", PropertySchema::string("Field for the prefix (Mr., Dr.)"))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        NameSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = NameSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let value = read_field(ctx, input, s.source)
            .await
            .primary(&mut output, || format!("Failed to read field '{}'", s.source))?;
        let full = value.as_ref().map(value_to_string).unwrap_or_default();
        let parsed = parse_name(&full);
        if parsed == ParsedName::default() {
            return Ok(output.succeed(format!("Field '{}' is empty, nothing to parse", s.source)));
        }

        let writes = [
            (s.prefix, parsed.prefix),
            (Some(s.first), parsed.first),
            (s.middle, parsed.middle),
            (Some(s.last), parsed.last),
            (s.suffix, parsed.suffix),
        ];
        for (field, part) in writes {
            let (Some(field), Some(part)) = (field, part) else {
                continue;
            };
            write_field(ctx, input, &mut output, field, Value::String(part))
                .await
                .primary(&mut output, || format!("Failed to write field '{}'", field))?;
        }

        let written = output.actions.len();
        Ok(output.succeed(format!("Parsed name into {} field(s)", written)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MemoryConnector;
    use crate::helpers::testing::{config, run};
    use std::sync::Arc;

    fn name(
        prefix: Option<&str>,
        first: &str,
        middle: Option<&str>,
        last: Option<&str>,
        suffix: Option<&str>,
    ) -> ParsedName {
        ParsedName {
            prefix: prefix.map(String::from),
            first: Some(first.to_string()),
            middle: middle.map(String::from),
            last: last.map(String::from),
            suffix: suffix.map(String::from),
        }
    }

    #[test]
    fn test_parse_simple_forms() {
        assert_eq!(parse_name("John"), name(None, "John", None, None, None));
        assert_eq!(parse_name("John Doe"), name(None, "John", None, Some("Doe"), None));
        assert_eq!(
            parse_name("  John  Quincy   Adams "),
            name(None, "John", Some("Quincy"), Some("Adams"), None)
        );
        assert_eq!(parse_name("   "), ParsedName::default());
    }

    #[test]
    fn test_parse_prefix_and_suffix() {
        assert_eq!(
            parse_name("Dr. Martin Luther King Jr."),
            name(Some("Dr."), "Martin", Some("Luther"), Some("King"), Some("Jr."))
        );
        assert_eq!(
            parse_name("John Doe, Jr."),
            name(None, "John", None, Some("Doe"), Some("Jr."))
        );
        assert_eq!(
            parse_name("Jane Smith PhD"),
            name(None, "Jane", None, Some("Smith"), Some("PhD"))
        );
    }

    #[test]
    fn test_parse_last_first_form() {
        assert_eq!(
            parse_name("Van Dyke, Dick"),
            name(None, "Dick", None, Some("Van Dyke"), None)
        );
        assert_eq!(
            parse_name("Doe, Mr. John Q III"),
            name(Some("Mr."), "John", Some("Q"), Some("Doe"), Some("III"))
        );
    }

    #[test]
    fn test_prefix_alone_is_a_first_name() {
        assert_eq!(parse_name("Dr"), name(None, "Dr", None, None, None));
    }

    #[tokio::test]
    async fn test_writes_only_configured_parts() {
        let crm = Arc::new(
            MemoryConnector::new().with_fields("c-1", &[("full_name", json!("Mrs. Ada King Lovelace"))]),
        );
        let output = run(
            &NameParseIt,
            &crm,
            config(&[("source_field", json!("full_name"))]),
        )
        .await
        .unwrap();

        assert_eq!(output.actions.len(), 2);
        assert_eq!(crm.field("c-1", "first_name"), Some(json!("Ada")));
        assert_eq!(crm.field("c-1", "last_name"), Some(json!("Lovelace")));
    }
}
