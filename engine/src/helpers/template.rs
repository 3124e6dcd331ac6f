//! Template rendering for notes and default values
//!
//! Supported placeholders:
//!
//! - `{{now}}`, `{{today}}`, `@Now`, `@Today`, optionally with a strftime
//!   suffix such as `{{today:%d/%m/%Y}}`
//! - merge fields `{{field}}` and `@Field`, looked up by exact key and then by
//!   snake_case key (`@FirstName` → `first_name`)
//!
//! Date macros are expanded before merge fields. Placeholders that cannot be
//! resolved are left in the text verbatim.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use sdk::types::value_to_string;
use sdk::FieldMap;
use std::sync::OnceLock;

const TODAY_FORMAT: &str = "%Y-%m-%d";

static DATE_BRACES: OnceLock<Regex> = OnceLock::new();
static DATE_AT: OnceLock<Regex> = OnceLock::new();
static MERGE_FIELD: OnceLock<Regex> = OnceLock::new();

fn date_braces() -> &'static Regex {
    DATE_BRACES.get_or_init(|| {
        Regex::new(r"(?i)\{\{\s*(now|today)\s*(?::([^}]*))?\}\}").expect("Invalid date macro pattern")
    })
}

fn date_at() -> &'static Regex {
    DATE_AT.get_or_init(|| Regex::new(r"@(Now|Today)\b").expect("Invalid date macro pattern"))
}

/// Both merge field forms in one pattern, so substituted values are never rescanned
fn merge_field() -> &'static Regex {
    MERGE_FIELD.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}|@([A-Za-z][A-Za-z0-9_]*)")
            .expect("Invalid merge field pattern")
    })
}

/// Render a template against a flattened contact at the current time
pub fn render(template: &str, fields: &FieldMap) -> String {
    render_at(template, fields, Utc::now())
}

/// Render a template against a flattened contact at a fixed instant
pub fn render_at(template: &str, fields: &FieldMap, now: DateTime<Utc>) -> String {
    let dated = date_braces().replace_all(template, |caps: &Captures| {
        let format = caps.get(2).map(|m| m.as_str().trim()).filter(|f| !f.is_empty());
        let is_now = caps[1].eq_ignore_ascii_case("now");
        format_date(now, is_now, format).unwrap_or_else(|| caps[0].to_string())
    });
    let dated = date_at().replace_all(&dated, |caps: &Captures| {
        format_date(now, &caps[1] == "Now", None).unwrap_or_else(|| caps[0].to_string())
    });

    merge_field()
        .replace_all(&dated, |caps: &Captures| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .and_then(|key| lookup(fields, key.as_str()))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn format_date(now: DateTime<Utc>, is_now: bool, format: Option<&str>) -> Option<String> {
    match format {
        // An invalid strftime string would panic on display
        Some(f) if StrftimeItems::new(f).any(|item| matches!(item, Item::Error)) => None,
        Some(f) => Some(now.format(f).to_string()),
        None if is_now => Some(now.to_rfc3339()),
        None => Some(now.format(TODAY_FORMAT).to_string()),
    }
}

fn lookup(fields: &FieldMap, key: &str) -> Option<String> {
    fields
        .get(key)
        .or_else(|| fields.get(&to_snake_case(key)))
        .map(value_to_string)
}

/// `FirstName` / `firstName` → `first_name`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("first_name".to_string(), json!("Ada"));
        fields.insert("email".to_string(), json!("ada@example.com"));
        fields.insert("orders.count".to_string(), json!(3));
        fields
    }

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_merge_fields() {
        let out = render_at("Hi {{first_name}} ({{ email }}), orders: {{orders.count}}", &fields(), instant());
        assert_eq!(out, "Hi Ada (ada@example.com), orders: 3");
    }

    #[test]
    fn test_at_fields_use_snake_case_fallback() {
        let out = render_at("Hello @FirstName, reach me at @Email", &fields(), instant());
        assert_eq!(out, "Hello Ada, reach me at ada@example.com");
    }

    #[test]
    fn test_merged_values_are_not_expanded_again() {
        let mut f = fields();
        f.insert("email".to_string(), json!("ada@company.com"));
        f.insert("company".to_string(), json!("Acme"));
        f.insert("handle".to_string(), json!("{{first_name}}"));

        assert_eq!(render_at("Email: {{email}}", &f, instant()), "Email: ada@company.com");
        assert_eq!(render_at("Email: @Email", &f, instant()), "Email: ada@company.com");
        assert_eq!(render_at("@Handle / {{company}}", &f, instant()), "{{first_name}} / Acme");
    }

    #[test]
    fn test_date_macros() {
        let f = FieldMap::new();
        assert_eq!(render_at("{{today}}", &f, instant()), "2024-03-09");
        assert_eq!(render_at("@Today", &f, instant()), "2024-03-09");
        assert_eq!(render_at("{{today:%d/%m/%Y}}", &f, instant()), "09/03/2024");
        assert_eq!(render_at("{{now}}", &f, instant()), "2024-03-09T14:30:00+00:00");
        assert_eq!(render_at("@Now", &f, instant()), "2024-03-09T14:30:00+00:00");
    }

    #[test]
    fn test_unresolved_placeholders_stay_verbatim() {
        let out = render_at("{{missing}} @Unknown mail@example.com", &fields(), instant());
        assert_eq!(out, "{{missing}} @Unknown mail@example.com");
    }

    #[test]
    fn test_invalid_date_format_stays_verbatim() {
        let out = render_at("{{today:%Q}}", &FieldMap::new(), instant());
        assert_eq!(out, "{{today:%Q}}");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("FirstName"), "first_name");
        assert_eq!(to_snake_case("firstName"), "first_name");
        assert_eq!(to_snake_case("Email"), "email");
        assert_eq!(to_snake_case("job_title"), "job_title");
        assert_eq!(to_snake_case("Address2Street"), "address2_street");
    }
}
