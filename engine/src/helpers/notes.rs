//! Templated notes

use async_trait::async_trait;
use sdk::types::value_to_string;
use sdk::{
    ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig, HelperError,
    HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};

use crate::helpers::template;
use crate::helpers::{invalid_config, load_contact, write_field, PrimaryStep};

struct NoteSettings<'a> {
    template: &'a str,
    target: &'a str,
    append: bool,
    separator: &'a str,
}

impl<'a> NoteSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            template: config.require_str("template")?,
            target: config.str_or("target_field", "notes")?,
            append: config.choice_or("mode", &["append", "replace"], "append")? == "append",
            separator: config.raw_str_or("separator", "\n")?,
        })
    }
}

/// Write a templated note onto the contact
#[derive(Debug, Default, Clone, Copy)]
pub struct NoteIt;

#[async_trait]
impl Helper for NoteIt {
    fn name(&self) -> &str {
        "Note It"
    }

    fn helper_type(&self) -> &str {
        "note_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Notes
    }

    fn description(&self) -> &str {
        "Add a note built from a template with merge fields and date macros"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required(
                "template",
                PropertySchema::string("Note text; supports {{field}}, @Field, {{today}} and {{now}}"),
            )
            .optional(
                "target_field",
                PropertySchema::string("Field holding the notes").with_default(json!("notes")),
            )
            .optional(
                "mode",
                PropertySchema::string("Append to or replace existing notes")
                    .with_enum(&["append", "replace"])
                    .with_default(json!("append")),
            )
            .optional(
                "separator",
                PropertySchema::string("Text placed between appended notes").with_default(json!("\n")),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        NoteSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = NoteSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let contact = load_contact(ctx, input)
            .await
            .primary(&mut output, || "Failed to load contact".to_string())?;
        let fields = contact.flatten();

        let note = template::render(s.template, &fields);
        let note = note.trim();
        if note.is_empty() {
            return Ok(output.succeed("Note rendered empty, nothing to write"));
        }

        let existing = fields
            .get(s.target)
            .map(value_to_string)
            .unwrap_or_default();
        let text = if s.append && !existing.trim().is_empty() {
            format!("{}{}{}", existing, s.separator, note)
        } else {
            note.to_string()
        };

        write_field(ctx, input, &mut output, s.target, Value::String(text))
            .await
            .primary(&mut output, || format!("Failed to write field '{}'", s.target))?;
        Ok(output.succeed(format!("Added note to '{}'", s.target)))
    }
}
