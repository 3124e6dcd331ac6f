//! CLI interface for crmflow
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines the commands for browsing the helper catalog and for validating
//! and running helpers against a CRM connector.

use clap::{Parser, Subcommand};
use sdk::HelperCategory;
use std::path::PathBuf;

/// CRM helper execution framework
///
/// Browse the built-in automation helpers, check helper configurations and
/// run helpers for contacts against the configured CRM connector.
#[derive(Parser, Debug)]
#[command(name = "crmflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered helpers
    List {
        /// Only show helpers in this category
        #[arg(long, value_parser = parse_category)]
        category: Option<HelperCategory>,
    },

    /// Print the configuration schema of a helper
    Schema {
        /// Helper type key (e.g. copy_it)
        helper_type: String,
    },

    /// Check a helper configuration without running it
    Validate {
        /// Helper type key
        helper_type: String,

        /// Configuration as a JSON object, or @path to a JSON file
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Run a helper for one or more contacts
    Run {
        /// Helper type key
        helper_type: String,

        /// Contact id; repeat to run for several contacts
        #[arg(long = "contact", required = true)]
        contacts: Vec<String>,

        /// Configuration as a JSON object, or @path to a JSON file
        #[arg(long, default_value = "{}")]
        params: String,

        /// JSON fixture for the memory connector, overriding the config file
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Account id recorded on the execution
        #[arg(long)]
        account: Option<String>,

        /// How many contacts to process at once
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
}

fn parse_category(value: &str) -> Result<HelperCategory, String> {
    value.parse().map_err(|e: sdk::HelperError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["crmflow", "--json", "--log", "debug", "list"]);
        assert!(cli.json);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::List { category: None }));
    }

    #[test]
    fn test_list_by_category() {
        let cli = Cli::parse_from(["crmflow", "list", "--category", "tagging"]);
        assert!(matches!(
            cli.command,
            Command::List {
                category: Some(HelperCategory::Tagging)
            }
        ));
        assert!(Cli::try_parse_from(["crmflow", "list", "--category", "billing"]).is_err());
    }

    #[test]
    fn test_validate_default_params() {
        let cli = Cli::parse_from(["crmflow", "validate", "copy_it"]);
        if let Command::Validate {
            helper_type,
            params,
        } = cli.command
        {
            assert_eq!(helper_type, "copy_it");
            assert_eq!(params, "{}");
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_run_multiple_contacts() {
        let cli = Cli::parse_from([
            "crmflow",
            "run",
            "tag_it",
            "--contact",
            "c-1",
            "--contact",
            "c-2",
            "--params",
            "@tag.json",
            "--fixture",
            "crm.json",
        ]);
        if let Command::Run {
            helper_type,
            contacts,
            params,
            fixture,
            concurrency,
            ..
        } = cli.command
        {
            assert_eq!(helper_type, "tag_it");
            assert_eq!(contacts, vec!["c-1", "c-2"]);
            assert_eq!(params, "@tag.json");
            assert_eq!(fixture, Some(PathBuf::from("crm.json")));
            assert_eq!(concurrency, 4);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_run_requires_contact() {
        assert!(Cli::try_parse_from(["crmflow", "run", "tag_it"]).is_err());
    }
}
