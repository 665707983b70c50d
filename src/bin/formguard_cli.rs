//! FormGuard CLI - Thin wrapper for embedding scripts
//!
//! Commands: compile, validate
//! Outputs JSON to stdout
//! Returns non-zero on schema errors or invalid input

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use formguard_core::{Engine, EngineConfig, RawInput};

#[derive(Parser)]
#[command(name = "formguard-cli")]
#[command(about = "FormGuard CLI - Schema-Driven Request Validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema file and report whether it is usable
    Compile {
        /// Path to the schema JSON file
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Validate request parameters against a schema
    Validate {
        /// Path to the schema JSON file
        #[arg(short, long)]
        schema: PathBuf,

        /// Request parameters as a JSON object of strings
        #[arg(short, long)]
        params: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let engine = Engine::new(EngineConfig::default());

    match cli.command {
        Commands::Compile { schema } => match engine.compile_file(&schema) {
            Ok(compiled) => {
                println!(
                    "{}",
                    serde_json::json!({ "ok": true, "fields": compiled.len() })
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}", serde_json::json!({ "ok": false, "error": e.to_string() }));
                ExitCode::FAILURE
            }
        },

        Commands::Validate { schema, params } => {
            let compiled = match engine.compile_file(&schema) {
                Ok(c) => c,
                Err(e) => {
                    println!("{}", serde_json::json!({ "ok": false, "error": e.to_string() }));
                    return ExitCode::FAILURE;
                }
            };

            let input: RawInput = match serde_json::from_str::<HashMap<String, String>>(&params) {
                Ok(map) => map,
                Err(e) => {
                    println!(
                        "{}",
                        serde_json::json!({ "ok": false, "error": format!("Invalid params: {e}") })
                    );
                    return ExitCode::FAILURE;
                }
            };

            let report = engine.evaluate(&compiled, &input);
            match serde_json::to_string_pretty(&report) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!(r#"{{"ok": false, "error": "{e}"}}"#);
                    return ExitCode::FAILURE;
                }
            }
            if report.overall_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2) // Validation failure
            }
        }
    }
}
