//! CLI tests

use clap::{CommandFactory, Parser};

use crate::{Cli, Commands, ConfigAction, OutputFormat};

#[test]
fn test_cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn test_ask_flags_build_request() {
    let cli = Cli::try_parse_from([
        "arlearn",
        "ask",
        "what do these do?",
        "--collection",
        "jet-engine-v1",
        "-e",
        "Dividers",
        "--scene",
        "exploded",
        "--offline",
    ])
    .unwrap();

    let Commands::Ask { question, query } = cli.command else {
        panic!("expected ask");
    };
    assert!(query.offline);

    let request = query.request(&question);
    assert_eq!(request.question, "what do these do?");
    assert_eq!(request.collection_scope.as_deref(), Some("jet-engine-v1"));
    assert_eq!(request.entity_hint.as_deref(), Some("Dividers"));
    assert_eq!(request.scene_hint.as_deref(), Some("exploded"));
}

#[test]
fn test_global_format_flag() {
    let cli = Cli::try_parse_from(["arlearn", "resolve", "dividers", "--format", "json"]).unwrap();
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(!cli.quiet);
}

#[test]
fn test_ingest_requires_collection() {
    assert!(Cli::try_parse_from(["arlearn", "ingest", "notes.txt"]).is_err());
    assert!(Cli::try_parse_from(["arlearn", "ingest", "notes.txt", "-c", "jet-engine-v1"]).is_ok());
}

#[test]
fn test_ingest_document_labels() {
    let cli = Cli::try_parse_from([
        "arlearn",
        "ingest",
        "manual.pdf",
        "-c",
        "jet-engine-v1",
        "-s",
        "intake",
        "--title",
        "Engine Manual",
        "--subject",
        "Aerospace",
    ])
    .unwrap();
    match cli.command {
        Commands::Ingest {
            scene,
            title,
            subject,
            ..
        } => {
            assert_eq!(scene.as_deref(), Some("intake"));
            assert_eq!(title.as_deref(), Some("Engine Manual"));
            assert_eq!(subject.as_deref(), Some("Aerospace"));
        }
        _ => panic!("expected ingest"),
    }
}

#[test]
fn test_config_subcommands() {
    let cli = Cli::try_parse_from(["arlearn", "config", "set", "retrieval.top_k", "4"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            action: ConfigAction::Set { .. }
        }
    ));
}
