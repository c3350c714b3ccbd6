use std::path::Path;

use cbrain_core::KnowledgeType;

use super::*;
use crate::content::TemplateCommands;
use crate::knowledge::{build_filters, document_title};

const OWNER: &str = "6f1c2c4e-8a4b-4c1e-9d53-0a1b2c3d4e5f";
const JOB: &str = "0b8d7c4a-2f1e-4a9b-8c6d-5e4f3a2b1c0d";

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["cbrain-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["cbrain-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn seed_templates_accepts_an_explicit_file() {
    let cli = Cli::try_parse_from([
        "cbrain-cli",
        "db",
        "seed-templates",
        "--file",
        "config/templates.yaml",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Db {
            command: DbCommands::SeedTemplates { file: Some(file) },
        }) => assert_eq!(file, PathBuf::from("config/templates.yaml")),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["cbrain-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn ingest_defaults_to_queued_extraction() {
    let cli = Cli::try_parse_from([
        "cbrain-cli",
        "ingest",
        "--owner",
        OWNER,
        "--file",
        "call.txt",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Ingest {
            team: None,
            title: None,
            speaker: None,
            now: false,
            ..
        })
    ));
}

#[test]
fn ingest_now_with_speaker() {
    let cli = Cli::try_parse_from([
        "cbrain-cli",
        "ingest",
        "--owner",
        OWNER,
        "--file",
        "call.txt",
        "--speaker",
        "Dana",
        "--now",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Ingest { speaker, now, .. }) => {
            assert_eq!(speaker.as_deref(), Some("Dana"));
            assert!(now);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn ingest_requires_an_owner() {
    let result = Cli::try_parse_from(["cbrain-cli", "ingest", "--file", "call.txt"]);
    assert!(result.is_err());
}

#[test]
fn ingest_rejects_a_malformed_owner() {
    let result = Cli::try_parse_from([
        "cbrain-cli",
        "ingest",
        "--owner",
        "not-a-uuid",
        "--file",
        "call.txt",
    ]);
    assert!(result.is_err());
}

#[test]
fn search_reads_type_and_limit() {
    let cli = Cli::try_parse_from([
        "cbrain-cli",
        "search",
        "pricing objections",
        "--owner",
        OWNER,
        "--type",
        "objection",
        "--limit",
        "5",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Search {
            query,
            knowledge_type,
            limit,
            json,
            ..
        }) => {
            assert_eq!(query, "pricing objections");
            assert_eq!(knowledge_type.as_deref(), Some("objection"));
            assert_eq!(limit, 5);
            assert!(!json);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn context_budget_is_optional() {
    let cli = Cli::try_parse_from(["cbrain-cli", "context", "onboarding", "--owner", OWNER])
        .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Context {
            budget,
            quality_boost,
            ..
        }) => {
            assert!(budget.is_none());
            assert!((quality_boost - 0.5).abs() < f32::EPSILON);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn templates_match_defaults_top_k() {
    let cli = Cli::try_parse_from([
        "cbrain-cli",
        "templates",
        "match",
        "why cold outreach fails",
        "--owner",
        OWNER,
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Templates {
            command: TemplateCommands::Match {
                top_k: 3,
                min_similarity: None,
                ..
            }
        })
    ));
}

#[test]
fn jobs_enqueue_defaults_to_empty_payload() {
    let cli = Cli::try_parse_from(["cbrain-cli", "jobs", "enqueue", "analyze_performance"])
        .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Jobs {
            command: JobCommands::Enqueue { job_type, payload },
        }) => {
            assert_eq!(job_type, "analyze_performance");
            assert_eq!(payload, "{}");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn jobs_status_takes_a_job_id() {
    let cli = Cli::try_parse_from(["cbrain-cli", "jobs", "status", JOB])
        .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Jobs {
            command: JobCommands::Status { job_id },
        }) => assert_eq!(job_id.to_string(), JOB),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn write_now_flag() {
    let cli = Cli::try_parse_from(["cbrain-cli", "write", JOB, "--now"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Write { now: true, .. })
    ));
}

#[test]
fn document_title_prefers_explicit_title() {
    let path = Path::new("/tmp/calls/founder-call.txt");
    assert_eq!(
        document_title(Some("  Q3 review ".to_string()), path),
        "Q3 review"
    );
    assert_eq!(document_title(Some("   ".to_string()), path), "founder-call");
    assert_eq!(document_title(None, path), "founder-call");
}

#[test]
fn build_filters_normalizes_labels() {
    let filters = build_filters(
        Some("Sales".to_string()),
        None,
        Some("Pricing".to_string()),
        None,
        Some("how-to"),
        Some(3),
        Some(30),
        10,
    )
    .expect("filters should build");

    assert_eq!(filters.category.as_deref(), Some("sales"));
    assert_eq!(filters.tag.as_deref(), Some("pricing"));
    assert_eq!(filters.knowledge_type, Some(KnowledgeType::HowTo));
    assert_eq!(filters.min_quality, Some(3));
    assert_eq!(filters.limit, 10);
}

#[test]
fn build_filters_rejects_out_of_range_quality() {
    let err = build_filters(None, None, None, None, None, Some(9), None, 20)
        .expect_err("quality 9 is out of range");
    assert!(err.to_string().contains("--min-quality"));
}

#[test]
fn build_filters_rejects_unknown_type() {
    assert!(build_filters(None, None, None, None, Some("gossip"), None, None, 20).is_err());
}

#[test]
fn truncate_marks_the_cut() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("abcdefghij", 4), "abcd...");
}
