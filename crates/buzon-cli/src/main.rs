use anyhow::{anyhow, Context};
use buzon_core::{CaseDesk, DeskConfig, EmailAccess, PrivacyChoice, Submission, TransitionRequest, Viewer};
use buzon_model::{
    categories, category_by_code, category_by_id, CaseKind, CaseStatus, CategoryCode, CategoryId, Channel,
    Priority, Year,
};
use buzon_store::{CaseFilter, Datastore, FsBlobStore, SqliteStore, SubmitterProfile};
use chrono::{DateTime, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Desk = CaseDesk<dyn Datastore>;

fn folio_arg() -> Arg {
    Arg::new("folio").required(true).help("Folio, e.g. D0007-ACA-UNACH-25")
}

fn parse_category(raw: &str) -> Result<CategoryId, String> {
    let category = match raw.parse::<u16>() {
        Ok(id) => category_by_id(CategoryId(id)),
        Err(_) => CategoryCode::from_str(&raw.to_ascii_uppercase())
            .ok()
            .and_then(category_by_code),
    };
    category
        .map(|c| c.id)
        .ok_or_else(|| format!("unknown category {raw:?}; run `buzon categories`"))
}

fn parse_year(raw: &str) -> Result<Year, String> {
    let year: u16 = raw.parse().map_err(|e| format!("{e}"))?;
    Year::new(year).map_err(|e| e.to_string())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn cli() -> Command {
    Command::new("buzon")
        .version(buzon_core::VERSION)
        .about("Complaints, suggestions and commendations desk")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("SQLite database path; overrides storage.database_path"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON on stderr"),
        )
        .subcommand(
            Command::new("submit")
                .about("Register a new case and print its folio")
                .arg(
                    Arg::new("channel")
                        .long("channel")
                        .default_value("digital")
                        .value_parser(Channel::from_str)
                        .help("physical or digital"),
                )
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .required(true)
                        .value_parser(CaseKind::from_str)
                        .help("complaint, suggestion or commendation"),
                )
                .arg(
                    Arg::new("category")
                        .long("category")
                        .required(true)
                        .value_parser(parse_category)
                        .help("Category code (ACA) or id (1)"),
                )
                .arg(Arg::new("description").long("description").required(true))
                .arg(Arg::new("area").long("area").help("Area involved"))
                .arg(Arg::new("improvement").long("improvement").help("Improvement proposal"))
                .arg(
                    Arg::new("confidential")
                        .long("confidential")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("contact")
                        .help("Keep the submitter's identity confidential"),
                )
                .arg(
                    Arg::new("contact")
                        .long("contact")
                        .action(ArgAction::SetTrue)
                        .help("Authorize staff to contact the submitter"),
                )
                .arg(Arg::new("email").long("email"))
                .arg(Arg::new("name").long("name"))
                .arg(Arg::new("phone").long("phone"))
                .arg(Arg::new("affiliation").long("affiliation"))
                .arg(Arg::new("gender").long("gender"))
                .arg(Arg::new("age-range").long("age-range"))
                .arg(Arg::new("campus").long("campus"))
                .arg(
                    Arg::new("received-at")
                        .long("received-at")
                        .value_parser(parse_time)
                        .help("RFC 3339 intake time for forms keyed in later"),
                ),
        )
        .subcommand(
            Command::new("lookup")
                .about("Public status of a folio")
                .arg(folio_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Staff view of a case")
                .arg(folio_arg())
                .arg(
                    Arg::new("privileged")
                        .long("privileged")
                        .action(ArgAction::SetTrue)
                        .help("Disclose confidential submitters"),
                ),
        )
        .subcommand(
            Command::new("transition")
                .about("Move a case to another status")
                .arg(folio_arg())
                .arg(
                    Arg::new("to")
                        .long("to")
                        .required(true)
                        .value_parser(CaseStatus::from_str)
                        .help("received, in_progress, addressed or closed"),
                )
                .arg(Arg::new("notes").long("notes"))
                .arg(Arg::new("actor").long("actor"))
                .arg(
                    Arg::new("priority")
                        .long("priority")
                        .value_parser(Priority::from_str)
                        .help("low, medium or high"),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("Ledger entries of a case")
                .arg(folio_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List cases, newest first")
                .arg(Arg::new("status").long("status").value_parser(CaseStatus::from_str))
                .arg(Arg::new("kind").long("kind").value_parser(CaseKind::from_str))
                .arg(Arg::new("channel").long("channel").value_parser(Channel::from_str))
                .arg(Arg::new("category").long("category").value_parser(parse_category))
                .arg(Arg::new("year").long("year").value_parser(parse_year))
                .arg(Arg::new("limit").long("limit").value_parser(value_parser!(usize)))
                .arg(
                    Arg::new("offset")
                        .long("offset")
                        .default_value("0")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("mine")
                .about("Cases submitted under an email")
                .arg(Arg::new("email").long("email").required(true))
                .arg(
                    Arg::new("privileged")
                        .long("privileged")
                        .action(ArgAction::SetTrue)
                        .help("Include confidential submissions and disclose submitters"),
                ),
        )
        .subcommand(
            Command::new("attach")
                .about("Attach a file to a case")
                .arg(folio_arg())
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("content-type")
                        .long("content-type")
                        .help("Defaults to a guess from the file extension"),
                ),
        )
        .subcommand(
            Command::new("reconcile")
                .about("Repair the cached status of a case from its ledger")
                .arg(folio_arg()),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify the hash chain of a case's ledger")
                .arg(folio_arg()),
        )
        .subcommand(Command::new("categories").about("List the category taxonomy"))
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<DeskConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => DeskConfig::load(path)?,
        None => DeskConfig::new(),
    };
    if let Some(db) = matches.get_one::<PathBuf>("db") {
        config.storage.database_path.clone_from(db);
    }
    Ok(config)
}

fn open_desk(config: DeskConfig) -> anyhow::Result<Desk> {
    let db = &config.storage.database_path;
    let store: Arc<dyn Datastore> = Arc::new(
        SqliteStore::open(db).with_context(|| format!("opening database {}", db.display()))?,
    );
    let blobs = Arc::new(FsBlobStore::new(config.storage.blob_dir.clone()));
    Ok(CaseDesk::new(config, store, blobs)?)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn text(args: &ArgMatches, id: &str) -> Option<String> {
    args.get_one::<String>(id).cloned()
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn submission(args: &ArgMatches) -> anyhow::Result<Submission> {
    let channel = *args.get_one::<Channel>("channel").ok_or_else(|| anyhow!("missing --channel"))?;
    let kind = *args.get_one::<CaseKind>("kind").ok_or_else(|| anyhow!("missing --kind"))?;
    let category = *args.get_one::<CategoryId>("category").ok_or_else(|| anyhow!("missing --category"))?;
    let description = text(args, "description").unwrap_or_default();

    let privacy = PrivacyChoice {
        confidential: args.get_flag("confidential"),
        contact_authorized: args.get_flag("contact"),
        email: text(args, "email"),
    };
    let profile = SubmitterProfile {
        display_name: text(args, "name"),
        phone: text(args, "phone"),
        affiliation: text(args, "affiliation"),
        gender: text(args, "gender"),
        age_range: text(args, "age-range"),
        campus: text(args, "campus"),
    };

    let mut submission = Submission::new(channel, kind, category, description, privacy).with_profile(profile);
    submission.area_involved = text(args, "area");
    submission.improvement_proposal = text(args, "improvement");
    submission.received_at = args.get_one::<DateTime<Utc>>("received-at").copied();
    Ok(submission)
}

fn folio(args: &ArgMatches) -> anyhow::Result<&str> {
    args.get_one::<String>("folio")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing folio"))
}

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    let Some((name, args)) = matches.subcommand() else {
        return Ok(());
    };
    if name == "categories" {
        return print_json(&categories());
    }

    let desk = open_desk(load_config(&matches)?)?;
    match name {
        "submit" => print_json(&desk.submit(submission(args)?)?),
        "lookup" => {
            let folio = folio(args)?;
            match desk.lookup_public(folio)? {
                Some(summary) => print_json(&summary),
                None => print_json(&json!({ "folio": folio, "found": false })),
            }
        }
        "show" => {
            let viewer = if args.get_flag("privileged") {
                tracing::warn!(folio = folio(args)?, "privileged disclosure requested");
                Viewer::Privileged
            } else {
                Viewer::Staff
            };
            print_json(&desk.get_case(folio(args)?, viewer)?)
        }
        "transition" => {
            let case_id = desk.case_id_for_folio(folio(args)?)?;
            let to = *args.get_one::<CaseStatus>("to").ok_or_else(|| anyhow!("missing --to"))?;
            let mut req = TransitionRequest::new(case_id, to);
            req.notes = text(args, "notes");
            req.actor = text(args, "actor");
            req.priority = args.get_one::<Priority>("priority").copied();
            print_json(&desk.transition(req)?)
        }
        "history" => {
            let case_id = desk.case_id_for_folio(folio(args)?)?;
            print_json(&desk.history(case_id)?)
        }
        "list" => {
            let filter = CaseFilter {
                kind: args.get_one::<CaseKind>("kind").copied(),
                status: args.get_one::<CaseStatus>("status").copied(),
                channel: args.get_one::<Channel>("channel").copied(),
                category: args.get_one::<CategoryId>("category").copied(),
                year: args.get_one::<Year>("year").copied(),
                limit: args.get_one::<usize>("limit").copied(),
                offset: args.get_one::<usize>("offset").copied().unwrap_or(0),
                ..CaseFilter::default()
            };
            print_json(&desk.list(&filter, Viewer::Staff)?)
        }
        "mine" => {
            let email = text(args, "email").unwrap_or_default();
            let access = if args.get_flag("privileged") {
                tracing::warn!("privileged disclosure requested for email listing");
                EmailAccess::Privileged
            } else {
                EmailAccess::Unverified
            };
            print_json(&desk.cases_for_email(&email, access)?)
        }
        "attach" => {
            let case_id = desk.case_id_for_folio(folio(args)?)?;
            let path = args.get_one::<PathBuf>("file").ok_or_else(|| anyhow!("missing file"))?;
            let content_type = text(args, "content-type").unwrap_or_else(|| guess_content_type(path).to_string());
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            print_json(&desk.attach(case_id, &content_type, bytes).await?)
        }
        "reconcile" => {
            let case_id = desk.case_id_for_folio(folio(args)?)?;
            print_json(&desk.reconcile(case_id)?)
        }
        "verify" => {
            let folio = folio(args)?;
            let entries = desk.verify_ledger(desk.case_id_for_folio(folio)?)?;
            print_json(&json!({ "folio": folio, "entries": entries, "verified": true }))
        }
        other => Err(anyhow!("unknown command {other}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));
    run(matches).await
}
