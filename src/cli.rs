use agenda::config::{self, AppConfig, ConfigError, FileConfig};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(AppConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Init(args)) = cli.command {
        let code = run_init(args);
        return RunOutcome::Exit(code);
    }

    let file = match cli.config.as_deref() {
        Some(path) => match FileConfig::load(path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("error: {err}");
                return RunOutcome::Exit(2);
            }
        },
        None => FileConfig::default(),
    };

    match resolve_config(&cli, file) {
        Ok(config) => RunOutcome::Serve(config),
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "agenda",
    version,
    about = "Appointment and alert scheduling server"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// TOML file with defaults for the options below.
    #[arg(long, env = "AGENDA_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "AGENDA_BIND")]
    bind: Option<String>,
    #[arg(long, env = "AGENDA_APP_NAME")]
    app_name: Option<String>,
    #[arg(long, env = "AGENDA_VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "AGENDA_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "AGENDA_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "AGENDA_SIGNING_KEY")]
    signing_key: Option<String>,
    #[arg(long, env = "AGENDA_DELIVERY_TIMEOUT")]
    delivery_timeout: Option<String>,
    #[arg(long, env = "AGENDA_SIGNATURE_TTL")]
    signature_ttl: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print fresh VAPID credentials and a signing key.
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

fn run_init(args: InitArgs) -> i32 {
    let keys = match agenda::generate_keys() {
        Ok(keys) => keys,
        Err(err) => {
            eprintln!("failed to generate keys: {err}");
            return 1;
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:you@example.com".to_string(), true),
    };

    println!("Keys generated.");
    println!();
    println!("AGENDA_VAPID_PRIVATE_KEY=\"{}\"", keys.vapid_private_key);
    println!("AGENDA_VAPID_PUBLIC_KEY=\"{}\"", keys.vapid_public_key);
    println!("AGENDA_VAPID_SUBJECT=\"{subject}\"");
    println!("AGENDA_SIGNING_KEY=\"{}\"", keys.signing_key);
    if show_subject_note {
        println!();
        println!("Note: replace AGENDA_VAPID_SUBJECT with a contact URI you control.");
    }
    0
}

fn resolve_config(cli: &Cli, file: FileConfig) -> Result<AppConfig, ConfigError> {
    let bind = match cli.bind.as_deref().or(file.bind.as_deref()) {
        Some(raw) => raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBind(raw.to_string()))?,
        None => config::default_bind(),
    };

    let app_name = cli
        .app_name
        .clone()
        .or(file.app_name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| config::DEFAULT_APP_NAME.to_string());

    let delivery_timeout = match cli
        .delivery_timeout
        .as_deref()
        .or(file.delivery_timeout.as_deref())
    {
        Some(raw) => {
            let timeout = config::parse_duration("delivery timeout", raw)?;
            std::time::Duration::try_from(timeout).map_err(|_| {
                ConfigError::InvalidDuration {
                    field: "delivery timeout",
                    value: raw.to_string(),
                }
            })?
        }
        None => config::default_delivery_timeout(),
    };

    let signature_ttl = match cli
        .signature_ttl
        .as_deref()
        .or(file.signature_ttl.as_deref())
    {
        Some(raw) => config::parse_duration("signature ttl", raw)?,
        None => config::default_signature_ttl(),
    };

    Ok(AppConfig {
        bind,
        app_name,
        vapid_private_key: cli.vapid_private_key.clone().or(file.vapid_private_key),
        vapid_public_key: cli.vapid_public_key.clone().or(file.vapid_public_key),
        vapid_subject: cli.vapid_subject.clone().or(file.vapid_subject),
        signing_key: cli.signing_key.clone().or(file.signing_key),
        delivery_timeout,
        signature_ttl,
    })
}
