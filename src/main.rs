// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crm_admin::backend::Backend;
use crm_admin::config::Settings;
use crm_admin::db::{LocalBackend, Store};
use crm_admin::entities::{NewUser, UserRole, CLIENT_SEARCH_FIELDS, CONTACT_SEARCH_FIELDS};
use crm_admin::formatters::Mask;
use crm_admin::logging::{self, LogTarget};
use crm_admin::rest::RestBackend;
use crm_admin::search::{FilterQuery, SortSpec};
use crm_admin::{filter_records, sort_records};
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

// ============================================================================
// ARGUMENTS
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "crm-admin",
    version,
    about = "CRM admin: terminal front end and record listing",
    after_help = "Environment: CRM_CONFIG, CRM_API_URL, CRM_DATABASE, CRM_OFFLINE, CRM_TOKEN, CRM_EMAIL, CRM_PASSWORD"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "JSON settings file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Terminal front end (default)
    Tui,
    /// Apply an input mask
    Format {
        #[arg(value_parser = parse_mask, help = "cnpj, cep or phone")]
        mask: Mask,
        value: String,
    },
    /// List clients
    Clients(ListArgs),
    /// List contacts
    Contacts {
        #[command(flatten)]
        list: ListArgs,
        #[arg(long, value_name = "ID", help = "Only contacts linked to this client")]
        client: Option<i64>,
    },
    /// Load clients from CSV into the local store
    Import { csv: PathBuf },
    /// Create a login in the local store
    SeedUser {
        name: String,
        email: String,
        password: String,
        #[arg(value_parser = parse_role, default_value = "ADMINISTRADOR")]
        role: UserRole,
    },
}

#[derive(Debug, Default, Args)]
struct ListArgs {
    #[arg(long, default_value = "", help = "Case-insensitive match on the searchable fields")]
    search: String,
    #[arg(long, help = "Include inactive records")]
    inactive: bool,
    #[arg(long, value_name = "FIELD[:asc|desc]", value_parser = parse_sort)]
    sort: Option<SortSpec>,
    #[arg(long, help = "Print JSON instead of a table")]
    json: bool,
}

fn parse_mask(raw: &str) -> Result<Mask, String> {
    Mask::from_name(raw).ok_or_else(|| format!("unknown mask: {}", raw))
}

fn parse_sort(raw: &str) -> Result<SortSpec, String> {
    SortSpec::parse(raw).ok_or_else(|| format!("invalid sort spec: {}", raw))
}

fn parse_role(raw: &str) -> Result<UserRole, String> {
    UserRole::parse(raw).ok_or_else(|| format!("unknown role: {}", raw))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let command = cli.command.unwrap_or(Command::Tui);
    if !matches!(command, Command::Tui) {
        logging::init(&settings, LogTarget::Stderr)?;
    }

    match command {
        Command::Tui => run_ui_mode(&settings)?,
        Command::Format { mask, value } => println!("{}", mask.apply(&value)),
        Command::Clients(list) => run_list_clients(&settings, &list)?,
        Command::Contacts { list, client } => run_list_contacts(&settings, &list, client)?,
        Command::Import { csv } => run_import(&settings, &csv)?,
        Command::SeedUser {
            name,
            email,
            password,
            role,
        } => run_seed_user(&settings, name, email, password, role)?,
    }

    Ok(())
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

fn open_backend(settings: &Settings) -> Result<Box<dyn Backend>> {
    if settings.offline {
        let store = Store::open(&settings.database_path).with_context(|| {
            format!("Failed to open database {}", settings.database_path.display())
        })?;
        return Ok(Box::new(LocalBackend::new(store)));
    }

    let backend = RestBackend::from_settings(settings)?;
    Ok(match env::var("CRM_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Box::new(backend.with_token(token.trim())),
        _ => Box::new(backend),
    })
}

/// Reuse a token session if it is still valid, otherwise log in from CRM_EMAIL/CRM_PASSWORD
fn ensure_session(backend: &mut dyn Backend) -> Result<()> {
    if backend.current_user().is_ok() {
        return Ok(());
    }

    match (env::var("CRM_EMAIL"), env::var("CRM_PASSWORD")) {
        (Ok(email), Ok(password)) => {
            backend
                .login(&email, &password)
                .map_err(|e| anyhow!("Login failed: {}", e.user_message()))?;
            Ok(())
        }
        _ => bail!("Not logged in: set CRM_TOKEN, or CRM_EMAIL and CRM_PASSWORD"),
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_list_clients(settings: &Settings, opts: &ListArgs) -> Result<()> {
    let mut backend = open_backend(settings)?;
    ensure_session(backend.as_mut())?;

    let clients = backend.list_clients()?;
    let query = FilterQuery::new(
        &opts.search,
        CLIENT_SEARCH_FIELDS,
        opts.inactive || settings.show_inactive,
    );
    let mut shown = filter_records(&clients, &query);
    if let Some(spec) = &opts.sort {
        shown = sort_records(&shown, spec);
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    for c in &shown {
        println!(
            "{:>5}  {:<30} {:<20} {:<25} {}",
            c.id,
            c.name,
            c.display_cnpj(),
            c.location(),
            c.status_label()
        );
    }
    println!("\n✓ {} of {} clients", shown.len(), clients.len());
    Ok(())
}

fn run_list_contacts(settings: &Settings, opts: &ListArgs, client: Option<i64>) -> Result<()> {
    let mut backend = open_backend(settings)?;
    ensure_session(backend.as_mut())?;

    let contacts = match client {
        Some(id) => backend.contacts_by_client(id)?,
        None => backend.list_contacts()?,
    };
    let query = FilterQuery::new(
        &opts.search,
        CONTACT_SEARCH_FIELDS,
        opts.inactive || settings.show_inactive,
    );
    let mut shown = filter_records(&contacts, &query);
    if let Some(spec) = &opts.sort {
        shown = sort_records(&shown, spec);
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    for c in &shown {
        println!(
            "{:>5}  {:<25} {:<22} {:<30} {:<16} {}",
            c.id,
            c.name,
            c.job_title.as_deref().unwrap_or("-"),
            c.email.as_deref().unwrap_or("-"),
            c.display_phone(),
            c.status_label()
        );
    }
    println!("\n✓ {} of {} contacts", shown.len(), contacts.len());
    Ok(())
}

fn run_import(settings: &Settings, csv_path: &Path) -> Result<()> {
    println!("🗄️  Client import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Store::open(&settings.database_path)?;
    println!("✓ Database: {}", settings.database_path.display());

    let report = store.import_clients_csv(csv_path, "import")?;
    println!("✓ Inserted:   {}", report.inserted);
    println!("✓ Duplicates: {}", report.duplicates);
    if report.invalid > 0 {
        println!("⚠️  Invalid rows: {} (see log)", report.invalid);
    }
    println!("✓ Store now holds {} clients", store.count_clients()?);

    Ok(())
}

fn run_seed_user(
    settings: &Settings,
    name: String,
    email: String,
    password: String,
    role: UserRole,
) -> Result<()> {
    let new_user = NewUser {
        name,
        email,
        password: password.clone(),
        role,
    }
    .validated(&password)
    .map_err(|e| anyhow!(e.user_message()))?;

    let store = Store::open(&settings.database_path)?;
    let user = store.create_user(&new_user)?;
    println!("✓ User {} <{}> created as {}", user.name, user.email, user.role.as_str());
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(settings: &Settings) -> Result<()> {
    use crm_admin::backend::AddressLookup;
    use crm_admin::rest::ViaCep;

    logging::init(settings, LogTarget::Terminal)?;

    let backend = open_backend(settings)?;
    let lookup: Option<Box<dyn AddressLookup>> = match ViaCep::from_settings(settings) {
        Ok(lookup) => Some(Box::new(lookup)),
        Err(e) => {
            warn!(error = %e, "CEP lookup disabled");
            None
        }
    };

    let mut app = ui::App::new(backend, lookup, settings.show_inactive);
    app.resume_session();
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_settings: &Settings) -> Result<()> {
    warn!("terminal UI not compiled in");
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or list records: crm-admin clients --search <term>");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("crm-admin").chain(args.iter().copied()))
    }

    #[test]
    fn test_list_options() {
        let cli = parse(&["clients", "--search", "ana", "--inactive", "--sort", "name:desc"]).unwrap();
        let Some(Command::Clients(list)) = cli.command else {
            panic!("expected clients command");
        };
        assert_eq!(list.search, "ana");
        assert!(list.inactive);
        assert_eq!(list.sort, Some(SortSpec::desc("name")));
        assert!(!list.json);

        assert!(parse(&["clients", "--sort", "name:up"]).is_err());
        assert!(parse(&["contacts", "--client", "x"]).is_err());
        assert!(parse(&["clients", "--bogus"]).is_err());
    }

    #[test]
    fn test_contacts_for_one_client() {
        let cli = parse(&["contacts", "--client", "7", "--json"]).unwrap();
        match cli.command {
            Some(Command::Contacts { list, client }) => {
                assert_eq!(client, Some(7));
                assert!(list.json);
                assert_eq!(list.search, "");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_config_is_global() {
        let cli = parse(&["clients", "--config", "crm.json", "--json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("crm.json")));

        let cli = parse(&["--config", "crm.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("crm.json")));
        assert!(cli.command.is_none());

        assert!(parse(&["--config"]).is_err());
    }

    #[test]
    fn test_format_and_seed_user() {
        match parse(&["format", "cnpj", "12345678000199"]).unwrap().command {
            Some(Command::Format { mask, value }) => {
                assert_eq!(mask, Mask::Cnpj);
                assert_eq!(mask.apply(&value), "12.345.678/0001-99");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(parse(&["format", "iban", "123"]).is_err());

        match parse(&["seed-user", "Ana", "ana@x.com", "segredo123"]).unwrap().command {
            Some(Command::SeedUser { role, .. }) => assert_eq!(role, UserRole::Administrador),
            other => panic!("unexpected: {:?}", other),
        }
        match parse(&["seed-user", "Bia", "bia@x.com", "segredo123", "suporte"]).unwrap().command {
            Some(Command::SeedUser { role, .. }) => assert_eq!(role, UserRole::Suporte),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(parse(&["seed-user", "Bia", "bia@x.com", "segredo123", "chefe"]).is_err());
    }
}
