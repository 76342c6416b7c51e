mod auth;
mod client;
mod config;
mod endpoints;
mod error;
mod events;
mod logging;
mod ota;
mod resolve;
mod session;
mod tokens;

use crate::auth::Credentials;
use crate::client::{HttpSettings, ResponseData};
use crate::config::{Config, Scope, save};
use crate::endpoints::Endpoints;
use crate::error::OtaError;
use crate::ota::OtaClient;
use crate::resolve::{Candidate, CandidateKind, Decision};
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

static FULL_IDS: OnceLock<bool> = OnceLock::new();

#[derive(Parser)]
#[command(
    name = "otactl",
    version,
    about = "CLI for the HERE OTA Connect device-fleet platform"
)]
struct Cli {
    #[arg(long, global = true, help = "Account e-mail (otherwise read from config)")]
    username: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Account password (otherwise OTACTL_PASSWORD or config)"
    )]
    password: Option<String>,

    #[arg(long, global = true, value_name = "URL", help = "Platform base URL")]
    base_url: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Identity service base URL used for sign-in"
    )]
    account_url: Option<String>,

    #[arg(
        long = "env",
        global = true,
        value_name = "ENVIRONMENT",
        help = "Switch to this environment before running the command"
    )]
    environment: Option<String>,

    #[arg(
        long,
        short = 'o',
        value_enum,
        default_value_t = OutputFormat::Pretty,
        global = true,
        help = "Output format (propagates to subcommands)"
    )]
    output: OutputFormat,

    #[arg(long, global = true, help = "Do not truncate long IDs in table output")]
    full_ids: bool,

    #[arg(
        long,
        value_name = "COL1,COL2",
        global = true,
        help = "Override table columns (comma-separated)"
    )]
    columns: Option<String>,

    #[arg(
        long,
        value_name = "COLUMN",
        global = true,
        help = "Sort table rows by column (ascending)"
    )]
    sort_by: Option<String>,

    #[arg(
        long,
        value_name = "TEXT",
        global = true,
        help = "Filter rows containing TEXT (case-insensitive)"
    )]
    filter: Option<String>,

    #[arg(long, short = 'v', global = true, help = "Log debug output to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist account settings to the chosen scope
    Configure {
        #[arg(long)]
        username: Option<String>,
        #[arg(long, help = "Store the password in the config file (prefer OTACTL_PASSWORD)")]
        password: Option<String>,
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
        #[arg(long, value_name = "URL")]
        account_url: Option<String>,
        #[arg(long, value_name = "ENVIRONMENT", help = "Environment to switch to after sign-in")]
        environment: Option<String>,
        #[arg(long, help = "Disable TLS certificate verification")]
        insecure: bool,
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show current configuration (secrets masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
    /// Sign in and show the signed-in user and session details
    Whoami,
    /// List environments available to the account
    Envs,
    /// Find the single environment that holds a device and switch to it
    Locate {
        #[arg(value_name = "DEVICE_NAME")]
        device: String,
    },
    /// Device operations in the current environment
    #[command(subcommand)]
    Device(DeviceCommand),
    /// Device group operations
    #[command(subcommand)]
    Group(GroupCommand),
    /// Update and campaign operations
    #[command(subcommand)]
    Campaign(CampaignCommand),
    /// List software versions in the user repository
    Software,
    /// Parse websocket messages (one JSON document per line on stdin)
    ParseEvents,
}

#[derive(Subcommand)]
enum DeviceCommand {
    /// Search devices by name
    Info {
        #[arg(value_name = "DEVICE_NAME")]
        name: String,
    },
    /// Print the device UUID
    Uuid {
        #[arg(value_name = "DEVICE_NAME")]
        name: String,
    },
    /// Fetch a device by UUID
    Get {
        #[arg(value_name = "DEVICE_UUID")]
        uuid: String,
    },
    /// Installation history
    History {
        #[arg(value_name = "DEVICE_NAME")]
        name: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Current and pending assignments
    Assignments {
        #[arg(value_name = "DEVICE_NAME")]
        name: String,
    },
    /// ECU download and installation events
    Events {
        #[arg(value_name = "DEVICE_NAME")]
        name: String,
    },
    /// Network information reported by the device
    Network {
        #[arg(value_name = "DEVICE_NAME")]
        name: String,
    },
    /// Last update data (admin view, includes replaced ECUs)
    LastUpdate {
        #[arg(value_name = "DEVICE_NAME")]
        name: String,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// List groups
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Create a static group
    Create {
        #[arg(value_name = "GROUP_NAME")]
        name: String,
    },
    /// Find a group ID by name (interactive confirmation)
    Find {
        #[arg(value_name = "GROUP_NAME")]
        name: String,
        #[arg(long, help = "Require an exact name match instead of a substring")]
        exact: bool,
    },
    /// Add a device to a group
    AddDevice {
        #[arg(value_name = "GROUP_NAME")]
        group: String,
        #[arg(value_name = "DEVICE_NAME")]
        device: String,
    },
    /// Remove a device from a group
    RemoveDevice {
        #[arg(value_name = "GROUP_NAME")]
        group: String,
        #[arg(value_name = "DEVICE_NAME")]
        device: String,
    },
    /// List device names in a group
    Devices {
        #[arg(value_name = "GROUP_NAME")]
        group: String,
    },
}

#[derive(Subcommand)]
enum CampaignCommand {
    /// List recent updates
    Updates {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Find an update ID by exact name (interactive confirmation)
    Find {
        #[arg(value_name = "UPDATE_NAME")]
        name: String,
    },
    /// Fetch a campaign by ID
    Info {
        #[arg(value_name = "CAMPAIGN_ID")]
        id: String,
    },
    /// Create a campaign for an update on a group and launch it
    Launch {
        #[arg(long, help = "Name of the new campaign")]
        name: String,
        #[arg(long, value_name = "GROUP_NAME")]
        group: String,
        #[arg(long, value_name = "UPDATE_NAME")]
        update: String,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
    Raw,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

struct RenderOpts {
    columns_override: Option<Vec<String>>,
    sort_by: Option<String>,
    filter: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).map_err(|err| {
        let expired = err
            .downcast_ref::<OtaError>()
            .is_some_and(OtaError::needs_reauthentication);
        if expired {
            err.context("the platform rejected the session; check the account credentials")
        } else {
            err
        }
    })
}

fn run(cli: Cli) -> Result<()> {
    logging::init_logging(cli.verbose);
    let cwd = std::env::current_dir().context("reading current directory")?;
    FULL_IDS.get_or_init(|| cli.full_ids);

    let render_opts = RenderOpts {
        columns_override: cli.columns.as_ref().map(|c| {
            c.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }),
        sort_by: cli.sort_by.clone(),
        filter: cli.filter.clone(),
    };

    match &cli.command {
        Commands::Configure {
            username,
            password,
            base_url,
            account_url,
            environment,
            insecure,
            timeout,
            scope,
        } => {
            let mut existing = config::load_scope((*scope).into(), &cwd)?;
            if let Some(username) = username {
                existing.username = Some(username.clone());
            }
            if let Some(password) = password {
                existing.password = Some(password.clone());
            }
            if let Some(url) = base_url {
                existing.base_url = Some(url.clone());
            }
            if let Some(url) = account_url {
                existing.account_url = Some(url.clone());
            }
            if let Some(env) = environment {
                existing.environment = Some(env.clone());
            }
            if *insecure {
                existing.verify_tls = Some(false);
            }
            if let Some(secs) = timeout {
                existing.timeout_secs = Some(*secs);
            }
            let path = save((*scope).into(), &existing, &cwd)?;
            println!("Saved configuration to {}", path.display());
            return Ok(());
        }
        Commands::ConfigShow => {
            let mut masked = config::load(&cwd)?;
            if masked.password.is_some() {
                masked.password = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
            return Ok(());
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Zsh => {
                    generate(shells::Zsh, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut std::io::stdout())
                }
            }
            return Ok(());
        }
        Commands::ParseEvents => return parse_events(cli.output),
        _ => {}
    }

    let mut client = connect(&cli, &cwd)?;
    let output = cli.output;

    match cli.command {
        Commands::Whoami => {
            let session = client.session();
            let profile = session.profile();
            let summary = json!({
                "userId": profile.user_id,
                "firstname": profile.firstname,
                "lastname": profile.lastname,
                "email": profile.email,
                "accessToken": mask_secret(session.access_token()),
                "environment": session.current_environment(),
                "websocket": client.websocket_address(),
            });
            print_json(&summary, output)?;
        }
        Commands::Envs => {
            let session = client.session();
            let rows: Vec<_> = session
                .environments()
                .iter()
                .map(|env| {
                    json!({
                        "name": env.name,
                        "namespace": env.namespace,
                        "current": env.name == session.current_environment(),
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(rows), output)?;
        }
        Commands::Locate { device } => {
            let env = client.resolve_unique_environment(&device)?;
            println!("{env}");
        }
        Commands::Device(command) => handle_device(&mut client, command, output, &render_opts)?,
        Commands::Group(command) => handle_group(&mut client, command, output, &render_opts)?,
        Commands::Campaign(command) => {
            handle_campaign(&mut client, command, output, &render_opts)?
        }
        Commands::Software => {
            render_response(client.software_versions()?, output, &render_opts, None)?
        }
        Commands::Configure { .. }
        | Commands::ConfigShow
        | Commands::Completion { .. }
        | Commands::ParseEvents => {}
    }

    Ok(())
}

fn connect(cli: &Cli, cwd: &Path) -> Result<OtaClient> {
    let effective = config::resolve(
        cwd,
        Config {
            username: cli.username.clone(),
            password: cli.password.clone(),
            base_url: cli.base_url.clone(),
            account_url: cli.account_url.clone(),
            environment: cli.environment.clone(),
            ..Config::default()
        },
    )?;
    let endpoints = Endpoints::new(&effective.base_url, &effective.account_url)
        .context("parsing platform URLs")?;
    let settings = HttpSettings {
        verify_tls: effective.verify_tls,
        timeout: Duration::from_secs(effective.timeout_secs),
        ..HttpSettings::default()
    };
    let credentials = Credentials {
        username: effective.username,
        password: effective.password,
    };

    let mut client = OtaClient::connect(endpoints, &settings, &credentials)?;
    if let Some(env) = effective.environment
        && env != client.current_environment()
    {
        client.switch_environment(&env)?;
    }
    Ok(client)
}

fn handle_device(
    client: &mut OtaClient,
    command: DeviceCommand,
    output: OutputFormat,
    render_opts: &RenderOpts,
) -> Result<()> {
    let columns: &[&str] = &["deviceName", "deviceId", "deviceStatus", "lastSeen", "uuid"];
    match command {
        DeviceCommand::Info { name } => {
            render_response(client.device_info(&name)?, output, render_opts, Some(columns))
        }
        DeviceCommand::Uuid { name } => {
            println!("{}", client.device_uuid(&name)?);
            Ok(())
        }
        DeviceCommand::Get { uuid } => {
            render_response(client.device_by_uuid(&uuid)?, output, render_opts, None)
        }
        DeviceCommand::History { name, limit } => render_response(
            client.device_history(&name, limit)?,
            output,
            render_opts,
            Some(&["correlationId", "success", "completedAt"]),
        ),
        DeviceCommand::Assignments { name } => {
            render_response(client.device_assignments(&name)?, output, render_opts, None)
        }
        DeviceCommand::Events { name } => {
            render_response(client.device_events(&name)?, output, render_opts, None)
        }
        DeviceCommand::Network { name } => {
            render_response(client.device_network(&name)?, output, render_opts, None)
        }
        DeviceCommand::LastUpdate { name } => {
            render_response(client.device_last_update(&name)?, output, render_opts, None)
        }
    }
}

fn handle_group(
    client: &mut OtaClient,
    command: GroupCommand,
    output: OutputFormat,
    render_opts: &RenderOpts,
) -> Result<()> {
    match command {
        GroupCommand::List { limit, offset } => render_response(
            client.groups(limit, offset)?,
            output,
            render_opts,
            Some(&["groupName", "groupType", "createdAt", "id"]),
        ),
        GroupCommand::Create { name } => {
            render_response(client.create_static_group(&name)?, output, render_opts, None)
        }
        GroupCommand::Find { name, exact } => {
            let id = if exact {
                client.find_group_id_by_name(&name, prompt_decision)?
            } else {
                client.find_group_by_name(&name, prompt_decision)?
            };
            println!("{id}");
            Ok(())
        }
        GroupCommand::AddDevice { group, device } => render_response(
            client.add_device_to_group(&group, &device, prompt_decision)?,
            output,
            render_opts,
            None,
        ),
        GroupCommand::RemoveDevice { group, device } => render_response(
            client.remove_device_from_group(&group, &device, prompt_decision)?,
            output,
            render_opts,
            None,
        ),
        GroupCommand::Devices { group } => {
            for name in client.device_names_in_group(&group, prompt_decision)? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn handle_campaign(
    client: &mut OtaClient,
    command: CampaignCommand,
    output: OutputFormat,
    render_opts: &RenderOpts,
) -> Result<()> {
    match command {
        CampaignCommand::Updates { name, limit } => render_response(
            client.updates(&name, limit)?,
            output,
            render_opts,
            Some(&["name", "description", "createdAt", "uuid"]),
        ),
        CampaignCommand::Find { name } => {
            println!("{}", client.find_campaign_by_name(&name, prompt_decision)?);
            Ok(())
        }
        CampaignCommand::Info { id } => {
            render_response(client.campaign_info(&id)?, output, render_opts, None)
        }
        CampaignCommand::Launch {
            name,
            group,
            update,
        } => render_response(
            client.launch_campaign_on_group(&name, &group, &update, prompt_decision)?,
            output,
            render_opts,
            None,
        ),
    }
}

/// Console confirmation for name lookups: `y` confirms, `q` aborts, anything else rejects.
fn prompt_decision(candidate: &Candidate) -> Decision {
    let mut stderr = io::stderr();
    let _ = writeln!(stderr, "{}", candidate.name);
    for (label, value) in [
        ("Description", &candidate.description),
        ("Created at", &candidate.created_at),
        ("Updated at", &candidate.updated_at),
    ] {
        if let Some(value) = value {
            let _ = writeln!(stderr, "  {label}: {value}");
        }
    }
    let question = match candidate.kind {
        CandidateKind::Group => "Select this group? (Y/N/Q): ",
        CandidateKind::Update => "Correct update? (Y/N/Q): ",
    };
    let _ = write!(stderr, "{question}");
    let _ = stderr.flush();

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        // closed stdin cannot confirm anything
        Ok(0) | Err(_) => return Decision::Abort,
        Ok(_) => {}
    }
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::Confirm,
        "q" | "quit" => Decision::Abort,
        _ => Decision::Reject,
    }
}

fn parse_events(output: OutputFormat) -> Result<()> {
    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(event) = events::parse_device_event(&line)? {
            let value = json!({
                "correlationId": event.correlation_id,
                "eventType": event.event_type,
            });
            print_json(&value, output)?;
        }
    }
    Ok(())
}

/// First six characters followed by a mask.
fn mask_secret(secret: &str) -> String {
    let shown: String = secret.chars().take(6).collect();
    format!("{shown}*****")
}

fn print_json(value: &serde_json::Value, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json | OutputFormat::Raw => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn render_response(
    response: ResponseData,
    output: OutputFormat,
    render_opts: &RenderOpts,
    columns: Option<&[&str]>,
) -> Result<()> {
    match output {
        OutputFormat::Raw => {
            println!("{}", response.body);
        }
        OutputFormat::Json => {
            if let Some(json) = response.json {
                println!("{}", serde_json::to_string(&json)?);
            } else {
                println!("{}", response.body);
            }
        }
        OutputFormat::Pretty => {
            if let Some(json) = response.json {
                if !print_table(&json, columns, render_opts) {
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
            } else if !response.body.is_empty() {
                println!("{}", response.body);
            }
        }
    }

    Ok(())
}

fn print_table(
    json: &serde_json::Value,
    columns_hint: Option<&[&str]>,
    render_opts: &RenderOpts,
) -> bool {
    let rows = match json {
        serde_json::Value::Array(arr) => arr,
        serde_json::Value::Object(map) => match map.get("values") {
            Some(serde_json::Value::Array(arr)) => arr,
            _ => return false,
        },
        _ => return false,
    };

    if rows.is_empty() {
        println!("No resources found.");
        return true;
    }

    let first_obj = match &rows[0] {
        serde_json::Value::Object(map) => map,
        _ => return false,
    };

    let present = |key: &str| {
        rows.iter()
            .any(|row| row.get(key).map(is_non_empty).unwrap_or(false))
    };

    let mut columns: Vec<String> = Vec::new();

    if let Some(override_cols) = &render_opts.columns_override {
        columns.extend(override_cols.iter().filter(|k| present(k)).cloned());
    }

    if columns.is_empty()
        && let Some(hint) = columns_hint
    {
        columns.extend(hint.iter().filter(|k| present(k)).map(|k| k.to_string()));
    }

    if columns.is_empty() {
        // Up to 8 fields of the first object that carry a value somewhere.
        columns.extend(first_obj.keys().filter(|k| present(k)).take(8).cloned());
    }

    if !columns.iter().any(|c| c == "id") && present("id") {
        columns.push("id".to_string());
    }

    if columns.is_empty() {
        return false;
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    let mut table: Vec<Vec<String>> = Vec::new();
    let needle = render_opts.filter.as_ref().map(|f| f.to_ascii_lowercase());
    let full_ids = *FULL_IDS.get().unwrap_or(&false);

    for row in rows {
        if let serde_json::Value::Object(map) = row {
            let mut out_row = Vec::new();
            for col in columns.iter() {
                let value = map.get(col).unwrap_or(&serde_json::Value::Null);
                let mut rendered = value_to_str(value);
                if (col == "id" || col == "uuid") && !full_ids && rendered.chars().count() > 12 {
                    let short: String = rendered.chars().take(12).collect();
                    rendered = format!("{short}…");
                }
                out_row.push(rendered);
            }
            if let Some(needle) = &needle
                && !out_row
                    .iter()
                    .any(|cell| cell.to_ascii_lowercase().contains(needle))
            {
                continue;
            }
            for (idx, cell) in out_row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
            table.push(out_row);
        }
    }

    if table.is_empty() {
        println!("No resources found.");
        return true;
    }

    if let Some(sort) = &render_opts.sort_by
        && let Some(idx) = columns.iter().position(|c| c == sort)
    {
        table.sort_by(|a, b| a[idx].cmp(&b[idx]));
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(&columns));
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", separator.join("  "));
    for row in &table {
        println!("{}", line(row));
    }

    true
}

fn value_to_str(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "".into(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn is_non_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(_) => true,
        serde_json::Value::Number(_) => true,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Array(arr) => !arr.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
    }
}
