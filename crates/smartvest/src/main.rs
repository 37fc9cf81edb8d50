//! `svest` - CLI for smartvest
//!
//! This binary registers vest wearers, prints their emergency payloads and
//! links, moves records in and out of the local store, and follows telemetry.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing::{info, warn};

use smartvest::cli::{
    Cli, Command, ConfigCommand, ExportFormat, OutputFormat, RegisterCommand, TelemetryCommand,
};
use smartvest::link::{self, ProfileLookup};
use smartvest::payload::{self, QrMode};
use smartvest::telemetry::{TelemetryChannel, TelemetryState};
use smartvest::{
    init_logging, verify_or_keep, AddressVerifier, Config, ExportOutcome, GeminiVerifier,
    PhotoUpload, RecordStore, RegistrationForm, UserRecord,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Config commands load the configuration themselves
    match cli.command {
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
        command => {
            let config =
                Config::load_from(cli.config).context("Failed to load configuration")?;
            run(&config, command).await
        }
    }
}

async fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Register(cmd) => handle_register(config, *cmd).await,
        Command::List(cmd) => handle_list(config, cmd.format),
        Command::Show(cmd) => handle_show(config, &cmd.id, cmd.json),
        Command::Open(cmd) => handle_open(config, &cmd.url, cmd.json),
        Command::Qr(cmd) => handle_qr(config, &cmd.id, cmd.mode.into()),
        Command::Login(cmd) => handle_login(config, &cmd.username, &cmd.password),
        Command::Export(cmd) => {
            let dir = cmd.out.unwrap_or_else(|| config.export_dir());
            handle_export(config, cmd.format, &dir)
        }
        Command::Import(cmd) => handle_import(config, &cmd.file),
        Command::Telemetry(cmd) => handle_telemetry(config, cmd).await,
        Command::Config(_) => unreachable!("config commands are handled before loading"),
    }
}

fn open_store(config: &Config) -> anyhow::Result<RecordStore> {
    RecordStore::from_config(config).context("Failed to open record store")
}

async fn handle_register(config: &Config, cmd: RegisterCommand) -> anyhow::Result<()> {
    let photo = cmd
        .photo
        .as_deref()
        .map(|path| PhotoUpload::from_path(path, config.registration.max_photo_bytes))
        .transpose()
        .map_err(registration_error)?;

    let mut address = cmd.address;
    if cmd.verify_address {
        let verifier = GeminiVerifier::from_config(&config.address)?;
        let check = verify_or_keep(
            verifier.as_ref().map(|v| v as &dyn AddressVerifier),
            &address,
        )
        .await;
        if check.verified {
            println!("Address verified: {}", check.address);
        }
        address = check.address;
    }

    let form = RegistrationForm {
        full_name: cmd.name,
        national_id: cmd.national_id,
        age: cmd.age,
        blood_type: cmd.blood_type,
        address,
        emergency_phone: cmd.phone,
        contact_name: cmd.contact_name,
        contact_relationship: cmd.relationship,
        observations: cmd.observations,
        photo,
        username: cmd.username.unwrap_or_default(),
        password: cmd.password.unwrap_or_default(),
        device_id: cmd.device_id.unwrap_or_default(),
    };
    let record = form
        .into_record(&config.registration)
        .map_err(registration_error)?;

    let store = open_store(config)?;
    store.save_user(&record)?;
    info!(id = %record.id, "Registered {}", record.full_name);

    println!("Registered {} ({})", record.full_name, record.id);
    println!(
        "Profile link: {}",
        link::local_url(&config.registration.link_base_url, &record.id)
    );
    Ok(())
}

/// Report bad input as a rejection; anything else is a failure with its cause chain.
fn registration_error(err: smartvest::Error) -> anyhow::Error {
    if err.is_validation_error() {
        anyhow!("Registration rejected: {err}")
    } else {
        anyhow::Error::new(err).context("Registration failed")
    }
}

fn handle_list(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let users = open_store(config)?.get_users()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&users)?),
        OutputFormat::Plain => {
            for user in &users {
                println!("{}\t{}", user.id, user.full_name);
            }
        }
        OutputFormat::Table => {
            if users.is_empty() {
                println!("No records registered.");
                return Ok(());
            }
            println!(
                "{:<10} {:<28} {:<12} {:<5} {:<6} {}",
                "ID", "Name", "National ID", "Age", "Blood", "Device"
            );
            for user in &users {
                println!(
                    "{:<10} {:<28} {:<12} {:<5} {:<6} {}",
                    user.short_id(),
                    user.full_name,
                    user.national_id,
                    user.age,
                    user.blood_type,
                    user.device_id.as_deref().unwrap_or("-")
                );
            }
            println!();
            println!("{} record(s)", users.len());
        }
    }
    Ok(())
}

fn print_profile(record: &UserRecord, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("{}", payload::emergency_card(record));
    println!("------------------");
    println!("ADDRESS: {}", record.address);
    println!("REGISTERED: {}", record.created_at.format("%Y-%m-%d %H:%M UTC"));
    if let Some(device) = &record.device_id {
        println!("DEVICE: {device}");
    }
    Ok(())
}

fn handle_show(config: &Config, id: &str, json: bool) -> anyhow::Result<()> {
    let Some(record) = open_store(config)?.get_user_by_id(id)? else {
        bail!("No record with id {id}");
    };
    print_profile(&record, json)
}

fn handle_open(config: &Config, url: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let lookup = link::resolve_profile(url, &store)?;

    if let ProfileLookup::Portable(record) = &lookup {
        info!(id = %record.id, "Saved portable profile to this device");
    }
    match lookup.record() {
        Some(record) => print_profile(record, json),
        None => bail!(lookup.message().unwrap_or("Profile could not be opened.")),
    }
}

fn handle_qr(config: &Config, id: &str, mode: QrMode) -> anyhow::Result<()> {
    let Some(record) = open_store(config)?.get_user_by_id(id)? else {
        bail!("No record with id {id}");
    };

    let content = payload::qr_payload(&record, mode, &config.registration.link_base_url)?;
    info!(%mode, "Suggested image name: {}", payload::qr_file_name(&record));
    println!("{content}");
    Ok(())
}

fn handle_login(config: &Config, username: &str, password: &str) -> anyhow::Result<()> {
    match open_store(config)?.authenticate(username, password)? {
        Some(record) => {
            println!("Welcome, {}", record.full_name);
            Ok(())
        }
        None => bail!("Invalid username or password"),
    }
}

fn handle_export(config: &Config, format: ExportFormat, dir: &Path) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let outcome = match format {
        ExportFormat::Csv => store.export_csv(dir)?,
        ExportFormat::Json => store.export_json(dir)?,
    };

    match outcome {
        ExportOutcome::Written(path) => println!("Exported to {}", path.display()),
        ExportOutcome::Empty(notice) => println!("{notice}"),
    }
    Ok(())
}

fn handle_import(config: &Config, file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let report = open_store(config)?.import_json(&text)?;

    if !report.success {
        bail!(report.message);
    }
    println!("{}", report.message);
    if report.updated > 0 {
        println!("{} existing record(s) updated.", report.updated);
    }
    if report.passwords_hashed > 0 {
        println!("{} legacy password(s) hashed.", report.passwords_hashed);
    }
    Ok(())
}

fn print_state(state: &TelemetryState, json: bool) {
    if json {
        match serde_json::to_string(state) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Could not serialize telemetry: {}", e),
        }
        return;
    }

    let battery = state
        .battery_level
        .map_or_else(|| "-".to_string(), |level| format!("{level}%"));
    println!(
        "{} {} {:.6},{:.6} battery {}{}  {}",
        state.last_update.format("%H:%M:%S"),
        state.device_id,
        state.latitude,
        state.longitude,
        battery,
        if state.sos_active { "  SOS ACTIVE" } else { "" },
        state.maps_url()
    );
}

async fn handle_telemetry(config: &Config, cmd: TelemetryCommand) -> anyhow::Result<()> {
    let channel = TelemetryChannel::from_config(&config.telemetry);

    match cmd {
        TelemetryCommand::Simulate {
            ticks,
            sos_at,
            json,
        } => {
            let subscription = channel.subscribe(&config.telemetry.device_id, move |state| {
                print_state(state, json);
            });

            let mut interval = tokio::time::interval(config.tick_interval());
            // The first tick completes immediately.
            interval.tick().await;
            for tick in 1..=ticks {
                interval.tick().await;
                if sos_at == Some(tick) {
                    channel.simulate_sos(true);
                }
                channel.simulate_movement(&mut rand::thread_rng());
            }

            let _ = subscription.unsubscribe();
        }
        TelemetryCommand::Ingest { file } => {
            let reader: Box<dyn BufRead> = match &file {
                Some(path) => Box::new(BufReader::new(
                    std::fs::File::open(path)
                        .with_context(|| format!("Failed to open {}", path.display()))?,
                )),
                None => Box::new(BufReader::new(std::io::stdin().lock())),
            };
            let subscription = channel.subscribe(&config.telemetry.device_id, |state| {
                print_state(state, true);
            });

            let mut rejected = 0usize;
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = channel.ingest_json(&line) {
                    warn!("Skipping telemetry payload: {}", e);
                    rejected += 1;
                }
            }

            let _ = subscription.unsubscribe();
            if rejected > 0 {
                warn!(rejected, "Some telemetry payloads were rejected");
            }
        }
    }
    Ok(())
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let mut config =
                Config::load_from(path).context("Failed to load configuration")?;
            if config.address.api_key.is_some() {
                config.address.api_key = Some("********".to_string());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Slot key:           {}", config.storage.slot_key);
                println!("  Export directory:   {}", config.export_dir().display());
                println!();
                println!("[Registration]");
                println!("  Max photo bytes:    {}", config.registration.max_photo_bytes);
                println!("  Password cost:      {}", config.registration.password_cost);
                println!("  Link base URL:      {}", config.registration.link_base_url);
                println!();
                println!("[Telemetry]");
                println!("  Device id:          {}", config.telemetry.device_id);
                println!(
                    "  Start position:     {}, {}",
                    config.telemetry.latitude, config.telemetry.longitude
                );
                println!("  Tick:               {:?}", config.tick_interval());
                println!();
                println!("[Address]");
                println!(
                    "  Verification:       {}",
                    if config.address.api_key.is_some() { "enabled" } else { "disabled" }
                );
                println!("  Model:              {}", config.address.model);
                println!("  Timeout:            {:?}", config.address_timeout());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
