//! `stm migrate` command - run a full migration

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::bail_config;
use crate::cli::GlobalOpts;
use crate::core::{Config, MigrationReport, MigrationStatus};
use crate::migration::migrate_file;

#[derive(clap::Args, Debug)]
pub struct MigrateArgs {
    /// Spreadsheet to migrate (.xlsx, .xlsm, .xls, .ods or .csv)
    pub file: PathBuf,

    /// Server base URL
    #[arg(long)]
    pub server: Option<String>,

    /// Shared space id
    #[arg(long)]
    pub shared_space: Option<u64>,

    /// Workspace id
    #[arg(long)]
    pub workspace: Option<u64>,

    /// Sign-in user or API client id
    #[arg(long, short = 'u')]
    pub user: Option<String>,

    /// Sign-in password or API secret (prompted when missing)
    #[arg(long)]
    pub password: Option<String>,

    /// Proxy host
    #[arg(long)]
    pub proxy_host: Option<String>,

    /// Proxy port
    #[arg(long)]
    pub proxy_port: Option<u16>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Email of the user assigned when a test's owner is unknown
    #[arg(long)]
    pub default_user: Option<String>,

    /// Release used when a release reference is unknown
    #[arg(long)]
    pub default_release: Option<String>,

    /// Test type assigned when a test has none
    #[arg(long)]
    pub default_test_type: Option<String>,

    /// Number of script upload threads
    #[arg(long, short = 'j')]
    pub workers: Option<usize>,
}

impl MigrateArgs {
    /// Flags as the highest-priority config layer
    fn overrides(&self) -> Config {
        Config {
            server: self.server.clone(),
            shared_space: self.shared_space,
            workspace: self.workspace,
            user: self.user.clone(),
            password: self.password.clone(),
            proxy_host: self.proxy_host.clone(),
            proxy_port: self.proxy_port,
            timeout_secs: self.timeout,
            default_user: self.default_user.clone(),
            default_release: self.default_release.clone(),
            default_test_type: self.default_test_type.clone(),
            upload_workers: self.workers,
            extension_fields: None,
        }
    }
}

pub fn run(args: MigrateArgs, global: &GlobalOpts) -> Result<()> {
    if !args.file.exists() {
        return Err(miette::miette!("File not found: {}", args.file.display()));
    }

    let mut config = Config::load(global.config.as_deref()).map_err(bail_config)?;
    config.merge(args.overrides());

    if config.password.is_none() && console::user_attended() {
        let prompt = format!("Password for {}", config.user.as_deref().unwrap_or("user"));
        let password = dialoguer::Password::new()
            .with_prompt(prompt)
            .interact()
            .into_diagnostic()?;
        config.password = Some(password);
    }

    let settings = config.into_settings().map_err(bail_config)?;

    if !global.quiet && !global.format.is_json() {
        eprintln!(
            "{} Migrating {} into {}",
            style("→").blue(),
            style(args.file.display()).yellow(),
            style(settings.connection.workspace_url()).cyan(),
        );
    }

    let report = migrate_file(&args.file, &settings);

    if global.format.is_json() {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else {
        print_summary(&report);
    }

    if !report.status.is_success() {
        std::process::exit(report.status.exit_code());
    }
    Ok(())
}

fn print_summary(report: &MigrationReport) {
    let mut summary = Builder::default();
    summary.push_record(["", "Migrated", "Failed"]);
    summary.push_record([
        "Tests".to_string(),
        report.migrated_tests.to_string(),
        report.failed_tests.to_string(),
    ]);
    summary.push_record([
        "Steps".to_string(),
        report.uploaded_steps.to_string(),
        report.failed_steps.to_string(),
    ]);

    println!();
    println!("{}", summary.build().with(Style::rounded()));
    println!("{}", status_line(report.status));
}

fn status_line(status: MigrationStatus) -> String {
    let name = style(status.as_str());
    let name = if status.is_success() {
        name.green()
    } else if status.is_fatal() {
        name.red()
    } else {
        name.yellow()
    };
    let mark = if status.is_success() {
        style("✓").green()
    } else {
        style("✗").red()
    };
    format!("{} {} - {}", mark, name.bold(), status.description())
}
