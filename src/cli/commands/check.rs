//! `stm check` command - offline sheet validation

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::truncate_str;
use crate::cli::GlobalOpts;
use crate::migration::{PrepareError, PreparedSheet, SheetOutline};

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Spreadsheet to validate
    pub file: PathBuf,

    /// Only print the summary and issues, not the test list
    #[arg(long)]
    pub summary: bool,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    file: String,
    tests: usize,
    steps: usize,
    #[serde(flatten)]
    outline: &'a SheetOutline,
}

pub fn run(args: CheckArgs, global: &GlobalOpts) -> Result<()> {
    if !args.file.exists() {
        return Err(miette::miette!("File not found: {}", args.file.display()));
    }

    let sheet = PreparedSheet::open(&args.file).map_err(|e| prepare_diagnostic(&args, e))?;
    let outline = SheetOutline::of(&sheet);

    if global.format.is_json() {
        let output = CheckOutput {
            file: args.file.display().to_string(),
            tests: outline.tests.len(),
            steps: outline.step_count(),
            outline: &outline,
        };
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    } else {
        print_outline(&args, &outline, global.quiet);
    }

    if !outline.is_clean() {
        return Err(miette::miette!(
            "{} row(s) would not be migrated",
            outline.issues.len()
        ));
    }
    Ok(())
}

fn prepare_diagnostic(args: &CheckArgs, e: PrepareError) -> miette::Report {
    miette::miette!(
        help = format!("status if migrated: {}", e.status()),
        "{}: {}",
        args.file.display(),
        e
    )
}

fn print_outline(args: &CheckArgs, outline: &SheetOutline, quiet: bool) {
    if !args.summary && !quiet && !outline.tests.is_empty() {
        let mut tests = Builder::default();
        tests.push_record(["Row", "Unique id", "Name", "Steps", "Calls"]);
        for test in &outline.tests {
            tests.push_record([
                test.row.to_string(),
                test.unique_id.clone().unwrap_or_default(),
                truncate_str(test.name.as_deref().unwrap_or_default(), 48),
                test.steps.to_string(),
                test.calls.to_string(),
            ]);
        }
        println!("{}", tests.build().with(Style::rounded()));
    }

    if !outline.issues.is_empty() {
        println!();
        for issue in &outline.issues {
            println!(
                "{} Row {}: {}",
                style("✗").red(),
                style(issue.row).yellow(),
                issue.message
            );
        }
    }

    println!();
    println!(
        "{} {} test(s), {} step(s) in {}",
        if outline.is_clean() {
            style("✓").green()
        } else {
            style("!").yellow()
        },
        style(outline.tests.len()).cyan(),
        style(outline.step_count()).cyan(),
        style(args.file.display()).yellow(),
    );
}
