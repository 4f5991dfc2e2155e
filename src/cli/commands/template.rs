//! `stm template` command - print an import sheet skeleton

use miette::{IntoDiagnostic, Result};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::sheet::{Column, STEP_TYPE, TEST_ROOT_TYPE};

#[derive(clap::Args, Debug)]
pub struct TemplateArgs {
    /// Header only, without the example test
    #[arg(long)]
    pub header_only: bool,

    /// Write to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Example rows: two tests, the second calling the first
fn example_rows() -> Vec<Vec<(Column, &'static str)>> {
    vec![
        vec![
            (Column::UniqueId, "T-1"),
            (Column::Type, TEST_ROOT_TYPE),
            (Column::Name, "Sign in with valid credentials"),
            (Column::Description, "A registered user can sign in"),
            (Column::Owner, "owner@example.com"),
            (Column::Designer, "designer@example.com"),
            (Column::Phase, "New"),
            (Column::UserTags, "smoke,login"),
            (Column::TestType, "End to End"),
            (Column::ProductAreas, "Login"),
            (Column::EstimatedDuration, "5"),
        ],
        vec![
            (Column::Type, STEP_TYPE),
            (Column::StepType, "simple"),
            (Column::StepDescription, "Open the sign-in page and submit valid credentials"),
        ],
        vec![
            (Column::Type, STEP_TYPE),
            (Column::StepType, "validation"),
            (Column::StepDescription, "Is the dashboard shown?"),
        ],
        vec![
            (Column::UniqueId, "T-2"),
            (Column::Type, TEST_ROOT_TYPE),
            (Column::Name, "Sign out"),
            (Column::Owner, "owner@example.com"),
        ],
        vec![
            (Column::Type, STEP_TYPE),
            (Column::StepType, "call"),
            (Column::StepDescription, "T-1"),
        ],
        vec![
            (Column::Type, STEP_TYPE),
            (Column::StepType, "simple"),
            (Column::StepDescription, "Click sign out"),
        ],
    ]
}

pub fn run(args: TemplateArgs) -> Result<()> {
    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::fs::File::create(path).into_diagnostic()?),
        None => Box::new(io::stdout()),
    };
    write_template(sink, !args.header_only)
}

fn write_template(sink: impl Write, with_example: bool) -> Result<()> {
    let columns = Column::all();
    let mut writer = csv::Writer::from_writer(sink);
    writer
        .write_record(columns.iter().map(|c| c.header()))
        .into_diagnostic()?;

    if with_example {
        for cells in example_rows() {
            let record = columns.iter().map(|column| {
                cells
                    .iter()
                    .find(|(c, _)| c == column)
                    .map(|(_, value)| *value)
                    .unwrap_or_default()
            });
            writer.write_record(record).into_diagnostic()?;
        }
    }

    writer.flush().into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{PreparedSheet, SheetOutline};
    use crate::sheet::Sheet;

    #[test]
    fn test_template_is_a_clean_sheet() {
        let mut buffer = Vec::new();
        write_template(&mut buffer, true).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(buffer.as_slice());
        let lines: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();

        let sheet = PreparedSheet::prepare(Sheet::from_texts(&lines)).unwrap();
        let outline = SheetOutline::of(&sheet);
        assert!(outline.is_clean());
        assert_eq!(outline.tests.len(), 2);
        assert_eq!(outline.step_count(), 4);
        assert_eq!(outline.tests[1].calls, 1);
    }
}
