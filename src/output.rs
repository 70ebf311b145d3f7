use std::io::Write;
use std::str::FromStr;

use clap::{Arg, ArgMatches, Command};
use unicode_width::UnicodeWidthStr;

use crate::error::CommandError;
use crate::flag::format_selector;
use crate::types::{Restore, RestorePhase};

const OUTPUT_ARG: &str = "output";
const COLUMN_PADDING: usize = 3;
const NONE: &str = "<none>";
const HEADERS: [&str; 7] = [
    "NAME", "BACKUP", "STATUS", "WARNINGS", "ERRORS", "CREATED", "SELECTOR",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => Err(CommandError::UnsupportedOutputFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// The `-o/--output` flag. It has no default: when it is absent the object
/// is submitted instead of printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputOptions {
    pub output: Option<String>,
}

impl OutputOptions {
    pub fn bind_flags(cmd: Command) -> Command {
        cmd.arg(
            Arg::new(OUTPUT_ARG)
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help(
                    "Output display format. For create commands, display the object \
                     but do not send it to the server. Valid formats are 'table', 'json', \
                     and 'yaml'.",
                ),
        )
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            output: matches.get_one::<String>(OUTPUT_ARG).cloned(),
        }
    }

    pub fn format(&self) -> Result<Option<OutputFormat>, CommandError> {
        self.output.as_deref().map(str::parse).transpose()
    }

    pub fn validate(&self) -> Result<(), CommandError> {
        self.format().map(|_| ())
    }

    /// Prints `restore` in the selected format. Returns `false` without
    /// writing anything when no format was requested.
    pub fn print_with_format<W: Write>(
        &self,
        out: &mut W,
        restore: &Restore,
    ) -> Result<bool, CommandError> {
        let Some(format) = self.format()? else {
            return Ok(false);
        };

        match format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, restore)?;
                writeln!(out)?;
            }
            OutputFormat::Yaml => {
                let yaml = serde_yaml::to_string(restore)?;
                out.write_all(yaml.as_bytes())?;
            }
            OutputFormat::Table => print_table(out, restore)?,
        }
        Ok(true)
    }
}

fn restore_row(restore: &Restore) -> Vec<String> {
    let status = restore.status.phase.unwrap_or(RestorePhase::New);
    let created = restore
        .metadata
        .creation_timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S %z").to_string())
        .unwrap_or_else(|| NONE.to_string());
    let selector = restore
        .spec
        .label_selector
        .as_ref()
        .map(format_selector)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NONE.to_string());

    vec![
        restore.metadata.name.clone(),
        restore.spec.backup_name.clone(),
        status.to_string(),
        restore.status.warnings.count().to_string(),
        restore.status.errors.count().to_string(),
        created,
        selector,
    ]
}

fn print_table<W: Write>(out: &mut W, restore: &Restore) -> std::io::Result<()> {
    let header: Vec<String> = HEADERS.iter().map(|s| s.to_string()).collect();
    let rows = [header, restore_row(restore)];

    let widths: Vec<usize> = (0..rows[0].len())
        .map(|col| rows.iter().map(|row| row[col].width()).max().unwrap_or(0))
        .collect();

    for row in &rows {
        let mut line = String::new();
        for (col, cell) in row.iter().enumerate() {
            line.push_str(cell);
            if col + 1 < row.len() {
                let pad = widths[col] - cell.width() + COLUMN_PADDING;
                line.push_str(&" ".repeat(pad));
            }
        }
        writeln!(out, "{line}")?;
    }
    Ok(())
}
