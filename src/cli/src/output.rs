//! Terminal output for the Tierflow CLI.
//!
//! Lists render as tables, JSON or YAML. Single records print as an aligned
//! [`Details`] block in table mode.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

/// Severity of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Ok,
    Info,
    Warn,
    Error,
}

impl Notice {
    fn tag(self) -> ColoredString {
        match self {
            Self::Ok => "[OK]".green().bold(),
            Self::Info => "[INFO]".blue().bold(),
            Self::Warn => "[WARN]".yellow().bold(),
            Self::Error => "[ERROR]".red().bold(),
        }
    }
}

/// Print a status line. Warnings and errors go to stderr so piped JSON stays clean.
pub fn notice(kind: Notice, msg: &str) {
    match kind {
        Notice::Ok | Notice::Info => println!("{} {}", kind.tag(), msg),
        Notice::Warn | Notice::Error => eprintln!("{} {}", kind.tag(), msg),
    }
}

/// Print a section title ahead of a table or details block.
pub fn section(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

fn serialized<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table | OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(value)?;
            json.push('\n');
            json
        }
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Print rows in the requested format.
pub fn print_list<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    if let OutputFormat::Table = format {
        if items.is_empty() {
            println!("{}", "No results found.".dimmed());
        } else {
            let table = Table::new(items)
                .with(Style::rounded())
                .with(Modify::new(Columns::first()).with(Alignment::left()))
                .to_string();
            println!("{}", table);
        }
        return Ok(());
    }
    print!("{}", serialized(items, format)?);
    Ok(())
}

/// Print one record as JSON or YAML. Table mode falls back to JSON.
pub fn print_item<T: Serialize>(item: &T, format: OutputFormat) -> Result<()> {
    print!("{}", serialized(item, format)?);
    Ok(())
}

/// Render an optional value, or a dash.
pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Key/value block with the keys padded to a common width.
#[derive(Debug, Default)]
pub struct Details {
    rows: Vec<(String, String)>,
}

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, key: &str, value: impl ToString) -> Self {
        self.rows.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a row showing `-` when the value is absent.
    pub fn maybe<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        self.row(key, or_dash(value))
    }

    /// Add a row only when the value is present.
    pub fn some<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.row(key, value),
            None => self,
        }
    }

    fn key_width(&self) -> usize {
        self.rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0)
    }

    pub fn print(&self) {
        let width = self.key_width();
        for (key, value) in &self.rows {
            println!("  {}  {}", format!("{:<width$}", key).cyan(), value);
        }
    }
}
