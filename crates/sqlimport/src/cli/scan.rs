//! `sqlimport scan-lengths` - find fields wider than their target columns.

use crate::cli::connection::ConnectionArgs;
use crate::cli::error::explain;
use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use sqlimport_core::{parse_delimiter, OversizedField, TableName};
use sqlimport_loader::scan_field_lengths;
use std::path::PathBuf;

/// Arguments for the `scan-lengths` command
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Delimited source file
    #[arg(value_name = "FILE")]
    pub source: PathBuf,

    /// Table whose column widths to check against
    #[arg(short, long)]
    pub table: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Field delimiter: one character, or tab/pipe/comma/semicolon
    #[arg(long, default_value = ",")]
    pub delimiter: String,

    /// The first line is a header
    #[arg(long)]
    pub header: bool,

    /// Print findings as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the scan-lengths command
pub fn run(args: ScanArgs) -> Result<()> {
    let delimiter = parse_delimiter(&args.delimiter)?;
    let table = TableName::parse(&args.table)
        .with_context(|| format!("Invalid table name: {}", args.table))?;

    super::block_on(async move {
        let mut db = args.connection.connect().await?;
        let problems = scan_field_lengths(&mut db, &table, args.source.clone(), delimiter, args.header)
            .await
            .map_err(|e| explain(e, &args.source, &table))?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&problems)?);
        } else if problems.is_empty() {
            println!("No oversized fields in {}", args.source.display());
        } else {
            println!("{}", render(&problems));
            println!("{} oversized fields", problems.len());
        }
        Ok(())
    })
}

fn render(problems: &[OversizedField]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Line", "Column", "Length", "Max", "Value"]);
    for p in problems {
        table.add_row(vec![
            p.row_number.to_string(),
            p.column.clone(),
            p.data_length.to_string(),
            p.max_allowed.to_string(),
            p.sample.clone(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_field() {
        let problems = vec![OversizedField {
            row_number: 4,
            column: "name".to_string(),
            data_length: 60,
            max_allowed: 50,
            sample: "x".repeat(47) + "...",
        }];
        let out = render(&problems).to_string();
        assert!(out.contains("name"));
        assert!(out.contains("60"));
    }
}
