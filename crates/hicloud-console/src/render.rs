//! Plain-text rendering of handler results.

use crate::handler::{Details, Outcome, Render, Table};
use colored::Colorize;
use std::io::{self, Write};

pub const CANCELLED: &str = "Operation cancelled";

pub fn render(out: &mut dyn Write, render: &Render) -> io::Result<()> {
    match render {
        Render::Empty => Ok(()),
        Render::Message(text) => writeln!(out, "{text}"),
        Render::Table(table) => render_table(out, table),
        Render::Details(details) => render_details(out, details),
        Render::Sequence(parts) => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 && !matches!(part, Render::Empty) {
                    writeln!(out)?;
                }
                self::render(out, part)?;
            }
            Ok(())
        }
    }
}

pub fn render_outcome(out: &mut dyn Write, outcome: &Outcome) -> io::Result<()> {
    match outcome {
        Outcome::Success(r) => render(out, r),
        Outcome::Failure { kind, message } => {
            writeln!(out, "{} {message}", format!("{}:", kind.label()).red().bold())
        }
        Outcome::Cancelled => writeln!(out, "{CANCELLED}"),
    }
}

fn render_table(out: &mut dyn Write, table: &Table) -> io::Result<()> {
    if let Some(title) = &table.title {
        writeln!(out, "{}", title.bold())?;
    }
    if table.rows.is_empty() {
        return writeln!(out, "  (none)");
    }

    let columns = table
        .rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.headers.len()))
        .max()
        .unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in std::iter::once(&table.headers).chain(&table.rows) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    write_row(out, &table.headers, &widths)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(out, &rule, &widths)?;
    for row in &table.rows {
        write_row(out, row, &widths)?;
    }
    Ok(())
}

fn write_row(out: &mut dyn Write, cells: &[String], widths: &[usize]) -> io::Result<()> {
    let mut line = String::new();
    for (i, width) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        if i + 1 == widths.len() {
            line.push_str(cell);
        } else {
            line.push_str(cell);
            line.extend(std::iter::repeat(' ').take(width - cell.chars().count() + 2));
        }
    }
    writeln!(out, "{}", line.trim_end())
}

fn render_details(out: &mut dyn Write, details: &Details) -> io::Result<()> {
    writeln!(out, "{}", details.title.bold())?;
    writeln!(out, "{}", "=".repeat(details.title.chars().count()))?;
    let key_width = details
        .fields
        .iter()
        .map(|(k, _)| k.chars().count())
        .max()
        .unwrap_or(0);
    for (key, value) in &details.fields {
        let pad = key_width - key.chars().count();
        writeln!(out, "  {key}:{} {value}", " ".repeat(pad))?;
    }
    Ok(())
}
