use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use rad_reconcile::{ApplyReport, BulkReport, ReconcilePlan, TrainingOutcome};
use rad_sources::{Column, Row};
use std::io::{self, Write};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const HEADER: Color = Color::Magenta;
    const OPERATION: Color = Color::Cyan;
    const OK: Color = Color::Green;
    const WARNING: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
}

/// Writes command results to stdout.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    fn line(&self, color: Color, text: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, SetForegroundColor(color), Print(text), ResetColor, Print("\n"))?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_info(&self, message: &str) -> Result<()> {
        self.line(Colors::DIM, message)
    }

    pub fn print_success(&self, message: &str) -> Result<()> {
        self.line(Colors::OK, message)
    }

    pub fn print_warning(&self, message: &str) -> Result<()> {
        self.line(Colors::WARNING, &format!("warning: {}", message))
    }

    pub fn print_error(&self, message: &str) -> Result<()> {
        self.line(Colors::ERROR, message)
    }

    /// Serialize any result as pretty JSON.
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    pub fn print_plan(&self, plan: &ReconcilePlan) -> Result<()> {
        self.line(Colors::HEADER, &format!("Plan for '{}'", plan.group_name))?;
        if plan.is_empty() {
            return self.print_info("  nothing to do");
        }
        for (i, op) in plan.operations.iter().enumerate() {
            self.line(Colors::OPERATION, &format!("  {:>2}. {}", i + 1, op))?;
        }
        Ok(())
    }

    pub fn print_report(&self, report: &ApplyReport) -> Result<()> {
        for op in &report.succeeded {
            self.line(Colors::OK, &format!("  done     {}", op))?;
        }
        if let Some(message) = report.failure_message() {
            self.print_error(&format!("  failed   {}", message))?;
        }
        for op in &report.not_attempted {
            self.line(Colors::DIM, &format!("  skipped  {}", op))?;
        }
        if report.aborted {
            self.print_warning("aborted before all operations ran")?;
        }
        match &report.training {
            TrainingOutcome::SentWithGroup => {
                self.print_info("Training requested with the new group.")?
            }
            TrainingOutcome::Retrained => self.print_info("Retraining requested.")?,
            _ => {}
        }
        for warning in report.warnings() {
            self.print_warning(&warning)?;
        }
        Ok(())
    }

    pub fn print_bulk(&self, report: &BulkReport) -> Result<()> {
        for name in &report.succeeded {
            self.line(Colors::OK, &format!("  {}d '{}'", report.action, name))?;
        }
        if let Some(message) = report.failure_message() {
            self.print_error(&message)?;
        }
        Ok(())
    }

    /// Fixed-width table, columns sized to their widest cell.
    pub fn print_table(&self, columns: &[Column], rows: &[Row]) -> Result<()> {
        let text: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.cells.iter().map(ToString::to_string).collect())
            .collect();
        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                text.iter()
                    .filter_map(|r| r.get(i))
                    .map(String::len)
                    .chain(std::iter::once(c.name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let format_row = |cells: Vec<&str>| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        self.line(Colors::HEADER, &format_row(columns.iter().map(|c| c.name).collect()))?;
        let mut stdout = io::stdout();
        for row in &text {
            writeln!(stdout, "{}", format_row(row.iter().map(String::as_str).collect()))?;
        }
        stdout.flush()?;
        if rows.is_empty() {
            self.print_info("(no rows)")?;
        }
        Ok(())
    }
}
