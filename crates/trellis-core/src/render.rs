use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::board::{Board, Card};
use crate::config::Config;
use crate::store::StoredTask;
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, board))]
    pub fn print_board(&mut self, board: &Board) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_board(out, board)
    }

    pub fn write_board<W: Write>(&self, mut out: W, board: &Board) -> anyhow::Result<()> {
        for (n, column) in board.columns().iter().enumerate() {
            if n > 0 {
                writeln!(out)?;
            }
            let heading = format!("{} ({})", column.status().label(), column.cards().len());
            writeln!(out, "{}", self.paint(&heading, "1"))?;

            if column.cards().is_empty() {
                writeln!(out, "  (empty)")?;
                continue;
            }

            let rows: Vec<Vec<String>> =
                column.cards().iter().map(|card| self.card_row(card)).collect();
            write_table(&mut out, &["ID", "Priority", "Title", "Description"], &rows)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, records))]
    pub fn print_pending(&mut self, records: &[StoredTask]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if records.is_empty() {
            writeln!(out, "No pending tasks.")?;
            return Ok(());
        }

        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|record| {
                vec![
                    self.paint(&record.task.id.to_string(), "33"),
                    record.task.status.label().to_string(),
                    self.paint_priority(record.task.priority),
                    record.task.title.clone(),
                    record
                        .queued_at
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default(),
                ]
            })
            .collect();

        write_table(
            &mut out,
            &["ID", "Status", "Priority", "Title", "Queued"],
            &rows,
        )
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "description {}", task.description)?;
        writeln!(out, "priority    {}", task.priority.label())?;
        writeln!(out, "status      {}", task.status.label())?;

        Ok(())
    }

    fn card_row(&self, card: &Card) -> Vec<String> {
        vec![
            self.paint(&card.id.to_string(), "33"),
            self.paint_priority(card.priority),
            card.title.clone(),
            card.summary().unwrap_or_default(),
        ]
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::Urgent => "31",
            Priority::High => "35",
            Priority::Medium => "36",
            Priority::Low => "2",
        };
        self.paint(priority.label(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

/// Left-aligned columns indented two spaces, sized to the widest
/// visible cell.
fn write_table<W: Write>(
    mut out: W,
    headers: &[&str],
    rows: &[Vec<String>],
) -> anyhow::Result<()> {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            rows.iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| visible_width(cell))
                .fold(visible_width(header), usize::max)
        })
        .collect();

    let write_row = |out: &mut W, cells: &mut dyn Iterator<Item = &str>| -> io::Result<()> {
        let line: Vec<String> = cells
            .zip(&widths)
            .map(|(cell, width)| {
                let pad = width.saturating_sub(visible_width(cell));
                format!("{cell}{}", " ".repeat(pad))
            })
            .collect();
        writeln!(out, "  {}", line.join(" ").trim_end())
    };

    write_row(&mut out, &mut headers.iter().copied())?;
    let rules: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(&mut out, &mut rules.iter().map(String::as_str))?;
    for row in rows {
        write_row(&mut out, &mut row.iter().map(String::as_str))?;
    }
    Ok(())
}

/// Drops SGR sequences (`ESC [ ... m`).
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            chars.by_ref().find(|c| *c == 'm');
        } else {
            out.push(ch);
        }
    }
    out
}
