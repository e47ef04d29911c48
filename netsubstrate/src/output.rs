use std::fmt::Display;

use serde::Serialize;

use crate::cli::OutputFormat;

const COLUMN_GAP: usize = 3;

#[derive(Serialize)]
pub struct TableCellOption<T>(Option<T>);

impl<T> From<Option<T>> for TableCellOption<T> {
    fn from(value: Option<T>) -> Self {
        TableCellOption(value)
    }
}

impl<T: Display> Display for TableCellOption<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str("-"),
        }
    }
}

/// Implemented through `#[derive(TableRow)]`.
pub trait TableRow {
    fn name(&self) -> String;
    fn column_titles() -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
}

/// Pads every column to its widest cell.
pub fn render_table<T: TableRow>(rows: &[T], with_headers: bool) -> String {
    let mut lines: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);

    if with_headers {
        lines.push(T::column_titles().into_iter().map(str::to_owned).collect());
    }

    lines.extend(rows.iter().map(TableRow::cells));

    let column_count = T::column_titles().len();
    let widths = (0..column_count)
        .map(|column| {
            lines
                .iter()
                .map(|line: &Vec<String>| line.get(column).map_or(0, |cell| cell.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();

    let mut output = String::new();

    for line in lines {
        let rendered = line
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}", width = width + COLUMN_GAP))
            .collect::<String>();

        output.push_str(rendered.trim_end());
        output.push('\n');
    }

    output
}

pub trait CliPrint {
    fn print(&self, format: OutputFormat) -> anyhow::Result<()>;
}

impl<T: Serialize + TableRow> CliPrint for [T] {
    fn print(&self, format: OutputFormat) -> anyhow::Result<()> {
        match format {
            OutputFormat::Names => {
                for row in self {
                    println!("{}", row.name());
                }
            }
            OutputFormat::Table => print!("{}", render_table(self, false)),
            OutputFormat::TableWithHeaders => print!("{}", render_table(self, true)),
            OutputFormat::Json => println!("{}", serde_json::to_string(self)?),
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(self)?),
        }

        Ok(())
    }
}
