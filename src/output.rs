use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BuildResult, QueryResult};
use crate::domain::TableLayout;
use crate::lookup::result_fields;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "sizemeup-build {}", result.version)?;
        writeln!(out, "  table:        {}", result.sizes_path)?;
        writeln!(out, "  total:        {}", result.total)?;
        writeln!(out, "  ncbi:         {}", result.ncbi)?;
        writeln!(
            out,
            "  user:         {} ({} shadowed by ncbi)",
            result.user_added, result.user_shadowed
        )?;
        if result.layout == TableLayout::Extended {
            writeln!(out, "  atb:          {}", result.atb_added)?;
        }
        if !result.unresolved_tax_ids.is_empty() {
            writeln!(
                out,
                "  unresolved:   {} TaxIDs without a species name",
                result.unresolved_tax_ids.len()
            )?;
        }
        Ok(())
    }

    /// Query result as an aligned two-row table.
    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        let columns = result.layout.columns();
        let values = result_fields(result.record.as_ref(), result.layout);
        let headers: Vec<String> = columns.iter().map(|c| title_case(c)).collect();
        let widths: Vec<usize> = headers
            .iter()
            .zip(&values)
            .map(|(h, v)| h.chars().count().max(v.chars().count()))
            .collect();

        let mut out = io::stdout().lock();
        match &result.version {
            Some(version) => writeln!(out, "Query Result (sizes {version})")?,
            None => writeln!(out, "Query Result")?,
        }
        writeln!(out, "{}", pad_row(&headers, &widths))?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(out, "{}", pad_row(&rule, &widths))?;
        writeln!(out, "{}", pad_row(&values, &widths))?;
        writeln!(out, "Writing the genome size to {}", result.output_path)?;
        Ok(())
    }
}

fn title_case(column: &str) -> String {
    match column {
        "tax_id" => "TaxID".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

fn pad_row(values: &[String], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_title_cased() {
        assert_eq!(title_case("name"), "Name");
        assert_eq!(title_case("tax_id"), "TaxID");
    }

    #[test]
    fn rows_are_padded_to_width() {
        let row = pad_row(&["a".to_string(), "bb".to_string()], &[3, 2]);
        assert_eq!(row, "a    bb");
    }
}
