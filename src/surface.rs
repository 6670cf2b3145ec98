//! User-facing output.
//!
//! The turn processor only talks to [`ChatSurface`]; the terminal
//! implementation prints markdown-ish text and aligned tables.

use std::io::Write;

use serde_json::Value;

use crate::conversation::Message;
use crate::engine::QueryTable;

pub trait ChatSurface {
    /// Render one chat message.
    fn message(&mut self, message: &Message);
    fn heading(&mut self, text: &str);
    fn table(&mut self, table: &QueryTable);
    fn code(&mut self, language: &str, code: &str);
    /// Inline error shown to the user. The conversation continues afterwards.
    fn error(&mut self, text: &str);
}

pub struct TerminalSurface<W: Write> {
    out: W,
}

impl TerminalSurface<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        // A closed stdout is not worth aborting the chat loop over.
        if let Err(err) = writeln!(self.out, "{}", text) {
            tracing::warn!("failed to write to terminal: {}", err);
        }
        if let Err(err) = self.out.flush() {
            tracing::warn!("failed to flush terminal: {}", err);
        }
    }
}

impl<W: Write> ChatSurface for TerminalSurface<W> {
    fn message(&mut self, message: &Message) {
        let text = format!("{} {}\n", message.role.avatar(), message.rendered());
        self.emit(&text);
    }

    fn heading(&mut self, text: &str) {
        let title = text.trim_start_matches('#').trim();
        self.emit(&format!("\n{}", title));
    }

    fn table(&mut self, table: &QueryTable) {
        self.emit(&format_table(table));
    }

    fn code(&mut self, language: &str, code: &str) {
        self.emit(&format!("```{}\n{}\n```", language, code.trim()));
    }

    fn error(&mut self, text: &str) {
        self.emit(&format!("✗ {}\n", text));
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.replace('\n', " "),
        other => other.to_string(),
    }
}

/// Left-aligned, pipe-separated text table with a header rule.
pub fn format_table(table: &QueryTable) -> String {
    let rendered: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &rendered {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(&table.columns));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &rendered {
        out.push('\n');
        out.push_str(&line(row));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_table() -> QueryTable {
        QueryTable {
            columns: vec!["SF_FUNC_NAME".into(), "SF_RETURN_VAL".into()],
            rows: vec![
                vec![json!("PARSE_JSON"), json!("VARIANT")],
                vec![json!("TRY_CAST"), Value::Null],
            ],
        }
    }

    #[test]
    fn table_columns_are_aligned() {
        let text = format_table(&sample_table());
        let expected = "\
SF_FUNC_NAME | SF_RETURN_VAL
-------------+--------------
PARSE_JSON   | VARIANT
TRY_CAST     | NULL
";
        assert_eq!(text, expected);
    }

    #[test]
    fn terminal_renders_messages_with_paragraph_breaks() {
        let mut surface = TerminalSurface::new(Vec::new());
        surface.message(&Message::new_assistant("a•b"));
        surface.error("boom");
        surface.heading("### Details");

        let output = String::from_utf8(surface.into_inner()).unwrap();
        assert!(output.contains("👸 a\n\nb"));
        assert!(output.contains("✗ boom"));
        assert!(output.contains("\nDetails\n"));
    }

    struct UnflushableWriter(Vec<u8>);

    impl Write for UnflushableWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn flush_failure_does_not_stop_output() {
        let mut surface = TerminalSurface::new(UnflushableWriter(Vec::new()));
        surface.error("first");
        surface.heading("## Second");

        let output = String::from_utf8(surface.into_inner().0).unwrap();
        assert!(output.contains("✗ first"));
        assert!(output.contains("Second"));
    }
}
