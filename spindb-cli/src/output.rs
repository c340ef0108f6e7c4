//! Human and `--json` rendering.

use std::io::IsTerminal;

use serde::Serialize;
use spindb_model::SpinError;

/// Print a value as one line of JSON on stdout.
pub fn emit_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("error: failed to serialize output: {err}"),
    }
}

/// Render an error: colorized prefix + remediation in human mode, a
/// single-line `{"error": ...}` object in JSON mode.
pub fn render_error(err: &anyhow::Error, json: bool) {
    let (code, message, hint) = match err.downcast_ref::<SpinError>() {
        Some(spin) => (
            spin.code(),
            spin.to_string(),
            spin.hint().map(str::to_string),
        ),
        None => ("UNKNOWN", format!("{err:#}"), None),
    };

    if json {
        emit_json(&serde_json::json!({
            "error": {
                "code": code,
                "message": message,
                "hint": hint,
            }
        }));
        return;
    }

    let (red, dim, reset) = if std::io::stderr().is_terminal() {
        ("\x1b[31m", "\x1b[2m", "\x1b[0m")
    } else {
        ("", "", "")
    };
    eprintln!("{red}error:{reset} {message}");
    if let Some(hint) = hint {
        eprintln!("{dim}hint: {hint}{reset}");
    }
}

/// Align rows into columns for list-style output.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> =
        headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }
    let mut out = String::new();
    let render_row = |cells: Vec<&str>, widths: &[usize]| {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                line.push_str("  ");
            }
            line.push_str(cell);
            if i + 1 < cells.len() {
                line.push_str(&" ".repeat(widths[i].saturating_sub(cell.len())));
            }
        }
        line
    };
    out.push_str(&render_row(headers.to_vec(), &widths));
    out.push('\n');
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&render_row(cells, &widths));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_columns() {
        let rendered = table(
            &["NAME", "PORT"],
            &[
                vec!["cache".to_string(), "6379".to_string()],
                vec!["myapp".to_string(), "5432".to_string()],
            ],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].contains("cache"));
        // Columns line up.
        let port_col = lines[0].find("PORT").unwrap();
        assert_eq!(lines[1].find("6379").unwrap(), port_col);
    }
}
