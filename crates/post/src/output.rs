//! Terminal reporting for `post` commands.
//!
//! Progress and diagnostics go to stderr so stdout carries only command data
//! (`post manifest | jq .pageModules`).

use std::fmt::Display;
use std::io;

use console::{Style, Term};
use post_site::BuildSummary;

/// Reporter shared by the commands.
pub(crate) struct Output {
    stderr: Term,
    stdout: Term,
    label: Style,
    done: Style,
    warn: Style,
    fail: Style,
}

impl Output {
    pub(crate) fn new() -> Self {
        Self {
            stderr: Term::stderr(),
            stdout: Term::stdout(),
            label: Style::new().cyan().bold(),
            done: Style::new().green(),
            warn: Style::new().yellow(),
            fail: Style::new().red(),
        }
    }

    /// Right-aligned label followed by a value, e.g. `  Source ./src`.
    pub(crate) fn field(&self, label: &str, value: &dyn Display) {
        let label = self.label.apply_to(format!("{label:>8}"));
        let _ = self.stderr.write_line(&format!("{label} {value}"));
    }

    pub(crate) fn page_failed(&self, route: &str) {
        let line = format!("page {route} failed to render, skipped");
        let _ = self.stderr.write_line(&self.warn.apply_to(line).to_string());
    }

    pub(crate) fn built(&self, summary: &BuildSummary) {
        let line = summary_line(summary);
        let _ = self.stderr.write_line(&self.done.apply_to(line).to_string());
    }

    pub(crate) fn failed(&self, err: &dyn Display) {
        let line = format!("error: {err}");
        let _ = self.stderr.write_line(&self.fail.apply_to(line).to_string());
    }

    /// Machine-readable command result on stdout.
    pub(crate) fn data(&self, text: &str) -> io::Result<()> {
        self.stdout.write_line(text)
    }
}

fn summary_line(summary: &BuildSummary) -> String {
    let mut line = format!(
        "built {} {} and {} {} into {}",
        summary.modules,
        plural(summary.modules, "module"),
        summary.pages,
        plural(summary.pages, "page"),
        summary.output_dir.display()
    );
    if !summary.failed_pages.is_empty() {
        line.push_str(&format!(" ({} skipped)", summary.failed_pages.len()));
    }
    line
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        noun.to_owned()
    } else {
        format!("{noun}s")
    }
}
