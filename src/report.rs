//! # Debug report
//!
//! Accumulates named sections describing a translation run and renders them
//! as a boxed ASCII report, in the same spirit as the teacher crate's
//! pipeline trace: flushed once at the end (§5: "the debug reporter
//! accumulates sections and is flushed only at the end"), not streamed.

use crate::ram::RamProgram;
use std::fmt::Write as _;
use std::time::Duration;

/// One named section of the report (e.g. "ram-program", "transform-pipeline").
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub lines: Vec<String>,
}

/// Accumulates sections during translation and renders them together.
#[derive(Debug, Clone, Default)]
pub struct DebugReport {
    sections: Vec<Section>,
}

impl DebugReport {
    pub fn new() -> Self {
        DebugReport::default()
    }

    pub fn add_section(&mut self, title: impl Into<String>, lines: Vec<String>) {
        self.sections.push(Section {
            title: title.into(),
            lines,
        });
    }

    /// Appends the "ram-program" section: the textual RAM dump plus the
    /// translation wall-clock (§6).
    pub fn add_ram_program(&mut self, program: &RamProgram, elapsed: Duration) {
        let mut lines: Vec<String> = program.pretty().lines().map(str::to_string).collect();
        lines.push(String::new());
        lines.push(format!("translation wall-clock: {:.3}ms", elapsed.as_secs_f64() * 1000.0));
        self.add_section("ram-program", lines);
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn format_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(63));
        let _ = writeln!(out, "{:^63}", "RAM TRANSLATION REPORT");
        let _ = writeln!(out, "{}", "=".repeat(63));
        out.push('\n');
        for section in &self.sections {
            let _ = writeln!(out, "+{}+", "-".repeat(61));
            let _ = writeln!(out, "| {:<59} |", section.title.to_uppercase());
            let _ = writeln!(out, "+{}+", "-".repeat(61));
            for line in &section.lines {
                let _ = writeln!(out, "  {line}");
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{RamProgram, Statement};
    use std::time::Duration;

    #[test]
    fn empty_report_has_no_sections() {
        let report = DebugReport::new();
        assert!(report.sections().is_empty());
    }

    #[test]
    fn ram_program_section_includes_wall_clock() {
        let mut report = DebugReport::new();
        let program = RamProgram {
            main: Statement::Sequence(vec![]),
            relations: vec![],
            subroutines: vec![],
        };
        report.add_ram_program(&program, Duration::from_millis(5));
        let rendered = report.format_report();
        assert!(rendered.contains("wall-clock"));
        assert!(rendered.contains("RAM-PROGRAM"));
    }
}
