//! Terminal rendering of the pre-flight diagnostics.

use colored::Colorize;
use rr_core::doctor::{DoctorReport, Section, Severity};

const BANNER: &str = "=====================================================";

/// Print the report grouped by section. Returns whether the host is ready.
pub fn print_report(report: &DoctorReport) -> bool {
    println!("{BANNER}");
    println!("     {}", "GitHub Repository Runner - System Check".bold());
    println!("{BANNER}");

    for section in [Section::Tools, Section::Ports, Section::Repository] {
        println!("\n{}:", section.title().bold());
        for finding in report.findings.iter().filter(|f| f.section == section) {
            println!("  {} {}", marker(finding.severity), finding.message);
        }
    }

    let issues: Vec<_> = report.issues().collect();
    println!();
    if issues.is_empty() {
        println!("{}", "All checks passed. The runner is ready.".green().bold());
        true
    } else {
        println!(
            "{}",
            format!("{} issue(s) found:", issues.len()).red().bold()
        );
        for issue in issues {
            println!("  - {}", issue.message);
        }
        false
    }
}

fn marker(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Ok => "✓".green(),
        Severity::Warning => "!".yellow(),
        Severity::Issue => "✗".red(),
    }
}
