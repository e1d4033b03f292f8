//! Output formatting utilities for the CLI
//!
//! Tables for session and swarm reports, plus colored status messages.

use std::time::Duration;

use tabled::{settings::Style, Table, Tabled};

use cr_client::SwarmReport;
use cr_core::SessionReport;

/// Format a session report as a two-column table
pub fn format_report(report: &SessionReport) -> String {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "FIELD")]
        field: &'static str,
        #[tabled(rename = "VALUE")]
        value: String,
    }

    let rows = vec![
        Row {
            field: "Client",
            value: report.client_id.to_string(),
        },
        Row {
            field: "Logged in",
            value: yes_no(report.logged_in),
        },
        Row {
            field: "Sent",
            value: report.sent.to_string(),
        },
        Row {
            field: "Replies",
            value: report.replies.to_string(),
        },
        Row {
            field: "Timeouts",
            value: report.timeouts.to_string(),
        },
        Row {
            field: "Unsolicited",
            value: report.unsolicited.to_string(),
        },
        Row {
            field: "Logout confirmed",
            value: yes_no(report.logout_confirmed),
        },
        Row {
            field: "Final state",
            value: report.final_state.to_string(),
        },
        Row {
            field: "Elapsed",
            value: format_duration(report.elapsed),
        },
    ];

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format per-client swarm counters as a table
pub fn format_swarm(report: &SwarmReport) -> String {
    if report.clients.is_empty() {
        return "No clients connected".to_string();
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "CLIENT")]
        client: String,
        #[tabled(rename = "SENT")]
        sent: u32,
        #[tabled(rename = "RECEIVED")]
        received: u32,
        #[tabled(rename = "STATE")]
        state: String,
    }

    let rows: Vec<Row> = report
        .clients
        .iter()
        .map(|c| Row {
            client: c.client_id.to_string(),
            sent: c.sent,
            received: c.received,
            state: c.final_state.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

/// Format a duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
