use ledgerkeep_config::AppConfig;
use ledgerkeep_db::MigrationReport;
use ledgerkeep_security::InputValidator;

const WIDTH: usize = 70;
const LEFT_W: usize = 33;

/// Print the post-migration summary box.
pub fn print_banner(config: &AppConfig, report: &MigrationReport) {
    for line in render_banner(config, report) {
        println!("{line}");
    }
}

pub fn render_banner(config: &AppConfig, report: &MigrationReport) -> Vec<String> {
    let version = env!("CARGO_PKG_VERSION");
    let db = &config.database;

    let url = db
        .url()
        .map(|u| InputValidator::redact_url(&u))
        .unwrap_or_else(|_| "<invalid>".to_string());
    let location = if db.is_in_memory() {
        "in memory".to_string()
    } else {
        db.data_dir.to_string_lossy().to_string()
    };

    let applied = if report.applied.is_empty() {
        "none".to_string()
    } else {
        let mut names: Vec<String> = report
            .applied
            .iter()
            .map(|r| format!("{} v{}", r.entity, r.version))
            .collect();
        if names.len() > 3 {
            let rest = names.len() - 2;
            names.truncate(2);
            names.push(format!("+{rest} more"));
        }
        names.join(", ")
    };

    // 6 for "│ " + "│  " + "│"
    let right_w = WIDTH - LEFT_W - 6;

    let title = format!("ledgerkeep v{version}");
    // 2 for ╭╮, 5 for "─── " + " "
    let title_dashes = WIDTH - 2 - title.chars().count() - 5;
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(WIDTH - 2));

    let row = |l: &str, r: &str| {
        format!(
            "│ {}│  {}│",
            pad(l, LEFT_W),
            pad(r, right_w)
        )
    };

    vec![
        top,
        row("", ""),
        row("  Schema up to date", "Database"),
        row("", &url),
        row("     _______", &"─".repeat(right_w - 2)),
        row("    |=======|", &format!("Schema      {} ({})", db.schema, db.user)),
        row("    | v v v |", &format!("Applied     {applied}")),
        row("    |_______|", &format!("Skipped     {}", report.skipped)),
        row("", &format!("Location    {location}")),
        row("  Rust · Ledger stats", ""),
        row("", ""),
        bottom,
    ]
}

/// Left-align `s` in `width` columns, truncating with an ellipsis.
fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len > width {
        let mut cut: String = s.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    } else {
        format!("{s}{}", " ".repeat(width - len))
    }
}
