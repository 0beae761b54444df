use colored::Colorize;
use converge::{Outcome, Summary};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print one finished step with its outcome
pub fn step(num: usize, total: usize, action: &str, outcome: Outcome) {
    let mark = match outcome {
        Outcome::Changed => "changed".yellow(),
        Outcome::Unchanged => "ok".green(),
        Outcome::Skipped => "skipped".dimmed(),
    };
    println!("{} {} {}", format!("[{num}/{total}]").blue().bold(), action, mark);
}

/// Print the run totals and the triggers that fired
pub fn summary(summary: &Summary, fired: &[String]) {
    header("Summary");
    kv("steps", &summary.total().to_string());
    kv("changed", &summary.changed.to_string().yellow().to_string());
    kv("unchanged", &summary.unchanged.to_string());
    kv("skipped", &summary.skipped.to_string());
    if fired.is_empty() {
        kv("fired", &"none".dimmed().to_string());
    } else {
        kv("fired", &fired.join(", "));
    }
}
