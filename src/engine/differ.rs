//! Status display - per-node diffs and the run summary

use super::executor::{ExecuteSummary, NodeOutcome, NodeReport, ProgressCallback};
use colored::{ColoredString, Colorize};
use declarative::{Diff, Level, Status};
use indicatif::{ProgressBar, ProgressStyle};

/// Prints each node as it completes, under a progress bar
#[derive(Debug, Default)]
pub struct Printer {
    /// Also print nodes without changes, with their messages
    pub verbose: bool,
    /// Only print failures
    pub quiet: bool,
    bar: Option<ProgressBar>,
}

impl Printer {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            bar: None,
        }
    }

    fn bar(&mut self, total: usize) -> &ProgressBar {
        let quiet = self.quiet;
        self.bar.get_or_insert_with(|| {
            if quiet {
                return ProgressBar::hidden();
            }
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        })
    }
}

impl ProgressCallback for Printer {
    fn on_node_start(&mut self, id: &str, index: usize, total: usize) {
        log::debug!("[{}/{}] {id}", index + 1, total);
        self.bar(total).set_message(id.to_string());
    }

    fn on_node_complete(&mut self, report: &NodeReport) {
        let failed = matches!(report.outcome, NodeOutcome::Failed { .. });
        let show = if self.quiet {
            failed
        } else {
            self.verbose || !matches!(report.outcome, NodeOutcome::NoChange)
        };
        let verbose = self.verbose;
        if let Some(pb) = &self.bar {
            if show {
                pb.suspend(|| display_report(report, verbose));
            }
            pb.inc(1);
            if pb.length().is_some_and(|len| pb.position() >= len) {
                pb.finish_and_clear();
            }
        } else if show {
            display_report(report, verbose);
        }
    }
}

fn symbol(outcome: &NodeOutcome) -> ColoredString {
    match outcome {
        NodeOutcome::NoChange => "○".dimmed(),
        NodeOutcome::WouldChange => "~".yellow(),
        NodeOutcome::Changed => "✓".green(),
        NodeOutcome::Failed { .. } => "✗".red(),
        NodeOutcome::Skipped { .. } => "⊘".dimmed(),
    }
}

fn level_label(level: Level) -> ColoredString {
    let text = level.to_string();
    match level {
        Level::NoChange => text.dimmed(),
        Level::MayChange => text.cyan(),
        Level::WillChange => text.yellow(),
        Level::CantChange | Level::Fatal => text.red(),
    }
}

/// Display one node with its diffs
pub fn display_report(report: &NodeReport, verbose: bool) {
    println!(
        "  {} {:<40} {}",
        symbol(&report.outcome),
        report.id,
        level_label(report.status.status_code())
    );

    match &report.outcome {
        NodeOutcome::Failed { error } => println!("      {}", error.red()),
        NodeOutcome::Skipped { reason } => println!("      {}", reason.dimmed()),
        _ => {}
    }
    display_status(&report.status, verbose);
}

fn display_status(status: &Status, verbose: bool) {
    for (field, diff) in status.diffs() {
        display_diff(field, diff);
    }
    if verbose {
        for message in status.messages() {
            println!("      {}", message.dimmed());
        }
        if let Some(output) = status.output().filter(|o| !o.trim().is_empty()) {
            for line in output.lines() {
                println!("      │ {line}");
            }
        }
    }
}

fn display_diff(field: &str, diff: &Diff) {
    let original = if diff.original.is_empty() {
        diff.default.as_deref().unwrap_or("<unset>")
    } else {
        diff.original.as_str()
    };

    if !original.contains('\n') && !diff.current.contains('\n') {
        println!(
            "      {} {}: {} → {}",
            "~".yellow(),
            field,
            original.red(),
            diff.current.green()
        );
        return;
    }

    // Multi-line values (file content) read better as a line diff
    println!("      {} {}:", "~".yellow(), field);
    let text = similar::TextDiff::from_lines(original, diff.current.as_str());
    for change in text.iter_all_changes() {
        let line = change.to_string_lossy();
        let line = line.trim_end_matches('\n');
        match change.tag() {
            similar::ChangeTag::Delete => println!("        {}", format!("- {line}").red()),
            similar::ChangeTag::Insert => println!("        {}", format!("+ {line}").green()),
            similar::ChangeTag::Equal => {}
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary, applied: bool) {
    println!();
    if !summary.is_success() {
        println!("  {} Run finished with errors", "⚠".yellow().bold());
    } else if applied {
        println!("  {} Plan applied successfully", "✓".green().bold());
    } else if summary.would_change > 0 {
        println!("  {} Plan has changes", "ℹ".blue().bold());
    } else {
        println!("  {} No changes needed", "✓".green().bold());
    }

    if summary.changed > 0 {
        println!("    • {} resources changed", summary.changed);
    }
    if summary.would_change > 0 {
        println!("    • {} resources would change", summary.would_change);
    }
    if summary.no_change > 0 {
        println!("    • {} resources unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
