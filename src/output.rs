//! Human-facing progress and summary rendering.

use colored::Colorize;

use crate::driver::Summary;
use crate::result::{Outcome, TestOutcome};

pub struct ProgressPrinter {
    verbose: bool,
}

impl ProgressPrinter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn print_result(&self, outcome: &TestOutcome) {
        let symbol = match outcome.outcome {
            Outcome::Passed => "✓".green(),
            Outcome::Failed => "✗".red(),
            Outcome::Skipped => "s".yellow(),
            Outcome::Error => "E".red().bold(),
        };

        println!("  {} {} ({:.0}ms)", symbol, outcome.nodeid, outcome.duration_ms);

        if matches!(outcome.outcome, Outcome::Failed | Outcome::Error) {
            if let Some(ref error) = outcome.error {
                println!("    {}", error.message.red());
                if self.verbose {
                    if let Some(ref tb) = error.traceback {
                        for line in tb.lines().take(20) {
                            println!("    {}", line.dimmed());
                        }
                    }
                }
            }
        } else if outcome.outcome == Outcome::Skipped {
            if let Some(ref error) = outcome.error {
                if let Some(ref reason) = error.reason {
                    println!("    {}", reason.dimmed());
                }
            }
        }
    }
}

pub fn print_summary(summary: &Summary) {
    let duration = summary.duration.as_secs_f64();
    let line = if summary.failed == 0 && summary.error == 0 {
        format!(
            "{} passed, {} skipped in {:.2}s",
            summary.passed, summary.skipped, duration
        )
        .green()
    } else {
        format!(
            "{} passed, {} failed, {} error, {} skipped in {:.2}s",
            summary.passed, summary.failed, summary.error, summary.skipped, duration
        )
        .red()
    };
    println!("{}", line);
}

pub fn print_no_tests_found() {
    println!("{}", "No tests found.".yellow());
}

pub fn print_collected(nodeids: &[String]) {
    for id in nodeids {
        println!("{id}");
    }
    let noun = if nodeids.len() == 1 { "item" } else { "items" };
    println!("\ncollected {} {}", nodeids.len(), noun);
}
