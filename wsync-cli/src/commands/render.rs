//! Terminal rendering shared by `sync`, `status` and friends.

use chrono::{DateTime, Utc};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use wsync_core::Fingerprint;
use wsync_sync::{
    ActionKind, NoopReason, Outcome, SkipReason, Summary, SyncPlan, SyncReport, SyncResult,
};

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "base")]
    base: String,
}

pub fn short(digest: Option<&Fingerprint>) -> String {
    digest.map_or_else(|| "-".to_string(), |d| d.short().to_string())
}

/// Table of every action that is not a plain no-op.
pub fn print_plan(plan: &SyncPlan) {
    let rows: Vec<PlanRow> = plan
        .actions
        .iter()
        .filter(|a| a.action != ActionKind::Noop(NoopReason::Unchanged))
        .map(|a| PlanRow {
            path: a.path.to_string(),
            action: a.action.label().to_string(),
            local: short(a.local.as_ref()),
            remote: short(a.remote.as_ref()),
            base: short(a.base.as_ref()),
        })
        .collect();
    if rows.is_empty() {
        println!("{} everything is in sync", "✓".green());
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

/// One line per finished item. Unchanged items are silent.
pub fn print_result(result: &SyncResult) {
    let label = result.action.map_or("rejected", ActionKind::label);
    match &result.outcome {
        Outcome::Applied => println!("  {} {label:<13} {}", "✓".green(), result.path),
        Outcome::Unchanged => {}
        Outcome::Conflicted { .. } => {
            println!("  {} {:<13} {}", "!".yellow().bold(), "conflict", result.path)
        }
        Outcome::Skipped(reason) => println!(
            "  {} {label:<13} {} ({})",
            "-".bright_black(),
            result.path,
            skip_detail(reason).bright_black()
        ),
        Outcome::Failed(reason) => println!(
            "  {} {label:<13} {}: {}",
            "✗".red().bold(),
            result.path,
            reason
        ),
    }
}

fn skip_detail(reason: &SkipReason) -> String {
    match reason {
        SkipReason::BlockedByDependency { on } => format!("blocked by {on}"),
        SkipReason::DirectionFiltered(transfer) => format!("would {transfer}"),
        SkipReason::Withheld => "secret withheld".to_string(),
        SkipReason::Cancelled => "cancelled".to_string(),
    }
}

pub fn print_summary(report: &SyncReport) {
    let Summary {
        applied,
        unchanged,
        conflicted,
        skipped,
        failed,
    } = report.summary();
    println!(
        "{applied} applied, {unchanged} unchanged, {} conflicted, {skipped} skipped, {} failed",
        if conflicted > 0 {
            conflicted.to_string().yellow().to_string()
        } else {
            conflicted.to_string()
        },
        if failed > 0 {
            failed.to_string().red().to_string()
        } else {
            failed.to_string()
        },
    );
    if report.cancelled {
        println!("{}", "run was cancelled; re-run to finish".yellow());
    }

    let conflicts: Vec<&SyncResult> = report.conflicts().collect();
    if conflicts.is_empty() {
        return;
    }
    println!("Conflicts (re-run with --conflict prefer-local or prefer-remote):");
    for result in conflicts {
        if let Outcome::Conflicted {
            local,
            remote,
            base,
        } = &result.outcome
        {
            println!(
                "  {}  local {}  remote {}  base {}",
                result.path,
                short(local.as_ref()),
                short(remote.as_ref()),
                short(base.as_ref())
            );
        }
    }
}

/// "just now", "5m ago", "3h ago", "2d ago".
pub fn format_age(at: DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(at);
    if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}
