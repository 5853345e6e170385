use colored::{ColoredString, Colorize};

use crate::dag::ExecutionPlan;
use crate::discovery::models::{InfrastructureStatus, Stack, StackStatus, Unit, UnitStatus};
use crate::executor::engine::{Execution, UnitRunStatus};
use crate::executor::terragrunt::{PlanResult, ValidationResult};

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg.green());
}

/// Print an error message.
pub fn print_error(msg: &str) {
    println!("{} {}", "✗".red().bold(), msg.red());
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "!".yellow().bold(), msg.yellow());
}

// Width specifiers on a `ColoredString` pad the visible text only.
fn unit_status_colored(status: UnitStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        UnitStatus::Deployed => text.green(),
        UnitStatus::Failed => text.red(),
        UnitStatus::Outdated | UnitStatus::DriftDetected => text.yellow(),
        UnitStatus::NotDeployed => text.dimmed(),
        UnitStatus::Unknown => text.normal(),
    }
}

fn stack_status_colored(status: StackStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        StackStatus::Deployed | StackStatus::Ready => text.green(),
        StackStatus::Failed => text.red(),
        StackStatus::Planning | StackStatus::Applying | StackStatus::Destroying => text.blue(),
        StackStatus::Unknown => text.normal(),
    }
}

fn run_status_colored(status: UnitRunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        UnitRunStatus::Completed => text.green(),
        UnitRunStatus::Failed => text.red(),
        UnitRunStatus::TimedOut => text.yellow(),
        UnitRunStatus::Skipped => text.dimmed(),
        UnitRunStatus::Running => text.blue(),
    }
}

/// Print discovered units as a table.
pub fn print_unit_list(units: &[Unit]) {
    if units.is_empty() {
        println!("{}", "No units found.".dimmed());
        return;
    }

    println!();
    println!("{}", "Units".bold().cyan());
    println!("{}", "─".repeat(96));
    println!(
        "  {:<52} {:<24} {:<14} {}",
        "PATH".bold(),
        "TYPE".bold(),
        "STATUS".bold(),
        "DEPS".bold()
    );
    println!("{}", "─".repeat(96));

    for unit in units {
        println!(
            "  {:<52} {:<24} {:<14} {}",
            unit.path,
            unit.resource_type.as_str(),
            unit_status_colored(unit.status),
            unit.unique_dependencies().len()
        );
    }

    println!();
    println!("  {} unit(s) total.", units.len());
    println!();
}

/// Print everything known about one unit.
pub fn print_unit_detail(unit: &Unit) {
    println!();
    println!("{} {}", "Unit:".bold().cyan(), unit.path.bold());
    println!("{}", "─".repeat(60));
    println!("  {:<16} {}", "Name:".bold(), unit.name);
    println!("  {:<16} {}", "Type:".bold(), unit.resource_type);
    println!("  {:<16} {}", "Account:".bold(), unit.account);
    println!(
        "  {:<16} {} ({:?})",
        "Environment:".bold(),
        unit.environment,
        unit.environment_type
    );
    println!("  {:<16} {}", "Project:".bold(), unit.project);
    if let Some(ref region) = unit.region {
        println!("  {:<16} {}", "Region:".bold(), region);
    }
    println!("  {:<16} {}", "Status:".bold(), unit_status_colored(unit.status));
    if let Some(modified) = unit.last_modified {
        println!("  {:<16} {}", "Modified:".bold(), modified.to_rfc3339());
    }
    if let Some(ref source) = unit.configuration.source {
        println!("  {:<16} {}", "Source:".bold(), source);
    }

    let deps = unit.unique_dependencies();
    if !deps.is_empty() {
        println!();
        println!("  {}:", "Dependencies".bold());
        for dep in deps {
            println!("    {} {}", "→".dimmed(), dep);
        }
    }

    if !unit.configuration.locals.is_empty() {
        println!();
        println!("  {}:", "Locals".bold());
        for (key, value) in &unit.configuration.locals {
            println!("    {:<20} = {}", key, value);
        }
    }

    println!("{}", "─".repeat(60));
    println!();
}

pub fn print_stack_list(stacks: &[Stack]) {
    if stacks.is_empty() {
        println!("{}", "No stacks found.".dimmed());
        return;
    }

    println!();
    println!("{}", "Stacks".bold().cyan());
    println!("{}", "─".repeat(80));
    println!(
        "  {:<48} {:<12} {:<8} {}",
        "PATH".bold(),
        "STATUS".bold(),
        "UNITS".bold(),
        "BATCHES".bold()
    );
    println!("{}", "─".repeat(80));

    for stack in stacks {
        println!(
            "  {:<48} {:<12} {:<8} {}",
            stack.path,
            stack_status_colored(stack.status),
            stack.units.len(),
            stack.execution_order.len()
        );
    }

    println!();
    println!("  {} stack(s) total.", stacks.len());
    println!();
}

pub fn print_stack_detail(stack: &Stack) {
    println!();
    println!("{} {}", "Stack:".bold().cyan(), stack.path.bold());
    println!("{}", "─".repeat(60));
    println!("  {:<16} {}", "Name:".bold(), stack.name);
    println!("  {:<16} {}", "Status:".bold(), stack_status_colored(stack.status));
    if let Some(created) = stack.created_at {
        println!("  {:<16} {}", "Created:".bold(), created.to_rfc3339());
    }
    if !stack.dependencies.is_empty() {
        println!("  {:<16} {}", "Depends on:".bold(), stack.dependencies.join(", "));
    }

    println!();
    println!("  {} ({}):", "Units".bold(), stack.units.len());
    for unit in &stack.units {
        println!(
            "    {:<48} {}",
            unit.path,
            unit_status_colored(unit.status)
        );
    }

    if !stack.execution_order.is_empty() {
        println!();
        print_batches(&stack.execution_order);
    }
    for warning in &stack.warnings {
        println!("  {} {}", "!".yellow().bold(), warning.yellow());
    }

    println!("{}", "─".repeat(60));
    println!();
}

fn print_batches(batches: &[Vec<String>]) {
    for (i, batch) in batches.iter().enumerate() {
        println!("  {} {}", format!("Batch {}:", i + 1).bold(), batch.join(", "));
    }
}

/// Print the batch order of an execution plan.
pub fn print_execution_plan(plan: &ExecutionPlan) {
    println!();
    println!(
        "{} {} unit(s) in {} batch(es)",
        "Execution order:".bold().cyan(),
        plan.unit_count(),
        plan.batches.len()
    );
    println!("{}", "─".repeat(60));
    print_batches(&plan.batches);

    if !plan.warnings.is_empty() {
        println!();
        for warning in &plan.warnings {
            println!("  {} {}", "!".yellow().bold(), warning.yellow());
        }
    }
    println!();
}

/// Print the outcome of an execution, unit by unit in plan order.
pub fn print_execution(execution: &Execution) {
    println!();
    println!(
        "{} {} {} {}",
        "Execution".bold().cyan(),
        execution.id.bold(),
        execution.command,
        execution.target_path
    );
    if execution.dry_run {
        println!("  {}", "(dry run)".dimmed());
    }
    println!("{}", "─".repeat(80));

    for (i, batch) in execution.execution_plan.iter().enumerate() {
        println!("  {}", format!("Batch {}", i + 1).bold());
        for path in batch {
            let Some(result) = execution.unit_results.get(path) else {
                println!("    {:<52} {}", path, "no result".dimmed());
                continue;
            };
            let elapsed = result
                .elapsed_ms
                .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
                .unwrap_or_default();
            println!(
                "    {:<52} {:<12} {}",
                path,
                run_status_colored(result.status),
                elapsed.dimmed()
            );
            for error in &result.errors {
                println!("      {}", error.red());
            }
        }
    }

    // Stack-run results are keyed by scraped unit names, not plan paths
    let unplanned: Vec<_> = execution
        .unit_results
        .iter()
        .filter(|(path, _)| !execution.execution_plan.iter().flatten().any(|p| p == *path))
        .collect();
    for (path, result) in unplanned {
        println!("    {:<52} {}", path, run_status_colored(result.status));
    }

    for warning in &execution.warnings {
        println!("  {} {}", "!".yellow().bold(), warning.yellow());
    }

    println!("{}", "─".repeat(80));
    let completed = execution.units_with(UnitRunStatus::Completed).len();
    let skipped = execution.units_with(UnitRunStatus::Skipped).len();
    let failed = execution.failed_units().len();
    println!(
        "  {} completed, {} failed, {} skipped",
        completed.to_string().green(),
        failed.to_string().red(),
        skipped.to_string().dimmed()
    );
    println!();

    match execution.error_message {
        Some(ref message) => print_error(message),
        None => print_success(&format!(
            "{} {} finished with status {}",
            execution.command, execution.target_path, execution.status
        )),
    }
}

pub fn print_validation(result: &ValidationResult) {
    if result.valid {
        print_success(&format!("{} is valid", result.unit_path));
    } else {
        print_error(&format!("{} is invalid", result.unit_path));
    }
    for error in &result.errors {
        println!("  {} {}", "✗".red(), error);
    }
    for warning in &result.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
}

/// Print a unit plan in a Terraform-like format.
pub fn print_plan_result(result: &PlanResult) {
    println!();
    let summary = &result.summary;
    if !summary.has_changes() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    for change in &summary.resources {
        let symbol = match change.action.as_str() {
            "created" => "+".green().bold(),
            "updated" => "~".yellow().bold(),
            "destroyed" => "-".red().bold(),
            _ => "?".normal(),
        };
        println!("  {} {} will be {}", symbol, change.address.bold(), change.action);
    }

    println!();
    println!(
        "{} {} to add, {} to change, {} to destroy.",
        "Plan:".bold(),
        summary.to_add.to_string().green(),
        summary.to_change.to_string().yellow(),
        summary.to_destroy.to_string().red()
    );
    println!();
}

/// Print the health summary for an environment.
pub fn print_status(status: &InfrastructureStatus) {
    let scope = status.environment.as_deref().unwrap_or("all environments");
    println!();
    println!("{} {}", "Infrastructure status:".bold().cyan(), scope.bold());
    println!("{}", "─".repeat(40));
    println!("  {:<16} {}", "Total:".bold(), status.total_units);
    println!("  {:<16} {}", "Deployed:".bold(), status.deployed.to_string().green());
    println!("  {:<16} {}", "Not deployed:".bold(), status.not_deployed);
    println!("  {:<16} {}", "Failed:".bold(), status.failed.to_string().red());
    println!("  {:<16} {}", "Outdated:".bold(), status.outdated.to_string().yellow());
    println!("  {:<16} {}", "Drift:".bold(), status.drift_detected.to_string().yellow());
    println!("  {:<16} {}", "Unknown:".bold(), status.unknown);

    let score = format!("{:.1}%", status.health_score);
    let score = if status.health_score >= 90.0 {
        score.green()
    } else if status.health_score >= 50.0 {
        score.yellow()
    } else {
        score.red()
    };
    println!("  {:<16} {}", "Health:".bold(), score);
    if status.total_stacks > 0 {
        println!(
            "  {:<16} {} ({} deployed, {} failed)",
            "Stacks:".bold(),
            status.total_stacks,
            status.deployed_stacks.to_string().green(),
            status.failed_stacks.to_string().red()
        );
    }
    println!("{}", "─".repeat(40));
    println!();
}
