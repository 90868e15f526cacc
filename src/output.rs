use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::error::Result;
use crate::geo::format_distance;
use crate::model::{Profile, Status, Task, VerificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn status_label(status: Status) -> ColoredString {
    let label = status.as_str();
    match status {
        Status::Open => label.cyan(),
        Status::Assigned | Status::InProgress => label.yellow(),
        Status::Review => label.magenta(),
        Status::Completed => label.green(),
        Status::Disputed => label.red().bold(),
        Status::Cancelled => label.dimmed(),
    }
}

fn verification_label(status: VerificationStatus) -> ColoredString {
    match status {
        VerificationStatus::Verified => "verified".green(),
        VerificationStatus::Pending => "pending".yellow(),
        VerificationStatus::None => "unverified".dimmed(),
    }
}

/// Budget in minor units rendered with two decimals.
pub fn format_budget(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

pub fn print_task(task: &Task, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(task)?,
        Format::Pretty => {
            println!(
                "{} {} ({})",
                format!("[{}]", task.id).bold(),
                task.title,
                status_label(task.status)
            );
            if let Some(ref desc) = task.description {
                println!("  {desc}");
            }
            println!(
                "  budget: {} | mode: {} | client: {}",
                format_budget(task.budget),
                task.mode,
                task.client_id
            );
            if let Some(point) = task.location {
                let place = task.address_text.as_deref().unwrap_or("-");
                println!(
                    "  {} {:.5}, {:.5} ({place})",
                    "nearby:".dimmed(),
                    point.latitude,
                    point.longitude
                );
            }
            if let Some(started) = task.started_at {
                println!("  {} {}", "started:".dimmed(), started.to_rfc3339());
            }
            if let Some(done) = task.completed_at {
                println!("  {} {}", "completed:".dimmed(), done.to_rfc3339());
            }
        }
        Format::Minimal => {
            println!(
                "{:36} {:24} {:11} {:>10}",
                task.id,
                truncate_title(&task.title, 24),
                task.status,
                format_budget(task.budget)
            );
        }
    }
    Ok(())
}

pub fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() > max_len {
        let truncated: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    } else {
        title.to_string()
    }
}

pub fn print_tasks(tasks: &[Task], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(tasks)?,
        Format::Pretty => {
            if tasks.is_empty() {
                println!("{}", "No tasks.".dimmed());
            }
            for task in tasks {
                print_task(task, Format::Pretty)?;
                println!();
            }
        }
        Format::Minimal => {
            println!("{:36} {:24} {:11} {:>10}", "ID", "TITLE", "STATUS", "BUDGET");
            println!("{}", "-".repeat(84));
            for task in tasks {
                print_task(task, Format::Minimal)?;
            }
        }
    }
    Ok(())
}

pub fn print_profile(profile: &Profile, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(profile)?,
        Format::Pretty => {
            println!(
                "{} {} ({})",
                format!("[{}]", profile.user_id).bold(),
                profile.full_name.as_deref().unwrap_or("-"),
                profile.role
            );
            println!(
                "  verification: {} | completed tasks: {}",
                verification_label(profile.verification_status),
                profile.completed_tasks
            );
            println!("  {} {}", "profile id:".dimmed(), profile.id);
        }
        Format::Minimal => {
            println!(
                "{} {} {} {}",
                profile.user_id, profile.role, profile.verification_status, profile.completed_tasks
            );
        }
    }
    Ok(())
}

/// One line per distance-annotated task, used by the nearby listing.
pub fn nearby_line(task: &Task, distance_m: f64) -> String {
    format!(
        "{:>8}  {}  {}",
        format_distance(distance_m),
        truncate_title(&task.title, 40),
        format_budget(task.budget)
    )
}
