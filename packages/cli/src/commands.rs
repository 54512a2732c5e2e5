//! Non-interactive subcommands.

use cora_report_models::workflow;
use cora_report_models::{Report, ReportCategory, ReportId, ReportStatus, StatusFilter};
use cora_repository::ReportSubmission;
use cora_session::SignUpOutcome;
use dialoguer::{Input, Password, Select};

use crate::CliResult;
use crate::context::Context;

/// Report fields given on the command line; missing ones are prompted for.
#[derive(Debug, Default, clap::Args)]
pub struct SubmitArgs {
    #[arg(long, help = category_help())]
    pub category: Option<String>,
    /// Short summary
    #[arg(long)]
    pub title: Option<String>,
    /// What happened
    #[arg(long)]
    pub description: Option<String>,
    /// Street address or location description
    #[arg(long)]
    pub address: Option<String>,
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<String>,
    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<String>,
}

/// Help text for `--category`, listing every accepted name.
#[must_use]
pub fn category_help() -> String {
    let names: Vec<String> = ReportCategory::all()
        .iter()
        .map(ToString::to_string)
        .collect();
    format!("Category ({})", names.join(", "))
}

fn prompt_text(prompt: &str, given: Option<String>) -> CliResult<String> {
    if let Some(value) = given {
        return Ok(value);
    }
    Ok(Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?)
}

fn prompt_category(given: Option<String>) -> CliResult<String> {
    if let Some(value) = given {
        return Ok(value);
    }
    let labels: Vec<&str> = ReportCategory::all().iter().map(|c| c.label()).collect();
    let idx = Select::new()
        .with_prompt("Category")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(ReportCategory::all()[idx].to_string())
}

fn password(given: Option<String>, confirm: bool) -> CliResult<String> {
    if let Some(value) = given {
        return Ok(value);
    }
    let prompt = Password::new().with_prompt("Password");
    let prompt = if confirm {
        prompt.with_confirmation("Confirm password", "Passwords do not match")
    } else {
        prompt
    };
    Ok(prompt.interact()?)
}

fn print_reports(reports: &[Report]) {
    if reports.is_empty() {
        println!("No reports.");
        return;
    }
    println!(
        "{:<36}  {:<19}  {:<12}  {:<18}  TITLE",
        "ID", "CREATED", "STATUS", "CATEGORY"
    );
    println!("{}", "-".repeat(100));
    for report in reports {
        println!(
            "{:<36}  {:<19}  {:<12}  {:<18}  {}",
            report.id,
            report.created_at.format("%Y-%m-%d %H:%M:%S"),
            report.status.label(),
            report.category.label(),
            report.title
        );
    }
}

/// Prints one report with the actions available on it.
pub fn print_report(report: &Report, show_actions: bool) {
    println!("{}", report.title);
    println!("  id:          {}", report.id);
    println!("  category:    {}", report.category.label());
    println!(
        "  status:      {} ({})",
        report.status.label(),
        report.status.color()
    );
    println!("  address:     {}", report.address_text);
    match report.location {
        Some(location) => println!(
            "  location:    {:.6}, {:.6}",
            location.latitude, location.longitude
        ),
        None => println!("  location:    unavailable"),
    }
    println!("  reported:    {}", report.created_at.to_rfc3339());
    println!("  submitter:   {}", report.user_id);
    println!("  confidence:  {:.2}", report.confidence_score);
    println!("  media:       {}", report.media_count);
    println!();
    println!("{}", report.description);

    if show_actions {
        let actions: Vec<String> = workflow::transitions_from(report.status)
            .map(|t| format!("{} (set-status {} {})", t.action, report.id, t.to))
            .collect();
        if !actions.is_empty() {
            println!();
            println!("Actions: {}", actions.join(", "));
        }
    }
}

/// `cora sign-in`
///
/// # Errors
///
/// Returns an error if the credentials are rejected.
pub async fn sign_in(ctx: &Context, email: &str, password_arg: Option<String>) -> CliResult {
    let password = password(password_arg, false)?;
    let identity = ctx.session.sign_in(email, &password).await?;
    println!(
        "Signed in as {} ({})",
        identity.email.as_deref().unwrap_or(email),
        identity.role
    );
    Ok(())
}

/// `cora sign-up`
///
/// # Errors
///
/// Returns an error if the registration is rejected.
pub async fn sign_up(ctx: &Context, email: &str, password_arg: Option<String>) -> CliResult {
    let password = password(password_arg, true)?;
    match ctx.session.sign_up(email, &password).await? {
        SignUpOutcome::SignedIn(session) => {
            println!("Account created; signed in as {}", session.identity.id);
        }
        SignUpOutcome::ConfirmationRequired { email } => {
            println!("Check {email} for a confirmation link, then run `cora sign-in`.");
        }
    }
    Ok(())
}

/// `cora sign-out`
pub async fn sign_out(ctx: &Context) {
    if ctx.session.current_user().is_none() {
        println!("Not signed in.");
        return;
    }
    ctx.session.sign_out().await;
    println!("Signed out.");
}

/// `cora whoami`
pub fn whoami(ctx: &Context) {
    match ctx.session.current_user() {
        Some(identity) => println!(
            "{} ({}, {})",
            identity.email.as_deref().unwrap_or("unknown email"),
            identity.role,
            identity.id
        ),
        None => println!("Not signed in."),
    }
}

/// `cora submit`
///
/// # Errors
///
/// Returns an error if nobody is signed in, a field is invalid, or the
/// backend rejects the report.
pub async fn submit(ctx: &Context, args: SubmitArgs) -> CliResult {
    ctx.session.require_user()?;
    let fields = ReportSubmission {
        category: prompt_category(args.category)?,
        title: prompt_text("Title", args.title)?,
        description: prompt_text("Description", args.description)?,
        address_text: prompt_text("Address", args.address)?,
        latitude: prompt_text("Latitude", args.lat)?,
        longitude: prompt_text("Longitude", args.lon)?,
    };

    let id = ctx
        .repository()
        .submit(ctx.session.current_user().as_ref(), &fields)
        .await?;
    println!("Report {id} submitted; it will appear as Unverified until reviewed.");
    Ok(())
}

/// `cora list`
///
/// # Errors
///
/// Returns an error if the reports cannot be loaded.
pub async fn list(ctx: &Context, filter: StatusFilter) -> CliResult {
    let reports = ctx.repository().list_by_status(filter).await?;
    print_reports(&reports);
    Ok(())
}

/// `cora show`
///
/// # Errors
///
/// Returns an error if the report does not exist or cannot be loaded.
pub async fn show(ctx: &Context, id: ReportId) -> CliResult {
    let report = ctx.repository().get(id).await?;
    let is_admin = ctx.session.current_user().is_some_and(|u| u.is_admin());
    print_report(&report, is_admin);
    Ok(())
}

/// `cora set-status`
///
/// # Errors
///
/// Returns an error if the caller is not an administrator, the workflow
/// does not allow the change, or the backend rejects it.
pub async fn set_status(ctx: &Context, id: ReportId, status: ReportStatus) -> CliResult {
    let admin = ctx.session.require_admin()?;
    let report = ctx.repository().transition(id, status).await?;
    log::info!("Admin {} set report {id} to {status}", admin.id);
    println!("Report {} is now {}.", report.id, report.status.label());
    Ok(())
}

/// `cora check`
///
/// # Errors
///
/// Returns an error if any check failed.
pub async fn check(ctx: &Context) -> CliResult {
    let token = ctx.session.access_token();
    let diagnostics = cora_server::diagnostics::run_checks(&ctx.services, token.as_deref()).await;
    println!("Backend: {}", diagnostics.backend);
    for check in &diagnostics.checks {
        let mark = if check.ok { "ok  " } else { "FAIL" };
        println!("  [{mark}] {:<10} {}", check.name, check.detail);
    }
    if diagnostics.all_ok() {
        Ok(())
    } else {
        Err("One or more checks failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_help_lists_only_known_categories() {
        let help = category_help();
        let inner = help
            .strip_prefix("Category (")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap();
        let names: Vec<&str> = inner.split(", ").collect();
        assert_eq!(names.len(), ReportCategory::all().len());
        for name in names {
            assert!(name.parse::<ReportCategory>().is_ok(), "{name}");
        }
        assert!(!help.contains("suspicious"));
    }
}
