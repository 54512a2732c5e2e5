//! Interactive administrator review dashboard.

use cora_feed::{FeedController, FeedKind, FeedView};
use cora_report_models::{ReportId, ReportStatus, StatusFilter};
use dialoguer::Select;

use crate::CliResult;
use crate::context::Context;

#[derive(Debug, Clone, Copy)]
enum Choice {
    Apply(ReportId, ReportStatus),
    ChangeFilter,
    Refresh,
    Quit,
}

fn render(view: &FeedView) {
    println!();
    match view {
        FeedView::Loading => println!("Loading..."),
        FeedView::Unavailable { filter, message } => {
            println!("[{filter}] No data available: {message}");
        }
        FeedView::Loaded { filter, reports } => {
            println!("[{filter}] {} reports", reports.len());
            for report in reports.iter() {
                println!(
                    "  {}  {:<12}  {:<18}  {}",
                    report.created_at.format("%Y-%m-%d %H:%M"),
                    report.status.label(),
                    report.category.label(),
                    report.title
                );
            }
        }
    }
    println!();
}

fn choose_filter(current: StatusFilter) -> CliResult<StatusFilter> {
    let filters: Vec<StatusFilter> = std::iter::once(StatusFilter::All)
        .chain(ReportStatus::all().iter().copied().map(StatusFilter::from))
        .collect();
    let labels: Vec<String> = filters
        .iter()
        .map(|f| f.status().map_or("All", ReportStatus::label).to_string())
        .collect();
    let default = filters.iter().position(|f| *f == current).unwrap_or(0);
    let idx = Select::new()
        .with_prompt("Show")
        .items(&labels)
        .default(default)
        .interact()?;
    Ok(filters[idx])
}

/// Runs the review loop until the administrator quits.
///
/// # Errors
///
/// Returns an error if the caller is not an administrator or a prompt
/// fails. Backend failures are shown and the loop continues.
pub async fn run(ctx: &Context) -> CliResult {
    let admin = ctx.session.require_admin()?;
    log::info!("Opening review dashboard for {}", admin.id);

    let controller = FeedController::new(ctx.repository(), FeedKind::Admin);
    controller.refresh().await?;

    loop {
        let view = controller.view();
        render(&view);

        let mut choices = Vec::new();
        let mut labels = Vec::new();
        for report in view.reports().unwrap_or_default() {
            for transition in controller.actions(report) {
                choices.push(Choice::Apply(report.id, transition.to));
                labels.push(format!("{}: {}", transition.action, report.title));
            }
        }
        choices.extend([Choice::ChangeFilter, Choice::Refresh, Choice::Quit]);
        labels.extend(["Change filter", "Refresh", "Quit"].map(String::from));

        let idx = Select::new()
            .with_prompt("Action")
            .items(&labels)
            .default(0)
            .interact()?;

        match choices[idx] {
            Choice::Apply(id, target) => {
                if let Err(e) = controller.apply_transition(id, target).await {
                    println!("{e}");
                }
            }
            Choice::ChangeFilter => {
                let filter = choose_filter(controller.filter())?;
                controller.set_filter(filter).await?;
            }
            Choice::Refresh => {
                controller.refresh().await?;
            }
            Choice::Quit => return Ok(()),
        }
    }
}
