//! Menu shown when `cora` runs without a subcommand.

use cora_report_models::{ReportStatus, StatusFilter};
use dialoguer::{Input, Select};

use crate::commands::{self, SubmitArgs};
use crate::context::Context;
use crate::{CliResult, dashboard};

/// Top-level actions.
#[derive(Debug, Clone, Copy)]
enum Action {
    Browse,
    Submit,
    Review,
    SignIn,
    SignUp,
    SignOut,
    Check,
    Serve,
    Quit,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Browse,
        Self::Submit,
        Self::Review,
        Self::SignIn,
        Self::SignUp,
        Self::SignOut,
        Self::Check,
        Self::Serve,
        Self::Quit,
    ];

    #[must_use]
    const fn label(self) -> &'static str {
        match self {
            Self::Browse => "Browse reports",
            Self::Submit => "Submit a report",
            Self::Review => "Review dashboard (admin)",
            Self::SignIn => "Sign in",
            Self::SignUp => "Create an account",
            Self::SignOut => "Sign out",
            Self::Check => "Check connection",
            Self::Serve => "Start server",
            Self::Quit => "Quit",
        }
    }
}

fn browse_filter() -> CliResult<StatusFilter> {
    let mut filters = vec![StatusFilter::All];
    filters.extend(ReportStatus::all().iter().copied().map(StatusFilter::from));
    let labels: Vec<String> = filters.iter().map(ToString::to_string).collect();
    let idx = Select::new()
        .with_prompt("Status")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(filters[idx])
}

fn email() -> CliResult<String> {
    Ok(Input::new().with_prompt("Email").interact_text()?)
}

async fn perform(ctx: &Context, action: Action) -> CliResult {
    match action {
        Action::Browse => commands::list(ctx, browse_filter()?).await,
        Action::Submit => commands::submit(ctx, SubmitArgs::default()).await,
        Action::Review => dashboard::run(ctx).await,
        Action::SignIn => commands::sign_in(ctx, &email()?, None).await,
        Action::SignUp => commands::sign_up(ctx, &email()?, None).await,
        Action::SignOut => {
            commands::sign_out(ctx).await;
            Ok(())
        }
        Action::Check => commands::check(ctx).await,
        Action::Serve | Action::Quit => Ok(()),
    }
}

/// Runs the menu until the user quits or starts the server.
///
/// Failed actions are reported and the menu is shown again.
///
/// # Errors
///
/// Returns an error if the context cannot be set up or a prompt fails.
pub async fn run() -> CliResult {
    println!("Cora");
    println!();

    let ctx = Context::init().await?;
    loop {
        commands::whoami(&ctx);
        let labels: Vec<&str> = Action::ALL.iter().map(|a| a.label()).collect();
        let idx = Select::new()
            .with_prompt("What would you like to do?")
            .items(&labels)
            .default(0)
            .interact()?;

        match Action::ALL[idx] {
            Action::Quit => return Ok(()),
            Action::Serve => {
                tokio::task::spawn_blocking(|| {
                    actix_web::rt::System::new().block_on(cora_server::interactive::run())
                })
                .await??;
                return Ok(());
            }
            action => {
                if let Err(e) = perform(&ctx, action).await {
                    log::error!("{} failed: {e}", action.label());
                    println!("{e}");
                }
            }
        }
        println!();
    }
}
