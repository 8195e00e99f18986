use anyhow::Result;
use datebook_core::Datebook;
use datebook_core::route::Route;
use datebook_core::scheduler::SchedulerState;
use owo_colors::OwoColorize;

use crate::render::route_hint;

/// Keep the session alive until ctrl-c, refreshing on the configured
/// interval.
pub async fn run(app: &Datebook) -> Result<()> {
    let scheduler = app.refresh_scheduler()?;
    let mut signed_in = app.session.subscribe();
    let mut states = scheduler.subscribe();

    scheduler.start()?;
    println!(
        "{} Refreshing the session every {} (ctrl-c to stop)",
        "●".green(),
        humantime::format_duration(scheduler.interval())
    );

    let mut last_state = *states.borrow_and_update();
    if last_state == SchedulerState::Idle {
        anyhow::bail!("Not signed in.\n\n{}", route_hint(Route::Auth));
    }

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = signed_in.changed() => {
                if changed.is_err() || !*signed_in.borrow() {
                    break Err(anyhow::anyhow!("Signed out.\n\n{}", route_hint(Route::Auth)));
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                tracing::debug!(?state, "token refresh state changed");

                if last_state == SchedulerState::Refreshing && state == SchedulerState::Scheduled {
                    println!("{} Session refreshed", "✓".green());
                }
                last_state = state;

                if state == SchedulerState::Idle {
                    break Err(anyhow::anyhow!(
                        "Token refresh stopped. Run {} to try again.",
                        "datebook refresh".bold()
                    ));
                }
            }
        }
    };

    // Ctrl-c ends the cycle but keeps the session.
    scheduler.stop()?;
    outcome
}
