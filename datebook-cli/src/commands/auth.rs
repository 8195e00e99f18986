use anyhow::Result;
use datebook_core::Datebook;
use datebook_core::error::DatebookError;
use datebook_core::route::Route;
use dialoguer::Confirm;
use owo_colors::OwoColorize;

use super::create_spinner;
use crate::render::{Render, route_hint};
use crate::utils::tui::{prompt_password, text_or_prompt};

pub async fn login(app: &Datebook, email: Option<String>) -> Result<()> {
    let email = text_or_prompt(email, "Email")?;
    let password = prompt_password("Password")?;

    let spinner = create_spinner("Signing in...".to_string());
    let result = app.auth.login(&email, &password).await;
    spinner.finish_and_clear();

    match result {
        Ok(_) => {
            if let Some(user) = app.session.user() {
                println!("{} Signed in as {}", "✓".green(), user.render());
            }
            Ok(())
        }
        Err(DatebookError::InvalidCredentials) => {
            anyhow::bail!("Invalid email or password.")
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn signup(app: &Datebook, email: Option<String>, name: Option<String>) -> Result<()> {
    let email = text_or_prompt(email, "Email")?;

    if !app.auth.check_email(&email).await? {
        anyhow::bail!("An account with {} already exists.\n\n{}", email, route_hint(Route::Auth));
    }

    let name = text_or_prompt(name, "Name")?;
    let password = prompt_password("Password")?;
    let confirm = prompt_password("Confirm password")?;
    if password != confirm {
        anyhow::bail!("Passwords don't match.");
    }

    let spinner = create_spinner("Creating account...".to_string());
    let result = app.auth.sign_up(&email, &name, &password).await;
    spinner.finish_and_clear();
    result?;

    if let Some(user) = app.session.user() {
        println!("{} Welcome, {}", "✓".green(), user.render());
    }
    Ok(())
}

pub fn logout(app: &Datebook) -> Result<()> {
    let was_signed_in = app.session.is_authenticated();
    app.auth.logout()?;

    if was_signed_in {
        println!("{} Signed out", "✓".green());
    } else {
        println!("{}", "Not signed in".dimmed());
    }
    Ok(())
}

pub fn whoami(app: &Datebook) -> Result<()> {
    let Some(user) = app.session.user() else {
        anyhow::bail!("Not signed in.\n\n{}", route_hint(Route::Auth));
    };
    println!("{}", user.render());
    Ok(())
}

pub async fn check_email(app: &Datebook, email: &str) -> Result<()> {
    if app.auth.check_email(email).await? {
        println!("{} {} is available", "✓".green(), email);
    } else {
        println!("{} {} is already registered", "✗".red(), email);
    }
    Ok(())
}

pub async fn refresh(app: &Datebook) -> Result<()> {
    let spinner = create_spinner("Refreshing session...".to_string());
    let result = app.auth.refresh_access_token().await;
    spinner.finish_and_clear();

    match result {
        Ok(_) => {
            println!("{} Session refreshed", "✓".green());
            Ok(())
        }
        Err(DatebookError::NoRefreshToken) => {
            anyhow::bail!("No refresh token stored.\n\n{}", route_hint(Route::Auth))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn change_password(app: &Datebook) -> Result<()> {
    let old_password = prompt_password("Current password")?;
    let new_password = prompt_password("New password")?;
    let confirm = prompt_password("Confirm new password")?;
    if new_password != confirm {
        anyhow::bail!("Passwords don't match.");
    }

    let spinner = create_spinner("Changing password...".to_string());
    let result = app.auth.change_password(&old_password, &new_password).await;
    spinner.finish_and_clear();
    result?;

    println!("{} Password changed", "✓".green());
    Ok(())
}

pub async fn delete_account(app: &Datebook) -> Result<()> {
    let confirmed = Confirm::new()
        .with_prompt("  This permanently deletes your account and events. Continue?")
        .default(false)
        .interact()?;
    if !confirmed {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    }

    let password = prompt_password("Password")?;

    let spinner = create_spinner("Deleting account...".to_string());
    let result = app.auth.delete_account(&password).await;
    spinner.finish_and_clear();
    let next = result?;

    println!("{} Account deleted", "✓".green());
    println!("\n{}", route_hint(next));
    Ok(())
}
