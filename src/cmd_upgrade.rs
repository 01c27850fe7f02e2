use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use oxiwatch::clienv;
use oxiwatch::self_update::{self, VersionChecker, CURRENT_VERSION};

pub(crate) async fn cmd_upgrade(check_only: bool) -> Result<()> {
    let checker = VersionChecker::new(CURRENT_VERSION, clienv::release_repo())?;

    println!("{}", style("Checking for updates...").cyan());
    let latest = checker
        .check_for_update()
        .await
        .context("failed to check for updates")?;

    let Some(latest) = latest else {
        println!(
            "{} Already on the latest version ({})",
            style("✓").green(),
            CURRENT_VERSION
        );
        return Ok(());
    };

    println!(
        "{} New version available: {} → {}",
        style("→").cyan(),
        CURRENT_VERSION,
        style(&latest).bold()
    );
    if check_only {
        println!("Run 'sudo oxiwatch upgrade' to install it");
        return Ok(());
    }

    let exe = self_update::current_exe()?;
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let installed = checker
        .upgrade(&exe, |done, total| {
            pb.set_length(total);
            pb.set_position(done);
        })
        .await;
    pb.finish_and_clear();
    let installed = installed.with_context(|| format!("failed to upgrade {}", exe.display()))?;

    println!(
        "{} Upgraded to {}. Restart the service to use it:",
        style("✓").green(),
        style(&installed).bold()
    );
    println!("  sudo systemctl restart oxiwatch");
    Ok(())
}
