use anyhow::{Context, Result};
use plx::{Aggregator, Platform};

pub async fn run(
    aggregator: &Aggregator,
    locator: &str,
    from: Platform,
    to: Platform,
    token: Option<&str>,
) -> Result<()> {
    println!("Converting {from} playlist to {to}...");

    let report = aggregator
        .convert_playlist(from, to, locator, token)
        .await
        .with_context(|| format!("Failed to convert {locator}"))?;

    println!("\nCreated {to} playlist: {}", report.url);
    println!("  Matched {}/{} tracks", report.matched, report.total);
    if report.matched < report.total {
        println!(
            "  {} track(s) had no match on {to} and were skipped",
            report.total - report.matched
        );
    }

    Ok(())
}
