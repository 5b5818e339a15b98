use anyhow::{Context, Result};
use plx::utils::unix_now;
use plx::{Aggregator, Platform};

pub async fn status(platform: Platform, aggregator: &Aggregator) -> Result<()> {
    let Some(record) = aggregator.credential_store().get(platform).await? else {
        println!("Not logged in to {platform}");
        println!("Run 'plx auth {platform}' to login");
        return Ok(());
    };
    let credentials = record.decode()?;

    println!("Logged in to {platform}");
    println!("First authorized: {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Last updated:     {}", record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "Refresh token:    {}",
        if credentials.refresh_token.is_some() { "yes" } else { "no" }
    );

    let now = unix_now();
    if credentials.expires_at == 0 {
        println!("Token does not expire");
    } else if credentials.is_expired(now) {
        println!("Token expired (will auto-refresh on next use where supported)");
    } else {
        println!("Token expires in: {}s", credentials.expires_at - now);
    }

    Ok(())
}

pub async fn refresh(platform: Platform, aggregator: &Aggregator) -> Result<()> {
    let credentials = aggregator
        .refresh_credentials(platform)
        .await
        .with_context(|| format!("Failed to refresh {platform} credentials"))?;

    println!("Refreshed {platform} credentials");
    if credentials.expires_at != 0 {
        println!("Token expires in: {}s", credentials.expires_at - unix_now());
    }
    Ok(())
}

pub async fn logout(platform: Platform, aggregator: &Aggregator) -> Result<()> {
    let store = aggregator.credential_store();

    if store.get(platform).await?.is_none() {
        println!("Not logged in to {platform}");
        return Ok(());
    }

    store
        .delete(platform)
        .await
        .with_context(|| format!("Failed to delete {platform} credentials"))?;

    println!("Logged out from {platform}");
    println!("Run 'plx auth {platform}' to login again");

    Ok(())
}
