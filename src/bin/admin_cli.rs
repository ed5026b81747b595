//! Offline admin inspection tool, the way the teacher's `src/bin/migrate.rs`
//! is a standalone entry point alongside the main server binary. Talks to
//! the admin HTTP surface (SPEC_FULL.md §F) rather than touching process
//! state directly, so it works against a remote gateway too.

use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let command = env::args().nth(1).unwrap_or_else(|| "health".to_string());
    let base_url = env::var("DAVGATE_ADMIN_URL").unwrap_or_else(|_| "http://127.0.0.1:8081".to_string());
    let token = env::var("DAVGATE_ADMIN_TOKEN").ok();

    let path = match command.as_str() {
        "health" => "/admin/health",
        "cache-stats" => "/admin/cache-stats",
        "ip-tables" => "/admin/ip-tables",
        "reload-ip-tables" => "/admin/ip-tables/reload",
        other => anyhow::bail!("unknown command {other}; expected health|cache-stats|ip-tables|reload-ip-tables"),
    };

    let client = reqwest::Client::new();
    let mut request = if command == "reload-ip-tables" {
        client.post(format!("{base_url}{path}"))
    } else {
        client.get(format!("{base_url}{path}"))
    };
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("{status}: {body}");

    Ok(())
}
