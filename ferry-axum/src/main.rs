use anyhow::Result;
use ferry_axum::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let app = ferry_axum::build(&config).await?;

    if let Some(every) = config.reap_interval() {
        app.spawn_reaper(every);
    }

    let addr = config.addr();
    println!("[ferry] listening on http://{addr}");

    app.listen(addr).await?;

    Ok(())
}
