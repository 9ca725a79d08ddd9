// Entry point for `cargo run -p web-server`. Loads the configuration, sets up tracing and
// hands over to the library.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = configuration::load_config()?;
    let _guard = configuration::init_tracing(&config.logging)?;

    if let Err(err) = web_server::run_server(&config).await {
        tracing::error!(error = %err, "Web server stopped");
        std::process::exit(1);
    }
    Ok(())
}
