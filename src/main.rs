use localchat::config::ChatConfig;

fn load_dotenv() {
    // A missing .env is fine; the process environment still applies.
    if let Err(err) = dotenvy::dotenv() {
        tracing::debug!("no .env loaded: {err}");
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn resolve_model(config: &mut ChatConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(config.resolve_model());
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn resolve_model(_config: &mut ChatConfig) -> anyhow::Result<()> {
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    load_dotenv();

    let mut config = ChatConfig::from_env()?;
    resolve_model(&mut config)?;
    tracing::info!(endpoint = %config.endpoint, model = ?config.model, "starting localchat");

    dioxus::LaunchBuilder::new()
        .with_context(config)
        .launch(localchat::ui::App);
    Ok(())
}
