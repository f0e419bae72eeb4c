#[tokio::main]
async fn main() -> mep_platform::Result<()> {
    mep_platform::init_tracing();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "platform starting"
    );
    mep_platform::run().await
}
