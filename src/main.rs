#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    testiflow::server::run().await
}
