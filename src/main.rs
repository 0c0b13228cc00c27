#[tokio::main]
async fn main() -> anyhow::Result<()> {
    catalystwells::app::run().await
}
