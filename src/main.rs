#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quickcalm_lib::run().await
}
