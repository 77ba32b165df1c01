//! Recipe Indexer Service - Entry Point
//!
//! Embeds recipe records into the vector index, driven by HTTP requests,
//! the cron schedule, and the Redis stream queue.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    recipe_indexer::run().await
}
