//! Binary entrypoint for the prompt-hierarchy tool

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    prompt_hierarchy::cli::run().await
}
