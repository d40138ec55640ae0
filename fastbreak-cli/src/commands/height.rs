use anyhow::Result;
use fastbreak_core::{AccessNode, ClientConfig, RestAccessNode};

pub async fn handle_height_command(config: &ClientConfig) -> Result<()> {
    let node = RestAccessNode::new(&config.access_node_url)?;
    let height = node.latest_sealed_block_height().await?;

    println!("Network: {:?}", config.network);
    println!("Access node: {}", node.base_url());
    println!("Latest sealed block: {}", height);
    Ok(())
}
