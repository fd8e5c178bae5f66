use clap::Parser;
use eth1_mock_node::{Args, Node};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let node = Node::init(args).await?;
    node.run().await
}
