use clap::Parser;
use futures::StreamExt;
use taskrelay::a2a::{Message, MessageRole};
use taskrelay::runtime::context::RequestContext;
use taskrelay::runtime::logging::init_tracing;
use taskrelay::sink::{describe_update, RemoteConnector, TaskConnection, UpstreamConnector};
use taskrelay::RelayResult;

/// Streams one task from an A2A agent and prints every update.
#[derive(Parser, Debug)]
#[command(name = "taskrelay-client", version)]
struct Args {
    /// Message sent to the agent.
    #[arg(long)]
    text: String,

    #[arg(long, default_value = "http://localhost:8001")]
    base_url: String,
}

#[tokio::main]
async fn main() -> RelayResult<()> {
    init_tracing("taskrelay=warn");
    let args = Args::parse();

    let connector = RemoteConnector::new(args.base_url)?;
    let mut connection = connector.connect(&RequestContext::new()).await?;
    let result = print_updates(connection.as_mut(), &args.text).await;
    connection.close().await;
    result
}

async fn print_updates(connection: &mut dyn TaskConnection, text: &str) -> RelayResult<()> {
    let message = Message::text(MessageRole::User, uuid::Uuid::new_v4().to_string(), text);
    let mut updates = connection.send_message(message).await?;
    while let Some(item) = updates.next().await {
        println!("{}", describe_update(&item?));
    }
    Ok(())
}
