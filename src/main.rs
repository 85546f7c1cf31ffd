use futures::StreamExt;
use redis_transport::Document;
use redis_transport::EntityRef;
use redis_transport::Error;
use redis_transport::ListFilter;
use redis_transport::ListItem;
use redis_transport::PutOptions;
use redis_transport::Result;
use redis_transport::StoreTransport;
use redis_transport::Transport;
use redis_transport::TransportConfig;
use redis_transport::UpdateFilter;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: redis-transport <command>
  list [id]
  bands <id>
  get <id> <band>
  put <id> <band> <json-object>
  remove <id> <band>
  watch [id] [band]";

enum Command {
    List(Option<String>),
    Bands(String),
    Get(String, String),
    Put(String, String, String),
    Remove(String, String),
    Watch(Option<String>, Option<String>),
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let arg = |i: usize| args.get(i).cloned();
        let required = |i: usize, name: &str| {
            arg(i).ok_or_else(|| Error::InvalidRequest(format!("missing <{name}>\n{USAGE}")))
        };

        match args.first().map(String::as_str) {
            Some("list") => Ok(Command::List(arg(1))),
            Some("bands") => Ok(Command::Bands(required(1, "id")?)),
            Some("get") => Ok(Command::Get(required(1, "id")?, required(2, "band")?)),
            Some("put") => Ok(Command::Put(
                required(1, "id")?,
                required(2, "band")?,
                required(3, "json-object")?,
            )),
            Some("remove") => Ok(Command::Remove(required(1, "id")?, required(2, "band")?)),
            Some("watch") => Ok(Command::Watch(arg(1), arg(2))),
            _ => Err(Error::InvalidRequest(USAGE.to_string())),
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = TransportConfig::new()?.validate()?;
    let transport = StoreTransport::builder(config).build()?;
    transport.wait_ready().await?;
    info!(transport = %transport.id(), "connected");

    if let Err(e) = run(&transport, command).await {
        error!(transport = %transport.id(), "{}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(
    transport: &StoreTransport,
    command: Command,
) -> Result<()> {
    match command {
        Command::List(id) => {
            let filter = id.map_or_else(ListFilter::all, ListFilter::id);
            let mut entities = transport.list(filter);
            while let Some(item) = entities.next().await {
                match item? {
                    ListItem::Entity { id } => println!("{id}"),
                    ListItem::End => break,
                }
            }
        }
        Command::Bands(id) => {
            for band in transport.bands(&id).await? {
                println!("{band}");
            }
        }
        Command::Get(id, band) => {
            let record = transport.get(&EntityRef::new(id, band)).await?;
            print_value(record.value());
        }
        Command::Put(id, band, raw) => {
            let value: Document = serde_json::from_str(&raw)
                .map_err(|e| Error::InvalidRequest(format!("value is not a JSON object: {e}")))?;
            let record = transport
                .put(&EntityRef::new(id, band), value, PutOptions::default())
                .await?;
            print_value(record.value());
        }
        Command::Remove(id, band) => {
            transport.remove(&EntityRef::new(id, band)).await?;
        }
        Command::Watch(id, band) => {
            let filter = UpdateFilter::new(id.as_deref(), band.as_deref());
            let mut updates = transport.updated(filter).await?;
            info!("watching for changes. Waiting for CTRL+C signal...");
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    notice = updates.next() => {
                        let Some(notice) = notice else { break };
                        // notices carry no value; read the current one
                        let record = transport.get(&notice.entity()).await?;
                        print!("{}/{} ", record.id, record.band);
                        print_value(record.value());
                    }
                    _ = &mut shutdown => break,
                }
            }
        }
    }
    Ok(())
}

fn print_value(value: Option<&Document>) {
    match value.map(serde_json::to_string_pretty) {
        Some(Ok(json)) => println!("{json}"),
        Some(Err(e)) => error!("value not printable: {}", e),
        None => println!("(missing)"),
    }
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {:?}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
}
