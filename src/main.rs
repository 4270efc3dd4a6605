mod cache;
mod config;
mod gateway;
mod host;
mod http;
mod logging;
mod network;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::cache::{BucketStorage, NoopStorage, SqliteStorage};
use crate::config::Config;
use crate::gateway::{Gateway, MessageOutcome};
use crate::host::{ConsoleEnvironment, Host, HostEvent};
use crate::http::Request;
use crate::network::{HttpNetwork, Network, OfflineNetwork};

#[derive(Parser, Debug)]
#[command(name = "swgate")]
#[command(about = "An offline-first caching gateway for read-only REST APIs")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swgate/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Behave as if the network were unreachable
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install and activate the configured deployment, even if already active
  Install,
  /// Request one or more URLs through the gateway
  Fetch {
    urls: Vec<String>,
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Treat the requests as document navigations
    #[arg(long)]
    navigate: bool,
    /// Print response headers
    #[arg(short, long)]
    include: bool,
  },
  /// Pre-cache the API listing, or a single API URL
  Warm { url: Option<String> },
  /// Show a notification through the gateway
  Notify { body: String },
  /// Post a raw JSON control message
  Message { json: String },
  /// List buckets in the store
  Buckets,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  if config.storage.enabled {
    let storage = SqliteStorage::open(config.storage.path.as_deref())?;
    run(config, Arc::new(storage), args).await
  } else {
    run(config, Arc::new(NoopStorage), args).await
  }
}

async fn run<S: BucketStorage + 'static>(config: Config, storage: Arc<S>, args: Args) -> Result<()> {
  let network: Arc<dyn Network> = if args.offline {
    Arc::new(OfflineNetwork)
  } else {
    Arc::new(HttpNetwork::new(&config.network)?)
  };

  let gateway = Gateway::new(
    config.gateway,
    Arc::clone(&storage),
    network,
    Arc::new(ConsoleEnvironment::new(config.host.notifications)),
  )?;

  if let Command::Buckets = args.command {
    return list_buckets(&gateway, storage.as_ref());
  }

  if let Command::Install = args.command {
    let install = gateway.on_install().await;
    for entry in &install.warmed {
      println!("warmed  {}", entry);
    }
    for entry in &install.failed {
      println!("failed  {}", entry);
    }

    let activation = gateway.on_activate().await;
    for bucket in &activation.purged {
      println!("purged  {}", bucket);
    }
    return Ok(());
  }

  let mut host = Host::new(gateway);
  host.start().await;

  match args.command {
    Command::Fetch {
      urls,
      method,
      navigate,
      include,
    } => {
      let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

      let mut requests = Vec::with_capacity(urls.len());
      for url in &urls {
        let request = Request::parse(method.clone(), url, host.gateway().origin())?;
        requests.push(if navigate { request.navigate() } else { request });
      }

      // Requests run concurrently, output keeps argument order
      let tx = host.sender();
      let runner = tokio::spawn(host.run());
      let mut replies = Vec::with_capacity(requests.len());
      for request in requests {
        let (reply, response) = oneshot::channel();
        tx.send(HostEvent::Fetch { request, reply })
          .map_err(|_| eyre!("Gateway stopped"))?;
        replies.push(response);
      }
      drop(tx);

      let mut stdout = std::io::stdout();
      for (url, reply) in urls.iter().zip(replies) {
        match reply.await {
          Ok(Ok(response)) => {
            writeln!(stdout, "{} {} ({})", response.status, url, response.source)?;
            if include {
              for (name, value) in &response.headers {
                writeln!(stdout, "{}: {}", name, value)?;
              }
              writeln!(stdout)?;
            }
            stdout.write_all(&response.body)?;
            writeln!(stdout)?;
          }
          Ok(Err(e)) => eprintln!("{}: {}", url, e),
          Err(_) => eprintln!("{}: no response", url),
        }
      }

      runner.await?;
    }
    Command::Warm { url } => {
      let message = serde_json::json!({ "type": "CACHE_POKEMON", "url": url });
      print_outcome(host.gateway().on_message(message).await);
    }
    Command::Notify { body } => {
      let message = serde_json::json!({ "type": "SHOW_NOTIFICATION", "body": body });
      print_outcome(host.gateway().on_message(message).await);
    }
    Command::Message { json } => {
      let message =
        serde_json::from_str(&json).map_err(|e| eyre!("Message is not valid JSON: {}", e))?;
      host.dispatch(HostEvent::Message(message));
      host.drain().await;
    }
    Command::Install | Command::Buckets => {}
  }

  Ok(())
}

fn list_buckets<S: BucketStorage>(gateway: &Gateway<S>, storage: &S) -> Result<()> {
  let namespaces = gateway.namespaces();

  for name in storage.bucket_names()? {
    let status = match namespaces.role_of(&name) {
      Some(role) if namespaces.is_stale(&name, role) => "stale",
      Some(_) => "current",
      None => "foreign",
    };
    let entries = storage.entry_keys(&name)?.len();
    println!("{:<40} {:>6} {}", name, entries, status);
  }

  Ok(())
}

fn print_outcome(outcome: MessageOutcome) {
  match outcome {
    MessageOutcome::Warmed(report) => {
      for url in &report.stored {
        println!("stored  {}", url);
      }
      for url in &report.failed {
        println!("failed  {}", url);
      }
    }
    MessageOutcome::Notified { shown } => {
      if !shown {
        println!("notification not shown");
      }
    }
    MessageOutcome::Ignored => println!("message ignored"),
  }
}
