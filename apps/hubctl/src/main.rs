use anyhow::Result;
use clap::Parser;
use client_core::{ClientEvent, ControlState, HubClient};
use shared::domain::{ChannelId, ChannelKind, SwitchAction};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::debug;

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the hub, e.g. http://192.168.4.1
    #[arg(long)]
    hub_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(hub_url) = args.hub_url {
        settings.hub_url = hub_url;
    }
    let hub_url = config::validate_hub_url(&settings.hub_url)?;

    let client = HubClient::new(hub_url.clone());
    let mut events = BroadcastStream::new(client.subscribe_events());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let Ok(event) = event else {
                continue;
            };
            print_event(event);
        }
    });

    client.start().await?;
    println!("hubctl: connecting to {hub_url} (type `help` for commands)");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "help" => print_help(),
            "list" => {
                let panel = client.panel_snapshot().await;
                if panel.is_empty() {
                    println!("(no channels loaded yet)");
                }
                for binding in panel {
                    let description = binding.description.as_deref().unwrap_or("");
                    match binding.control {
                        ControlState::Switch { reading } => {
                            println!("{:<6} digital  {:<6} {description}", binding.id, reading);
                        }
                        ControlState::Slider { level, .. } => {
                            println!("{:<6} pwm      {:<6} {description}", binding.id, level);
                        }
                    }
                }
            }
            "reload" => {
                if let Err(err) = client.load_panel().await {
                    eprintln!("reload failed: {err}");
                }
            }
            other => dispatch_line(&client, other).await,
        }
    }

    Ok(())
}

/// Turns one console line (`CH1=ON`, `CH5=120`) into a wire command,
/// validating against the loaded panel first; the dispatcher itself does
/// no validation.
async fn dispatch_line(client: &HubClient, line: &str) {
    let Some((id, value)) = line.split_once('=') else {
        eprintln!("unrecognized input '{line}' (try `help`)");
        return;
    };
    let id = ChannelId::new(id.trim());
    let value = value.trim();

    let Some(binding) = client.binding(&id).await else {
        eprintln!("unknown channel '{id}' (try `list`)");
        return;
    };

    let sent = match binding.kind {
        ChannelKind::Digital => match value {
            "ON" => client.set_switch(&id, SwitchAction::On).await,
            "OFF" => client.set_switch(&id, SwitchAction::Off).await,
            _ => {
                eprintln!("channel {id} takes ON or OFF");
                return;
            }
        },
        ChannelKind::Pwm => match value.parse::<u8>() {
            Ok(level) => client.set_level(&id, level).await,
            Err(_) => {
                eprintln!("channel {id} takes a level 0-255");
                return;
            }
        },
    };

    if sent {
        debug!(channel = %id, value, "command dispatched");
    } else {
        eprintln!("link is not open; command dropped");
    }
}

fn print_event(event: ClientEvent) {
    match event {
        ClientEvent::LinkStateChanged(state) => println!("[link] {state:?}"),
        ClientEvent::PanelRebuilt { channels } => {
            let ids: Vec<&str> = channels.iter().map(|id| id.as_str()).collect();
            println!("[panel] {} channels: {}", ids.len(), ids.join(", "));
        }
        ClientEvent::ControlUpdated { id, reading } => println!("[state] {id} -> {reading}"),
        ClientEvent::ResyncStarted { reason } => println!("[resync] {reason:?}"),
        ClientEvent::Error(message) => eprintln!("[error] {message}"),
    }
}

fn print_help() {
    println!("commands:");
    println!("  <id>=ON | <id>=OFF   switch a digital channel, e.g. CH1=ON");
    println!("  <id>=<0-255>         set a pwm channel, e.g. CH5=120");
    println!("  list                 show the current control panel");
    println!("  reload               refetch channel descriptors");
    println!("  quit                 exit");
}
