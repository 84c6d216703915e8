use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use dotenv::dotenv;
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use message_board::config::Config;
use message_board::reconciler::PAGE_SIZE;
use message_board::session::{validate_content, Profile, Session};
use message_board::{
    HttpTransport, Message, MessageId, MessageStatus, ReconcileError, Reconciler, Snapshot,
};

type Client = Reconciler<HttpTransport>;

const HELP: &str = "Commands: list | send <text> | delete <id> | retry <temp-id> | \
                    discard <temp-id> | search <query> | show <id> | exit";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    let transport = HttpTransport::new(&config.base_url, config.request_timeout)
        .with_context(|| format!("invalid API base URL {}", config.base_url))?;

    transport
        .auth_health()
        .await
        .context("Please confirm your auth server is up")?;

    let token = config
        .access_token
        .clone()
        .context("MESSAGES_ACCESS_TOKEN is not set")?;
    let profile = match &config.id_token {
        Some(id_token) => {
            Profile::from_id_token(id_token).context("could not read MESSAGES_ID_TOKEN")?
        }
        None => Profile::default(),
    };
    let session = Arc::new(Session::new(token, profile));
    let author = session.author();
    info!("signed in as {} against {}", author, transport.base_url());

    let client = Arc::new(Reconciler::new(Arc::new(transport), config.failed_send));
    spawn_renderer(&client, author.clone());

    if let Err(e) = client.load(&session.token).await {
        println!("Error: {}", e);
    }
    println!("{}", HELP);

    run_prompt(client, session, author).await
}

/// Prints the list again whenever its contents or the error change.
fn spawn_renderer(client: &Arc<Client>, me: String) {
    let mut updates = client.subscribe();
    tokio::spawn(async move {
        let mut shown = Snapshot::default();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.messages == shown.messages && snapshot.error == shown.error {
                continue;
            }
            render(&snapshot, &me);
            shown = snapshot;
        }
    });
}

async fn run_prompt(client: Arc<Client>, session: Arc<Session>, author: String) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();

    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout())?;

        input.clear();
        if reader.read_line(&mut input).await? == 0 {
            break;
        }
        let line = input.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim_start();

        match command.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => {
                println!("Exiting client...");
                break;
            }
            "help" => println!("{}", HELP),
            "list" | "refresh" => {
                spawn_command(&client, &session, |client, session| async move {
                    client.load(&session.token).await?;
                    Ok::<(), ReconcileError>(())
                });
            }
            "send" => {
                let Some(content) = validate_content(rest) else {
                    println!("Message cannot be empty");
                    continue;
                };
                let content = content.to_string();
                let me = author.clone();
                spawn_command(&client, &session, move |client, session| async move {
                    client.submit(&session.token, &me, &content).await?;
                    Ok::<(), ReconcileError>(())
                });
            }
            _ if rest.is_empty() => println!("{}", HELP),
            "delete" => {
                let id = MessageId::parse(rest);
                if let Some(message) = client.snapshot().messages.iter().find(|m| m.id == id) {
                    if !message.is_authored_by(&author) {
                        println!("You can only delete your own messages");
                        continue;
                    }
                }
                spawn_command(&client, &session, move |client, session| async move {
                    client.remove(&session.token, &id).await?;
                    Ok::<(), ReconcileError>(())
                });
            }
            "retry" => {
                let id = MessageId::parse(rest);
                spawn_command(&client, &session, move |client, session| async move {
                    client.retry(&session.token, &id).await?;
                    Ok::<(), ReconcileError>(())
                });
            }
            "discard" => {
                let id = MessageId::parse(rest);
                spawn_command(&client, &session, move |client, _| async move {
                    client.discard(&id).await?;
                    Ok::<(), ReconcileError>(())
                });
            }
            "search" => {
                let query = rest.to_string();
                let me = author.clone();
                spawn_command(&client, &session, move |client, session| async move {
                    let found = client.search(&session.token, &query, PAGE_SIZE, 0).await?;
                    println!("{} result(s) for {:?}", found.len(), query);
                    for message in &found {
                        println!("  {}", format_message(message, &me));
                    }
                    Ok::<(), ReconcileError>(())
                });
            }
            "show" => {
                let id = MessageId::parse(rest);
                let me = author.clone();
                spawn_command(&client, &session, move |client, session| async move {
                    match client.fetch(&session.token, &id).await? {
                        Some(message) => println!("  {}", format_message(&message, &me)),
                        None => println!("Message {} not found", id),
                    }
                    Ok::<(), ReconcileError>(())
                });
            }
            _ => println!("Unknown command. {}", HELP),
        }
    }

    Ok(())
}

/// Runs a command without blocking the prompt; its outcome is printed when it
/// completes.
fn spawn_command<F, Fut>(client: &Arc<Client>, session: &Arc<Session>, command: F)
where
    F: FnOnce(Arc<Client>, Arc<Session>) -> Fut,
    Fut: Future<Output = Result<(), ReconcileError>> + Send + 'static,
{
    let task = command(Arc::clone(client), Arc::clone(session));
    tokio::spawn(async move {
        if let Err(e) = task.await {
            error!("command failed: {}", e);
            println!("Error: {}", e);
        }
    });
}

fn render(snapshot: &Snapshot, me: &str) {
    println!();
    if let Some(err) = &snapshot.error {
        println!("Error: {}", err);
    }
    if snapshot.messages.is_empty() {
        println!("No messages yet.");
    }
    for message in &snapshot.messages {
        println!("  {}", format_message(message, me));
    }
}

fn format_message(message: &Message, me: &str) -> String {
    let status = match message.status {
        MessageStatus::Confirmed => "",
        MessageStatus::Pending => " (sending...)",
        MessageStatus::Failed => " (failed, retry or discard)",
    };
    let own = if message.is_confirmed() && message.is_authored_by(me) {
        " [yours]"
    } else {
        ""
    };
    format!(
        "[{}] {} {}: {}{}{}",
        format_timestamp(message.created_at),
        message.id,
        message.author,
        message.content,
        status,
        own
    )
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
