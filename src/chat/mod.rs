//! Conversations: directory, message threads, realtime sync and contact.

pub mod bridge;
pub mod contact;
pub mod directory;
pub mod thread;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::{MarketStore, SupabaseClient};
use crate::error::AppError;
use crate::models::{ConversationSummary, Message, Profile};
use crate::notify::Notification;
use crate::pages;
use crate::realtime::RealtimeClient;
use crate::render;
use bridge::ThreadUpdate;
use contact::{Contact, ContactOutcome};
use thread::MessageThread;

fn print_directory(list: &[&ConversationSummary]) {
    pages::CHATS.render();
    if list.is_empty() {
        println!("  (no conversations)");
        return;
    }

    for summary in list {
        let unread = if summary.unread_count > 0 {
            format!(" ({} sin leer)", summary.unread_count)
        } else {
            String::new()
        };
        println!("{}{}", summary.other_user.display_name(), unread);
        println!("  ID: {}", summary.id());
        match summary.last_message {
            Some(ref last) => println!(
                "  [{}] {}",
                last.created_at.with_timezone(&Local).format("%d/%m %H:%M"),
                render::preview(&last.content, 60)
            ),
            None => println!("  Sin mensajes"),
        }
        println!();
    }
}

/// How often a long-running view checks whether its token needs refreshing.
const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Refresh the session if it is about to expire and hand the current token
/// to the realtime connection.
async fn sync_realtime_token(client: &SupabaseClient, realtime: &RealtimeClient) {
    match client.access_token().await {
        Ok(token) => realtime.set_token(token),
        Err(e) => tracing::warn!("Could not refresh session: {:#}", e),
    }
}

async fn show_directory(client: &SupabaseClient, search: Option<&str>) -> Result<()> {
    let session = client.session()?;
    let list = directory::load(client, session)
        .await
        .context("No se pudieron cargar las conversaciones")?;
    let shown = directory::search(&list, search.unwrap_or(""));
    print_directory(&shown);
    Ok(())
}

/// List conversations, optionally opening one with `open_with` first and
/// following changes live with `watch`.
pub async fn list_chats(search: Option<String>, open_with: Option<String>, watch: bool) -> Result<()> {
    let client = SupabaseClient::connect().await?;

    if let Some(ref other) = open_with {
        let id = directory::open_with(&client, client.session()?, other).await?;
        println!("Conversation: {}", id);
    }
    show_directory(&client, search.as_deref()).await?;

    if !watch {
        return Ok(());
    }

    let session = client.session()?;
    let realtime = RealtimeClient::start(client.project().clone(), client.access_token().await?);
    let mut sub = realtime.subscribe(
        &format!("conversations:{}", session.user_id()),
        bridge::directory_bindings(session.user_id()),
    );
    let mut token_check = tokio::time::interval(TOKEN_CHECK_INTERVAL);
    token_check.tick().await;
    println!("Watching for changes... (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = token_check.tick() => sync_realtime_token(&client, &realtime).await,
            notice = sub.recv() => {
                let Some(notice) = notice else { break };
                if bridge::touches_directory(&notice) {
                    if let Err(e) = show_directory(&client, search.as_deref()).await {
                        Notification::from_error(&e, "No se pudieron cargar las conversaciones").show();
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }
    Ok(())
}

fn print_message(msg: &Message, actor: &str, other: &Profile) {
    let who = if msg.is_from(actor) {
        "Tú"
    } else {
        other.display_name()
    };
    let time = msg.created_at.with_timezone(&Local).format("%H:%M");
    let seen = if msg.is_from(actor) && msg.read_at.is_some() {
        " ✓"
    } else {
        ""
    };
    println!("[{}] {}: {}{}", time, who, msg.content, seen);
    if let Some(ref item) = msg.item {
        println!("        ↳ {} ({})", item.title, item.id);
    }
}

/// Counterpart profile of a conversation the actor takes part in.
async fn counterpart(client: &SupabaseClient, conversation_id: &str) -> Result<Profile> {
    let list = directory::load(client, client.session()?)
        .await
        .context("No se pudieron cargar las conversaciones")?;
    list.into_iter()
        .find(|s| s.id() == conversation_id)
        .map(|s| s.other_user)
        .ok_or_else(|| AppError::not_found("Conversation").into())
}

/// Interactive thread: prints the history, then new messages as they
/// arrive, and sends each line typed. `/quit` or Ctrl-C leaves.
pub async fn open_chat(conversation_id: &str) -> Result<()> {
    let client = Arc::new(SupabaseClient::connect().await?);
    let session = client.session()?.clone();

    let other = counterpart(&client, conversation_id).await?;
    let mut thread = MessageThread::new(Some(conversation_id.to_string()), &session);
    thread
        .fetch(client.as_ref())
        .await
        .context("No se pudieron cargar los mensajes")?;

    println!("\nChat con {}", other.display_name());
    println!("{:-<60}", "");
    if thread.messages().is_empty() {
        println!("(no messages)");
    }
    for msg in thread.messages() {
        print_message(msg, session.user_id(), &other);
    }
    println!("{:-<60}", "");
    println!("Type a message and press Enter. /quit to leave.");

    let realtime = RealtimeClient::start(client.project().clone(), client.access_token().await?);
    let mut sub = realtime.subscribe(
        &format!("messages:{}", conversation_id),
        bridge::thread_bindings(conversation_id),
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut token_check = tokio::time::interval(TOKEN_CHECK_INTERVAL);
    token_check.tick().await;

    loop {
        tokio::select! {
            _ = token_check.tick() => sync_realtime_token(&client, &realtime).await,
            line = lines.next_line() => {
                let line = match line.context("Failed to read from stdin")? {
                    Some(l) => l,
                    None => break,
                };
                if line.trim() == "/quit" {
                    break;
                }
                match thread.send(client.as_ref(), &line, None).await {
                    Ok(Some(sent)) => print_message(&sent, session.user_id(), &other),
                    Ok(None) => {}
                    Err(e) => Notification::from_error(&e, "Error al enviar mensaje").show(),
                }
            }
            notice = sub.recv() => {
                let Some(notice) = notice else { break };
                match bridge::apply_to_thread(&mut thread, &client, notice).await {
                    Ok(ThreadUpdate::Appended { message, .. }) => {
                        print_message(&message, session.user_id(), &other);
                    }
                    Ok(ThreadUpdate::Refetched) => {
                        tracing::debug!("Thread reloaded ({} messages)", thread.messages().len());
                    }
                    Ok(ThreadUpdate::AlreadyShown) | Ok(ThreadUpdate::Ignored) => {}
                    Err(e) => Notification::from_error(&e, "No se pudieron cargar los mensajes").show(),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }
    Ok(())
}

/// Send one message without opening the thread.
pub async fn send_message(conversation_id: &str, text: &str, item_id: Option<String>) -> Result<()> {
    let client = SupabaseClient::connect().await?;
    let session = client.session()?;
    let mut thread = MessageThread::new(Some(conversation_id.to_string()), session);
    match thread.send(&client, text, item_id).await? {
        Some(_) => println!("Message sent."),
        None => Notification::info("Mensaje vacío", "No se envió nada").show(),
    }
    Ok(())
}

/// Contact the owner of an item.
pub async fn contact_owner(item_id: &str, message: Option<String>) -> Result<()> {
    let client = Arc::new(SupabaseClient::connect_optional().await?);
    let item = client
        .item(item_id)
        .await
        .context("No se pudo cargar el ítem")?
        .ok_or_else(|| AppError::not_found("Item"))?;

    let contact = Contact::new(Arc::clone(&client));
    let outcome = contact
        .contact(client.session_opt(), &item, message.as_deref())
        .await?;
    outcome.notification().show();
    if let ContactOutcome::Opened { conversation_id } = outcome {
        println!("Open it with: circulapp chat {}", conversation_id);
    }
    Ok(())
}
