//! Circulapp CLI - circular-economy marketplace client
//!
//! Browse and publish reusable materials, and chat with other members,
//! from the terminal.

mod api;
mod auth;
mod chat;
mod config;
mod error;
mod market;
mod models;
mod notify;
mod pages;
mod profile;
mod prompt;
mod realtime;
mod render;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::market::publish::{ItemEdit, ItemForm};
use crate::models::{Category, ItemStatus};
use crate::notify::Notification;
use crate::profile::ProfileEdit;

#[derive(Parser)]
#[command(name = "circulapp")]
#[command(about = "Terminal client for the Circulapp circular-economy marketplace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with e-mail and password, or with Google/Facebook
    Login {
        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long, conflicts_with = "provider")]
        password: Option<String>,

        /// Federated provider to sign in with
        #[arg(long, value_enum)]
        provider: Option<auth::Provider>,
    },

    /// Create an account
    Signup {
        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        password: Option<String>,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(long)]
        full_name: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show current authentication status
    Status,

    /// Send a password-reset e-mail
    ResetPassword {
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Finish a password reset from the link in the e-mail
    Recover {
        /// Address the reset link opened
        url: String,

        #[arg(long)]
        new_password: Option<String>,
    },

    /// Set the backend project to talk to
    Configure {
        /// Project URL (https://<ref>.supabase.co)
        #[arg(long)]
        url: Option<String>,

        /// Project anon (public) key
        #[arg(long)]
        anon_key: Option<String>,

        /// Storage bucket for item images
        #[arg(long)]
        bucket: Option<String>,

        /// Web app address used in e-mail redirects
        #[arg(long)]
        site_url: Option<String>,
    },

    /// Show your profile
    Whoami,

    /// Show your publishing statistics
    Stats,

    /// Manage your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Browse and manage marketplace items
    Items {
        #[command(subcommand)]
        command: ItemsCommand,
    },

    /// Contact the owner of an item
    Contact {
        /// Item ID (from `items list` output)
        item_id: String,

        /// First message to send
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List your conversations
    Chats {
        /// Only conversations whose counterpart matches this name
        #[arg(short, long)]
        search: Option<String>,

        /// Open (or reuse) a conversation with this user ID first
        #[arg(long = "with")]
        with_user: Option<String>,

        /// Keep running and reprint the list when it changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Open a conversation and chat interactively
    Chat {
        /// Conversation ID (from `chats` output)
        conversation_id: String,
    },

    /// Send a message
    Send {
        /// Conversation ID (from `chats` output)
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,

        /// Item the message refers to
        #[arg(long)]
        item: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Change profile fields; an empty value clears optional ones
    Edit {
        #[arg(long)]
        full_name: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        bio: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum ItemsCommand {
    /// List available items
    List {
        /// Category (plastico, carton, vidrio, ...) or "todos"
        #[arg(short, long, default_value = "todos")]
        category: String,

        /// Minimum weight in kg
        #[arg(long)]
        min_weight: Option<f64>,

        /// Text to look for in title, description, category or owner
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one item
    Show { item_id: String },

    /// List your own items
    Mine,

    /// Publish a new item
    Publish {
        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        category: Option<Category>,

        /// Weight in kg
        #[arg(short, long)]
        weight: Option<f64>,

        #[arg(short, long)]
        location: Option<String>,

        /// Give the item away for free
        #[arg(long, conflicts_with = "price")]
        free: bool,

        #[arg(long)]
        price: Option<f64>,

        /// Image files (JPG, PNG, WebP or GIF, up to 5MB each, at most 10)
        #[arg(short, long = "image", required = true)]
        images: Vec<PathBuf>,
    },

    /// Edit one of your items
    Edit {
        item_id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        category: Option<Category>,

        #[arg(short, long)]
        weight: Option<f64>,

        #[arg(short, long)]
        location: Option<String>,

        /// Mark the item as free (true) or paid (false)
        #[arg(long)]
        free: Option<bool>,

        #[arg(long)]
        price: Option<f64>,

        /// Images to add to the gallery
        #[arg(short, long = "image")]
        images: Vec<PathBuf>,
    },

    /// Change the status of one of your items
    Status {
        item_id: String,

        /// disponible, reservado or retirado
        status: ItemStatus,
    },

    /// Delete one of your items
    Delete { item_id: String },
}

/// Description shown when a command fails for an unclassified reason.
fn fallback_message(command: &Commands) -> &'static str {
    match command {
        Commands::Login { .. } => "Error al iniciar sesión",
        Commands::Signup { .. } => "Error al registrarse",
        Commands::Logout | Commands::Status => "No se pudo leer la sesión",
        Commands::ResetPassword { .. } | Commands::Recover { .. } => {
            "No se pudo restablecer la contraseña"
        }
        Commands::Configure { .. } => "No se pudo guardar la configuración",
        Commands::Whoami | Commands::Profile { .. } => "No se pudo cargar el perfil",
        Commands::Stats => "No se pudieron cargar las estadísticas",
        Commands::Items { command } => match command {
            ItemsCommand::List { .. } => "No se pudieron cargar los ítems",
            ItemsCommand::Show { .. } => "No se pudo cargar el ítem",
            ItemsCommand::Mine => "No se pudieron cargar tus ítems",
            ItemsCommand::Publish { .. } => "No se pudo publicar el ítem",
            ItemsCommand::Edit { .. } | ItemsCommand::Status { .. } => {
                "No se pudo actualizar el material"
            }
            ItemsCommand::Delete { .. } => "No se pudo eliminar el material",
        },
        Commands::Contact { .. } => "No se pudo iniciar la conversación",
        Commands::Chats { .. } => "No se pudieron cargar las conversaciones",
        Commands::Chat { .. } => "No se pudieron cargar los mensajes",
        Commands::Send { .. } => "Error al enviar mensaje",
    }
}

async fn run_items(command: ItemsCommand) -> Result<()> {
    match command {
        ItemsCommand::List {
            category,
            min_weight,
            search,
        } => market::list_items(&category, min_weight, search).await,
        ItemsCommand::Show { item_id } => market::show_item(&item_id).await,
        ItemsCommand::Mine => market::my_items().await,
        ItemsCommand::Publish {
            title,
            description,
            category,
            weight,
            location,
            free,
            price,
            images,
        } => {
            let form = ItemForm {
                title: title.unwrap_or_default(),
                description: description.unwrap_or_default(),
                category,
                weight_kg: weight,
                location: location.unwrap_or_default(),
                is_free: free,
                price,
            };
            tracing::info!("Publishing item...");
            market::publish_item(form, images).await
        }
        ItemsCommand::Edit {
            item_id,
            title,
            description,
            category,
            weight,
            location,
            free,
            price,
            images,
        } => {
            let changes = ItemEdit {
                title,
                description,
                category,
                weight_kg: weight,
                location,
                is_free: free,
                price,
            };
            market::edit_item(&item_id, changes, images).await
        }
        ItemsCommand::Status { item_id, status } => {
            market::set_item_status(&item_id, status).await
        }
        ItemsCommand::Delete { item_id } => market::delete_item(&item_id).await,
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Login {
            email,
            password,
            provider,
        } => {
            tracing::info!("Starting authentication flow...");
            auth::login(email, password, provider).await
        }
        Commands::Signup {
            email,
            password,
            username,
            full_name,
        } => auth::signup(email, password, username, full_name).await,
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await
        }
        Commands::Status => auth::status().await,
        Commands::ResetPassword { email } => auth::reset_password(email).await,
        Commands::Recover { url, new_password } => auth::recover(&url, new_password).await,
        Commands::Configure {
            url,
            anon_key,
            bucket,
            site_url,
        } => config::configure(url, anon_key, bucket, site_url),
        Commands::Whoami => profile::whoami().await,
        Commands::Stats => profile::stats().await,
        Commands::Profile {
            command:
                ProfileCommand::Edit {
                    full_name,
                    username,
                    bio,
                    phone,
                    avatar_url,
                },
        } => {
            let edit = ProfileEdit {
                full_name,
                username,
                bio,
                phone,
                avatar_url,
            };
            profile::edit_profile(edit).await
        }
        Commands::Items { command } => run_items(command).await,
        Commands::Contact { item_id, message } => chat::contact_owner(&item_id, message).await,
        Commands::Chats {
            search,
            with_user,
            watch,
        } => {
            tracing::info!("Fetching conversations...");
            chat::list_chats(search, with_user, watch).await
        }
        Commands::Chat { conversation_id } => chat::open_chat(&conversation_id).await,
        Commands::Send { to, message, item } => {
            tracing::info!("Sending message...");
            chat::send_message(&to, &message, item).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let fallback = fallback_message(&cli.command);
    if let Err(e) = run(cli.command).await {
        tracing::debug!("Command failed: {:#}", e);
        Notification::from_error(&e, fallback).show();
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_publish_arguments() {
        let cli = Cli::try_parse_from([
            "circulapp",
            "items",
            "publish",
            "--title",
            "Cartón de mudanza",
            "--weight",
            "12",
            "--category",
            "carton",
            "--location",
            "Palermo",
            "--free",
            "--image",
            "caja.jpg",
        ])
        .unwrap();
        match cli.command {
            Commands::Items {
                command:
                    ItemsCommand::Publish {
                        category,
                        weight,
                        free,
                        images,
                        ..
                    },
            } => {
                assert_eq!(category, Some(Category::Cardboard));
                assert_eq!(weight, Some(12.0));
                assert!(free);
                assert_eq!(images, vec![PathBuf::from("caja.jpg")]);
            }
            _ => panic!("expected items publish"),
        }
    }

    #[test]
    fn test_publish_needs_an_image() {
        assert!(Cli::try_parse_from(["circulapp", "items", "publish", "--title", "Latas"]).is_err());
    }

    #[test]
    fn test_status_parses_wire_names() {
        let cli =
            Cli::try_parse_from(["circulapp", "items", "status", "i1", "reservado"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Items {
                command: ItemsCommand::Status {
                    status: ItemStatus::Reserved,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_fallback_messages() {
        let cli = Cli::try_parse_from(["circulapp", "contact", "i1"]).unwrap();
        assert_eq!(
            fallback_message(&cli.command),
            "No se pudo iniciar la conversación"
        );
        let cli = Cli::try_parse_from(["circulapp", "send", "--to", "c1", "hola"]).unwrap();
        assert_eq!(fallback_message(&cli.command), "Error al enviar mensaje");
    }
}
