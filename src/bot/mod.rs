//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for the `SplitBuddy` application,
//! including all slash commands, autocomplete handlers, channel notifications,
//! and bot context management.

/// Discord command implementations (group, bill, general)
pub mod commands;
/// Discord interaction handlers (autocomplete, etc.)
pub mod handlers;
/// Posts settlement events to group channels
pub mod notifier;

use crate::{
    config::settings::Settings,
    core::{
        bank_link::ConfiguredBankLinks,
        transaction::{SettlementEngine, spawn_deadline_sweeper},
    },
    errors::{Error, Result},
};
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Shared data available to all bot commands.
/// This structure holds the database connection, the settlement engine and
/// the loaded settings.
pub struct BotData {
    /// Database connection for all database operations
    pub database: Arc<DatabaseConnection>,
    /// Settlement lifecycle operations
    pub engine: SettlementEngine,
    /// Settings loaded at startup
    pub settings: Settings,
}

impl BotData {
    /// Creates a new `BotData` instance.
    #[must_use]
    pub const fn new(database: Arc<DatabaseConnection>, engine: SettlementEngine, settings: Settings) -> Self {
        Self {
            database,
            engine,
            settings,
        }
    }
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {error}");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            match &error {
                Error::Database(_) | Error::Io(_) | Error::FrameworkError(_) => {
                    error!("Error in command `{}`: {error:?}", ctx.command().name);
                }
                _ => info!("Command `{}` rejected: {error}", ctx.command().name),
            }
            if let Err(e) = ctx.say(format!("❌ {error}")).await {
                error!("Failed to send error message: {e}");
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {e}");
            }
        }
    }
}

/// Connects to Discord and runs the bot until the gateway closes.
///
/// The deadline sweeper is started once the bot is ready.
#[instrument(skip(token, database, settings))]
pub async fn run_bot(token: String, database: DatabaseConnection, settings: Settings) -> Result<()> {
    let database = Arc::new(database);
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::help(),
                commands::group(),
                commands::bill(),
            ],
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Registered {} commands globally", framework.options().commands.len());

                let notifier =
                    notifier::ChannelNotifier::new(Arc::clone(&ctx.http), Arc::clone(&database));
                let engine = SettlementEngine::new(
                    Arc::clone(&database),
                    Arc::new(notifier),
                    Arc::new(ConfiguredBankLinks::from_settings(&settings.bank_link)),
                    settings.settlement.clone(),
                );
                spawn_deadline_sweeper(engine.clone());

                Ok(BotData::new(database, engine, settings))
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot client...");
    client.start().await?;
    Ok(())
}

pub use commands::*;
pub use handlers::*;
