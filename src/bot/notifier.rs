//! Delivers [`GroupEvent`]s to the Discord channel a group was created in.

use crate::{
    core::{
        group,
        notify::{GroupEvent, GroupNotifier, LoggingNotifier},
    },
    errors::Result,
};
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Posts events as plain messages in the group's channel
#[derive(Clone)]
pub struct ChannelNotifier {
    http: Arc<serenity::Http>,
    db: Arc<DatabaseConnection>,
}

impl ChannelNotifier {
    /// Creates a notifier that sends through `http`
    #[must_use]
    pub const fn new(http: Arc<serenity::Http>, db: Arc<DatabaseConnection>) -> Self {
        Self { http, db }
    }
}

async fn deliver(
    http: &serenity::Http,
    db: &DatabaseConnection,
    group_id: i64,
    event: &GroupEvent,
) -> Result<()> {
    let Some(found) = group::get_group(db, group_id).await? else {
        debug!("Group {group_id} vanished before its event was delivered");
        return Ok(());
    };
    let Some(channel_id) = found
        .channel_id
        .as_deref()
        .and_then(|id| id.parse::<u64>().ok())
        .filter(|id| *id != 0)
    else {
        debug!("Group {group_id} has no channel");
        return Ok(());
    };

    serenity::ChannelId::new(channel_id)
        .say(http, event.to_string())
        .await?;
    Ok(())
}

impl GroupNotifier for ChannelNotifier {
    fn notify(&self, group_id: i64, event: GroupEvent) {
        LoggingNotifier.notify(group_id, event.clone());
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = deliver(&notifier.http, &notifier.db, group_id, &event).await {
                warn!("Could not notify group {group_id}: {e}");
            }
        });
    }
}
