//! Helpers shared by the group and bill commands.

use crate::{
    bot::BotData,
    core::{group, transaction::SettlementEngine},
    entities::{group as group_entity, transaction},
    errors::{Error, Result},
};

/// Poise context used by every command
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// Discord ID of the invoking user
pub fn author_id(ctx: Context<'_>) -> String {
    ctx.author().id.to_string()
}

/// The group bound to the channel the command was used in
pub async fn channel_group(ctx: Context<'_>) -> Result<group_entity::Model> {
    let channel_id = ctx.channel_id().to_string();
    group::get_group_by_channel(&*ctx.data().database, &channel_id)
        .await?
        .ok_or_else(|| Error::not_found("group for this channel", channel_id))
}

/// The channel group's open bill
pub async fn open_bill(ctx: Context<'_>) -> Result<(group_entity::Model, transaction::Model)> {
    let found = channel_group(ctx).await?;
    let bill = ctx
        .data()
        .engine
        .get_pending_for_group(found.id)
        .await?
        .ok_or_else(|| Error::not_found("open bill for group", found.id))?;
    Ok((found, bill))
}

/// The channel group's most recent bill, open or settled
pub async fn latest_bill(ctx: Context<'_>) -> Result<transaction::Model> {
    let found = channel_group(ctx).await?;
    latest_for(&ctx.data().engine, found.id).await
}

async fn latest_for(engine: &SettlementEngine, group_id: i64) -> Result<transaction::Model> {
    engine
        .get_latest_for_group(group_id)
        .await?
        .ok_or_else(|| Error::not_found("bill for group", group_id))
}

/// Extracts user IDs from mentions like `<@123>` or `<@!123>`, or bare IDs.
pub fn parse_member_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|token| {
            let id = token
                .trim_start_matches("<@")
                .trim_start_matches('!')
                .trim_end_matches('>');
            (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
        })
        .collect()
}

/// Renders a member ID as a Discord mention
pub fn mention(member_id: &str) -> String {
    format!("<@{member_id}>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member_list() {
        let parsed = parse_member_list("<@123> <@!456>, 789 bob <@>");
        assert_eq!(parsed, vec!["123", "456", "789"]);
    }

    #[test]
    fn test_parse_member_list_empty() {
        assert!(parse_member_list("  ").is_empty());
    }
}
