//! Group Discord commands - create a group in a channel, join, leave, and list members.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::commands::utils::{Context, author_id, channel_group, mention},
        core::group,
        errors::Result,
    };

    /// Parent command for managing the group bound to this channel.
    #[poise::command(
        slash_command,
        subcommands("group_create", "group_join", "group_leave", "group_members")
    )]
    pub async fn group(ctx: Context<'_>) -> Result<()> {
        let help_text = "Group command. Available subcommands:\n\
            `/group create` - Create a group in this channel, with you as host\n\
            `/group join` - Join this channel's group\n\
            `/group leave` - Leave this channel's group\n\
            `/group members` - List the members of this channel's group";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Creates a group in this channel. You become its host.
    #[poise::command(slash_command, rename = "create")]
    pub async fn group_create(
        ctx: Context<'_>,
        #[description = "Name of the group (e.g., 'Friday dinner')"] name: String,
    ) -> Result<()> {
        let created = group::create_group(
            &*ctx.data().database,
            name,
            author_id(ctx),
            Some(ctx.channel_id().to_string()),
        )
        .await?;

        ctx.say(format!(
            "✅ Group **{}** created. Others can join with `/group join`.",
            created.name
        ))
        .await?;
        Ok(())
    }

    /// Joins this channel's group.
    #[poise::command(slash_command, rename = "join")]
    pub async fn group_join(ctx: Context<'_>) -> Result<()> {
        let found = channel_group(ctx).await?;
        group::add_member(&*ctx.data().database, found.id, author_id(ctx)).await?;

        ctx.say(format!("✅ You are a member of **{}**.", found.name))
            .await?;
        Ok(())
    }

    /// Leaves this channel's group. The host cannot leave.
    #[poise::command(slash_command, rename = "leave")]
    pub async fn group_leave(ctx: Context<'_>) -> Result<()> {
        let found = channel_group(ctx).await?;
        group::remove_member(&*ctx.data().database, found.id, &author_id(ctx)).await?;

        ctx.say(format!("👋 You left **{}**.", found.name)).await?;
        Ok(())
    }

    /// Lists the members of this channel's group in join order.
    #[poise::command(slash_command, rename = "members")]
    pub async fn group_members(ctx: Context<'_>) -> Result<()> {
        let found = channel_group(ctx).await?;
        let members = group::get_member_ids(&*ctx.data().database, found.id).await?;

        let lines: Vec<String> = members
            .iter()
            .map(|member| {
                if *member == found.host_id {
                    format!("• {} (host)", mention(member))
                } else {
                    format!("• {}", mention(member))
                }
            })
            .collect();

        ctx.say(format!("**{}** members:\n{}", found.name, lines.join("\n")))
            .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
