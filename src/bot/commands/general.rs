//! General Discord commands - ping, help, and other utility commands.
//! This module contains simple commands that don't require database operations
//! and provide basic bot functionality and user assistance.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let window = ctx.data().settings.settlement.allocation_window_minutes;
        let help_text = format!(
            "**SplitBuddy Help**\n\
        Split a shared bill fairly, down to the cent.\n\n\
        **Groups**\n\
        • `/group create <name>` - Creates a group in this channel with you as host.\n\
        • `/group join` / `/group leave` - Joins or leaves this channel's group.\n\
        • `/group members` - Lists the group's members.\n\n\
        **Bills**\n\
        • `/bill start <even|items>` - Opens a bill (host only).\n\
        • `/bill receipt <file>` - Uploads an extracted receipt as JSON.\n\
        • `/bill item <name> <price>` - Adds an item by hand.\n\
        • `/bill claim <item>` - Claims or releases an item.\n\
        • `/bill assign <item> [members]` - Sets who shares an item.\n\
        • `/bill tip <amount>` / `/bill subtotal <amount>` - Adjusts the bill.\n\
        • `/bill status` - Shows items, claims and allocations.\n\
        • `/bill finalize` - Computes what everyone owes.\n\
        • `/bill settle` - Records the bill as paid.\n\n\
        Bills not finalized within {window} minutes are split evenly without tip.\n\
        • `/ping` - Checks if the bot is responsive."
        );

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
