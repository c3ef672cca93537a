//! Bill Discord commands - the settlement lifecycle of a group's shared bill.
//!
//! Every subcommand works on the group bound to the current channel. Status
//! and settle look at the most recent bill; everything else needs an open one.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            commands::utils::{
                Context, author_id, channel_group, latest_bill, mention, open_bill,
                parse_member_list,
            },
            handlers::autocomplete,
        },
        core::{
            allocation::ClaimedItem,
            money::{format_cents, parse_amount},
            normalizer::{self, RawExtraction},
            validator,
        },
        entities::{SplitMode, TransactionStatus},
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;

    /// Largest receipt attachment accepted
    const MAX_RECEIPT_BYTES: u32 = 1024 * 1024;

    /// Below this, a line item is pointed out for review
    const REVIEW_CONFIDENCE: f64 = 0.9;

    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum SplitChoice {
        #[name = "even"]
        Even,
        #[name = "items"]
        Items,
    }

    impl From<SplitChoice> for SplitMode {
        fn from(choice: SplitChoice) -> Self {
            match choice {
                SplitChoice::Even => Self::EvenSplit,
                SplitChoice::Items => Self::ItemSplit,
            }
        }
    }

    /// Parent command for a group's shared bill.
    #[poise::command(
        slash_command,
        subcommands(
            "bill_start",
            "bill_tip",
            "bill_subtotal",
            "bill_receipt",
            "bill_item",
            "bill_claim",
            "bill_assign",
            "bill_status",
            "bill_finalize",
            "bill_settle"
        )
    )]
    pub async fn bill(ctx: Context<'_>) -> Result<()> {
        let help_text = "Bill command. Available subcommands:\n\
            `/bill start` - Open a bill for this channel's group (host only)\n\
            `/bill tip` / `/bill subtotal` - Set the tip or subtotal (creator only)\n\
            `/bill receipt` - Upload an extracted receipt as a JSON file\n\
            `/bill item` - Add an item by hand (creator only)\n\
            `/bill claim` - Claim or release an item\n\
            `/bill assign` - Set who shares an item\n\
            `/bill status` - Show the bill, items and claims\n\
            `/bill finalize` - Compute what everyone owes (creator only)\n\
            `/bill settle` - Record the bill as paid (creator only)";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Opens a bill for this channel's group. Host only.
    #[poise::command(slash_command, rename = "start")]
    pub async fn bill_start(
        ctx: Context<'_>,
        #[description = "Split evenly, or by claimed items"] mode: SplitChoice,
    ) -> Result<()> {
        let found = channel_group(ctx).await?;
        let bill = ctx
            .data()
            .engine
            .create_transaction(found.id, &author_id(ctx), mode.into())
            .await?;

        ctx.say(format!(
            "🧾 Bill #{} opened for **{}**. Allocation closes <t:{}:R>; after that it is split evenly without tip.",
            bill.id,
            found.name,
            bill.allocation_deadline.timestamp()
        ))
        .await?;
        Ok(())
    }

    /// Sets the tip on the open bill. Creator only.
    #[poise::command(slash_command, rename = "tip")]
    pub async fn bill_tip(
        ctx: Context<'_>,
        #[description = "Tip amount (e.g., 12.50)"] amount: String,
    ) -> Result<()> {
        let cents = parse_amount(&amount)?;
        let (_, bill) = open_bill(ctx).await?;
        let updated = ctx
            .data()
            .engine
            .set_tip(bill.id, &author_id(ctx), cents)
            .await?;

        ctx.say(format!(
            "✅ Tip set to {}. Total is now {}.",
            format_cents(updated.tip_cents),
            format_cents(updated.total_cents)
        ))
        .await?;
        Ok(())
    }

    /// Overrides the subtotal (tax included) of the open bill. Creator only.
    #[poise::command(slash_command, rename = "subtotal")]
    pub async fn bill_subtotal(
        ctx: Context<'_>,
        #[description = "Subtotal including tax (e.g., 84.20)"] amount: String,
    ) -> Result<()> {
        let cents = parse_amount(&amount)?;
        let (_, bill) = open_bill(ctx).await?;
        let updated = ctx
            .data()
            .engine
            .set_subtotal(bill.id, &author_id(ctx), cents)
            .await?;

        ctx.say(format!(
            "✅ Subtotal set to {}. Total is now {}.",
            format_cents(updated.subtotal_cents),
            format_cents(updated.total_cents)
        ))
        .await?;
        Ok(())
    }

    /// Uploads an extracted receipt (JSON) to the open bill.
    ///
    /// Replaces any earlier receipt, including its claims.
    #[poise::command(slash_command, rename = "receipt")]
    pub async fn bill_receipt(
        ctx: Context<'_>,
        #[description = "JSON file with the extracted receipt"] file: serenity::Attachment,
    ) -> Result<()> {
        if file.size > MAX_RECEIPT_BYTES {
            return Err(Error::InvalidInput {
                message: format!("receipt file is larger than {MAX_RECEIPT_BYTES} bytes"),
            });
        }

        ctx.defer().await?;
        let bytes = file.download().await?;
        let raw: RawExtraction = serde_json::from_slice(&bytes)?;
        let structured = normalizer::normalize(&raw);
        let confidence = validator::score_confidence(&raw, &structured);

        let (_, bill) = open_bill(ctx).await?;
        let uploaded = ctx
            .data()
            .engine
            .upload_receipt(bill.id, &author_id(ctx), &structured)
            .await?;

        let mut reply = format!(
            "🧾 Receipt with {} items added. Subtotal (tax included): {}.\n",
            uploaded.items.len(),
            format_cents(uploaded.subtotal_cents)
        );
        for (item, score) in uploaded.items.iter().zip(&confidence.line_items) {
            let flag = if *score < REVIEW_CONFIDENCE { " ⚠️" } else { "" };
            writeln!(
                &mut reply,
                "`#{}` {} {}{flag}",
                item.id,
                item.name,
                format_cents(item.price_cents)
            )?;
        }
        if !uploaded.report.is_valid {
            writeln!(&mut reply, "\n**Please double-check:**")?;
            for issue in &uploaded.report.issues {
                writeln!(&mut reply, "• {issue}")?;
            }
        }

        ctx.say(reply).await?;
        Ok(())
    }

    /// Adds an item to the open bill by hand. Creator only.
    #[poise::command(slash_command, rename = "item")]
    pub async fn bill_item(
        ctx: Context<'_>,
        #[description = "Item name"] name: String,
        #[description = "Item price (e.g., 9.99)"] price: String,
    ) -> Result<()> {
        let cents = parse_amount(&price)?;
        let (_, bill) = open_bill(ctx).await?;
        let item = ctx
            .data()
            .engine
            .add_line_item(bill.id, &author_id(ctx), &name, cents)
            .await?;

        ctx.say(format!(
            "✅ Added `#{}` {} {}.",
            item.id,
            item.name,
            format_cents(item.price_cents)
        ))
        .await?;
        Ok(())
    }

    /// Claims an item on the open bill, or releases it if you already claimed it.
    #[poise::command(slash_command, rename = "claim")]
    pub async fn bill_claim(
        ctx: Context<'_>,
        #[description = "Item to claim"]
        #[autocomplete = "autocomplete::autocomplete_line_item"]
        item: i64,
    ) -> Result<()> {
        let (_, bill) = open_bill(ctx).await?;
        let (claimed, claimants) = ctx
            .data()
            .engine
            .toggle_claim(bill.id, &author_id(ctx), item)
            .await?;

        let verb = if claimed { "claimed" } else { "released" };
        ctx.say(format!(
            "✅ You {verb} item `#{item}`. Shared by {} member(s).",
            claimants.len()
        ))
        .await?;
        Ok(())
    }

    /// Sets exactly who shares an item on the open bill.
    #[poise::command(slash_command, rename = "assign")]
    pub async fn bill_assign(
        ctx: Context<'_>,
        #[description = "Item to assign"]
        #[autocomplete = "autocomplete::autocomplete_line_item"]
        item: i64,
        #[description = "Members sharing it, as mentions (empty to clear)"] members: Option<
            String,
        >,
    ) -> Result<()> {
        let member_ids = members.as_deref().map(parse_member_list).unwrap_or_default();
        let (_, bill) = open_bill(ctx).await?;
        let stored = ctx
            .data()
            .engine
            .set_claims(bill.id, &author_id(ctx), item, &member_ids)
            .await?;

        if stored.is_empty() {
            ctx.say(format!("✅ Item `#{item}` is now unclaimed.")).await?;
        } else {
            let names: Vec<String> = stored.iter().map(|m| mention(m)).collect();
            ctx.say(format!("✅ Item `#{item}` is shared by {}.", names.join(", ")))
                .await?;
        }
        Ok(())
    }

    /// Shows the current bill with its items, claims, and allocations.
    #[poise::command(slash_command, rename = "status")]
    pub async fn bill_status(ctx: Context<'_>) -> Result<()> {
        let bill = latest_bill(ctx).await?;
        let engine = &ctx.data().engine;

        let mode = match bill.split_mode {
            SplitMode::EvenSplit => "Even split",
            SplitMode::ItemSplit => "Item split",
        };
        let state = match (bill.status, bill.recorded_at) {
            (TransactionStatus::PendingAllocation, _) => {
                format!("Open until <t:{}:t>", bill.allocation_deadline.timestamp())
            }
            (TransactionStatus::Settled, None) => "Finalized".to_string(),
            (TransactionStatus::Settled, Some(_)) => "Finalized and recorded".to_string(),
        };

        let mut summary = String::new();
        writeln!(&mut summary, "**Mode:** {mode}")?;
        writeln!(&mut summary, "**State:** {state}")?;
        writeln!(
            &mut summary,
            "**Subtotal:** {} (tax {})",
            format_cents(bill.subtotal_cents),
            format_cents(bill.tax_cents)
        )?;
        writeln!(&mut summary, "**Tip:** {}", format_cents(bill.tip_cents))?;
        write!(&mut summary, "**Total:** {}", format_cents(bill.total_cents))?;
        if bill.fallback_applied {
            write!(&mut summary, "\n*Deadline passed; split evenly without tip.*")?;
        }

        let mut embed_fields = Vec::new();
        if let Some((_, items)) = engine.get_receipt(bill.id).await? {
            let claims = engine.get_claims(bill.id).await?;
            let mut lines = String::new();
            for item in &items {
                let claimants = claims
                    .get(&item.id)
                    .filter(|c| !c.is_empty())
                    .map_or_else(
                        || "unclaimed".to_string(),
                        |c| c.iter().map(|m| mention(m)).collect::<Vec<_>>().join(" "),
                    );
                writeln!(
                    &mut lines,
                    "`#{}` {} {} - {claimants}",
                    item.id,
                    item.name,
                    format_cents(item.price_cents)
                )?;
            }
            if !lines.is_empty() {
                embed_fields.push(("Items".to_string(), lines, false));
            }
        }

        let allocations = engine.get_allocations(bill.id).await?;
        if !allocations.is_empty() {
            let mut lines = String::new();
            for allocation in &allocations {
                write!(
                    &mut lines,
                    "{} owes **{}**",
                    mention(&allocation.member_id),
                    format_cents(allocation.amount_cents)
                )?;
                let items: Vec<ClaimedItem> =
                    serde_json::from_str(&allocation.claimed_items).unwrap_or_default();
                if !items.is_empty() {
                    let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
                    write!(&mut lines, " ({})", names.join(", "))?;
                }
                lines.push('\n');
            }
            embed_fields.push(("Allocations".to_string(), lines, false));
        }

        let embed = serenity::CreateEmbed::default()
            .title(format!("🧾 Bill #{}", bill.id))
            .description(summary)
            .color(0x0058_65F2)
            .fields(embed_fields);

        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }

    /// Computes what everyone owes and closes the open bill. Creator only.
    #[poise::command(slash_command, rename = "finalize")]
    pub async fn bill_finalize(ctx: Context<'_>) -> Result<()> {
        let (_, bill) = open_bill(ctx).await?;
        let allocations = ctx
            .data()
            .engine
            .finalize(bill.id, &author_id(ctx))
            .await?;

        let mut reply = format!("✅ Bill #{} finalized:\n", bill.id);
        for allocation in &allocations {
            writeln!(
                &mut reply,
                "• {} owes {}",
                mention(&allocation.member_id),
                format_cents(allocation.amount_cents)
            )?;
        }
        ctx.say(reply).await?;
        Ok(())
    }

    /// Records the finalized bill as paid. Creator only, once.
    #[poise::command(slash_command, rename = "settle")]
    pub async fn bill_settle(ctx: Context<'_>) -> Result<()> {
        let bill = latest_bill(ctx).await?;
        let record = ctx
            .data()
            .engine
            .settle(bill.id, &author_id(ctx))
            .await?;

        ctx.say(format!(
            "✅ Bill #{} recorded as settled: {} across {} member(s).",
            record.transaction.id,
            format_cents(record.transaction.total_cents),
            record.allocations.len()
        ))
        .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
