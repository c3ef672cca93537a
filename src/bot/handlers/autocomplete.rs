//! Autocomplete handlers for Discord slash command parameters.
//!
//! Suggests the line items of the channel's open bill while the user types, so
//! claim and assign commands can take an item ID without looking it up first.

use crate::{
    bot::{BotData, commands::utils::open_bill},
    core::money::format_cents,
    errors::Error,
};
use poise::serenity_prelude::AutocompleteChoice;

/// Discord autocomplete limit
const MAX_CHOICES: usize = 25;

/// Provides autocomplete suggestions for line items on the open bill.
///
/// Each choice is labeled `"#id name ($price)"` and carries the item ID as its
/// value. Matching is case-insensitive on the item name or ID.
pub async fn autocomplete_line_item(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<AutocompleteChoice> {
    let Ok((_, bill)) = open_bill(ctx).await else {
        return Vec::new();
    };
    let Ok(Some((_, items))) = ctx.data().engine.get_receipt(bill.id).await else {
        return Vec::new();
    };

    let partial_lower = partial.trim().trim_start_matches('#').to_lowercase();

    items
        .into_iter()
        .filter(|item| {
            item.name.to_lowercase().contains(&partial_lower)
                || item.id.to_string().starts_with(&partial_lower)
        })
        .take(MAX_CHOICES)
        .map(|item| {
            AutocompleteChoice::new(
                format!("#{} {} ({})", item.id, item.name, format_cents(item.price_cents)),
                item.id,
            )
        })
        .collect()
}
