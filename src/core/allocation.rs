//! Allocation engine - Computes each member's final owed amount.
//!
//! Two policies are supported:
//!
//! - **Even split**: `subtotal + tip` divided equally among all members.
//! - **Item split**: each claimed item is divided among its claimants, unclaimed
//!   items are divided among everyone, and tax and tip follow each member's
//!   share of the items.
//!
//! Arithmetic runs in micro-cent fixed point and is rounded to cents once at
//! the end. The remaining penny drift is given to one member chosen by
//! [`RemainderPolicy`], so the amounts always add up to the total exactly.

use crate::{
    entities::transaction::SplitMode,
    errors::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Fixed-point units per cent
const SCALE: i128 = 1_000_000;

/// Who absorbs the rounding remainder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// The first member in group order
    #[default]
    FirstMember,
    /// The group host, wherever they sit in the member list
    Host,
}

/// A line item together with the members who claimed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemClaims {
    pub name: String,
    pub price_cents: i64,
    /// Claimant member IDs in claim order
    pub claimants: Vec<String>,
}

/// Everything the engine needs to split one bill
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    pub mode: SplitMode,
    /// Current group members in group order
    pub members: &'a [String],
    pub host_id: &'a str,
    /// Pre-tip amount to split, tax included
    pub subtotal_cents: i64,
    /// Portion of the subtotal that is tax, used for the even-split breakdown
    pub tax_cents: i64,
    pub tip_cents: i64,
    /// Receipt items, only read for item split
    pub items: &'a [ItemClaims],
}

/// An item a member pays part of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedItem {
    pub name: String,
    /// The member's share of the item price
    pub share_cents: i64,
}

/// One member's computed amount and its breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberShare {
    pub member_id: String,
    pub amount_cents: i64,
    pub item_subtotal_cents: i64,
    pub tax_cents: i64,
    pub tip_cents: i64,
    pub claimed_items: Vec<ClaimedItem>,
}

/// Rounds a non-negative fixed-point value to the nearest whole unit of `divisor`.
fn round_scaled(value: i128, divisor: i128) -> i64 {
    let rounded = (value.max(0) + divisor / 2) / divisor;
    i64::try_from(rounded).unwrap_or(i64::MAX)
}

fn member_count(members: &[String]) -> i128 {
    members.len() as i128
}

fn check_request(request: &AllocationRequest<'_>) -> Result<()> {
    if request.members.is_empty() {
        return Err(Error::invalid_state("cannot allocate a bill for a group with no members"));
    }
    for cents in [request.subtotal_cents, request.tax_cents, request.tip_cents] {
        if cents < 0 {
            return Err(Error::InvalidAmount { cents });
        }
    }
    if let Some(item) = request.items.iter().find(|item| item.price_cents < 0) {
        return Err(Error::InvalidAmount {
            cents: item.price_cents,
        });
    }
    Ok(())
}

fn remainder_target(members: &[String], host_id: &str, policy: RemainderPolicy) -> usize {
    match policy {
        RemainderPolicy::FirstMember => 0,
        RemainderPolicy::Host => members.iter().position(|m| m == host_id).unwrap_or(0),
    }
}

/// Adds `diff` to the target member. A negative diff is taken cent by cent from
/// the target first and then down the member list, never below zero.
fn apply_remainder(amounts: &mut [i64], diff: i64, target: usize) {
    if diff >= 0 {
        amounts[target] += diff;
        return;
    }

    let mut owed = -diff;
    let order = std::iter::once(target).chain((0..amounts.len()).filter(|i| *i != target));
    for index in order {
        let take = owed.min(amounts[index]);
        amounts[index] -= take;
        owed -= take;
        if owed == 0 {
            break;
        }
    }
}

/// Splits `amount` into its tip, tax and item components without going negative.
fn breakdown(amount: i64, tip: i64, tax: i64) -> (i64, i64, i64) {
    let tip = tip.clamp(0, amount);
    let tax = tax.clamp(0, amount - tip);
    (amount - tip - tax, tax, tip)
}

fn even_split(request: &AllocationRequest<'_>, target: usize) -> Vec<MemberShare> {
    let n = member_count(request.members);
    let total = i128::from(request.subtotal_cents + request.tip_cents);
    let share = round_scaled(total * SCALE / n, SCALE);

    let mut amounts = vec![share; request.members.len()];
    let diff = request.subtotal_cents + request.tip_cents - amounts.iter().sum::<i64>();
    apply_remainder(&mut amounts, diff, target);

    let tax = request.tax_cents.min(request.subtotal_cents);
    let tip_share = round_scaled(i128::from(request.tip_cents) * SCALE / n, SCALE);
    let tax_share = round_scaled(i128::from(tax) * SCALE / n, SCALE);

    request
        .members
        .iter()
        .zip(amounts)
        .map(|(member_id, amount_cents)| {
            let (item_subtotal_cents, tax_cents, tip_cents) =
                breakdown(amount_cents, tip_share, tax_share);
            MemberShare {
                member_id: member_id.clone(),
                amount_cents,
                item_subtotal_cents,
                tax_cents,
                tip_cents,
                claimed_items: Vec::new(),
            }
        })
        .collect()
}

fn item_split(request: &AllocationRequest<'_>, target: usize) -> Vec<MemberShare> {
    let members = request.members;
    let n = member_count(members);
    let index: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, member)| (member.as_str(), i))
        .collect();

    let mut base = vec![0_i128; members.len()];
    let mut claimed: Vec<Vec<ClaimedItem>> = vec![Vec::new(); members.len()];
    let mut unclaimed: i128 = 0;
    let mut items_sum: i64 = 0;

    for item in request.items {
        items_sum += item.price_cents;

        let mut claimants: Vec<usize> = Vec::with_capacity(item.claimants.len());
        for claimant in &item.claimants {
            if let Some(&position) = index.get(claimant.as_str()) {
                if !claimants.contains(&position) {
                    claimants.push(position);
                }
            }
        }

        if claimants.is_empty() {
            unclaimed += i128::from(item.price_cents);
            continue;
        }

        let share = i128::from(item.price_cents) * SCALE / claimants.len() as i128;
        for position in claimants {
            base[position] += share;
            claimed[position].push(ClaimedItem {
                name: item.name.clone(),
                share_cents: round_scaled(share, SCALE),
            });
        }
    }

    if unclaimed > 0 {
        let per_member = unclaimed * SCALE / n;
        for share in &mut base {
            *share += per_member;
        }
    }

    // Tax, fees and discounts not covered by line items follow the same ratio as tip
    let extra = i128::from(request.subtotal_cents - items_sum) * SCALE;
    let tip = i128::from(request.tip_cents) * SCALE;
    let base_sum: i128 = base.iter().sum();
    debug!(
        "Item split: {} items, unclaimed {} cents, extra {} cents",
        request.items.len(),
        unclaimed,
        request.subtotal_cents - items_sum
    );

    let proportional = |value: i128, member_base: i128| {
        if base_sum == 0 {
            value / n
        } else {
            member_base * value / base_sum
        }
    };

    let mut amounts = Vec::with_capacity(members.len());
    let mut tip_shares = Vec::with_capacity(members.len());
    let mut tax_shares = Vec::with_capacity(members.len());
    for member_base in &base {
        let tip_share = proportional(tip, *member_base);
        let extra_share = proportional(extra, *member_base);
        amounts.push(round_scaled(member_base + extra_share + tip_share, SCALE));
        tip_shares.push(round_scaled(tip_share, SCALE));
        tax_shares.push(round_scaled(extra_share, SCALE));
    }

    let diff = request.subtotal_cents + request.tip_cents - amounts.iter().sum::<i64>();
    apply_remainder(&mut amounts, diff, target);

    members
        .iter()
        .zip(amounts)
        .zip(tip_shares.into_iter().zip(tax_shares))
        .zip(claimed)
        .map(|(((member_id, amount_cents), (tip, tax)), claimed_items)| {
            let (item_subtotal_cents, tax_cents, tip_cents) = breakdown(amount_cents, tip, tax);
            MemberShare {
                member_id: member_id.clone(),
                amount_cents,
                item_subtotal_cents,
                tax_cents,
                tip_cents,
                claimed_items,
            }
        })
        .collect()
}

/// Computes the full allocation set for one bill.
///
/// The result has one entry per member, in member order, and its amounts add
/// up to `subtotal_cents + tip_cents` exactly. Identical inputs always produce
/// identical output.
///
/// # Errors
/// Returns [`Error::InvalidState`] for an empty member list and
/// [`Error::InvalidAmount`] for negative figures.
pub fn allocate(request: &AllocationRequest<'_>, policy: RemainderPolicy) -> Result<Vec<MemberShare>> {
    check_request(request)?;
    let target = remainder_target(request.members, request.host_id, policy);

    let shares = match request.mode {
        SplitMode::EvenSplit => even_split(request, target),
        SplitMode::ItemSplit => item_split(request, target),
    };
    Ok(shares)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn members(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("m{i}")).collect()
    }

    fn item(name: &str, price_cents: i64, claimants: &[&str]) -> ItemClaims {
        ItemClaims {
            name: name.to_string(),
            price_cents,
            claimants: claimants.iter().map(ToString::to_string).collect(),
        }
    }

    fn request<'a>(
        mode: SplitMode,
        members: &'a [String],
        subtotal_cents: i64,
        tip_cents: i64,
        items: &'a [ItemClaims],
    ) -> AllocationRequest<'a> {
        AllocationRequest {
            mode,
            members,
            host_id: "m1",
            subtotal_cents,
            tax_cents: 0,
            tip_cents,
            items,
        }
    }

    fn amounts(shares: &[MemberShare]) -> Vec<i64> {
        shares.iter().map(|s| s.amount_cents).collect()
    }

    #[test]
    fn test_even_split_remainder_goes_to_first_member() {
        let group = members(3);
        let shares = allocate(
            &request(SplitMode::EvenSplit, &group, 1000, 0, &[]),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(amounts(&shares), vec![334, 333, 333]);
    }

    #[test]
    fn test_even_split_negative_remainder() {
        // 2000 / 3 rounds up to 667, so the first member gives back a cent
        let group = members(3);
        let shares = allocate(
            &request(SplitMode::EvenSplit, &group, 2000, 0, &[]),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(amounts(&shares), vec![666, 667, 667]);
    }

    #[test]
    fn test_host_policy_targets_host() {
        let group = vec!["a".to_string(), "b".to_string(), "host".to_string()];
        let mut req = request(SplitMode::EvenSplit, &group, 1000, 0, &[]);
        req.host_id = "host";
        let shares = allocate(&req, RemainderPolicy::Host).unwrap();
        assert_eq!(amounts(&shares), vec![333, 333, 334]);
    }

    #[test]
    fn test_even_split_ignores_claims() {
        let group = members(2);
        let items = [item("Steak", 3000, &["m1"])];
        let shares = allocate(
            &request(SplitMode::EvenSplit, &group, 3000, 400, &items),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(amounts(&shares), vec![1700, 1700]);
        assert_eq!(shares[0].tip_cents, 200);
        assert!(shares[0].claimed_items.is_empty());
    }

    #[test]
    fn test_even_split_breakdown_adds_up() {
        let group = members(4);
        let mut req = request(SplitMode::EvenSplit, &group, 2722, 500, &[]);
        req.tax_cents = 225;
        let shares = allocate(&req, RemainderPolicy::FirstMember).unwrap();
        for share in &shares {
            assert_eq!(
                share.item_subtotal_cents + share.tax_cents + share.tip_cents,
                share.amount_cents
            );
        }
        assert_eq!(shares[1].tip_cents, 125);
        assert_eq!(shares[1].tax_cents, 56);
    }

    #[test]
    fn test_item_split_claims_and_shared_items() {
        let group = members(3);
        let items = [
            item("Burger", 1200, &["m1"]),
            item("Salad", 900, &["m2"]),
            item("Nachos", 900, &["m1", "m2", "m3"]),
        ];
        let shares = allocate(
            &request(SplitMode::ItemSplit, &group, 3000, 0, &items),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(amounts(&shares), vec![1500, 1200, 300]);
        assert_eq!(
            shares[2].claimed_items,
            vec![ClaimedItem {
                name: "Nachos".to_string(),
                share_cents: 300
            }]
        );
    }

    #[test]
    fn test_unclaimed_item_absorbed_by_everyone() {
        let group = members(3);
        let items = [item("Pitcher", 900, &[]), item("Wings", 300, &["m1"])];
        let shares = allocate(
            &request(SplitMode::ItemSplit, &group, 1200, 0, &items),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(amounts(&shares), vec![600, 300, 300]);
        assert!(shares[1].claimed_items.is_empty());
    }

    #[test]
    fn test_tip_is_proportional_to_base_share() {
        let group = members(2);
        let items = [item("Big", 2000, &["m1"]), item("Small", 1000, &["m2"])];
        let shares = allocate(
            &request(SplitMode::ItemSplit, &group, 3000, 300, &items),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(shares[0].tip_cents, 200);
        assert_eq!(shares[1].tip_cents, 100);
        assert_eq!(amounts(&shares), vec![2200, 1100]);
    }

    #[test]
    fn test_tax_follows_item_share() {
        let group = members(2);
        let items = [item("Big", 2000, &["m1"]), item("Small", 1000, &["m2"])];
        let mut req = request(SplitMode::ItemSplit, &group, 3300, 0, &items);
        req.tax_cents = 300;
        let shares = allocate(&req, RemainderPolicy::FirstMember).unwrap();
        assert_eq!(amounts(&shares), vec![2200, 1100]);
        assert_eq!(shares[0].tax_cents, 200);
        assert_eq!(shares[1].item_subtotal_cents, 1000);
    }

    #[test]
    fn test_item_split_without_items_splits_evenly() {
        let group = members(4);
        let shares = allocate(
            &request(SplitMode::ItemSplit, &group, 0, 1000, &[]),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(amounts(&shares), vec![250, 250, 250, 250]);
    }

    #[test]
    fn test_departed_claimant_is_ignored() {
        let group = members(2);
        let items = [item("Fries", 400, &["gone"]), item("Soda", 200, &["gone", "m2"])];
        let shares = allocate(
            &request(SplitMode::ItemSplit, &group, 600, 0, &items),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert_eq!(amounts(&shares), vec![200, 400]);
    }

    #[test]
    fn test_single_member_pays_everything() {
        let group = members(1);
        let items = [item("A", 1234, &[]), item("B", 766, &["m1"])];
        for mode in [SplitMode::EvenSplit, SplitMode::ItemSplit] {
            let shares = allocate(
                &request(mode, &group, 2150, 333, &items),
                RemainderPolicy::FirstMember,
            )
            .unwrap();
            assert_eq!(amounts(&shares), vec![2483]);
        }
    }

    #[test]
    fn test_remainder_never_drives_amount_negative() {
        // m1 owes nothing for items, so a negative drift must come from others
        let group = members(3);
        let items = [item("A", 1000, &["m2"]), item("B", 1000, &["m3"])];
        let shares = allocate(
            &request(SplitMode::ItemSplit, &group, 2000, 1, &items),
            RemainderPolicy::FirstMember,
        )
        .unwrap();
        assert!(shares.iter().all(|s| s.amount_cents >= 0));
        assert_eq!(shares.iter().map(|s| s.amount_cents).sum::<i64>(), 2001);
    }

    #[test]
    fn test_conservation_and_non_negativity_sweep() {
        for size in 1..=50 {
            let group = members(size);
            let items: Vec<ItemClaims> = (0..size)
                .map(|i| {
                    let claimants: Vec<&str> = match i % 3 {
                        0 => vec![],
                        1 => vec![group[i].as_str()],
                        _ => vec![group[0].as_str(), group[i].as_str()],
                    };
                    item(&format!("item {i}"), 137 + 91 * i64::try_from(i).unwrap(), &claimants)
                })
                .collect();
            let items_sum: i64 = items.iter().map(|i| i.price_cents).sum();
            let subtotal = items_sum + 17 * i64::try_from(size).unwrap();

            for mode in [SplitMode::EvenSplit, SplitMode::ItemSplit] {
                for policy in [RemainderPolicy::FirstMember, RemainderPolicy::Host] {
                    let mut req = request(mode, &group, subtotal, 1001, &items);
                    req.tax_cents = 17;
                    let shares = allocate(&req, policy).unwrap();
                    assert_eq!(shares.len(), size);
                    assert_eq!(
                        shares.iter().map(|s| s.amount_cents).sum::<i64>(),
                        subtotal + 1001,
                        "size {size}, mode {mode:?}"
                    );
                    assert!(shares.iter().all(|s| s.amount_cents >= 0));
                }
            }
        }
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let group = members(7);
        let items = [
            item("A", 1999, &["m3", "m5"]),
            item("B", 501, &[]),
            item("C", 333, &["m7"]),
        ];
        let req = request(SplitMode::ItemSplit, &group, 3100, 457, &items);
        let first = allocate(&req, RemainderPolicy::FirstMember).unwrap();
        let second = allocate(&req, RemainderPolicy::FirstMember).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_empty_group_and_negative_amounts() {
        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            allocate(
                &request(SplitMode::EvenSplit, &empty, 100, 0, &[]),
                RemainderPolicy::FirstMember
            ),
            Err(Error::InvalidState { .. })
        ));

        let group = members(2);
        assert!(matches!(
            allocate(
                &request(SplitMode::EvenSplit, &group, 100, -5, &[]),
                RemainderPolicy::FirstMember
            ),
            Err(Error::InvalidAmount { cents: -5 })
        ));
    }
}
