//! Splitting a discount across cart lines.
//!
//! Largest-remainder apportionment: every line gets the floor of its pro-rata
//! share, then the leftover units go one each to the lines with the largest
//! remainders (earlier lines win ties). Shares always sum to the total.

use crate::money::Money;

use super::LineDiscount;

/// Splits `total` over `weights` (line index, weight) in proportion to weight.
///
/// Lines whose share rounds to zero are left out. With `total` not above the
/// sum of weights, no line receives more than its weight.
pub fn distribute(total: Money, weights: &[(usize, Money)]) -> Vec<LineDiscount> {
    let weight_sum: i128 = weights.iter().map(|(_, w)| w.amount() as i128).sum();
    if total.amount() <= 0 || weight_sum <= 0 {
        return Vec::new();
    }
    let total = total.amount() as i128;

    let mut shares: Vec<(usize, i128, i128)> = weights
        .iter()
        .enumerate()
        .map(|(pos, (_, w))| {
            let scaled = total * w.amount() as i128;
            (pos, scaled / weight_sum, scaled % weight_sum)
        })
        .collect();

    let floor_sum: i128 = shares.iter().map(|(_, floor, _)| *floor).sum();
    let mut leftover = total - floor_sum;

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|a, b| shares[*b].2.cmp(&shares[*a].2).then(a.cmp(b)));
    for pos in order {
        if leftover == 0 {
            break;
        }
        shares[pos].1 += 1;
        leftover -= 1;
    }

    shares
        .into_iter()
        .filter(|(_, amount, _)| *amount > 0)
        .map(|(pos, amount, _)| LineDiscount {
            line_index: weights[pos].0,
            amount: Money::new(amount as i64),
        })
        .collect()
}
