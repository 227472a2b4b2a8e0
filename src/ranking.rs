//! Active-rank computation for one (product, year) partition.

use crate::config::RankSource;
use crate::schema::{LeagueTableRow, MetricColumn, RankSlice};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedRow<'a> {
    pub row: &'a LeagueTableRow,
    pub active_rank: u32,
}

/// Where the active ranks of a partition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrigin {
    Explicit,
    Derived(MetricColumn),
}

/// Ranks a full partition, best first.
///
/// With [`RankSource::PreferExplicit`] and a stored rank on every row, the
/// stored ranks are used as-is. Otherwise ranks are derived from `metric`
/// (Amount when `metric` is Rank) using minimum-rank ties: a row's rank is one
/// plus the number of rows strictly better than it, so values 9, 9, 5 rank
/// 1, 1, 3. Equal rows keep their stored order.
pub fn rank_partition<'a>(
    partition: &[&'a LeagueTableRow],
    metric: MetricColumn,
    source: RankSource,
) -> (Vec<RankedRow<'a>>, RankOrigin) {
    let explicit = source == RankSource::PreferExplicit
        && !partition.is_empty()
        && partition.iter().all(|r| r.rank.is_some());

    if explicit {
        let mut ranked: Vec<RankedRow<'a>> = partition
            .iter()
            .filter_map(|row| {
                row.rank.map(|active_rank| RankedRow {
                    row: *row,
                    active_rank,
                })
            })
            .collect();
        ranked.sort_by_key(|r| r.active_rank);
        return (ranked, RankOrigin::Explicit);
    }

    let metric = match metric {
        MetricColumn::Rank => MetricColumn::Amount,
        other => other,
    };
    (derive_ranks(partition, metric), RankOrigin::Derived(metric))
}

fn derive_ranks<'a>(partition: &[&'a LeagueTableRow], metric: MetricColumn) -> Vec<RankedRow<'a>> {
    let direction = metric.direction();
    let value = |row: &LeagueTableRow| metric.raw_value(row).unwrap_or(f64::NAN);

    let mut ordered: Vec<&'a LeagueTableRow> = partition.to_vec();
    ordered.sort_by(|a, b| direction.better_first(value(*a), value(*b)));

    let mut ranked: Vec<RankedRow<'a>> = Vec::with_capacity(ordered.len());
    for (position, &row) in ordered.iter().enumerate() {
        let active_rank = match ranked.last() {
            Some(prev) if direction.better_first(value(prev.row), value(row)) == Ordering::Equal => {
                prev.active_rank
            }
            _ => position as u32 + 1,
        };
        ranked.push(RankedRow { row, active_rank });
    }
    ranked
}

pub fn apply_slice<'a>(ranked: Vec<RankedRow<'a>>, slice: RankSlice) -> Vec<RankedRow<'a>> {
    ranked
        .into_iter()
        .filter(|r| slice.contains(r.active_rank))
        .collect()
}
