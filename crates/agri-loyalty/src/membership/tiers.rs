use serde::Serialize;

use super::domain::{Tier, TierDefinition};
use super::failure::FailureKind;

/// Ordered tier thresholds; intervals are `[min, max)` and contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    definitions: Vec<TierDefinition>,
}

/// Where a point balance sits within the tier ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierProgress {
    pub current: TierDefinition,
    pub next: Option<TierDefinition>,
    pub progress_percent: f64,
    pub points_to_next: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierTableError {
    #[error("tier table must not be empty")]
    Empty,
    #[error("lowest tier must start at 0 points (found {0})")]
    FirstMinimumNotZero(i64),
    #[error("tier {0} appears more than once")]
    DuplicateTier(&'static str),
    #[error("tier {tier} must end where the next tier starts ({expected}), found {found:?}")]
    Gap {
        tier: &'static str,
        expected: i64,
        found: Option<i64>,
    },
    #[error("only the highest tier may be open-ended; {0} must declare a maximum")]
    OpenEndedBelowTop(&'static str),
    #[error("highest tier {tier} must be open-ended (found maximum {max})")]
    ClosedTopTier { tier: &'static str, max: i64 },
}

impl TierTableError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Validation
    }
}

impl TierTable {
    /// Builds a table from stored rows without validating contiguity.
    pub fn new(mut definitions: Vec<TierDefinition>) -> Self {
        definitions.sort_by_key(|definition| definition.min_points);
        Self { definitions }
    }

    /// Builds a table for administrative updates, rejecting gaps and overlaps.
    pub fn validated(definitions: Vec<TierDefinition>) -> Result<Self, TierTableError> {
        let table = Self::new(definitions);
        let rows = &table.definitions;

        let first = rows.first().ok_or(TierTableError::Empty)?;
        if first.min_points != 0 {
            return Err(TierTableError::FirstMinimumNotZero(first.min_points));
        }

        for (index, row) in rows.iter().enumerate() {
            if rows[..index].iter().any(|earlier| earlier.tier == row.tier) {
                return Err(TierTableError::DuplicateTier(row.tier.as_str()));
            }

            match rows.get(index + 1) {
                Some(next) => match row.max_points {
                    Some(max) if max == next.min_points && max > row.min_points => {}
                    Some(_) => {
                        return Err(TierTableError::Gap {
                            tier: row.tier.as_str(),
                            expected: next.min_points,
                            found: row.max_points,
                        })
                    }
                    None => return Err(TierTableError::OpenEndedBelowTop(row.tier.as_str())),
                },
                None => {
                    if let Some(max) = row.max_points {
                        return Err(TierTableError::ClosedTopTier {
                            tier: row.tier.as_str(),
                            max,
                        });
                    }
                }
            }
        }

        Ok(table)
    }

    /// Bronze/silver/gold/platinum ladder used when nothing else is configured.
    pub fn standard() -> Self {
        Self::new(vec![
            TierDefinition::new(Tier::Bronze, "Bronze", 0, Some(1_000)),
            TierDefinition::new(Tier::Silver, "Silver", 1_000, Some(5_000)),
            TierDefinition::new(Tier::Gold, "Gold", 5_000, Some(10_000)),
            TierDefinition::new(Tier::Platinum, "Platinum", 10_000, None),
        ])
    }

    pub fn definitions(&self) -> &[TierDefinition] {
        &self.definitions
    }

    pub fn into_definitions(self) -> Vec<TierDefinition> {
        self.definitions
    }

    /// Resolves the tier owning `points`. An empty table falls back to an open-ended bronze tier.
    pub fn resolve(&self, points: i64) -> TierProgress {
        let index = self
            .definitions
            .iter()
            .rposition(|definition| definition.min_points <= points)
            .unwrap_or(0);

        let Some(current) = self.definitions.get(index).cloned() else {
            return TierProgress {
                current: lowest_fallback(),
                next: None,
                progress_percent: 100.0,
                points_to_next: 0,
            };
        };
        let next = self.definitions.get(index + 1).cloned();

        match &next {
            Some(next_tier) => {
                let span = (next_tier.min_points - current.min_points).max(1) as f64;
                let earned = (points - current.min_points) as f64;
                let progress_percent = (earned / span * 100.0).clamp(0.0, 100.0);
                let points_to_next = (next_tier.min_points - points).max(0);
                TierProgress {
                    current,
                    next,
                    progress_percent,
                    points_to_next,
                }
            }
            None => TierProgress {
                current,
                next: None,
                progress_percent: 100.0,
                points_to_next: 0,
            },
        }
    }

    pub fn tier_for(&self, points: i64) -> Tier {
        self.resolve(points).current.tier
    }
}

fn lowest_fallback() -> TierDefinition {
    TierDefinition::new(Tier::Bronze, "Bronze", 0, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_tier_just_below_threshold() {
        let progress = TierTable::standard().resolve(999);
        assert_eq!(progress.current.tier, Tier::Bronze);
        assert_eq!(progress.next.as_ref().map(|next| next.tier), Some(Tier::Silver));
        assert!((progress.progress_percent - 99.9).abs() < 1e-9);
        assert_eq!(progress.points_to_next, 1);
    }

    #[test]
    fn top_tier_reports_full_progress() {
        let progress = TierTable::standard().resolve(10_000);
        assert_eq!(progress.current.tier, Tier::Platinum);
        assert!(progress.next.is_none());
        assert_eq!(progress.progress_percent, 100.0);
        assert_eq!(progress.points_to_next, 0);
    }

    #[test]
    fn boundary_value_belongs_to_upper_tier() {
        let table = TierTable::standard();
        assert_eq!(table.tier_for(1_000), Tier::Silver);
        assert_eq!(table.tier_for(4_999), Tier::Silver);
        assert_eq!(table.tier_for(5_000), Tier::Gold);
        assert_eq!(table.tier_for(0), Tier::Bronze);
    }

    #[test]
    fn unordered_rows_are_sorted_before_lookup() {
        let mut rows = TierTable::standard().into_definitions();
        rows.reverse();
        let table = TierTable::new(rows);
        assert_eq!(table.tier_for(7_500), Tier::Gold);
        assert_eq!(table.definitions()[0].tier, Tier::Bronze);
    }

    #[test]
    fn empty_table_defaults_to_lowest_tier() {
        let progress = TierTable::new(Vec::new()).resolve(42_000);
        assert_eq!(progress.current.tier, Tier::Bronze);
        assert!(progress.next.is_none());
        assert_eq!(progress.points_to_next, 0);
    }

    #[test]
    fn validation_rejects_gaps_and_open_middle_tiers() {
        let gap = vec![
            TierDefinition::new(Tier::Bronze, "Bronze", 0, Some(900)),
            TierDefinition::new(Tier::Silver, "Silver", 1_000, None),
        ];
        assert!(matches!(
            TierTable::validated(gap),
            Err(TierTableError::Gap { tier: "bronze", expected: 1_000, .. })
        ));

        let open_middle = vec![
            TierDefinition::new(Tier::Bronze, "Bronze", 0, None),
            TierDefinition::new(Tier::Silver, "Silver", 1_000, None),
        ];
        assert_eq!(
            TierTable::validated(open_middle),
            Err(TierTableError::OpenEndedBelowTop("bronze"))
        );

        let offset = vec![TierDefinition::new(Tier::Bronze, "Bronze", 10, None)];
        assert_eq!(
            TierTable::validated(offset),
            Err(TierTableError::FirstMinimumNotZero(10))
        );

        let closed_top = vec![
            TierDefinition::new(Tier::Bronze, "Bronze", 0, Some(1_000)),
            TierDefinition::new(Tier::Silver, "Silver", 1_000, Some(5_000)),
        ];
        assert_eq!(
            TierTable::validated(closed_top),
            Err(TierTableError::ClosedTopTier {
                tier: "silver",
                max: 5_000,
            })
        );

        assert_eq!(TierTable::validated(Vec::new()), Err(TierTableError::Empty));
        assert!(TierTable::validated(TierTable::standard().into_definitions()).is_ok());
    }
}
