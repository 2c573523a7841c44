use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use saferide_core::EngineError;
use saferide_shared::{RideCategory, TripShape};

/// Fixed amounts per trip shape, in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRates {
    pub one_way_cents: i64,
    pub return_cents: i64,
}

impl TripRates {
    pub fn for_shape(&self, shape: TripShape) -> i64 {
        match shape {
            TripShape::OneWay => self.one_way_cents,
            TripShape::Return => self.return_cents,
        }
    }
}

/// Rates for one driver pool: a per-day amount for custom schedules and flat
/// amounts per schedule granularity otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRates {
    pub daily_cents: i64,
    pub bi_weekly: TripRates,
    pub monthly: TripRates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub in_house: CategoryRates,
    pub freelance: CategoryRates,
}

impl RateTable {
    pub fn category(&self, category: RideCategory) -> &CategoryRates {
        match category {
            RideCategory::InHouse => &self.in_house,
            RideCategory::Freelance => &self.freelance,
        }
    }
}

/// Read accessor over the externally managed rate configuration.
///
/// `current` hands out a snapshot taken at the moment of the call; amounts
/// are computed against that snapshot and nothing caches a table across
/// requests.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn current(&self) -> Result<RateTable, EngineError>;
}

/// Provider over a table loaded at startup (config file) and replaceable at
/// runtime. `None` models a deployment whose rate configuration was never
/// seeded, which must fail amount computation.
#[derive(Default)]
pub struct StaticRates {
    table: RwLock<Option<RateTable>>,
}

impl StaticRates {
    pub fn new(table: RateTable) -> Self {
        Self {
            table: RwLock::new(Some(table)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn replace(&self, table: RateTable) {
        *self.table.write().unwrap() = Some(table);
    }
}

#[async_trait]
impl RateProvider for StaticRates {
    async fn current(&self) -> Result<RateTable, EngineError> {
        self.table
            .read()
            .unwrap()
            .ok_or_else(|| EngineError::ExternalDependency("rate configuration missing".to_string()))
    }
}

#[cfg(test)]
pub(crate) fn sample_table() -> RateTable {
    RateTable {
        in_house: CategoryRates {
            daily_cents: 4_000,
            bi_weekly: TripRates {
                one_way_cents: 30_000,
                return_cents: 52_000,
            },
            monthly: TripRates {
                one_way_cents: 56_000,
                return_cents: 98_000,
            },
        },
        freelance: CategoryRates {
            daily_cents: 3_500,
            bi_weekly: TripRates {
                one_way_cents: 26_000,
                return_cents: 46_000,
            },
            monthly: TripRates {
                one_way_cents: 50_000,
                return_cents: 88_000,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_provider_fails_the_computation() {
        let provider = StaticRates::empty();
        assert!(matches!(
            provider.current().await,
            Err(EngineError::ExternalDependency(_))
        ));

        provider.replace(sample_table());
        assert_eq!(
            provider.current().await.unwrap().in_house.daily_cents,
            4_000
        );
    }
}
