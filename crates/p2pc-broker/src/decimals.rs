//! Per-session cache of the payment asset's decimals.
//!
//! Decimals are fixed for the lifetime of a deployed asset, so the value is
//! fetched once and memoized. The cache lives on the session; regenerating
//! the session is the only way to drop it.

use tokio::sync::OnceCell;
use tracing::debug;

use crate::amount::AmountConverter;
use crate::error::{BrokerError, Result};
use crate::ledger::{LedgerConnection, Query};
use crate::wallet::Address;

/// Lazily populated decimals value.
#[derive(Debug, Default)]
pub struct DecimalsCache {
    cell: OnceCell<u8>,
}

impl DecimalsCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value, if already fetched.
    #[must_use]
    pub fn cached(&self) -> Option<u8> {
        self.cell.get().copied()
    }

    /// Return the decimals, fetching them from the ledger on first use.
    ///
    /// Concurrent first callers wait on a single fetch. A failed fetch leaves
    /// the cache empty so a later call can try again.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error if the fetch fails or the value is not a
    /// valid decimals count.
    pub async fn get<L: LedgerConnection>(&self, ledger: &L, contract: &Address) -> Result<u8> {
        self.cell
            .get_or_try_init(|| async {
                let value = ledger.query(contract, &Query::Decimals).await?;
                let decimals: u8 = serde_json::from_value(value)
                    .map_err(|e| BrokerError::invalid_response(Query::Decimals.method(), e.to_string()))?;
                // Reject scales the converter cannot represent before caching them.
                AmountConverter::new(decimals)?;
                debug!(contract = %contract, decimals, "decimals cached");
                Ok(decimals)
            })
            .await
            .copied()
    }

    /// Converter for the cached scale.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if decimals have not been fetched yet.
    pub fn converter(&self) -> Result<AmountConverter> {
        let decimals = self.cached().ok_or_else(|| {
            BrokerError::precondition("decimals not fetched for this session")
        })?;
        AmountConverter::new(decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedLedger;

    #[tokio::test]
    async fn test_fetches_once() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let cache = DecimalsCache::new();

        assert_eq!(cache.cached(), None);
        assert_eq!(cache.get(&ledger, &contract).await.expect("decimals"), 6);
        assert_eq!(cache.get(&ledger, &contract).await.expect("decimals"), 6);
        assert_eq!(cache.cached(), Some(6));
        assert_eq!(ledger.query_count("decimals").await, 1);
    }

    #[tokio::test]
    async fn test_converter_requires_fetch() {
        let cache = DecimalsCache::new();
        assert!(matches!(
            cache.converter(),
            Err(BrokerError::Precondition { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(18).await;
        let cache = DecimalsCache::new();

        ledger.set_offline(true).await;
        assert!(matches!(
            cache.get(&ledger, &contract).await,
            Err(BrokerError::Connection { .. })
        ));
        assert_eq!(cache.cached(), None);

        ledger.set_offline(false).await;
        assert_eq!(cache.get(&ledger, &contract).await.expect("decimals"), 18);
        assert_eq!(cache.converter().expect("converter").decimals(), 18);
    }
}
