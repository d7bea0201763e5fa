//! Memory of which node-key constraints are already installed.
//!
//! Installing a constraint is idempotent in the store but costs a round
//! trip, so write paths only ask for `(domain, type, label)` tuples not seen
//! since start-up or since the last schema change that could affect them.

use std::collections::HashSet;

use parking_lot::Mutex;

use strata_core::Result;
use strata_graph::GraphStore;

type Entry = (String, String, String);

#[derive(Debug, Default)]
pub struct ConstraintCache {
    installed: Mutex<HashSet<Entry>>,
}

impl ConstraintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install keys for every label of `(domain, type_name)` not yet cached.
    pub async fn ensure(
        &self,
        store: &dyn GraphStore,
        domain: &str,
        type_name: &str,
        labels: &[String],
    ) -> Result<()> {
        let missing: Vec<String> = {
            let installed = self.installed.lock();
            labels
                .iter()
                .filter(|l| !installed.contains(&entry(domain, type_name, l)))
                .cloned()
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        store.ensure_node_keys(&missing).await?;
        tracing::debug!(domain, type_name, labels = ?missing, "Node keys installed");

        let mut installed = self.installed.lock();
        for label in missing {
            installed.insert((domain.to_string(), type_name.to_string(), label));
        }
        Ok(())
    }

    pub fn invalidate_type(&self, domain: &str, type_name: &str) {
        self.installed
            .lock()
            .retain(|(d, t, _)| !(d == domain && t == type_name));
    }

    pub fn invalidate_domain(&self, domain: &str) {
        self.installed.lock().retain(|(d, _, _)| d != domain);
    }

    pub fn len(&self) -> usize {
        self.installed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.lock().is_empty()
    }
}

fn entry(domain: &str, type_name: &str, label: &str) -> Entry {
    (domain.to_string(), type_name.to_string(), label.to_string())
}
