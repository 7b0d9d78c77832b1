//! A thread-safe in-memory holder for the currently active [`Configuration`].
//!
//! [`ConfigurationStore`] allows concurrent readers (flag evaluation) and a writer (whatever
//! installs a freshly fetched/parsed configuration) without readers blocking each other. Each
//! evaluation call takes a single `Arc` snapshot up front, so a configuration swap mid-evaluation
//! never produces an inconsistent read across the several fields an evaluation touches.

use std::sync::{Arc, RwLock};

use crate::config::Configuration;

/// Holds the current [`Configuration`] behind a lock, handing out cheap `Arc` clones to readers.
pub struct ConfigurationStore {
    configuration: RwLock<Arc<Configuration>>,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        ConfigurationStore {
            configuration: RwLock::new(Arc::new(Configuration::empty())),
        }
    }
}

impl ConfigurationStore {
    /// Creates a store holding an empty configuration (every evaluation against it returns the
    /// caller's default value until [`ConfigurationStore::set_configuration`] is called).
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cheap snapshot of the currently active configuration.
    pub fn get_configuration(&self) -> Arc<Configuration> {
        let guard = self
            .configuration
            .read()
            .expect("thread holding configuration lock should not panic");
        Arc::clone(&guard)
    }

    /// Atomically replaces the active configuration.
    pub fn set_configuration(&self, config: Configuration) {
        let mut slot = self
            .configuration
            .write()
            .expect("thread holding configuration lock should not panic");
        *slot = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ConfigurationStore;
    use crate::config::Configuration;

    #[test]
    fn starts_with_empty_configuration() {
        let store = ConfigurationStore::new();
        assert!(store.get_configuration().flags.is_empty());
    }

    #[test]
    fn can_set_configuration_from_another_thread() {
        let store = Arc::new(ConfigurationStore::new());

        {
            let store = store.clone();
            std::thread::spawn(move || {
                store.set_configuration(
                    Configuration::from_server_response(
                        r#"{"format":"SERVER","flags":{}}"#,
                    )
                    .unwrap(),
                );
            })
            .join()
            .unwrap();
        }

        assert_eq!(store.get_configuration().format, crate::config::ConfigurationFormat::Server);
    }
}
