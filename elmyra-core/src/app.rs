//! Wiring of store, resolver and dispatcher from a [`Config`].

use std::path::PathBuf;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::resolver::ArtifactResolver;
use crate::session::ImportSessions;
use crate::store::VersionStore;
use crate::worker::Worker;

pub struct App<W> {
    pub dispatcher: Dispatcher<W>,
    pub resolver: ArtifactResolver,
    pub uploads: PathBuf,
    pub max_upload_bytes: u64,
}

impl<W: Worker> App<W> {
    pub fn new(worker: W, config: &Config) -> Self {
        let layout = config.layout();
        let store = VersionStore::new(&layout.visualizations, config.version_precision);

        Self {
            dispatcher: Dispatcher::new(worker, store.clone(), layout.imports),
            resolver: ArtifactResolver::new(store),
            uploads: layout.uploads,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn store(&self) -> &VersionStore {
        self.resolver.store()
    }

    pub fn sessions(&self) -> ImportSessions<'_, W> {
        ImportSessions::new(&self.dispatcher, &self.uploads)
    }
}
