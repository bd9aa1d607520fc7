use crate::controller::Loader;
use connectors::{store::ObjectStager, warehouse::ConnectionSource};
use engine_config::{env::EnvSnapshot, error::SettingsError, settings::LoaderSettingsBuilder};
use engine_core::observer::{LoadObserver, NoopObserver};
use model::core::table::TableName;
use std::sync::Arc;

/// Creates loaders that share defaults, a stager and a connection source.
#[derive(Clone)]
pub struct LoaderFactory {
    defaults: LoaderSettingsBuilder,
    env: EnvSnapshot,
    stager: Arc<dyn ObjectStager>,
    source: Arc<dyn ConnectionSource>,
    observer: Arc<dyn LoadObserver>,
}

impl LoaderFactory {
    pub fn new(
        defaults: LoaderSettingsBuilder,
        env: EnvSnapshot,
        stager: Arc<dyn ObjectStager>,
        source: Arc<dyn ConnectionSource>,
    ) -> Self {
        Self {
            defaults,
            env,
            stager,
            source,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// A loader whose settings are `overlay` on top of the factory defaults.
    pub fn create(&self, overlay: LoaderSettingsBuilder) -> Result<Loader, SettingsError> {
        let settings = overlay.merge_over(self.defaults.clone()).build(&self.env)?;
        Ok(Loader::with_observer(
            Arc::new(settings),
            self.stager.clone(),
            self.source.clone(),
            self.observer.clone(),
        ))
    }

    pub fn for_table(&self, table: TableName) -> Result<Loader, SettingsError> {
        self.create(LoaderSettingsBuilder::new().table(table))
    }
}
