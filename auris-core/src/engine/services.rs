use std::sync::Arc;

use auris_config::ConfigHandle;

use crate::archive::SevenZip;
use crate::catalog::CatalogClient;
use crate::classify::Classifier;
use crate::companion::CompanionClient;
use crate::db::Database;
use crate::dedupe::DuplicateDetector;
use crate::error::Result;
use crate::extract::Extractor;
use crate::metadata::MetadataResolver;

/// Everything a pipeline stage may need, wired once at startup.
///
/// All collaborators arrive through this bundle; nothing in the engine
/// reaches for globals.
pub struct Services {
    pub db: Database,
    pub config: ConfigHandle,
    pub catalog: Arc<CatalogClient>,
    pub companion: Arc<CompanionClient>,
    pub extractor: Extractor,
    pub resolver: MetadataResolver,
    pub detector: DuplicateDetector,
    pub classifier: Classifier,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

impl Services {
    /// Wire the full service graph from a database and a config handle.
    pub fn build(db: Database, config: ConfigHandle) -> Result<Arc<Self>> {
        let snapshot = config.current();

        let catalog = Arc::new(CatalogClient::new(&snapshot.metadata)?);
        let companion = Arc::new(CompanionClient::new(&snapshot.companion_server)?);
        let driver = SevenZip::new(&snapshot.extract.seven_zip_path);

        let extractor = Extractor::new(driver, db.passwords());
        let resolver = MetadataResolver::new(Arc::clone(&catalog), db.metadata());
        let detector = DuplicateDetector::new(
            db.library(),
            db.linkage(),
            Arc::clone(&catalog),
            Arc::clone(&companion),
        );
        let classifier = Classifier::new(db.library());

        Ok(Arc::new(Self {
            db,
            config,
            catalog,
            companion,
            extractor,
            resolver,
            detector,
            classifier,
        }))
    }
}
