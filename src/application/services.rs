// ============================================================
// Layer 2 — Service Wiring
// ============================================================
// Turns the configured backends into trait objects:
//
//   STORAGE_BACKEND=s3     → S3ObjectStore
//   STORAGE_BACKEND=local  → LocalObjectStore(STORAGE_DIR)
//   TRACKING_BACKEND=mlflow → MlflowClient(http://HOST:5000)
//   TRACKING_BACKEND=local  → LocalTracker(TRACKING_DIR)
//
// The tracker and the registry are the same object for both
// tracking backends; they are shared through an Arc.

use std::sync::Arc;

use anyhow::Result;

use crate::domain::traits::{ExperimentTracker, ModelRegistry, ObjectStore};
use crate::infra::config::{Settings, StorageBackend, TrackingBackend};
use crate::infra::local_tracker::LocalTracker;
use crate::infra::mlflow::MlflowClient;
use crate::infra::object_store::{Credentials, LocalObjectStore, S3ObjectStore};

#[derive(Clone)]
pub struct Services {
    pub store:    Arc<dyn ObjectStore>,
    pub tracker:  Arc<dyn ExperimentTracker>,
    pub registry: Arc<dyn ModelRegistry>,
}

impl Services {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let conn = &settings.connection;

        let store: Arc<dyn ObjectStore> = match conn.storage_backend {
            StorageBackend::S3 => Arc::new(S3ObjectStore::new(
                Credentials {
                    access_key: conn.aws_key.clone(),
                    secret_key: conn.aws_secret.clone(),
                    region:     conn.aws_region.clone(),
                },
                conn.bucket.clone(),
                conn.s3_endpoint.clone(),
            )),
            StorageBackend::Local => Arc::new(LocalObjectStore::new(conn.storage_dir.join(&conn.bucket))),
        };

        let (tracker, registry): (Arc<dyn ExperimentTracker>, Arc<dyn ModelRegistry>) =
            match conn.tracking_backend {
                TrackingBackend::Mlflow => {
                    let client = Arc::new(MlflowClient::new(&settings.tracking_config()));
                    (client.clone(), client)
                }
                TrackingBackend::Local => {
                    let local = Arc::new(LocalTracker::new(&conn.tracking_dir)?);
                    (local.clone(), local)
                }
            };

        tracing::debug!(
            "Backends: storage={:?}, tracking={:?}",
            conn.storage_backend,
            conn.tracking_backend
        );
        Ok(Self { store, tracker, registry })
    }
}
