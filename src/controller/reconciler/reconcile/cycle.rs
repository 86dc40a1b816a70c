//! One sync cycle: store lookup, client setup, fetch and merge, template,
//! upsert. Each step maps its failure onto a [`SyncError`] variant.

use crate::controller::reconciler::merge::build_secret_data;
use crate::controller::reconciler::secret::DesiredSecret;
use crate::controller::reconciler::template::apply_template;
use crate::controller::reconciler::types::{Reconciler, SyncError};
use crate::crd::ExternalSecret;
use tracing::debug;

/// Materialize the Secret for `es`; returns the number of keys written
pub(super) async fn run_cycle(ctx: &Reconciler, es: &ExternalSecret) -> Result<usize, SyncError> {
    let namespace = es.metadata.namespace.as_deref().unwrap_or("default");

    let store = ctx
        .objects
        .get_store(&es.spec.store_ref, namespace)
        .await
        .map_err(SyncError::StoreNotFound)?;

    let client = ctx
        .clients
        .client_for(&store)
        .await
        .map_err(SyncError::StoreSetup)?;

    let data = build_secret_data(client.as_ref(), &es.spec.data_from, &es.spec.data)
        .await
        .map_err(SyncError::Fetch)?;

    let mut secret = DesiredSecret::for_external_secret(es, data);
    if let Some(template) = &es.spec.template {
        apply_template(&mut secret, template).map_err(SyncError::Template)?;
    }

    ctx.objects
        .upsert_secret(&secret)
        .await
        .map_err(SyncError::Upsert)?;

    debug!(
        store = %store.display_name(),
        keys = secret.data.len(),
        secret_type = %secret.type_,
        "Secret upserted"
    );
    Ok(secret.data.len())
}
