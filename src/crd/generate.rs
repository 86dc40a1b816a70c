//! CRD manifests rendered from the Rust types, consumed by the `crdgen` binary.

use super::{ClusterSecretStore, ExternalSecret, SecretStore};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::CustomResourceExt;

/// Every CRD served by the controller
#[must_use]
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        ExternalSecret::crd(),
        SecretStore::crd(),
        ClusterSecretStore::crd(),
    ]
}

/// Multi-document YAML of [`all_crds`], with a generated-file header
///
/// # Errors
///
/// Returns the serializer error if a CRD cannot be rendered.
pub fn render_crds() -> Result<String, serde_yaml::Error> {
    let mut out = String::from(
        "# This file is auto-generated by crdgen\n\
         # DO NOT EDIT THIS FILE MANUALLY\n\
         # Change the types under src/crd/ and regenerate\n",
    );
    for crd in all_crds() {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}
