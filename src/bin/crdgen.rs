//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions for `ExternalSecret`, `SecretStore` and
//! `ClusterSecretStore` as one multi-document YAML stream.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/crds.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use external_secret_controller::crd::generate::render_crds;

fn main() {
    match render_crds() {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Failed to serialize CRDs to YAML: {e}");
            std::process::exit(1);
        }
    }
}
