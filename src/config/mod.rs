mod manifest;

pub use manifest::{Manifest, ManifestError};
