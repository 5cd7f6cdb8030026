//! Encoder selection.
//!
//! The vector math lives in [`editkb_core::embedding`]; this module maps
//! the `[embedding]` config section onto a concrete [`Encoder`].
//!
//! | `provider` | Encoder |
//! |------------|---------|
//! | `"hashing"` | [`HashingEncoder`] with `embedding.dims` buckets |

use std::sync::Arc;

use anyhow::{bail, Result};
use editkb_core::embedding::{Encoder, HashingEncoder};

use crate::config::EmbeddingConfig;

/// Create the encoder named by `config.provider`.
///
/// # Errors
///
/// Returns an error for unknown provider names or a zero dimension.
pub fn create_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn Encoder>> {
    if config.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEncoder::new(config.dims))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
