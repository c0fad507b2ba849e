//! Site adapters. Each one registers itself through `register`.

use crate::error::Result;
use crate::registry::AdapterRegistry;

pub mod douban;
pub mod komiic;

/// Register every bundled adapter, in selection priority order
pub fn register_builtin(registry: &mut AdapterRegistry) -> Result<()> {
    komiic::register(registry)?;
    douban::register(registry)?;
    Ok(())
}
