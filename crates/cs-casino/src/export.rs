//! Background transaction export
//!
//! The chain is snapshotted on the calling thread, then written out on a
//! worker. Appends made after the snapshot are not included, and never wait
//! on the export.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use cs_ledger::write_export;

use crate::context::CasinoContext;
use crate::error::CasinoResult;

/// Export every transfer to `dest` on a worker thread.
/// The handle yields the number of rows written.
pub fn spawn_export(
    ctx: &CasinoContext,
    dest: impl Into<PathBuf>,
) -> CasinoResult<JoinHandle<CasinoResult<usize>>> {
    let dest = dest.into();
    let blocks = ctx.chain().snapshot()?;
    log::debug!("Exporting {} block(s) to {}", blocks.len(), dest.display());

    let handle = thread::Builder::new()
        .name("cs-export".into())
        .spawn(move || -> CasinoResult<usize> {
            let rows = write_export(&dest, &blocks)?;
            log::info!("Exported {} transaction(s) to {}", rows, dest.display());
            Ok(rows)
        })?;
    Ok(handle)
}

/// Rebuild the live transaction log from the chain. Appends wait for it.
pub fn rebuild_transaction_log(ctx: &CasinoContext) -> CasinoResult<usize> {
    Ok(ctx.chain().regenerate_transaction_log()?)
}
