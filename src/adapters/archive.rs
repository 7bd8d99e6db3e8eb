//! Directory-tree archives with tar, run wherever the target lives

use super::AdapterContext;
use crate::backends::Invocation;
use crate::error::BackupError;
use crate::utils::executor::{StdinSource, StdoutSink};
use std::path::Path;
use tracing::info;

/// `tar czf - -C <dir> .` streamed into `dest`
pub(crate) fn dump_tree(ctx: &AdapterContext, dir: &str, dest: &Path) -> Result<(), BackupError> {
    info!("Archiving {} ({})", dir, ctx.backend.mode());
    ctx.backend.exec(
        Invocation::new(["tar", "czf", "-", "-C", dir, "."])
            .stdout(StdoutSink::File(dest.to_path_buf())),
    )?;
    Ok(())
}

/// Empty `dir`, then unpack `artifact` into it
pub(crate) fn restore_tree(
    ctx: &AdapterContext,
    dir: &str,
    artifact: &Path,
) -> Result<(), BackupError> {
    info!("Replacing contents of {} from {:?}", dir, artifact);
    ctx.backend
        .exec(Invocation::new(["find", dir, "-mindepth", "1", "-delete"]))?;
    ctx.backend.exec(
        Invocation::new(["tar", "xzf", "-", "-C", dir])
            .stdin(StdinSource::File(artifact.to_path_buf())),
    )?;
    Ok(())
}
