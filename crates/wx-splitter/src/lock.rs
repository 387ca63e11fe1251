//! Per-shard exclusive write lock (§4.2, §5): writers for the same shard
//! serialize through a lock held from open-temp to rename; readers never
//! lock at all, they rely on rename atomicity instead.

use std::fs::OpenOptions;
use std::path::Path;

use fs4::fs_std::FileExt;
use wx_common::{WxError, WxResult};

/// Run `f` while holding an exclusive lock on `shard_path`'s sibling
/// `.lock` file. The lock file itself is never read; it exists only as a
/// mutex handle, so concurrent writers to the same shard block on this
/// call rather than racing each other's temp-file writes.
pub fn with_shard_lock<T>(shard_path: &Path, f: impl FnOnce() -> WxResult<T>) -> WxResult<T> {
    let lock_path = lock_sibling_path(shard_path);
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| WxError::io(lock_path.display().to_string(), e))?;

    FileExt::lock_exclusive(&lock_file).map_err(|e| WxError::io(lock_path.display().to_string(), e))?;
    let result = f();
    let _ = FileExt::unlock(&lock_file);
    result
}

fn lock_sibling_path(shard_path: &Path) -> std::path::PathBuf {
    let file_name = shard_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("shard");
    shard_path.with_file_name(format!(".{file_name}.lock"))
}
