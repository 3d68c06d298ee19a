//! Transaction utilities
//!
//! Scoped helpers around [`AttachmentStore`]: the closure runs inside a
//! transaction which is committed if it returns `Ok` and rolled back otherwise.

use crate::error::{StoreError, StoreResult};
use crate::store::{AttachmentStore, ReadTransaction, WriteTransaction};

/// Execute a closure within a read transaction.
///
/// # Example
///
/// ```ignore
/// let pointer = with_read(store, |txn| txn.fetch_pointer(&id))?;
/// ```
pub fn with_read<R>(
    store: &dyn AttachmentStore,
    f: impl FnOnce(&dyn ReadTransaction) -> R,
) -> StoreResult<R> {
    let txn = store.begin_read()?;
    Ok(f(&*txn))
}

/// Execute a closure within a write transaction.
///
/// Commits if the closure succeeds and rolls back (drops the transaction) on
/// error.
///
/// # Example
///
/// ```ignore
/// with_transaction(store, |txn| {
///     txn.remove_pointer(&id)?;
///     txn.insert_stream(stream)?;
///     Ok::<_, StoreError>(())
/// })?;
/// ```
pub fn with_transaction<R, E>(
    store: &dyn AttachmentStore,
    f: impl FnOnce(&mut dyn WriteTransaction) -> Result<R, E>,
) -> Result<R, E>
where
    E: From<StoreError>,
{
    let mut txn = store.begin_write()?;

    match f(&mut *txn) {
        Ok(result) => {
            txn.commit()?;
            Ok(result)
        }
        Err(e) => {
            drop(txn);
            Err(e)
        }
    }
}
