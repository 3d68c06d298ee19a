//! Message-request policy.
//!
//! Decides whether a thread still has an unaccepted message request. The
//! business rules live with the profile/whitelist owner; the downloader only
//! consumes the two predicates below.

use courier_core::models::ThreadRecord;

use crate::store::ReadTransaction;

pub trait MessageRequestPolicy: Send + Sync {
    /// Whether the user has accepted the thread (for example by whitelisting its profile).
    fn is_thread_accepted(&self, thread: &ThreadRecord, txn: &dyn ReadTransaction) -> bool;

    /// Whether the thread carries an explicit pending message request.
    fn has_pending_message_request(&self, thread: &ThreadRecord, txn: &dyn ReadTransaction)
        -> bool;
}

/// Policy backed by the store's profile whitelist and the thread's own flag.
pub struct WhitelistPolicy;

impl MessageRequestPolicy for WhitelistPolicy {
    fn is_thread_accepted(&self, thread: &ThreadRecord, txn: &dyn ReadTransaction) -> bool {
        txn.is_thread_whitelisted(&thread.id)
    }

    fn has_pending_message_request(
        &self,
        thread: &ThreadRecord,
        _txn: &dyn ReadTransaction,
    ) -> bool {
        thread.has_pending_message_request
    }
}
