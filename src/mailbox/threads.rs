use std::collections::HashMap;

use tracing::{debug, warn};

use crate::errors::{MailError, MailResult};
use crate::mailbox::MailboxSession;
use crate::types::Thread;

/// Groups `(thread id, uid)` pairs into threads.
///
/// Threads are ordered by their first appearance and keep the UIDs in the
/// order they were encountered.
pub fn assemble_threads<I, S>(pairs: I) -> Vec<Thread>
where
    I: IntoIterator<Item = (S, u32)>,
    S: Into<String>,
{
    let mut threads: Vec<Thread> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (thread_id, uid) in pairs {
        let thread_id = thread_id.into();
        match position.get(&thread_id) {
            Some(&i) => threads[i].uids.push(uid),
            None => {
                position.insert(thread_id.clone(), threads.len());
                threads.push(Thread::new(thread_id, vec![uid]));
            }
        }
    }

    threads
}

/// Lists the threads of the selected mailbox.
pub async fn get_threads<S: MailboxSession>(session: &mut S) -> MailResult<Vec<Thread>> {
    let index = session.fetch_thread_index("1:*").await.map_err(|e| {
        warn!(error = %e, "FETCH (X-GM-THRID UID) failed");
        MailError::BadConnection
    })?;

    let threads = assemble_threads(index);
    debug!(threads = threads.len(), "threads assembled");
    Ok(threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uids(threads: &[Thread]) -> Vec<Vec<u32>> {
        threads.iter().map(|t| t.uids.clone()).collect()
    }

    #[test]
    fn groups_by_first_occurrence() {
        let threads = assemble_threads([("A", 1), ("B", 2), ("A", 3)]);
        assert_eq!(uids(&threads), vec![vec![1, 3], vec![2]]);
        assert_eq!(threads[0].id, "A");
        assert_eq!(threads[1].id, "B");
    }

    #[test]
    fn empty_input_gives_no_threads() {
        let threads = assemble_threads(Vec::<(String, u32)>::new());
        assert!(threads.is_empty());
    }

    #[test]
    fn interleaved_threads_keep_encounter_order() {
        let threads = assemble_threads([
            ("1000000000000000001", 100),
            ("1000000000000000003", 101),
            ("1000000000000000001", 102),
            ("1000000000000000002", 103),
            ("1000000000000000002", 104),
            ("1000000000000000001", 105),
        ]);
        assert_eq!(
            uids(&threads),
            vec![vec![100, 102, 105], vec![101], vec![103, 104]]
        );
    }

    #[test]
    fn uid_order_is_not_sorted() {
        let threads = assemble_threads([("t", 9), ("t", 3), ("t", 7)]);
        assert_eq!(threads[0].uids, vec![9, 3, 7]);
    }
}
