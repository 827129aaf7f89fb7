use std::collections::VecDeque;
use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::BackendResult;

/// Number of keys fetched per page while scanning.
pub const SCAN_PAGE_SIZE: usize = 64;

/// One page of a prefix scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Cursor for the following page: the last key of this one, or `None` when exhausted.
    pub next: Option<String>,
}

/// `""` and `"*"` both select every key.
pub fn normalize_prefix(prefix: &str) -> &str {
    if prefix == "*" {
        ""
    } else {
        prefix
    }
}

struct Cursor {
    prefix: String,
    after: Option<String>,
    buffered: VecDeque<String>,
    done: bool,
}

/// Turns a page fetcher into a lazy key stream.
///
/// `fetch(prefix, after)` is only called when the previous page has been drained, so keys
/// written between pages can still be picked up. The stream ends after the first error.
pub fn paged<'a, F, Fut>(prefix: &str, fetch: F) -> BoxStream<'a, BackendResult<String>>
where
    F: Fn(String, Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = BackendResult<ScanPage>> + Send + 'a,
{
    let cursor = Cursor {
        prefix: normalize_prefix(prefix).to_string(),
        after: None,
        buffered: VecDeque::new(),
        done: false,
    };

    stream::unfold((fetch, cursor), |(fetch, mut cursor)| async move {
        loop {
            if let Some(key) = cursor.buffered.pop_front() {
                return Some((Ok(key), (fetch, cursor)));
            }
            if cursor.done {
                return None;
            }
            let page = fetch(cursor.prefix.clone(), cursor.after.take());
            match page.await {
                Ok(page) => {
                    cursor.done = page.next.is_none();
                    cursor.after = page.next;
                    cursor.buffered.extend(page.keys);
                }
                Err(e) => {
                    cursor.done = true;
                    return Some((Err(e), (fetch, cursor)));
                }
            }
        }
    })
    .boxed()
}
