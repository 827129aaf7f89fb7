use std::time::Duration;

/// What a scan does with a record it cannot turn back into an object.
///
/// A record fails when its key is not `<kind>:<id>`, its kind is not registered, or its
/// payload does not match the kind's shape. Backend failures always abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Abort the operation and return the record's error.
    #[default]
    FailFast,
    /// Log the record at `warn` and keep scanning.
    Skip,
}

/// Tunables for an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub decode_policy: DecodePolicy,
    /// Upper bound for a whole operation, scans included. `None` waits on the backend.
    pub op_timeout: Option<Duration>,
}

impl StoreOptions {
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }
}
