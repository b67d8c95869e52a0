use parking_lot::Mutex;
use std::sync::Arc;

/// Lock-guarded value shared between collector tasks and readers.
///
/// Lock sections stay short and never span an `.await`.
pub(crate) type Shared<T> = Arc<Mutex<T>>;

pub(crate) fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
