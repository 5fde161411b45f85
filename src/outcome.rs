use crate::error::LoadError;

/// One key's slot in a dispatched batch's result buffer.
///
/// `Undefined` marks a slot the batch function never filled. It is only used
/// to detect a short result vector and never reaches a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<V, E> {
    Value(V),
    Error(E),
    Undefined,
}

impl<V, E> Outcome<V, E> {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Outcome::Undefined)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    /// Converts a defined slot into what the key's promise completes with.
    pub(crate) fn into_result(self) -> Option<Result<V, LoadError<E>>> {
        match self {
            Outcome::Value(v) => Some(Ok(v)),
            Outcome::Error(e) => Some(Err(LoadError::Item(e))),
            Outcome::Undefined => None,
        }
    }
}

impl<V, E> From<Result<V, E>> for Outcome<V, E> {
    fn from(result: Result<V, E>) -> Self {
        match result {
            Ok(v) => Outcome::Value(v),
            Err(e) => Outcome::Error(e),
        }
    }
}

/// Lays the batch function's results out against `key_count` keys.
///
/// Missing trailing results stay `Undefined`. Extra results are reported back
/// as the actual result count so the caller can fail the batch.
pub(crate) fn buffer<V, E>(
    key_count: usize,
    results: Vec<Result<V, E>>,
) -> Result<Vec<Outcome<V, E>>, usize> {
    let values = results.len();
    if values > key_count {
        return Err(values);
    }
    let mut buffer = Vec::with_capacity(key_count);
    buffer.extend(results.into_iter().map(Outcome::from));
    buffer.resize_with(key_count, || Outcome::Undefined);
    Ok(buffer)
}
