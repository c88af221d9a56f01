use super::Error;

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Run `future` until it completes or `cancel_token` is cancelled,
/// whichever happens first.
///
/// `future` is dropped on cancellation, closing whatever socket it owns.
pub(super) async fn run_cancellable<T, F>(cancel_token: &CancellationToken, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;

        _ = cancel_token.cancelled() => Err(Error::Aborted),
        res = future => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::pending;

    #[tokio::test]
    async fn test_cancelled_before_completion() {
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        let res = run_cancellable(&cancel_token, pending::<Result<(), Error>>()).await;
        assert!(matches!(res, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn test_completes() {
        let cancel_token = CancellationToken::new();

        let res = run_cancellable(&cancel_token, async { Ok(42) }).await;
        assert_eq!(res.unwrap(), 42);
    }
}
