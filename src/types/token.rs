/// Cancelled on Ctrl-C; stops listing and the hand-out of new transfers.
pub type RunCancellationToken = tokio_util::sync::CancellationToken;

pub fn create_run_cancellation_token() -> RunCancellationToken {
    tokio_util::sync::CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_token_follows_parent() {
        let token = create_run_cancellation_token();
        let child = token.child_token();

        token.cancel();
        assert!(child.is_cancelled());
    }
}
