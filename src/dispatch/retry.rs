/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Duration;

/// Additional attempts made for a message after the first one fails.
pub const MAX_RETRY: usize = 2;

/// Reply code for "454 4.7.0 Temporary authentication failure" (RFC 4954).
pub const AUTHENTICATION_FAILED_CODE: u16 = 454;

/// Pause between two attempts of the same message.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bounded retry applied to each message independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
    pub retry_code: u16,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: MAX_RETRY,
            delay: RETRY_DELAY,
            retry_code: AUTHENTICATION_FAILED_CODE,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        RetryPolicy {
            max_retries,
            delay,
            ..Default::default()
        }
    }

    /// Disables retries altogether.
    pub fn never() -> Self {
        RetryPolicy::new(0, Duration::ZERO)
    }

    /// Returns `true` if `err` is the reply this policy retries.
    pub fn is_retryable(&self, err: &crate::Error) -> bool {
        matches!(err, crate::Error::UnexpectedReply(reply) if reply.code == self.retry_code)
    }

    /// Next state of a message after an attempt that produced `result`,
    /// given the number of retries already spent on it.
    pub(crate) fn next(&self, result: crate::Result<()>, retries: usize) -> Delivery {
        match result {
            Ok(()) => Delivery::Sent,
            Err(err) if retries < self.max_retries && self.is_retryable(&err) => {
                Delivery::RetryWait(err)
            }
            Err(err) => Delivery::Failed(err),
        }
    }
}

/// Per-message delivery state.
///
/// ```text
/// Pending -> Sent
/// Pending -> RetryWait -> Pending
/// Pending -> Failed
/// ```
#[derive(Debug)]
pub(crate) enum Delivery {
    Pending,
    RetryWait(crate::Error),
    Sent,
    Failed(crate::Error),
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use smtp_proto::Response;

    use super::{Delivery, RetryPolicy, AUTHENTICATION_FAILED_CODE, MAX_RETRY};

    fn rejected(code: u16) -> crate::Error {
        crate::Error::UnexpectedReply(Response {
            code,
            esc: [4, 7, 0],
            message: "rejected".to_string(),
        })
    }

    #[test]
    fn retry_transitions() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, MAX_RETRY);
        assert_eq!(policy.delay, Duration::from_secs(1));

        assert!(matches!(policy.next(Ok(()), 0), Delivery::Sent));
        for retries in 0..MAX_RETRY {
            assert!(matches!(
                policy.next(Err(rejected(AUTHENTICATION_FAILED_CODE)), retries),
                Delivery::RetryWait(_)
            ));
        }
        assert!(matches!(
            policy.next(Err(rejected(AUTHENTICATION_FAILED_CODE)), MAX_RETRY),
            Delivery::Failed(_)
        ));

        // Other failures are never retried
        assert!(matches!(
            policy.next(Err(rejected(451)), 0),
            Delivery::Failed(_)
        ));
        assert!(matches!(
            policy.next(Err(crate::Error::SessionClosed), 0),
            Delivery::Failed(_)
        ));
        assert!(matches!(
            policy.next(Err(crate::Error::Timeout), 0),
            Delivery::Failed(_)
        ));
    }

    #[test]
    fn retries_disabled() {
        assert!(matches!(
            RetryPolicy::never().next(Err(rejected(AUTHENTICATION_FAILED_CODE)), 0),
            Delivery::Failed(_)
        ));
    }
}
