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

use smtp_proto::Response;

pub mod auth;
pub mod builder;
pub mod client;
pub mod ehlo;
pub mod envelope;
pub mod message;
pub mod stream;
pub mod tls;

pub trait AssertReply: Sized {
    fn is_positive_completion(&self) -> bool;
    fn assert_positive_completion(self) -> crate::Result<()>;
    fn assert_code(self, code: u16) -> crate::Result<()>;
}

impl AssertReply for Response<String> {
    /// Returns `true` if the reply is a positive completion.
    #[inline(always)]
    fn is_positive_completion(&self) -> bool {
        (200..=299).contains(&self.code)
    }

    /// Returns an error if the reply is not a positive completion.
    #[inline(always)]
    fn assert_positive_completion(self) -> crate::Result<()> {
        if self.is_positive_completion() {
            Ok(())
        } else {
            Err(crate::Error::UnexpectedReply(self))
        }
    }

    /// Returns an error if the reply code does not match the expected value.
    #[inline(always)]
    fn assert_code(self, code: u16) -> crate::Result<()> {
        if self.code == code {
            Ok(())
        } else {
            Err(crate::Error::UnexpectedReply(self))
        }
    }
}

#[cfg(test)]
mod test {
    use smtp_proto::Response;

    use super::AssertReply;

    fn reply(code: u16) -> Response<String> {
        Response {
            code,
            esc: [0, 0, 0],
            message: "test".to_string(),
        }
    }

    #[test]
    fn assert_reply() {
        assert!(reply(250).assert_positive_completion().is_ok());
        assert!(reply(221).assert_positive_completion().is_ok());
        assert!(reply(354).assert_positive_completion().is_err());
        assert!(reply(354).assert_code(354).is_ok());

        let err = reply(454).assert_positive_completion().unwrap_err();
        assert_eq!(err.reply_code(), Some(454));
        assert!(err.is_transient_auth_failure());
        assert!(!reply(535)
            .assert_positive_completion()
            .unwrap_err()
            .is_transient_auth_failure());
    }
}
