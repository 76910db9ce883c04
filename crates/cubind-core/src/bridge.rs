//! Native error → host error conversion.
//!
//! The message buffer is allocated by the native side. It is copied into a
//! host `String` first, then handed back through `drop_error_message`, and
//! never touched again.

use std::ffi::CStr;
use std::ptr;

use crate::error::RuntimeError;
use crate::ffi::{FnDropErrorMessage, NativeError};

impl NativeError {
    /// The success value: code 0, no message.
    pub const fn success() -> Self {
        Self { code: 0, message: ptr::null_mut() }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Take ownership of the native error, copying and releasing its message.
    ///
    /// Only for failures; a null message yields an empty host message.
    pub fn into_runtime_error(mut self, drop_message: FnDropErrorMessage) -> RuntimeError {
        let message = if self.message.is_null() {
            String::new()
        } else {
            let text = unsafe { CStr::from_ptr(self.message) }
                .to_string_lossy()
                .into_owned();
            unsafe { drop_message(self.message) };
            self.message = ptr::null_mut();
            text
        };
        RuntimeError { code: self.code, message }
    }

    /// `Ok(())` on success without bridging, otherwise the bridged error.
    pub fn into_result(self, drop_message: FnDropErrorMessage) -> Result<(), RuntimeError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.into_runtime_error(drop_message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, alloc_message, fake_drop_error_message};

    #[test]
    fn test_message_is_copied_then_released_once() {
        let before = testing::message_drops();
        let err = NativeError { code: 700, message: alloc_message("an illegal memory access was encountered") };

        let host = err.into_runtime_error(fake_drop_error_message);

        assert_eq!(host.code, 700);
        assert_eq!(host.message, "an illegal memory access was encountered");
        assert_eq!(testing::message_drops() - before, 1);
    }

    #[test]
    fn test_null_message_yields_empty_text_without_release() {
        let before = testing::message_drops();
        let err = NativeError { code: 2, message: ptr::null_mut() };

        let host = err.into_runtime_error(fake_drop_error_message);

        assert_eq!(host, RuntimeError { code: 2, message: String::new() });
        assert_eq!(testing::message_drops(), before);
    }

    #[test]
    fn test_success_is_not_bridged() {
        let before = testing::message_drops();
        assert!(NativeError::success().into_result(fake_drop_error_message).is_ok());
        assert_eq!(testing::message_drops(), before);
    }

    #[test]
    fn test_failure_result_carries_message() {
        let before = testing::message_drops();
        let err = NativeError { code: 1, message: alloc_message("invalid argument") };
        let result = err.into_result(fake_drop_error_message);
        assert_eq!(
            result,
            Err(RuntimeError { code: 1, message: "invalid argument".into() })
        );
        assert_eq!(testing::message_drops() - before, 1);
    }

    #[test]
    fn test_non_utf8_message_is_copied_lossily() {
        let before = testing::message_drops();
        let raw = std::ffi::CString::new(vec![b'b', b'a', b'd', 0xff]).unwrap().into_raw();
        let host = NativeError { code: 9, message: raw }.into_runtime_error(fake_drop_error_message);
        assert!(host.message.starts_with("bad"));
        assert_eq!(testing::message_drops() - before, 1);
    }
}
