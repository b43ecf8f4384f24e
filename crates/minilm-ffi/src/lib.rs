//! Plain C ABI over [`minilm::Session`]: create a session from two file
//! paths, embed a string into a freshly allocated float buffer, free that
//! buffer, and destroy the session. Grounded on
//! `original_source/src/main/c/jni/minilm_jni.c`'s create/embed/destroy
//! lifecycle, generalized from JNI handles and exceptions to raw pointers
//! and a null-on-error convention any C caller can use.

use std::ffi::CStr;
use std::os::raw::c_char;

use minilm::{Session, HIDDEN_SIZE};

/// Opens a session from `tbf_path` and `vocab_path` (both NUL-terminated
/// UTF-8 C strings). Returns a null pointer if either path is null, not
/// valid UTF-8, or loading fails for any reason (see the logged error).
///
/// # Safety
/// `tbf_path` and `vocab_path` must each be either null or a valid pointer
/// to a NUL-terminated, UTF-8-valid C string that remains readable for the
/// duration of this call.
#[no_mangle]
pub unsafe extern "C" fn minilm_create(
    tbf_path: *const c_char,
    vocab_path: *const c_char,
) -> *mut Session {
    if tbf_path.is_null() || vocab_path.is_null() {
        log::error!("minilm-ffi: minilm_create called with a null path");
        return std::ptr::null_mut();
    }

    let tbf_path = match CStr::from_ptr(tbf_path).to_str() {
        Ok(s) => s,
        Err(_) => {
            log::error!("minilm-ffi: tbf_path is not valid UTF-8");
            return std::ptr::null_mut();
        }
    };
    let vocab_path = match CStr::from_ptr(vocab_path).to_str() {
        Ok(s) => s,
        Err(_) => {
            log::error!("minilm-ffi: vocab_path is not valid UTF-8");
            return std::ptr::null_mut();
        }
    };

    match Session::create(tbf_path, vocab_path) {
        Ok(session) => Box::into_raw(Box::new(session)),
        Err(e) => {
            log::error!("minilm-ffi: failed to create session: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Embeds `text` (a NUL-terminated UTF-8 C string) and returns a freshly
/// allocated buffer of exactly [`HIDDEN_SIZE`] floats, which the caller
/// must release with [`minilm_free_embedding`]. Returns null on any error
/// (invalid handle, invalid UTF-8, tokenization failure).
///
/// # Safety
/// `session` must be a live pointer previously returned by
/// [`minilm_create`] and not yet passed to [`minilm_destroy`]. `text` must
/// be either null or a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn minilm_embed(session: *mut Session, text: *const c_char) -> *mut f32 {
    if session.is_null() || text.is_null() {
        log::error!("minilm-ffi: minilm_embed called with a null session or text");
        return std::ptr::null_mut();
    }

    let text = match CStr::from_ptr(text).to_str() {
        Ok(s) => s,
        Err(_) => {
            log::error!("minilm-ffi: text is not valid UTF-8");
            return std::ptr::null_mut();
        }
    };

    let session = &*session;
    match session.embed(text) {
        Ok(embedding) => {
            let boxed: Box<[f32]> = Box::new(embedding);
            Box::into_raw(boxed) as *mut f32
        }
        Err(e) => {
            log::error!("minilm-ffi: failed to embed text: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Frees a buffer previously returned by [`minilm_embed`]. A no-op on null.
///
/// # Safety
/// `embedding` must be either null or a pointer previously returned by
/// [`minilm_embed`] on this same session, not already freed.
#[no_mangle]
pub unsafe extern "C" fn minilm_free_embedding(embedding: *mut f32) {
    if embedding.is_null() {
        return;
    }
    let slice_ptr = std::ptr::slice_from_raw_parts_mut(embedding, HIDDEN_SIZE);
    drop(Box::from_raw(slice_ptr));
}

/// Destroys a session created by [`minilm_create`]. A no-op on null.
///
/// # Safety
/// `session` must be either null or a pointer previously returned by
/// [`minilm_create`], not already passed to this function.
#[no_mangle]
pub unsafe extern "C" fn minilm_destroy(session: *mut Session) {
    if session.is_null() {
        return;
    }
    drop(Box::from_raw(session));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn create_with_null_paths_returns_null() {
        unsafe {
            assert!(minilm_create(std::ptr::null(), std::ptr::null()).is_null());
        }
    }

    #[test]
    fn create_with_missing_files_returns_null() {
        let tbf = CString::new("/nonexistent/model.tbf").unwrap();
        let vocab = CString::new("/nonexistent/vocab.txt").unwrap();
        unsafe {
            assert!(minilm_create(tbf.as_ptr(), vocab.as_ptr()).is_null());
        }
    }

    #[test]
    fn embed_with_null_session_returns_null() {
        let text = CString::new("hello").unwrap();
        unsafe {
            assert!(minilm_embed(std::ptr::null_mut(), text.as_ptr()).is_null());
        }
    }

    #[test]
    fn destroy_and_free_are_no_ops_on_null() {
        unsafe {
            minilm_destroy(std::ptr::null_mut());
            minilm_free_embedding(std::ptr::null_mut());
        }
    }
}
