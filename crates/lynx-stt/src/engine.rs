//! Dynamic loading of the native Lynx library and the raw C ABI.
//!
//! The engine exposes a fixed set of C symbols. This module resolves them at
//! runtime with `libloading`, keeps the library handle alive alongside the
//! raw symbols, and implements the call/error-stack protocol on top.

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr::addr_of_mut;

use libc::{c_char, c_float, c_int};
#[cfg(unix)]
use libloading::os::unix::Symbol as RawSymbol;
#[cfg(windows)]
use libloading::os::windows::Symbol as RawSymbol;
use libloading::{Library, Symbol};

use crate::error::{EngineFailure, LynxError, Status};

/// Opaque engine handle on the C side.
#[repr(C)]
struct RawLynx {
    _private: [u8; 0],
}

type LynxInitFn = unsafe extern "C" fn(
    access_key: *const c_char,
    model_path: *const c_char,
    endpoint_duration_sec: c_float,
    enable_automatic_punctuation: bool,
    object: *mut *mut RawLynx,
) -> Status;
type LynxFrameLengthFn = unsafe extern "C" fn() -> i32;
type LynxSampleRateFn = unsafe extern "C" fn() -> i32;
type LynxVersionFn = unsafe extern "C" fn() -> *const c_char;
type LynxProcessFn = unsafe extern "C" fn(
    object: *mut RawLynx,
    pcm: *const i16,
    transcript: *mut *mut c_char,
    is_endpoint: *mut bool,
) -> Status;
type LynxFlushFn =
    unsafe extern "C" fn(object: *mut RawLynx, transcript: *mut *mut c_char) -> Status;
type LynxDeleteFn = unsafe extern "C" fn(object: *mut RawLynx);
type LynxTranscriptFreeFn = unsafe extern "C" fn(transcript: *mut c_char);
type LynxSetClientFn = unsafe extern "C" fn(client: *const c_char);
type LynxGetErrorStackFn =
    unsafe extern "C" fn(messages: *mut *mut *mut c_char, depth: *mut c_int) -> Status;
type LynxFreeErrorStackFn = unsafe extern "C" fn(messages: *mut *mut c_char);

unsafe fn load_symbol<T>(library: &Library, name: &[u8]) -> Result<RawSymbol<T>, LynxError> {
    library
        .get(name)
        .map(|symbol: Symbol<T>| symbol.into_raw())
        .map_err(|err| {
            LynxError::LibraryLoad(format!(
                "missing symbol `{}`: {}",
                String::from_utf8_lossy(name),
                err
            ))
        })
}

/// Reads and frees the engine's diagnostic message stack.
unsafe fn read_error_stack(
    get_error_stack: LynxGetErrorStackFn,
    free_error_stack: LynxFreeErrorStackFn,
) -> Result<Vec<String>, LynxError> {
    let mut messages: *mut *mut c_char = std::ptr::null_mut();
    let mut depth: c_int = 0;

    let status = get_error_stack(addr_of_mut!(messages), addr_of_mut!(depth));
    if status != Status::Success {
        return Err(LynxError::Engine(EngineFailure {
            status,
            context: "unable to read engine error state".to_string(),
            message_stack: Vec::new(),
        }));
    }

    let mut stack = Vec::with_capacity(depth as usize);
    for i in 0..depth as isize {
        let message = *messages.offset(i);
        stack.push(CStr::from_ptr(message).to_string_lossy().into_owned());
    }
    free_error_stack(messages);

    Ok(stack)
}

fn path_to_cstring(path: &Path) -> Result<CString, LynxError> {
    let text = path.to_str().ok_or_else(|| {
        LynxError::InvalidArgument(format!("path {} is not valid UTF-8", path.display()))
    })?;
    CString::new(text).map_err(|_| {
        LynxError::InvalidArgument(format!("path {} contains a NUL byte", path.display()))
    })
}

/// Symbols that outlive initialization. Holds the `Library` so the raw
/// symbols can never dangle.
struct Vtable {
    process: RawSymbol<LynxProcessFn>,
    flush: RawSymbol<LynxFlushFn>,
    delete: RawSymbol<LynxDeleteFn>,
    transcript_free: RawSymbol<LynxTranscriptFreeFn>,
    get_error_stack: RawSymbol<LynxGetErrorStackFn>,
    free_error_stack: RawSymbol<LynxFreeErrorStackFn>,

    _library: Library,
}

pub(crate) struct EngineInner {
    raw: *mut RawLynx,
    frame_length: i32,
    sample_rate: i32,
    version: String,
    vtable: Vtable,
}

impl EngineInner {
    /// Loads the library, resolves all symbols, and initializes a session.
    ///
    /// Callers are expected to have validated arguments already; this only
    /// deals with the dynamic loader and the engine itself.
    pub(crate) fn init(
        access_key: &str,
        model_path: &Path,
        library_path: &Path,
        endpoint_duration_sec: f32,
        enable_automatic_punctuation: bool,
    ) -> Result<Self, LynxError> {
        let access_key = CString::new(access_key).map_err(|_| {
            LynxError::InvalidArgument("access key contains a NUL byte".to_string())
        })?;
        let model_path = path_to_cstring(model_path)?;

        let library = unsafe { Library::new(library_path) }.map_err(|err| {
            LynxError::LibraryLoad(format!(
                "could not open {}: {}",
                library_path.display(),
                err
            ))
        })?;

        // SAFETY: raw symbols are either consumed before `library` moves into
        // the vtable, or stored next to it in the vtable itself.
        let (raw, frame_length, sample_rate, version, vtable) = unsafe {
            let set_client = load_symbol::<LynxSetClientFn>(&library, b"lynx_set_client")?;
            set_client(c"rust".as_ptr());

            let get_error_stack =
                load_symbol::<LynxGetErrorStackFn>(&library, b"lynx_get_error_stack")?;
            let free_error_stack =
                load_symbol::<LynxFreeErrorStackFn>(&library, b"lynx_free_error_stack")?;

            let init = load_symbol::<LynxInitFn>(&library, b"lynx_init")?;
            let frame_length_fn =
                load_symbol::<LynxFrameLengthFn>(&library, b"lynx_frame_length")?;
            let sample_rate_fn = load_symbol::<LynxSampleRateFn>(&library, b"lynx_sample_rate")?;
            let version_fn = load_symbol::<LynxVersionFn>(&library, b"lynx_version")?;

            let mut raw: *mut RawLynx = std::ptr::null_mut();
            let status = init(
                access_key.as_ptr(),
                model_path.as_ptr(),
                endpoint_duration_sec,
                enable_automatic_punctuation,
                addr_of_mut!(raw),
            );
            if status != Status::Success {
                let stack = read_error_stack(*get_error_stack, *free_error_stack)?;
                return Err(LynxError::Engine(EngineFailure {
                    status,
                    context: "engine initialization failed".to_string(),
                    message_stack: stack,
                }));
            }

            let version = CStr::from_ptr(version_fn()).to_str().map_err(|_| {
                LynxError::LibraryLoad(
                    "engine version string is not valid UTF-8".to_string(),
                )
            })?;

            let vtable = Vtable {
                process: load_symbol(&library, b"lynx_process")?,
                flush: load_symbol(&library, b"lynx_flush")?,
                delete: load_symbol(&library, b"lynx_delete")?,
                transcript_free: load_symbol(&library, b"lynx_transcript_free")?,
                get_error_stack,
                free_error_stack,
                _library: library,
            };

            (
                raw,
                frame_length_fn(),
                sample_rate_fn(),
                version.to_string(),
                vtable,
            )
        };

        tracing::debug!(
            version = %version,
            frame_length,
            sample_rate,
            "lynx engine initialized"
        );

        Ok(Self {
            raw,
            frame_length,
            sample_rate,
            version,
            vtable,
        })
    }

    pub(crate) fn frame_length(&self) -> i32 {
        self.frame_length
    }

    pub(crate) fn sample_rate(&self) -> i32 {
        self.sample_rate
    }

    pub(crate) fn version(&self) -> &str {
        &self.version
    }

    pub(crate) fn process(&self, pcm: &[i16]) -> Result<(String, bool), LynxError> {
        if pcm.len() != self.frame_length as usize {
            return Err(LynxError::FrameLength {
                got: pcm.len(),
                want: self.frame_length as usize,
            });
        }

        unsafe {
            let mut transcript: *mut c_char = std::ptr::null_mut();
            let mut is_endpoint = false;

            let status = (self.vtable.process)(
                self.raw,
                pcm.as_ptr(),
                addr_of_mut!(transcript),
                addr_of_mut!(is_endpoint),
            );
            if status != Status::Success {
                return Err(self.failure(status, "process failed"));
            }

            let text = self.take_transcript(transcript)?;
            Ok((text, is_endpoint))
        }
    }

    pub(crate) fn flush(&self) -> Result<String, LynxError> {
        unsafe {
            let mut transcript: *mut c_char = std::ptr::null_mut();

            let status = (self.vtable.flush)(self.raw, addr_of_mut!(transcript));
            if status != Status::Success {
                return Err(self.failure(status, "flush failed"));
            }

            self.take_transcript(transcript)
        }
    }

    /// Copies a transcript buffer out of the engine and frees it. The buffer
    /// is freed on the UTF-8 failure path as well.
    unsafe fn take_transcript(&self, transcript: *mut c_char) -> Result<String, LynxError> {
        // The engine hands back an empty string rather than NULL, but a NULL
        // here must not become undefined behavior.
        if transcript.is_null() {
            return Ok(String::new());
        }
        let text = CStr::from_ptr(transcript).to_str().map(str::to_owned);
        (self.vtable.transcript_free)(transcript);
        text.map_err(|_| {
            LynxError::Engine(EngineFailure {
                status: Status::RuntimeError,
                context: "engine returned a transcript that is not valid UTF-8".to_string(),
                message_stack: Vec::new(),
            })
        })
    }

    fn failure(&self, status: Status, context: &str) -> LynxError {
        let stack = unsafe {
            read_error_stack(*self.vtable.get_error_stack, *self.vtable.free_error_stack)
        };
        match stack {
            Ok(message_stack) => LynxError::Engine(EngineFailure {
                status,
                context: context.to_string(),
                message_stack,
            }),
            Err(err) => err,
        }
    }
}

// SAFETY: the engine serializes access to a session internally; the raw
// pointer is only ever passed back to the library that produced it.
unsafe impl Send for EngineInner {}
unsafe impl Sync for EngineInner {}

impl Drop for EngineInner {
    fn drop(&mut self) {
        unsafe {
            (self.vtable.delete)(self.raw);
        }
    }
}
