//! Default camera through AVFoundation.
//!
//! The session delivers NV12 sample buffers on a dispatch queue; each one is
//! copied into an I420 buffer and pushed into the active `NativeVideoSource`.

use std::ffi::{c_char, c_void};
use std::sync::Mutex;

use livekit::webrtc::prelude::*;
use livekit::webrtc::video_source::native::NativeVideoSource;
use objc2::rc::Retained;
use objc2::runtime::{AnyClass, AnyObject, Bool, NSObject};
use objc2::{ClassType, define_class, msg_send, msg_send_id};
use playground_core::{CaptureHandle, PlaygroundError};
use playground_video::{I420PlanesMut, nv12_to_i420};

#[link(name = "CoreMedia", kind = "framework")]
unsafe extern "C" {
    fn CMSampleBufferGetImageBuffer(sbuf: *const c_void) -> *const c_void;
}

#[link(name = "CoreVideo", kind = "framework")]
unsafe extern "C" {
    fn CVPixelBufferLockBaseAddress(pxbuf: *const c_void, flags: u64) -> i32;
    fn CVPixelBufferUnlockBaseAddress(pxbuf: *const c_void, flags: u64) -> i32;
    fn CVPixelBufferGetBaseAddressOfPlane(pxbuf: *const c_void, plane: usize) -> *const u8;
    fn CVPixelBufferGetBytesPerRowOfPlane(pxbuf: *const c_void, plane: usize) -> usize;
    fn CVPixelBufferGetWidth(pxbuf: *const c_void) -> usize;
    fn CVPixelBufferGetHeight(pxbuf: *const c_void) -> usize;
}

#[link(name = "AVFoundation", kind = "framework")]
unsafe extern "C" {
    static AVMediaTypeVideo: *const AnyObject;
    static AVCaptureSessionPresetHigh: *const AnyObject;
}

unsafe extern "C" {
    fn dispatch_queue_create(label: *const c_char, attr: *const c_void) -> *mut c_void;
    fn dispatch_release(queue: *mut c_void);
}

/// kCVPixelFormatType_420YpCbCr8BiPlanarFullRange ('420f')
const PIXEL_FORMAT_NV12: u32 = 0x3432_3066;
/// kCVPixelBufferLock_ReadOnly
const LOCK_READ_ONLY: u64 = 1;

/// Source fed by the delegate. One camera session runs at a time.
static ACTIVE_SOURCE: Mutex<Option<NativeVideoSource>> = Mutex::new(None);

fn camera_err(message: &str) -> PlaygroundError {
    PlaygroundError::Media(format!("camera: {message}"))
}

fn on_sample_buffer(sample_buffer: *const c_void) {
    if sample_buffer.is_null() {
        return;
    }
    let guard = ACTIVE_SOURCE.lock().expect("camera source lock poisoned");
    let Some(source) = guard.as_ref() else { return };

    let pxbuf = unsafe { CMSampleBufferGetImageBuffer(sample_buffer) };
    if pxbuf.is_null() {
        return;
    }
    let status = unsafe { CVPixelBufferLockBaseAddress(pxbuf, LOCK_READ_ONLY) };
    if status != 0 {
        tracing::warn!("CVPixelBufferLockBaseAddress failed: {status}");
        return;
    }

    let width = unsafe { CVPixelBufferGetWidth(pxbuf) } as u32;
    let height = unsafe { CVPixelBufferGetHeight(pxbuf) } as u32;
    let y_ptr = unsafe { CVPixelBufferGetBaseAddressOfPlane(pxbuf, 0) };
    let uv_ptr = unsafe { CVPixelBufferGetBaseAddressOfPlane(pxbuf, 1) };
    let stride_y = unsafe { CVPixelBufferGetBytesPerRowOfPlane(pxbuf, 0) };
    let stride_uv = unsafe { CVPixelBufferGetBytesPerRowOfPlane(pxbuf, 1) };

    if !y_ptr.is_null() && !uv_ptr.is_null() {
        // Plane sizes as CoreVideo lays them out: stride * rows.
        let y = unsafe { std::slice::from_raw_parts(y_ptr, stride_y * height as usize) };
        let uv = unsafe {
            std::slice::from_raw_parts(uv_ptr, stride_uv * height.div_ceil(2) as usize)
        };

        let mut buffer = I420Buffer::new(width, height);
        let (dst_stride_y, dst_stride_u, dst_stride_v) = buffer.strides();
        let (dst_y, dst_u, dst_v) = buffer.data_mut();
        nv12_to_i420(
            width,
            height,
            y,
            stride_y,
            uv,
            stride_uv,
            I420PlanesMut {
                y: dst_y,
                u: dst_u,
                v: dst_v,
                stride_y: dst_stride_y,
                stride_u: dst_stride_u,
                stride_v: dst_stride_v,
            },
        );
        unsafe { CVPixelBufferUnlockBaseAddress(pxbuf, LOCK_READ_ONLY) };

        source.capture_frame(&VideoFrame {
            rotation: VideoRotation::VideoRotation0,
            timestamp_us: 0,
            buffer,
        });
    } else {
        unsafe { CVPixelBufferUnlockBaseAddress(pxbuf, LOCK_READ_ONLY) };
    }
}

define_class!(
    #[unsafe(super(NSObject))]
    #[name = "PlaygroundCameraDelegate"]
    struct CameraDelegate;

    impl CameraDelegate {
        #[unsafe(method(captureOutput:didOutputSampleBuffer:fromConnection:))]
        #[allow(non_snake_case)]
        fn captureOutput_didOutputSampleBuffer_fromConnection(
            &self,
            _output: *const AnyObject,
            sample_buffer: *const c_void,
            _connection: *const AnyObject,
        ) {
            on_sample_buffer(sample_buffer);
        }
    }
);

/// A running AVCaptureSession on the default camera.
pub struct MacCameraCapture {
    session: Retained<AnyObject>,
    // The output holds its delegate weakly.
    _delegate: Retained<CameraDelegate>,
    queue: *mut c_void,
}

// The session is only started and stopped through this handle; frames are
// delivered on the session's own dispatch queue.
unsafe impl Send for MacCameraCapture {}

impl MacCameraCapture {
    pub fn start(source: NativeVideoSource) -> Result<Self, PlaygroundError> {
        *ACTIVE_SOURCE.lock().expect("camera source lock poisoned") = Some(source);
        let started = unsafe { Self::start_session() };
        if started.is_err() {
            ACTIVE_SOURCE
                .lock()
                .expect("camera source lock poisoned")
                .take();
        }
        started
    }

    unsafe fn start_session() -> Result<Self, PlaygroundError> {
        let class = |name: &std::ffi::CStr| {
            AnyClass::get(name).ok_or_else(|| camera_err(&format!("class {name:?} not found")))
        };

        let session: Retained<AnyObject> = unsafe { msg_send_id![class(c"AVCaptureSession")?, new] };
        let _: () = unsafe { msg_send![&*session, setSessionPreset: AVCaptureSessionPresetHigh] };

        let device: *mut AnyObject = unsafe {
            msg_send![class(c"AVCaptureDevice")?, defaultDeviceWithMediaType: AVMediaTypeVideo]
        };
        let device = unsafe { Retained::retain(device) }
            .ok_or_else(|| camera_err("no camera device found"))?;

        let mut error: *mut AnyObject = std::ptr::null_mut();
        let input: *mut AnyObject = unsafe {
            msg_send![class(c"AVCaptureDeviceInput")?, deviceInputWithDevice: &*device error: &mut error]
        };
        let input = unsafe { Retained::retain(input) }
            .ok_or_else(|| camera_err("cannot open camera input (permission denied?)"))?;

        let output: Retained<AnyObject> =
            unsafe { msg_send_id![class(c"AVCaptureVideoDataOutput")?, new] };
        let format: Retained<AnyObject> = unsafe {
            msg_send_id![class(c"NSNumber")?, numberWithUnsignedInt: PIXEL_FORMAT_NV12]
        };
        // kCVPixelBufferPixelFormatTypeKey
        let format_key: Retained<AnyObject> = unsafe {
            msg_send_id![class(c"NSString")?, stringWithUTF8String: c"PixelFormatType".as_ptr()]
        };
        let settings: Retained<AnyObject> = unsafe {
            msg_send_id![class(c"NSDictionary")?, dictionaryWithObject: &*format forKey: &*format_key]
        };
        let _: () = unsafe { msg_send![&*output, setVideoSettings: &*settings] };
        let _: () = unsafe { msg_send![&*output, setAlwaysDiscardsLateVideoFrames: Bool::YES] };

        let delegate: Retained<CameraDelegate> = unsafe { msg_send_id![CameraDelegate::class(), new] };
        let queue = unsafe { dispatch_queue_create(c"livekit-playground.camera".as_ptr(), std::ptr::null()) };
        let _: () = unsafe { msg_send![&*output, setSampleBufferDelegate: &*delegate, queue: queue] };

        let capture = MacCameraCapture {
            session,
            _delegate: delegate,
            queue,
        };

        let can_add_input: Bool = unsafe { msg_send![&*capture.session, canAddInput: &*input] };
        if !can_add_input.as_bool() {
            return Err(camera_err("cannot add camera input to session"));
        }
        let _: () = unsafe { msg_send![&*capture.session, addInput: &*input] };

        let can_add_output: Bool = unsafe { msg_send![&*capture.session, canAddOutput: &*output] };
        if !can_add_output.as_bool() {
            return Err(camera_err("cannot add video output to session"));
        }
        let _: () = unsafe { msg_send![&*capture.session, addOutput: &*output] };

        let _: () = unsafe { msg_send![&*capture.session, startRunning] };
        tracing::info!("camera capture started");
        Ok(capture)
    }
}

impl CaptureHandle for MacCameraCapture {
    fn stop(self: Box<Self>) {
        // Drop stops the session.
    }
}

impl Drop for MacCameraCapture {
    fn drop(&mut self) {
        let running: Bool = unsafe { msg_send![&*self.session, isRunning] };
        if running.as_bool() {
            let _: () = unsafe { msg_send![&*self.session, stopRunning] };
            tracing::info!("camera capture stopped");
        }
        ACTIVE_SOURCE
            .lock()
            .expect("camera source lock poisoned")
            .take();
        unsafe { dispatch_release(self.queue) };
    }
}
