//! GOP mode selection for the handoff framebuffer.

use kernel_handoff::boot::FramebufferInfo;
use log::{error, info};
use uefi::proto::console::gop::GraphicsOutput;
use uefi::{Status, boot};

/// The one resolution the kernel's console is written against.
pub const PREFERRED_WIDTH: usize = 1920;
pub const PREFERRED_HEIGHT: usize = 1080;

/// Switch the display into the preferred mode and describe the resulting
/// framebuffer.
///
/// An absent mode is an invalid-input failure (the platform works, the
/// display just cannot do what the kernel expects); protocol errors are
/// firmware failures. Both abort the boot.
///
/// # Errors
/// `Status::UNSUPPORTED` when no mode matches; protocol status otherwise.
#[allow(clippy::cast_possible_truncation)]
pub fn select_framebuffer() -> Result<FramebufferInfo, Status> {
    let handle = boot::get_handle_for_protocol::<GraphicsOutput>().map_err(|e| {
        error!("failed to locate a graphics output protocol: {e:?}");
        e.status()
    })?;
    let mut gop = boot::open_protocol_exclusive::<GraphicsOutput>(handle).map_err(|e| {
        error!("failed to open the graphics output protocol: {e:?}");
        e.status()
    })?;

    let Some(mode) = gop
        .modes()
        .find(|m| m.info().resolution() == (PREFERRED_WIDTH, PREFERRED_HEIGHT))
    else {
        error!("no {PREFERRED_WIDTH}x{PREFERRED_HEIGHT} graphics mode available");
        return Err(Status::UNSUPPORTED);
    };

    gop.set_mode(&mode).map_err(|e| {
        error!("failed to set the graphics mode: {e:?}");
        e.status()
    })?;

    let info = gop.current_mode_info();
    let (width, height) = info.resolution();
    let mut fb = gop.frame_buffer();

    info!(
        "framebuffer {}x{} (stride {}) at {:#x}",
        width,
        height,
        info.stride(),
        fb.as_mut_ptr() as u64
    );

    Ok(FramebufferInfo {
        ptr: fb.as_mut_ptr() as u64,
        width: width as u32,
        height: height as u32,
        stride: info.stride() as u32,
        _reserved: 0,
    })
}
