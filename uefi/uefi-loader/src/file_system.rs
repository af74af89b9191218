//! Fixed-path access to the kernel image on the boot volume.

use boot_elf::ImageSource;
use log::error;
use uefi::proto::media::file::{File, FileAttribute, FileMode, RegularFile};
use uefi::{CStr16, Status, boot, cstr16};

/// The one path the loader knows. No search, no configuration.
pub const KERNEL_IMAGE_PATH: &CStr16 = cstr16!(r"\EFI\BOOT\kernelua");

/// Open the kernel image on the volume this loader was started from.
///
/// # Errors
/// Any protocol or file-open failure; all fatal to the boot attempt.
pub fn open_kernel_image() -> Result<FileSource, Status> {
    let image_handle = boot::image_handle();
    let mut fs = boot::get_image_file_system(image_handle).map_err(|e| {
        error!("failed to open the boot volume file system: {e:?}");
        e.status()
    })?;

    let mut root = fs.open_volume().map_err(|e| {
        error!("failed to open the volume root directory: {e:?}");
        e.status()
    })?;

    let handle = root
        .open(KERNEL_IMAGE_PATH, FileMode::Read, FileAttribute::empty())
        .map_err(|e| {
            error!("failed to open {KERNEL_IMAGE_PATH}: {e:?}");
            e.status()
        })?;

    let Some(file) = handle.into_regular_file() else {
        error!("{KERNEL_IMAGE_PATH} is not a regular file");
        return Err(Status::NOT_FOUND);
    };

    Ok(FileSource { file })
}

/// Positioned reads over the opened image file.
pub struct FileSource {
    file: RegularFile,
}

impl ImageSource for FileSource {
    type Error = Status;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Status> {
        self.file.set_position(offset).map_err(|e| e.status())?;

        // The file protocol may return short reads; keep going until the
        // buffer is full.
        let mut filled = 0;
        while filled < buf.len() {
            let read = self
                .file
                .read(&mut buf[filled..])
                .map_err(|e| e.status())?;
            if read == 0 {
                return Err(Status::END_OF_FILE);
            }
            filled += read;
        }
        Ok(())
    }
}
