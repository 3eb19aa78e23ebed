mod io;


use std::path::Path;

use crate::common::{Error, Result};

/// Supported image file extensions for reading and writing.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pgm", "pnm", "png", "jpg", "jpeg", "tiff", "tif", "bmp"];

/// Dimensions of an 8-bit single-channel image. Rows are tightly packed.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
}

impl ImageDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Row-major 8-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    desc: ImageDesc,
    bytes: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: u32, height: u32, bytes: Vec<u8>) -> Result<GrayImage> {
        let desc = ImageDesc::new(width, height);
        if bytes.len() != desc.pixel_count() {
            return Err(Error::InvalidImage(format!(
                "bytes length {} does not match {}x{} = {} pixels",
                bytes.len(),
                width,
                height,
                desc.pixel_count()
            )));
        }

        Ok(GrayImage { desc, bytes })
    }

    pub fn new_black(desc: ImageDesc) -> GrayImage {
        GrayImage {
            desc,
            bytes: vec![0; desc.pixel_count()],
        }
    }

    /// Returns the image descriptor.
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn pixel_count(&self) -> usize {
        self.desc.pixel_count()
    }

    /// Returns the pixels as a flat row-major slice.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Decodes an image file and converts it to 8-bit luma.
    pub fn read_file<P: AsRef<Path>>(filename: P) -> Result<GrayImage> {
        check_extension(filename.as_ref())?;
        io::load(filename.as_ref())
    }

    /// Encodes the image as 8-bit luma; the container format follows the extension.
    pub fn save_file<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        check_extension(filename.as_ref())?;
        io::save(self, filename.as_ref())
    }
}

fn check_extension(filename: &Path) -> Result<()> {
    let extension = filename
        .extension()
        .and_then(|os_str| os_str.to_str())
        .ok_or_else(|| Error::Codec(format!("missing extension: {}", filename.display())))?
        .to_ascii_lowercase();

    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(Error::Codec(format!("unsupported extension: {}", extension)))
    }
}
