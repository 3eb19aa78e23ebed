use std::path::Path;

use image as image_lib;

use super::GrayImage;
use crate::common::Result;

pub(crate) fn load(filename: &Path) -> Result<GrayImage> {
    let img = image_lib::open(filename)?;
    if img.color() != image_lib::ColorType::L8 {
        log::debug!(
            "converting {:?} image {} to 8-bit luma",
            img.color(),
            filename.display()
        );
    }

    let luma = img.into_luma8();
    let (width, height) = luma.dimensions();

    GrayImage::new(width, height, luma.into_raw())
}

pub(crate) fn save(image: &GrayImage, filename: &Path) -> Result<()> {
    image_lib::save_buffer(
        filename,
        image.bytes(),
        image.width(),
        image.height(),
        image_lib::ExtendedColorType::L8,
    )?;

    Ok(())
}
