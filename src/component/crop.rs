//! Region cropping
//!
//! Cuts a component out of the source screenshot, optionally blanking the
//! pixels its segmentation mask does not cover.

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

use super::types::{CropError, Mask, Region, Result};
use crate::geometry::{BBox, ImageDims};

/// Check that a mask can be indexed with image coordinates
pub fn validate_mask(mask: &Mask, dims: ImageDims) -> Result<()> {
    if mask.width() != dims.width || mask.height() != dims.height {
        return Err(CropError::MaskMismatch {
            mask_w: mask.width(),
            mask_h: mask.height(),
            image_w: dims.width,
            image_h: dims.height,
        });
    }
    Ok(())
}

/// Crop `bbox` from `image`; pixels outside `mask` become transparent black
pub fn crop_region(image: &DynamicImage, bbox: BBox, mask: Option<&Mask>) -> Result<DynamicImage> {
    let dims = ImageDims::new(image.width(), image.height());
    if bbox.is_degenerate() || !bbox.is_within(dims) {
        return Err(CropError::OutOfBounds(bbox));
    }

    let crop = image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);

    let Some(mask) = mask else {
        return Ok(crop);
    };
    validate_mask(mask, dims)?;

    let mut out = RgbaImage::new(bbox.width, bbox.height);
    for (x, y, pixel) in crop.pixels() {
        if mask.get_pixel(bbox.x + x, bbox.y + y)[0] > 0 {
            out.put_pixel(x, y, pixel);
        } else {
            out.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
    Ok(DynamicImage::ImageRgba8(out))
}

/// Crop a filtered region, using its mask when it still carries one
pub fn crop_for(image: &DynamicImage, region: &Region) -> Result<DynamicImage> {
    crop_region(image, region.bbox, region.mask.as_ref())
}
