use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{Rgba, RgbaImage};

use crate::field::{shade, FieldInputs};
use crate::types::SurfaceSize;

/// Evaluates the background on the CPU at `inputs.time`.
///
/// `inputs.resolution` is overwritten with `size` so the image covers exactly
/// one frame. Rows are written top-down; fragment coordinates keep the
/// bottom-left origin the shader expects.
pub fn render_still(size: SurfaceSize, inputs: &FieldInputs) -> RgbaImage {
    let inputs = FieldInputs {
        resolution: [size.width as f32, size.height as f32],
        ..*inputs
    };
    RgbaImage::from_fn(size.width, size.height, |x, y| {
        let frag = [x as f32 + 0.5, (size.height - 1 - y) as f32 + 0.5];
        let colour = shade(frag, &inputs);
        Rgba(colour.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
    })
}

/// Renders a still and writes it as PNG.
pub fn export_still(path: &Path, size: SurfaceSize, inputs: &FieldInputs) -> Result<()> {
    if size.is_empty() {
        bail!("still size must be non-zero, got {}x{}", size.width, size.height);
    }
    let image = render_still(size, inputs);
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write still to {}", path.display()))?;
    tracing::info!(path = %path.display(), width = size.width, height = size.height, "still exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn still_before_fade_in_is_flat_floor_grey() {
        let image = render_still(
            SurfaceSize::new(8, 6),
            &FieldInputs {
                time: 0.0,
                resolution: [0.0, 0.0],
                pointer: [0.0, 0.0],
            },
        );
        assert_eq!(image.dimensions(), (8, 6));
        // 0.08 * 255 = 20.4
        assert!(image.pixels().all(|p| p.0 == [20, 20, 20, 255]));
    }

    #[test]
    fn empty_size_is_rejected() {
        let dir = std::env::temp_dir().join("backdrop-still-empty.png");
        let err = export_still(
            &dir,
            SurfaceSize::new(0, 4),
            &FieldInputs {
                time: 1.0,
                resolution: [0.0, 0.0],
                pointer: [0.0, 0.0],
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }
}
