// slicekit/src/processors/slicer.rs
use crate::core::{CutPlan, Image, Result};

/// Cuts an image horizontally into full-width strips.
#[derive(Debug, Default, Clone, Copy)]
pub struct Slicer;

impl Slicer {
    pub fn new() -> Self {
        Self
    }

    pub fn slice(&self, image: &Image, plan: &CutPlan) -> Result<Vec<Image>> {
        let mut slices = Vec::new();
        self.for_each_slice(image, plan, |_, slice| {
            slices.push(slice);
            Ok(())
        })?;
        Ok(slices)
    }

    /// Hands each slice to `sink` in top-to-bottom order, so only one copy is alive at a time.
    pub fn for_each_slice<F>(&self, image: &Image, plan: &CutPlan, mut sink: F) -> Result<usize>
    where
        F: FnMut(usize, Image) -> Result<()>,
    {
        let segments = plan.segments(image.height())?;
        let width = image.width();

        log::debug!(
            "Cutting {}x{} image into {} slices",
            width,
            image.height(),
            segments.len()
        );

        for (index, rows) in segments.iter().enumerate() {
            let pixels = image
                .pixels()
                .crop_imm(0, rows.start, width, rows.end - rows.start);
            sink(index, image.with_pixels(pixels))?;
        }

        Ok(segments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Dpi;
    use image::{DynamicImage, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> Image {
        let pixels = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]));
        Image::from_pixels(DynamicImage::ImageRgb8(pixels)).with_dpi(Some(Dpi::new(300, 300)))
    }

    #[test]
    fn slices_cover_image_without_gaps() {
        let image = gradient(5, 100);
        let slices = Slicer::new()
            .slice(&image, &CutPlan::Offsets(vec![30, 31, 90]))
            .unwrap();

        let heights: Vec<u32> = slices.iter().map(|s| s.height()).collect();
        assert_eq!(heights, vec![30, 1, 59, 10]);
        assert!(slices.iter().all(|s| s.width() == 5));

        // first row of the third slice is row 31 of the source
        let third = slices[2].pixels().to_rgb8();
        assert_eq!(third.get_pixel(2, 0).0, [2, 31, 7]);
        assert_eq!(slices[3].dpi(), Some(Dpi::new(300, 300)));
    }

    #[test]
    fn out_of_range_cut_fails_before_any_output() {
        let image = gradient(5, 50);
        let mut produced = 0;
        let result = Slicer::new().for_each_slice(&image, &CutPlan::Offsets(vec![10, 60]), |_, _| {
            produced += 1;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(produced, 0);
    }
}
