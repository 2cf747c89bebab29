use std::path::Path;

use image::RgbaImage;

/// Before/after divider position as a percentage of the container width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompareSlider {
    percent: f32,
}

impl Default for CompareSlider {
    fn default() -> Self {
        Self { percent: 50.0 }
    }
}

impl CompareSlider {
    pub fn percent(&self) -> f32 {
        self.percent
    }

    pub fn set_percent(&mut self, percent: f32) {
        self.percent = if percent.is_nan() {
            50.0
        } else {
            percent.clamp(0.0, 100.0)
        };
    }

    /// Place the divider under a pointer at `x` in a container spanning
    /// `left..left + width`.
    pub fn drag_to(&mut self, x: f32, left: f32, width: f32) {
        if width <= 0.0 {
            return;
        }
        self.set_percent((x - left) / width * 100.0);
    }

    /// Divider x coordinate inside the container.
    pub fn split_x(&self, left: f32, width: f32) -> f32 {
        left + width * self.percent / 100.0
    }
}

pub fn download_name(source_stem: &str) -> String {
    format!("{source_stem}_edited.png")
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<(), image::ImageError> {
    img.save_with_format(path, image::ImageFormat::Png)?;
    log::info!("saved result to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_clamps_to_container() {
        let mut s = CompareSlider::default();
        assert_eq!(s.percent(), 50.0);

        s.drag_to(175.0, 100.0, 300.0);
        assert_eq!(s.percent(), 25.0);
        s.drag_to(20.0, 100.0, 300.0);
        assert_eq!(s.percent(), 0.0);
        s.drag_to(900.0, 100.0, 300.0);
        assert_eq!(s.percent(), 100.0);
        assert_eq!(s.split_x(100.0, 300.0), 400.0);
    }

    #[test]
    fn zero_width_container_is_ignored() {
        let mut s = CompareSlider::default();
        s.drag_to(10.0, 0.0, 0.0);
        assert_eq!(s.percent(), 50.0);
        s.set_percent(f32::NAN);
        assert_eq!(s.percent(), 50.0);
    }

    #[test]
    fn saved_file_round_trips_dimensions() {
        let img = RgbaImage::from_pixel(7, 5, image::Rgba([9, 8, 7, 255]));
        let path = std::env::temp_dir().join(format!("redline-{}-{}", std::process::id(), download_name("t")));
        save_png(&img, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, img);
    }
}
