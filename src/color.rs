// src/color.rs
// sRGB palette colors with conversions into the linear values the pipelines
// and the render pass clear expect.
use bevy_color::{ColorToComponents, LinearRgba, Srgba};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    srgba: Srgba,
}

impl Color {
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            srgba: Srgba { alpha, ..self.srgba },
        }
    }

    pub fn into_linear_rgba(self) -> [f32; 4] {
        LinearRgba::from(self.srgba).to_f32_array()
    }

    pub fn into_linear_wgpu_color(self) -> wgpu::Color {
        let linear = LinearRgba::from(self.srgba);
        wgpu::Color {
            r: linear.red as f64,
            g: linear.green as f64,
            b: linear.blue as f64,
            a: linear.alpha as f64,
        }
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self {
            srgba: Srgba::rgb_u8(r, g, b),
        }
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::from((r, g, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_passes_through_linear_conversion() {
        let rgba = Color::from((61, 220, 255)).with_alpha(0.12).into_linear_rgba();
        assert!((rgba[3] - 0.12).abs() < 1e-6);
    }

    #[test]
    fn white_is_linear_one() {
        let rgba = Color::from((255, 255, 255)).into_linear_rgba();
        for channel in &rgba[..3] {
            assert!((channel - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn wgpu_clear_color_matches_linear_components() {
        let color = Color::from((18, 18, 18));
        let rgba = color.into_linear_rgba();
        let clear = color.into_linear_wgpu_color();
        assert!((clear.r - rgba[0] as f64).abs() < 1e-6);
        assert!((clear.a - 1.0).abs() < 1e-6);
    }
}
