use crate::backend::UniformShape;
use crate::types::{TextureImage, UniformValue};

/// GL call a [`UniformValue`] lowers to.
#[derive(Debug, PartialEq)]
pub(crate) enum Upload<'a> {
    Int(i32),
    Float(f32),
    Floats(UniformShape, &'a [f32]),
    Texture(&'a TextureImage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UnsupportedLength(pub usize);

/// Lowers a value without copying; matrices and colour arrays are viewed as
/// flat column-major floats.
pub(crate) fn lower(value: &UniformValue) -> Result<Upload<'_>, UnsupportedLength> {
    let upload = match value {
        UniformValue::Bool(flag) => Upload::Int(i32::from(*flag)),
        UniformValue::Float(value) => Upload::Float(*value),
        UniformValue::Vec2(vector) => Upload::Floats(UniformShape::Vec2, vector),
        UniformValue::Vec3(vector) => Upload::Floats(UniformShape::Vec3, vector),
        UniformValue::Vec4(vector) => Upload::Floats(UniformShape::Vec4, vector),
        UniformValue::Mat3(matrix) => {
            Upload::Floats(UniformShape::Mat3, bytemuck::cast_slice(matrix.as_slice()))
        }
        UniformValue::Mat4(matrix) => {
            Upload::Floats(UniformShape::Mat4, bytemuck::cast_slice(matrix.as_slice()))
        }
        UniformValue::Vec4Array(colors) => {
            if colors.is_empty() {
                return Err(UnsupportedLength(0));
            }
            Upload::Floats(UniformShape::Vec4, bytemuck::cast_slice(colors.as_slice()))
        }
        UniformValue::Floats(values) => {
            let shape = UniformShape::from_len(values.len()).ok_or(UnsupportedLength(values.len()))?;
            Upload::Floats(shape, values)
        }
        UniformValue::Texture(image) => Upload::Texture(image),
    };
    Ok(upload)
}

/// Companion uniform carrying an image's width / height.
pub fn aspect_ratio_uniform(name: &str) -> String {
    format!("{name}_aspect_ratio")
}

/// Implicit uniforms every mount feeds.
pub const U_TIME: &str = "u_time";
pub const U_RESOLUTION: &str = "u_resolution";
pub const U_PIXEL_RATIO: &str = "u_pixelRatio";

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn bools_lower_to_integers() {
        assert_eq!(lower(&UniformValue::Bool(true)), Ok(Upload::Int(1)));
        assert_eq!(lower(&UniformValue::Bool(false)), Ok(Upload::Int(0)));
    }

    #[test]
    fn matrices_flatten_column_major() {
        let matrix = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let value = UniformValue::Mat3(matrix);
        let Ok(Upload::Floats(shape, data)) = lower(&value) else {
            panic!("matrix should lower to floats");
        };
        assert_eq!(shape, UniformShape::Mat3);
        assert_eq!(data, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn colour_arrays_upload_every_element() {
        let value = UniformValue::Vec4Array(vec![[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0]]);
        let Ok(Upload::Floats(shape, data)) = lower(&value) else {
            panic!("array should lower to floats");
        };
        assert_eq!(shape, UniformShape::Vec4);
        assert_eq!(data.len(), 8);
        assert_eq!(lower(&UniformValue::Vec4Array(Vec::new())), Err(UnsupportedLength(0)));
    }

    #[test]
    fn untyped_floats_dispatch_by_length() {
        let sixteen = UniformValue::Floats(vec![0.0; 16]);
        assert!(matches!(lower(&sixteen), Ok(Upload::Floats(UniformShape::Mat4, _))));
        let two = UniformValue::Floats(vec![0.5, 0.5]);
        assert!(matches!(lower(&two), Ok(Upload::Floats(UniformShape::Vec2, _))));
        let five = UniformValue::Floats(vec![0.0; 5]);
        assert_eq!(lower(&five), Err(UnsupportedLength(5)));
    }

    #[test]
    fn textures_pass_through() {
        let image = TextureImage::new(RgbaImage::new(1, 1));
        let value = UniformValue::Texture(image.clone());
        assert_eq!(lower(&value), Ok(Upload::Texture(&image)));
        assert_eq!(aspect_ratio_uniform("u_image"), "u_image_aspect_ratio");
    }
}
