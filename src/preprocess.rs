use std::{io::Cursor, path::Path};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, RgbImage, imageops::FilterType};
use tch::{Kind, Tensor};

use crate::error::ServiceError;

pub const IMG_SIZE: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct PreparedImage {
    // [1, 3, 224, 224]
    pub tensor: Tensor,
    pub original_width: u32,
    pub original_height: u32,
}

pub fn prepare(bytes: &[u8]) -> Result<PreparedImage, ServiceError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ServiceError::InvalidImage(e.to_string()))?;
    let (original_width, original_height) = (img.width(), img.height());
    let tensor = to_normalized_tensor(&img).unsqueeze(0);
    Ok(PreparedImage {
        tensor,
        original_width,
        original_height,
    })
}

pub fn load_image_file(path: &Path) -> Result<Tensor, ServiceError> {
    let img = image::open(path)
        .map_err(|e| ServiceError::InvalidImage(format!("{}: {e}", path.display())))?;
    Ok(to_normalized_tensor(&img))
}

fn to_normalized_tensor(img: &DynamicImage) -> Tensor {
    let rgb = img
        .resize_exact(IMG_SIZE, IMG_SIZE, FilterType::Triangle)
        .to_rgb8();
    let raw = rgb.into_raw();
    let tensor = Tensor::from_slice(&raw)
        .reshape([IMG_SIZE as i64, IMG_SIZE as i64, 3])
        .permute([2, 0, 1])
        .to_kind(Kind::Float)
        / 255.0;
    let mean = Tensor::from_slice(&IMAGENET_MEAN).view([3, 1, 1]);
    let std = Tensor::from_slice(&IMAGENET_STD).view([3, 1, 1]);
    (tensor - mean) / std
}

pub fn preview_data_url(tensor: &Tensor) -> Result<String, ServiceError> {
    let img = tensor.to_device(tch::Device::Cpu).to_kind(Kind::Float);
    let img = if img.dim() == 4 { img.squeeze_dim(0) } else { img };
    let size = img.size();
    if size.len() != 3 || size[0] != 3 {
        return Err(ServiceError::Other(format!(
            "preview expects a [3, H, W] tensor, got {size:?}"
        )));
    }
    let (height, width) = (size[1], size[2]);

    let mean = Tensor::from_slice(&IMAGENET_MEAN).view([3, 1, 1]);
    let std = Tensor::from_slice(&IMAGENET_STD).view([3, 1, 1]);
    let pixels = ((img * std + mean).clamp(0.0, 1.0) * 255.0)
        .permute([1, 2, 0])
        .contiguous()
        .to_kind(Kind::Uint8)
        .flatten(0, -1);
    let raw = Vec::<u8>::try_from(&pixels)?;

    let buffer = RgbImage::from_raw(width as u32, height as u32, raw)
        .ok_or_else(|| ServiceError::Other("preview buffer has the wrong length".into()))?;
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(buffer)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| ServiceError::Other(format!("preview encoding failed: {e}")))?;

    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(png.into_inner())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb(rgb));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_prepare_shape_and_original_size() {
        let prepared = prepare(&solid_png(40, 30, [10, 20, 30])).unwrap();
        assert_eq!(prepared.tensor.size(), vec![1, 3, 224, 224]);
        assert_eq!(prepared.original_width, 40);
        assert_eq!(prepared.original_height, 30);
    }

    #[test]
    fn test_prepare_normalizes_with_imagenet_stats() {
        let prepared = prepare(&solid_png(8, 8, [255, 0, 128])).unwrap();
        let t = &prepared.tensor;
        let red = t.double_value(&[0, 0, 100, 100]);
        let green = t.double_value(&[0, 1, 5, 5]);
        let blue = t.double_value(&[0, 2, 0, 0]);
        assert!((red - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        assert!((green - (0.0 - 0.456) / 0.224).abs() < 1e-4);
        assert!((blue - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-4);
    }

    #[test]
    fn test_prepare_rejects_garbage() {
        let err = prepare(b"definitely not an image").err().unwrap();
        assert!(matches!(err, ServiceError::InvalidImage(_)));
    }

    #[test]
    fn test_preview_round_trips_colors() {
        let prepared = prepare(&solid_png(16, 16, [200, 100, 50])).unwrap();
        let url = preview_data_url(&prepared.tensor).unwrap();
        let encoded = url.strip_prefix("data:image/png;base64,").unwrap();
        let png = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (224, 224));
        let px = decoded.get_pixel(112, 112).0;
        for (got, want) in px.iter().zip([200u8, 100, 50]) {
            assert!((*got as i32 - want as i32).abs() <= 1, "{px:?}");
        }
    }
}
