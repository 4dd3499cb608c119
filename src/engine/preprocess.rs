//! Image preprocessing for detection and embedding

use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, imageops::FilterType, DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

/// Standard input size for face detection (SCRFD)
pub const DETECTOR_INPUT_SIZE: (u32, u32) = (640, 640);

/// Standard input size for face embedding (ArcFace)
pub const EMBEDDER_INPUT_SIZE: (u32, u32) = (112, 112);

/// ArcFace landmark template for a 112x112 aligned face
pub const ARCFACE_TEMPLATE: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Channel order of the produced tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Pixel value mapping applied while building the tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelScale {
    /// Raw 0..255 values
    Raw,
    /// (v - 127.5) / 128.0
    Symmetric,
}

impl PixelScale {
    fn apply(self, v: u8) -> f32 {
        match self {
            PixelScale::Raw => v as f32,
            PixelScale::Symmetric => (v as f32 - 127.5) / 128.0,
        }
    }
}

/// 2x3 similarity transform `[scale*R | t]`
pub type Transform = [[f32; 3]; 2];

/// Load an image file, applying EXIF orientation
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read image file {}", path.display()))?;
    decode_image(&data)
}

/// Decode image bytes to RGB with EXIF orientation handling
pub fn decode_image(data: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(data).context("Failed to decode image")?;
    Ok(apply_exif_orientation(data, image).to_rgb8())
}

fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    };

    // https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Resize keeping aspect ratio, centered on a black canvas of the target size
pub fn letterbox(image: &RgbImage, target: (u32, u32)) -> RgbImage {
    let info = ResizeInfo::new(image.dimensions(), target);
    let (target_w, target_h) = target;

    let new_w = ((image.width() as f32 * info.scale) as u32).clamp(1, target_w);
    let new_h = ((image.height() as f32 * info.scale) as u32).clamp(1, target_h);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut padded = RgbImage::from_pixel(target_w, target_h, Rgb([0, 0, 0]));
    imageops::replace(&mut padded, &resized, info.offset_x as i64, info.offset_y as i64);
    padded
}

/// Convert an RGB image to a 1xCxHxW tensor
pub fn image_to_nchw(image: &RgbImage, order: ChannelOrder, scale: PixelScale) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    let channels = match order {
        ChannelOrder::Rgb => [0, 1, 2],
        ChannelOrder::Bgr => [2, 1, 0],
    };

    for (x, y, pixel) in image.enumerate_pixels() {
        for (plane, &src) in channels.iter().enumerate() {
            tensor[[0, plane, y as usize, x as usize]] = scale.apply(pixel[src]);
        }
    }

    tensor
}

/// Least-squares similarity transform mapping `src` points onto `dst`.
///
/// Closed form of the Umeyama estimate restricted to proper rotations:
/// with centered points, `a = sum(s.d) / sum(|s|^2)` and
/// `b = sum(s x d) / sum(|s|^2)` give `scale*R = [[a, -b], [b, a]]`.
pub fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Transform {
    let n = src.len() as f32;

    let (src_cx, src_cy) = src.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
    let (dst_cx, dst_cy) = dst.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
    let (src_cx, src_cy) = (src_cx / n, src_cy / n);
    let (dst_cx, dst_cy) = (dst_cx / n, dst_cy / n);

    let mut var_src = 0.0f32;
    let mut dot = 0.0f32;
    let mut cross = 0.0f32;

    for (s, d) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (s.0 - src_cx, s.1 - src_cy);
        let (dx, dy) = (d.0 - dst_cx, d.1 - dst_cy);

        var_src += sx * sx + sy * sy;
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
    }

    // Degenerate landmarks (all points coincide): translate only
    let (a, b) = if var_src > 1e-10 {
        (dot / var_src, cross / var_src)
    } else {
        (1.0, 0.0)
    };

    let tx = dst_cx - (a * src_cx - b * src_cy);
    let ty = dst_cy - (b * src_cx + a * src_cy);

    [[a, -b, tx], [b, a, ty]]
}

/// Apply a transform to a point
pub fn transform_point(t: &Transform, (x, y): (f32, f32)) -> (f32, f32) {
    (
        t[0][0] * x + t[0][1] * y + t[0][2],
        t[1][0] * x + t[1][1] * y + t[1][2],
    )
}

/// Align a face in place using its 5-point landmarks.
///
/// The raster keeps its dimensions; the landmarks land on the ArcFace
/// template, so the aligned face occupies the top-left 112x112 window.
pub fn align_face_in_place(image: &mut RgbImage, landmarks: &[(f32, f32); 5]) {
    let transform = estimate_similarity_transform(landmarks, &ARCFACE_TEMPLATE);
    let source = image.clone();
    warp_into(&source, &transform, image);
}

/// Backward-map every output pixel through the inverse transform with
/// bilinear sampling. Pixels mapping outside the source become black.
fn warp_into(source: &RgbImage, transform: &Transform, output: &mut RgbImage) {
    let det = transform[0][0] * transform[1][1] - transform[0][1] * transform[1][0];
    if det.abs() < f32::EPSILON {
        output.pixels_mut().for_each(|p| *p = Rgb([0, 0, 0]));
        return;
    }

    let inv = [
        [transform[1][1] / det, -transform[0][1] / det],
        [-transform[1][0] / det, transform[0][0] / det],
    ];

    let max_x = source.width().saturating_sub(1) as f32;
    let max_y = source.height().saturating_sub(1) as f32;

    for (x, y, out) in output.enumerate_pixels_mut() {
        let dx = x as f32 - transform[0][2];
        let dy = y as f32 - transform[1][2];

        let src_x = inv[0][0] * dx + inv[0][1] * dy;
        let src_y = inv[1][0] * dx + inv[1][1] * dy;

        *out = if src_x >= 0.0 && src_x <= max_x && src_y >= 0.0 && src_y <= max_y {
            sample_bilinear(source, src_x, src_y)
        } else {
            Rgb([0, 0, 0])
        };
    }
}

fn sample_bilinear(source: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x as u32;
    let y0 = y as u32;
    let x1 = (x0 + 1).min(source.width() - 1);
    let y1 = (y0 + 1).min(source.height() - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = source.get_pixel(x0, y0);
    let p01 = source.get_pixel(x0, y1);
    let p10 = source.get_pixel(x1, y0);
    let p11 = source.get_pixel(x1, y1);

    let mut pixel = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        pixel[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(pixel)
}

/// The embedder input window of an aligned raster: its top-left 112x112
/// region, or the whole raster stretched to 112x112 when it is smaller.
pub fn embedding_window(aligned: &RgbImage) -> RgbImage {
    let (target_w, target_h) = EMBEDDER_INPUT_SIZE;
    let (w, h) = aligned.dimensions();

    if w >= target_w && h >= target_h {
        imageops::crop_imm(aligned, 0, 0, target_w, target_h).to_image()
    } else {
        imageops::resize(aligned, target_w, target_h, FilterType::Triangle)
    }
}

/// Letterbox geometry for mapping detections back to the source image
#[derive(Debug, Clone)]
pub struct ResizeInfo {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl ResizeInfo {
    pub fn new(original: (u32, u32), target: (u32, u32)) -> Self {
        let (orig_w, orig_h) = original;
        let (target_w, target_h) = target;

        let scale = f32::min(
            target_w as f32 / orig_w.max(1) as f32,
            target_h as f32 / orig_h.max(1) as f32,
        );

        let new_w = ((orig_w as f32 * scale) as u32).min(target_w);
        let new_h = ((orig_h as f32 * scale) as u32).min(target_h);

        Self {
            scale,
            offset_x: (target_w - new_w) / 2,
            offset_y: (target_h - new_h) / 2,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    /// Convert detection coordinates back to original image space
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.offset_x as f32) / self.scale;
        let y = (y - self.offset_y as f32) / self.scale;
        (x, y)
    }
}
