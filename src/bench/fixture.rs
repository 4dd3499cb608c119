//! Fixture preparation
//!
//! The reference image is decoded and searched for faces exactly once.
//! Every detected face becomes an aligned copy of the whole reference
//! raster; the resulting set is shared read-only by every trial.

use std::path::Path;

use anyhow::Context;
use image::RgbImage;
use tracing::{info, warn};

use crate::engine::detector::{FaceBox, FaceDetection};
use crate::engine::preprocess::{align_face_in_place, load_image};
use crate::error::{BenchError, SetupStep};

/// One aligned face, produced from its own copy of the reference image
#[derive(Debug, Clone)]
pub struct AlignedFace {
    index: usize,
    image: RgbImage,
}

impl AlignedFace {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Position in detection order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Immutable, ordered set of aligned faces
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    faces: Vec<AlignedFace>,
}

impl Fixtures {
    pub fn new(faces: Vec<AlignedFace>) -> Self {
        Self { faces }
    }

    pub fn faces(&self) -> &[AlignedFace] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AlignedFace> {
        self.faces.iter()
    }
}

impl<'a> IntoIterator for &'a Fixtures {
    type Item = &'a AlignedFace;
    type IntoIter = std::slice::Iter<'a, AlignedFace>;

    fn into_iter(self) -> Self::IntoIter {
        self.faces.iter()
    }
}

/// Decode the reference image and build fixtures from it
pub fn build_fixtures<D: FaceDetection + ?Sized>(
    reference_image: &Path,
    detector: &D,
) -> Result<Fixtures, BenchError> {
    let reference = load_image(reference_image)
        .map_err(|e| BenchError::setup(SetupStep::DecodeImage, e))?;

    info!(
        "Reference image {} ({}x{})",
        reference_image.display(),
        reference.width(),
        reference.height()
    );

    build_fixtures_from_image(&reference, detector)
}

/// Detect faces once and align an independent clone of `reference` per face
pub fn build_fixtures_from_image<D: FaceDetection + ?Sized>(
    reference: &RgbImage,
    detector: &D,
) -> Result<Fixtures, BenchError> {
    let detected = detector
        .detect(reference)
        .map_err(|e| BenchError::setup(SetupStep::DetectFaces, e))?;

    if detected.is_empty() {
        warn!("No faces detected in reference image; every trial will be empty");
    }

    for (index, face) in detected.iter().enumerate() {
        check_landmarks(face)
            .with_context(|| format!("face #{} has malformed landmarks", index))
            .map_err(|e| BenchError::setup(SetupStep::DetectFaces, e))?;
    }

    let faces: Vec<AlignedFace> = detected
        .iter()
        .enumerate()
        .map(|(index, face)| {
            // Alignment overwrites its input
            let mut aligned = reference.clone();
            align_face_in_place(&mut aligned, &face.landmarks);
            AlignedFace::new(index, aligned)
        })
        .collect();

    info!("Prepared {} aligned face fixtures", faces.len());
    Ok(Fixtures::new(faces))
}

/// Landmarks must be finite and not all at one point
fn check_landmarks(face: &FaceBox) -> anyhow::Result<()> {
    anyhow::ensure!(
        face.landmarks.iter().all(|(x, y)| x.is_finite() && y.is_finite()),
        "non-finite landmark coordinates {:?}",
        face.landmarks
    );

    let n = face.landmarks.len() as f32;
    let (cx, cy) = face
        .landmarks
        .iter()
        .fold((0.0, 0.0), |(x, y), p| (x + p.0 / n, y + p.1 / n));
    let spread: f32 = face
        .landmarks
        .iter()
        .map(|(x, y)| (x - cx).powi(2) + (y - cy).powi(2))
        .sum();
    anyhow::ensure!(
        spread > 1e-6,
        "all landmarks coincide at ({:.1}, {:.1})",
        cx,
        cy
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::preprocess::ARCFACE_TEMPLATE;
    use image::Rgb;

    struct StubDetector(Vec<FaceBox>);

    impl FaceDetection for StubDetector {
        fn detect(&self, _image: &RgbImage) -> anyhow::Result<Vec<FaceBox>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetection for FailingDetector {
        fn detect(&self, _image: &RgbImage) -> anyhow::Result<Vec<FaceBox>> {
            anyhow::bail!("detector exploded")
        }
    }

    fn face_at(offset: f32) -> FaceBox {
        FaceBox {
            x1: offset,
            y1: offset,
            x2: offset + 120.0,
            y2: offset + 120.0,
            confidence: 0.9,
            landmarks: ARCFACE_TEMPLATE.map(|(x, y)| (x + offset, y + offset)),
        }
    }

    fn reference() -> RgbImage {
        RgbImage::from_fn(256, 192, |x, y| Rgb([x as u8, y as u8, 90]))
    }

    #[test]
    fn test_one_fixture_per_face_with_source_dimensions() {
        let reference = reference();
        let detector = StubDetector(vec![face_at(0.0), face_at(40.0), face_at(70.0)]);

        let fixtures = build_fixtures_from_image(&reference, &detector).unwrap();

        assert_eq!(fixtures.len(), 3);
        for (i, face) in fixtures.iter().enumerate() {
            assert_eq!(face.index(), i);
            assert_eq!(face.dimensions(), reference.dimensions());
        }
    }

    #[test]
    fn test_fixtures_are_independent_copies() {
        let reference = reference();
        let snapshot = reference.clone();
        let detector = StubDetector(vec![face_at(10.0), face_at(10.0)]);

        let fixtures = build_fixtures_from_image(&reference, &detector).unwrap();
        let (a, b) = (fixtures.faces()[0].image(), fixtures.faces()[1].image());

        assert_eq!(a, b);
        assert_ne!(a.as_raw().as_ptr(), b.as_raw().as_ptr());
        assert_ne!(a, &reference);
        assert_eq!(reference, snapshot);

        let mut faces = fixtures.faces().to_vec();
        faces[0].image.put_pixel(0, 0, Rgb([255, 0, 255]));

        assert_ne!(faces[0].image(), faces[1].image());
        assert_eq!(fixtures.faces()[0].image(), fixtures.faces()[1].image());
    }

    #[test]
    fn test_no_faces_is_empty_not_error() {
        let fixtures = build_fixtures_from_image(&reference(), &StubDetector(vec![])).unwrap();
        assert!(fixtures.is_empty());
    }

    #[test]
    fn test_detector_failure_is_setup_error() {
        let err = build_fixtures_from_image(&reference(), &FailingDetector).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Setup { step: SetupStep::DetectFaces, .. }
        ));
        assert!(err.to_string().contains("detector exploded"));
    }

    #[test]
    fn test_collapsed_landmarks_rejected() {
        let mut face = face_at(0.0);
        face.landmarks = [(0.0, 0.0); 5];
        let detector = StubDetector(vec![face_at(20.0), face]);

        let err = build_fixtures_from_image(&reference(), &detector).unwrap_err();

        assert!(matches!(
            err,
            BenchError::Setup { step: SetupStep::DetectFaces, .. }
        ));
        let msg = err.to_string();
        assert!(msg.contains("face #1"));
        assert!(msg.contains("coincide"));
    }

    #[test]
    fn test_nan_landmarks_rejected() {
        let mut face = face_at(0.0);
        face.landmarks[2] = (f32::NAN, 71.0);

        let err = build_fixtures_from_image(&reference(), &StubDetector(vec![face])).unwrap_err();

        assert!(matches!(
            err,
            BenchError::Setup { step: SetupStep::DetectFaces, .. }
        ));
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_missing_image_is_decode_error() {
        let err = build_fixtures(Path::new("/nonexistent/reference.jpeg"), &StubDetector(vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::Setup { step: SetupStep::DecodeImage, .. }
        ));
    }
}
