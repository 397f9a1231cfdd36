//! End-to-end scan of a synthetic scene through the whole pipeline.

use image::{GrayImage, Rgb, RgbImage};
use nalgebra::{Matrix3, Vector3};

use crate::calib::Calibration;
use crate::camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};
use crate::decode::FrameDecoder;
use crate::encode::PatternEncoder;
use crate::map::CorrespondenceMap;
use crate::options::Options;
use crate::triangulate::triangulate;
use crate::MapStats;

const CAM_W: u32 = 32;
const CAM_H: u32 = 24;

fn scan_rig() -> (Options, Calibration) {
    let options = Options::new(64, 32, 0.5, 1).unwrap();
    let camera = CameraModel {
        intrinsics: CameraIntrinsics {
            fx: 40.0,
            fy: 40.0,
            cx: 16.0,
            cy: 12.0,
        },
        distortion: RadialTangentialDistortion::default(),
    };
    let projector = CameraModel {
        intrinsics: CameraIntrinsics {
            fx: 60.0,
            fy: 40.0,
            cx: 32.0,
            cy: 16.0,
        },
        distortion: RadialTangentialDistortion::default(),
    };
    let calibration = Calibration::new(
        camera,
        projector,
        Matrix3::identity(),
        Vector3::new(0.05, 0.0, 0.0),
    )
    .unwrap();
    (options, calibration)
}

/// Projector pixel a camera pixel sees on a wall at z = 1.
fn wall_projection(calibration: &Calibration, x: u32, y: u32) -> (f64, f64) {
    let cam = calibration.camera().intrinsics;
    let proj = calibration.projector().intrinsics;
    let t = calibration.translation();
    let xn = (x as f64 + 0.5 - cam.cx) / cam.fx;
    let yn = (y as f64 + 0.5 - cam.cy) / cam.fy;
    (
        proj.fx * (xn - t.x) + proj.cx,
        proj.fy * (yn - t.y) + proj.cy,
    )
}

/// Render what the camera captures while one pattern is projected.
fn capture(calibration: &Calibration, pattern: &GrayImage) -> GrayImage {
    GrayImage::from_fn(CAM_W, CAM_H, |x, y| {
        let (u, v) = wall_projection(calibration, x, y);
        *pattern.get_pixel(u.floor() as u32, v.floor() as u32)
    })
}

#[test]
fn full_scan_reconstructs_a_frontal_wall() {
    let (options, calibration) = scan_rig();

    let mut encoder = PatternEncoder::new(&options);
    let mut decoder = FrameDecoder::new(&options);
    while !encoder.is_finished() {
        let pattern = encoder.current_image().unwrap();
        decoder.add_frame(&capture(&calibration, &pattern)).unwrap();
        encoder.advance().unwrap();
    }
    assert!(decoder.is_finished());

    // The wall fills the camera view, so every pixel decodes.
    let total = (CAM_W * CAM_H) as usize;
    assert_eq!(decoder.horizontal_map().unwrap().valid_count(), total);
    assert_eq!(decoder.vertical_map().unwrap().valid_count(), total);
    for y in 0..CAM_H {
        for x in 0..CAM_W {
            let (u, v) = wall_projection(&calibration, x, y);
            let col = decoder.horizontal_map().unwrap().get(x, y).unwrap();
            let row = decoder.vertical_map().unwrap().get(x, y).unwrap();
            assert_eq!(col, u.floor() as f32, "col at ({x}, {y})");
            assert_eq!(row, v.floor() as f32, "row at ({x}, {y})");
        }
    }

    // Persist both maps and carry on from the on-disk copies.
    let dir = tempfile::tempdir().unwrap();
    let h_path = dir.path().join("h.map");
    let v_path = dir.path().join("v.map");
    decoder.horizontal_map().unwrap().write(&h_path).unwrap();
    decoder.vertical_map().unwrap().write(&v_path).unwrap();
    let horizontal = CorrespondenceMap::read(&h_path).unwrap();
    let vertical = CorrespondenceMap::read(&v_path).unwrap();

    let color = RgbImage::from_fn(CAM_W, CAM_H, |x, y| Rgb([x as u8, y as u8, 200]));
    let mesh = triangulate(
        &options,
        &horizontal,
        &vertical,
        decoder.mask().unwrap(),
        &calibration,
        &color,
    )
    .unwrap();

    // Decoded columns quantize to whole projector pixels, so individual
    // depths wobble around the true wall but their mean stays on it.
    assert_eq!(mesh.len(), total);
    let mut depth_sum = 0.0;
    for vertex in mesh.vertices() {
        let z = vertex.position[2];
        assert!((0.9..1.1).contains(&z), "z = {z}");
        depth_sum += z;
    }
    let mean = depth_sum / mesh.len() as f64;
    assert!((mean - 1.0).abs() < 0.02, "mean depth {mean}");

    let ply_path = dir.path().join("wall.ply");
    mesh.save_ply(&ply_path).unwrap();
    let ply = std::fs::read_to_string(&ply_path).unwrap();
    assert!(ply.starts_with("ply\n"));
    assert!(ply.contains(&format!("element vertex {total}")));
}

#[test]
fn map_stats_summarize_decode_coverage() {
    let (options, calibration) = scan_rig();
    let mut encoder = PatternEncoder::new(&options);
    let mut decoder = FrameDecoder::new(&options);
    while !encoder.is_finished() {
        let pattern = encoder.current_image().unwrap();
        decoder.add_frame(&capture(&calibration, &pattern)).unwrap();
        encoder.advance().unwrap();
    }

    let stats = MapStats::of(decoder.horizontal_map().unwrap());
    assert_eq!(stats.image_size, [CAM_W, CAM_H]);
    assert_eq!(stats.valid_pixels, (CAM_W * CAM_H) as usize);
    assert_eq!(stats.coverage, 1.0);
    let min = stats.min_value.unwrap();
    let max = stats.max_value.unwrap();
    assert!(min >= 0.0 && max < 64.0, "range {min}..{max}");
    assert!(min < max);

    let empty = MapStats::of(&CorrespondenceMap::new(4, 4));
    assert_eq!(empty.valid_pixels, 0);
    assert_eq!(empty.coverage, 0.0);
    assert!(empty.min_value.is_none());
}
