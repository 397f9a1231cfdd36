use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use grayscan_core::calib::Calibration;
use grayscan_core::camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};
use grayscan_core::decode::FrameDecoder;
use grayscan_core::encode::PatternEncoder;
use grayscan_core::map::CorrespondenceMap;
use grayscan_core::options::Options;
use grayscan_core::triangulate::triangulate;

fn make_capture_fixture(options: &Options, seed: u64) -> Vec<GrayImage> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut encoder = PatternEncoder::new(options);
    let mut frames = Vec::with_capacity(encoder.pattern_count());
    while !encoder.is_finished() {
        let mut frame = encoder.current_image().expect("sequence not exhausted");
        for p in frame.pixels_mut() {
            let noisy = p.0[0] as i16 + rng.gen_range(-6i16..=6);
            p.0[0] = noisy.clamp(0, 255) as u8;
        }
        frames.push(frame);
        encoder.advance().expect("sequence not exhausted");
    }
    frames
}

fn bench_decode(c: &mut Criterion) {
    let options = Options::new(640, 480, 0.5, 1).expect("valid options");
    let frames = make_capture_fixture(&options, 7);

    c.bench_function("decode_640x480_sequence", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new(&options);
            for frame in &frames {
                decoder
                    .add_frame(black_box(frame))
                    .expect("frame count matches sequence");
            }
            black_box(decoder.is_finished())
        })
    });
}

fn make_map_fixture(
    width: u32,
    height: u32,
    options: &Options,
    seed: u64,
) -> (CorrespondenceMap, CorrespondenceMap, GrayImage) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut horizontal = CorrespondenceMap::new(width, height);
    let mut vertical = CorrespondenceMap::new(width, height);
    let mut mask = GrayImage::new(width, height);
    let max_col = options.projector_width as f32;
    let max_row = options.projector_height as f32;
    for y in 0..height {
        for x in 0..width {
            // Roughly a tilted wall with dropouts, like a real decode.
            if rng.gen_range(0..100) < 92 {
                let col = (x as f32 / width as f32) * (max_col * 0.8)
                    + rng.gen_range(0.0..max_col * 0.1);
                let row = (y as f32 / height as f32) * (max_row * 0.8)
                    + rng.gen_range(0.0..max_row * 0.1);
                horizontal.set(x, y, col);
                vertical.set(x, y, row);
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }
    (horizontal, vertical, mask)
}

fn bench_triangulate(c: &mut Criterion) {
    let options = Options::new(1024, 768, 0.5, 1).expect("valid options");
    let camera = CameraModel {
        intrinsics: CameraIntrinsics {
            fx: 900.0,
            fy: 900.0,
            cx: 320.0,
            cy: 240.0,
        },
        distortion: RadialTangentialDistortion {
            k1: -0.08,
            k2: 0.01,
            p1: 0.0005,
            p2: -0.0004,
            k3: 0.0,
        },
    };
    let projector = CameraModel {
        intrinsics: CameraIntrinsics {
            fx: 1300.0,
            fy: 1300.0,
            cx: 512.0,
            cy: 384.0,
        },
        distortion: RadialTangentialDistortion::default(),
    };
    let calibration = Calibration::new(
        camera,
        projector,
        Matrix3::identity(),
        Vector3::new(0.12, 0.02, 0.0),
    )
    .expect("valid rig");
    let (horizontal, vertical, mask) = make_map_fixture(640, 480, &options, 99);
    let color = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));

    c.bench_function("triangulate_640x480_cloud", |b| {
        b.iter(|| {
            let mesh = triangulate(
                black_box(&options),
                black_box(&horizontal),
                black_box(&vertical),
                black_box(&mask),
                &calibration,
                &color,
            )
            .expect("inputs share one geometry");
            black_box(mesh.len())
        })
    });
}

criterion_group!(hotpaths, bench_decode, bench_triangulate);
criterion_main!(hotpaths);
